//! Protocol Messages
//!
//! Wire format for gateway clients. Every frame is a JSON object tagged by
//! `type`; server errors carry a stable [`ErrorCode`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ids::{ActorId, RoomId};
use crate::events::schema::EventType;
use crate::events::validator::ValidationError;
use crate::ingest::coordinator::{BroadcastStatus, IngestError, IngestReceipt};
use crate::network::auth::AuthError;
use crate::rooms::broadcast::RoomBroadcast;
use crate::rooms::room::{Player, RoomError};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with a provider-issued JWT.
    Auth {
        /// Bearer token.
        token: String,
    },

    /// Submit a gameplay event.
    SubmitEvent {
        /// Emulator that produced the event; falls back to the event's own tag.
        #[serde(default)]
        emulator: Option<String>,
        /// Raw event object.
        event: Value,
    },

    /// Open a new room owned by the caller.
    CreateRoom {
        /// Display name.
        name: String,
        /// Capacity.
        max_players: usize,
    },

    /// Join a room.
    JoinRoom {
        /// Room to join.
        room_id: String,
    },

    /// Leave a room.
    LeaveRoom {
        /// Room to leave.
        room_id: String,
    },

    /// Refresh presence in a room.
    Heartbeat {
        /// Room the caller is in.
        room_id: String,
    },

    /// Receive the room's gameplay broadcasts on this connection.
    SubscribeRoom {
        /// Room to follow.
        room_id: String,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        #[serde(default)]
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication outcome.
    AuthResult(AuthResult),

    /// Event persisted.
    EventAccepted(EventAccepted),

    /// Room opened.
    RoomCreated {
        /// New room.
        room_id: RoomId,
    },

    /// Caller is a member of the room.
    RoomJoined {
        /// Room.
        room_id: RoomId,
        /// True if the caller was already a member.
        already_member: bool,
        /// Current members.
        players: Vec<Player>,
    },

    /// Leave processed.
    RoomLeft {
        /// Room.
        room_id: RoomId,
        /// False if the caller was not a member.
        removed: bool,
    },

    /// Presence refreshed.
    HeartbeatAck {
        /// Room.
        room_id: RoomId,
        /// False if the caller is not a member.
        member: bool,
    },

    /// Subscription registered.
    Subscribed {
        /// Room.
        room_id: RoomId,
    },

    /// Gameplay event published to a subscribed room.
    RoomBroadcast(RoomBroadcast),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time in Unix milliseconds.
        server_time: u64,
    },

    /// Request failed.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Reason.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether the token was accepted.
    pub success: bool,
    /// Actor the connection now acts as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<ActorId>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Summary of an accepted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAccepted {
    /// Event log id.
    pub event_id: String,
    /// Canonical kind.
    pub event_type: EventType,
    /// Normalized score.
    pub score: u64,
    /// Room the event was attributed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Reward handlers that processed it.
    pub rewards_notified: usize,
    /// Broadcast step outcome.
    pub broadcast: BroadcastStatus,
}

impl From<&IngestReceipt> for EventAccepted {
    fn from(receipt: &IngestReceipt) -> Self {
        Self {
            event_id: receipt.event.id.to_string(),
            event_type: receipt.event.event_type.clone(),
            score: receipt.event.score,
            room_id: receipt.event.room_id.clone(),
            rewards_notified: receipt.rewards_notified,
            broadcast: receipt.broadcast,
        }
    }
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Seconds to wait before retrying, for rate limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ServerError {
    /// Error without retry hint.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Token rejected.
    AuthFailed,
    /// Request needs an authenticated connection.
    NotAuthenticated,
    /// JWT has expired.
    TokenExpired,
    /// Malformed frame or argument.
    InvalidInput,
    /// Event type not allowed.
    InvalidEventType,
    /// Actor unknown.
    InvalidActor,
    /// Score outside bounds.
    ScoreOutOfRange,
    /// Room reference malformed.
    InvalidRoomReference,
    /// Payload malformed or too large.
    InvalidPayload,
    /// Rate limited.
    RateLimited,
    /// Room does not exist.
    RoomNotFound,
    /// Room is not accepting joins.
    RoomInactive,
    /// Room has no free slot.
    RoomFull,
    /// Bad room name or capacity.
    InvalidRoom,
    /// Caller may not manage the room.
    Forbidden,
    /// Connection cap reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&AuthError> for ServerError {
    fn from(err: &AuthError) -> Self {
        let code = match err {
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::NotConfigured => ErrorCode::InternalError,
            _ => ErrorCode::AuthFailed,
        };
        ServerError::new(code, err.to_string())
    }
}

impl From<&IngestError> for ServerError {
    fn from(err: &IngestError) -> Self {
        let code = match err {
            IngestError::Validation(v) => match v {
                ValidationError::InvalidEventType(_) => ErrorCode::InvalidEventType,
                ValidationError::InvalidActor(_) => ErrorCode::InvalidActor,
                ValidationError::ScoreOutOfRange { .. } => ErrorCode::ScoreOutOfRange,
                ValidationError::InvalidRoomReference(_) => ErrorCode::InvalidRoomReference,
                ValidationError::InvalidPayload | ValidationError::PayloadTooLarge { .. } => {
                    ErrorCode::InvalidPayload
                }
                ValidationError::Directory(_) => ErrorCode::InternalError,
            },
            IngestError::RateLimited { retry_after } => {
                return ServerError {
                    code: ErrorCode::RateLimited,
                    message: err.to_string(),
                    retry_after: Some(retry_after.as_secs()),
                };
            }
            IngestError::Counter(_) | IngestError::Persistence(_) => ErrorCode::InternalError,
        };
        ServerError::new(code, err.to_string())
    }
}

impl From<&RoomError> for ServerError {
    fn from(err: &RoomError) -> Self {
        let code = match err {
            RoomError::NotFound(_) => ErrorCode::RoomNotFound,
            RoomError::Inactive(_) => ErrorCode::RoomInactive,
            RoomError::Full(_) => ErrorCode::RoomFull,
            RoomError::InvalidCapacity(_) | RoomError::InvalidName => ErrorCode::InvalidRoom,
            RoomError::Forbidden { .. } => ErrorCode::Forbidden,
            RoomError::CreationFailed(_) | RoomError::Store(_) => ErrorCode::InternalError,
        };
        // Store details stay in the logs.
        let message = if err.is_infrastructure() {
            "room service unavailable".to_string()
        } else {
            err.to_string()
        };
        ServerError::new(code, message)
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::store::EventStoreError;
    use std::time::Duration;

    #[test]
    fn test_client_submit_event_parsing() {
        let msg = ClientMessage::from_json(
            r#"{"type":"submit_event","emulator":"JSNES","event":{"event":"level_cleared","score":10}}"#,
        )
        .unwrap();

        match msg {
            ClientMessage::SubmitEvent { emulator, event } => {
                assert_eq!(emulator.as_deref(), Some("JSNES"));
                assert_eq!(event["score"], 10);
            }
            other => panic!("wrong message: {:?}", other),
        }

        let msg = ClientMessage::from_json(r#"{"type":"submit_event","event":{}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SubmitEvent { emulator: None, .. }));
    }

    #[test]
    fn test_client_room_messages() {
        let msg = ClientMessage::from_json(r#"{"type":"create_room","name":"Lobby","max_players":4}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CreateRoom { max_players: 4, .. }));

        let msg = ClientMessage::from_json(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping { timestamp: 0 }));

        assert!(ClientMessage::from_json(r#"{"type":"join_room"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let json = ServerMessage::RoomLeft {
            room_id: RoomId::parse("room_abc123def456").unwrap(),
            removed: true,
        }
        .to_json()
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "room_left");
        assert_eq!(value["room_id"], "room_abc123def456");

        let parsed = ServerMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, ServerMessage::RoomLeft { removed: true, .. }));
    }

    #[test]
    fn test_rate_limited_error_carries_retry_after() {
        let err = IngestError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        let frame = ServerError::from(&err);
        assert_eq!(frame.code, ErrorCode::RateLimited);
        assert_eq!(frame.retry_after, Some(42));

        let json = ServerMessage::Error(frame).to_json().unwrap();
        assert!(json.contains("\"code\":\"rate_limited\""));
        assert!(json.contains("\"retry_after\":42"));
    }

    #[test]
    fn test_error_code_mapping() {
        let invalid = IngestError::Validation(ValidationError::InvalidEventType("warp".into()));
        assert_eq!(ServerError::from(&invalid).code, ErrorCode::InvalidEventType);

        let outage = IngestError::Persistence(EventStoreError::Unavailable("db down".into()));
        assert_eq!(ServerError::from(&outage).code, ErrorCode::InternalError);

        let room = RoomId::parse("room_abc123def456").unwrap();
        assert_eq!(ServerError::from(&RoomError::Full(room.clone())).code, ErrorCode::RoomFull);
        assert_eq!(ServerError::from(&RoomError::NotFound(room)).code, ErrorCode::RoomNotFound);

        let json = ServerMessage::error(ErrorCode::RoomFull, "full").to_json().unwrap();
        assert!(json.contains("room_full"));
        assert!(!json.contains("retry_after"));
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(ServerError::from(&AuthError::Expired).code, ErrorCode::TokenExpired);
        assert_eq!(ServerError::from(&AuthError::InvalidSignature).code, ErrorCode::AuthFailed);
    }
}
