//! Room domain events.
//!
//! Emitted by the manager after each successful mutation (evictions are
//! emitted before the sweep persists) and delivered over a tokio broadcast
//! channel to whoever subscribed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ids::{ActorId, RoomId};

/// Something happened to a room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomEvent {
    /// Room created
    Created {
        room_id: RoomId,
        created_by: ActorId,
        at: DateTime<Utc>,
    },

    /// Name, capacity, active flag or raw membership changed
    Updated { room_id: RoomId, at: DateTime<Utc> },

    /// Room deleted with its membership
    Deleted { room_id: RoomId, at: DateTime<Utc> },

    /// Actor joined
    PlayerJoined {
        room_id: RoomId,
        actor_id: ActorId,
        at: DateTime<Utc>,
    },

    /// Actor left
    PlayerLeft {
        room_id: RoomId,
        actor_id: ActorId,
        at: DateTime<Utc>,
    },

    /// Actor removed by the presence sweep
    PlayerEvicted {
        room_id: RoomId,
        actor_id: ActorId,
        last_seen_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

impl RoomEvent {
    /// Room the event concerns.
    pub fn room_id(&self) -> &RoomId {
        match self {
            RoomEvent::Created { room_id, .. }
            | RoomEvent::Updated { room_id, .. }
            | RoomEvent::Deleted { room_id, .. }
            | RoomEvent::PlayerJoined { room_id, .. }
            | RoomEvent::PlayerLeft { room_id, .. }
            | RoomEvent::PlayerEvicted { room_id, .. } => room_id,
        }
    }

    /// Actor the event concerns, for membership events.
    pub fn actor_id(&self) -> Option<ActorId> {
        match self {
            RoomEvent::PlayerJoined { actor_id, .. }
            | RoomEvent::PlayerLeft { actor_id, .. }
            | RoomEvent::PlayerEvicted { actor_id, .. } => Some(*actor_id),
            RoomEvent::Created { .. } | RoomEvent::Updated { .. } | RoomEvent::Deleted { .. } => None,
        }
    }
}
