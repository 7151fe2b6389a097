//! Event Validator
//!
//! Gatekeeper between adapter output and the event log. Checks the canonical
//! taxonomy, actor identity, score bounds, room reference format and payload
//! size, then produces an immutable [`CanonicalEvent`].

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::core::actor::{ActorDirectory, DirectoryError};
use crate::core::clock::SharedClock;
use crate::core::ids::{ActorId, RoomId};
use crate::events::schema::{fields, numeric_value, CanonicalEvent, EventType, RawEvent};

/// Validator limits.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Highest score accepted.
    pub max_score: u64,
    /// Largest serialized payload, in bytes.
    pub max_payload_bytes: usize,
    /// Event types registered on top of the built-in taxonomy.
    pub extra_event_types: BTreeSet<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_score: 999_999_999,
            max_payload_bytes: 10_240,
            extra_event_types: BTreeSet::new(),
        }
    }
}

/// Why an event was rejected.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// Missing or unknown event type.
    #[error("invalid event type: {0}")]
    InvalidEventType(String),

    /// Missing or unknown actor.
    #[error("invalid actor: {0}")]
    InvalidActor(String),

    /// Score is not a non-negative number within bounds.
    #[error("score out of range: {value} (max {max})")]
    ScoreOutOfRange {
        /// Offending value as submitted.
        value: String,
        /// Configured maximum.
        max: u64,
    },

    /// Room reference is malformed.
    #[error("invalid room reference: {0}")]
    InvalidRoomReference(String),

    /// Payload is not a JSON object.
    #[error("payload must be an object")]
    InvalidPayload,

    /// Serialized payload exceeds the configured limit.
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge {
        /// Serialized size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Actor directory could not be queried.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl ValidationError {
    /// Directory outages are infrastructure failures, everything else is the client's fault.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ValidationError::Directory(_))
    }
}

/// Validates raw events against the canonical schema.
pub struct EventValidator {
    config: RwLock<ValidatorConfig>,
    directory: Arc<dyn ActorDirectory>,
    clock: SharedClock,
}

impl EventValidator {
    /// Create a validator.
    pub fn new(config: ValidatorConfig, directory: Arc<dyn ActorDirectory>, clock: SharedClock) -> Self {
        Self {
            config: RwLock::new(config),
            directory,
            clock,
        }
    }

    /// Snapshot of the current limits.
    pub fn config(&self) -> ValidatorConfig {
        self.config.read().clone()
    }

    /// Replace limits at runtime.
    pub fn update_config(&self, config: ValidatorConfig) {
        *self.config.write() = config;
    }

    /// Allow an additional event type. Returns false if it was already allowed.
    pub fn register_event_type(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || EventType::from_name(name).is_builtin() {
            return false;
        }
        self.config.write().extra_event_types.insert(name.to_string())
    }

    /// Every accepted event type, built-ins first.
    pub fn allowed_event_types(&self) -> Vec<EventType> {
        let config = self.config.read();
        EventType::BUILTIN
            .into_iter()
            .chain(config.extra_event_types.iter().map(|n| EventType::Registered(n.clone())))
            .collect()
    }

    /// Whether an event type is part of the current taxonomy.
    pub fn is_allowed(&self, event_type: &EventType) -> bool {
        match event_type {
            EventType::Registered(name) => self.config.read().extra_event_types.contains(name),
            _ => true,
        }
    }

    /// Validate and sanitize a raw event.
    pub async fn validate(&self, raw: &RawEvent) -> Result<CanonicalEvent, ValidationError> {
        let config = self.config();

        let event_type = self.check_event_type(raw)?;
        let actor_id = self.check_actor(raw).await?;
        let score = check_score(raw, config.max_score)?;
        let room_id = check_room(raw)?;
        let payload = check_payload(raw, config.max_payload_bytes)?;

        debug!(%actor_id, event_type = %event_type, score, "event validated");

        Ok(CanonicalEvent {
            id: Uuid::new_v4(),
            event_type,
            actor_id,
            room_id,
            score,
            payload,
            created_at: self.clock.now(),
        })
    }

    fn check_event_type(&self, raw: &RawEvent) -> Result<EventType, ValidationError> {
        let name = raw
            .event_name()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ValidationError::InvalidEventType("missing".into()))?;

        let event_type = EventType::from_name(name);
        if self.is_allowed(&event_type) {
            Ok(event_type)
        } else {
            Err(ValidationError::InvalidEventType(name.to_string()))
        }
    }

    async fn check_actor(&self, raw: &RawEvent) -> Result<ActorId, ValidationError> {
        let actor_id = match raw.get(fields::ACTOR_ID) {
            Some(Value::Number(n)) => n.as_u64().map(ActorId),
            Some(Value::String(s)) => s.parse::<ActorId>().ok(),
            _ => None,
        }
        .filter(|id| id.get() > 0)
        .ok_or_else(|| ValidationError::InvalidActor("missing".into()))?;

        match self.directory.resolve_actor(actor_id).await? {
            Some(_) => Ok(actor_id),
            None => Err(ValidationError::InvalidActor(actor_id.to_string())),
        }
    }
}

fn check_score(raw: &RawEvent, max: u64) -> Result<u64, ValidationError> {
    let value = match raw.get(fields::SCORE) {
        None | Some(Value::Null) => return Ok(0),
        Some(value) => value,
    };

    let out_of_range = || ValidationError::ScoreOutOfRange {
        value: value.to_string(),
        max,
    };

    let number = numeric_value(value).ok_or_else(out_of_range)?;
    if !number.is_finite() || number < 0.0 || number.trunc() > max as f64 {
        return Err(out_of_range());
    }
    Ok(number.trunc() as u64)
}

fn check_room(raw: &RawEvent) -> Result<Option<RoomId>, ValidationError> {
    match raw.get(fields::ROOM_ID) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => RoomId::parse(s)
            .map(Some)
            .ok_or_else(|| ValidationError::InvalidRoomReference(s.clone())),
        Some(other) => Err(ValidationError::InvalidRoomReference(other.to_string())),
    }
}

fn check_payload(raw: &RawEvent, limit: usize) -> Result<Map<String, Value>, ValidationError> {
    let payload = match raw.data() {
        None | Some(Value::Null) => return Ok(Map::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ValidationError::InvalidPayload),
    };

    let size = serde_json::to_vec(payload).map(|v| v.len()).unwrap_or(usize::MAX);
    if size > limit {
        return Err(ValidationError::PayloadTooLarge { size, limit });
    }

    Ok(payload
        .iter()
        .map(|(k, v)| (sanitize_str(k), sanitize_value(v)))
        .collect())
}

/// Trim and drop control characters.
fn sanitize_str(s: &str) -> String {
    s.trim().chars().filter(|c| !c.is_control()).collect()
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (sanitize_str(k), sanitize_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::actor::{Actor, StaticActorDirectory};
    use crate::core::clock::SystemClock;
    use serde_json::json;

    fn validator() -> EventValidator {
        let directory = StaticActorDirectory::new().with(Actor::new(ActorId(7), "Ada"));
        EventValidator::new(ValidatorConfig::default(), Arc::new(directory), Arc::new(SystemClock))
    }

    fn raw(value: Value) -> RawEvent {
        RawEvent::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_score_bounds() {
        let v = validator();

        let too_big = raw(json!({"event": "level_complete", "actor_id": 7, "score": 999999999999u64}));
        assert!(matches!(
            v.validate(&too_big).await,
            Err(ValidationError::ScoreOutOfRange { .. })
        ));

        let ok = raw(json!({"event": "level_complete", "actor_id": 7, "score": 500}));
        let event = v.validate(&ok).await.unwrap();
        assert_eq!(event.score, 500);
        assert_eq!(event.event_type, EventType::LevelComplete);
        assert_eq!(event.actor_id, ActorId(7));
    }

    #[tokio::test]
    async fn test_score_coercion() {
        let v = validator();
        let event = v
            .validate(&raw(json!({"event": "death", "actor_id": 7, "score": "42.9"})))
            .await
            .unwrap();
        assert_eq!(event.score, 42);

        let negative = raw(json!({"event": "death", "actor_id": 7, "score": -1}));
        assert!(matches!(v.validate(&negative).await, Err(ValidationError::ScoreOutOfRange { .. })));

        let garbage = raw(json!({"event": "death", "actor_id": 7, "score": "lots"}));
        assert!(matches!(v.validate(&garbage).await, Err(ValidationError::ScoreOutOfRange { .. })));

        let absent = v.validate(&raw(json!({"event": "death", "actor_id": 7}))).await.unwrap();
        assert_eq!(absent.score, 0);
    }

    #[tokio::test]
    async fn test_event_type_checks() {
        let v = validator();

        let missing = raw(json!({"actor_id": 7}));
        assert!(matches!(v.validate(&missing).await, Err(ValidationError::InvalidEventType(_))));

        let unknown = raw(json!({"event": "boss_defeated", "actor_id": 7}));
        assert!(matches!(v.validate(&unknown).await, Err(ValidationError::InvalidEventType(_))));

        assert!(v.register_event_type("boss_defeated"));
        assert!(!v.register_event_type("boss_defeated"));
        assert!(!v.register_event_type("game_over"));
        let event = v.validate(&unknown).await.unwrap();
        assert_eq!(event.event_type, EventType::Registered("boss_defeated".into()));
        assert_eq!(v.allowed_event_types().len(), 7);
    }

    #[tokio::test]
    async fn test_actor_checks() {
        let v = validator();

        let missing = raw(json!({"event": "game_start"}));
        assert!(matches!(v.validate(&missing).await, Err(ValidationError::InvalidActor(_))));

        let unknown = raw(json!({"event": "game_start", "actor_id": 8}));
        assert!(matches!(v.validate(&unknown).await, Err(ValidationError::InvalidActor(_))));

        let stringly = raw(json!({"event": "game_start", "actor_id": "7"}));
        assert!(v.validate(&stringly).await.is_ok());
    }

    #[tokio::test]
    async fn test_room_reference_format() {
        let v = validator();

        let bad = raw(json!({"event": "game_start", "actor_id": 7, "room_id": "lobby"}));
        assert!(matches!(v.validate(&bad).await, Err(ValidationError::InvalidRoomReference(_))));

        let numeric = raw(json!({"event": "game_start", "actor_id": 7, "room_id": 12}));
        assert!(matches!(v.validate(&numeric).await, Err(ValidationError::InvalidRoomReference(_))));

        let good = raw(json!({"event": "game_start", "actor_id": 7, "room_id": "room_abc123def456"}));
        let event = v.validate(&good).await.unwrap();
        assert_eq!(event.room_id.unwrap().as_str(), "room_abc123def456");

        let null = raw(json!({"event": "game_start", "actor_id": 7, "room_id": null}));
        assert!(v.validate(&null).await.unwrap().room_id.is_none());
    }

    #[tokio::test]
    async fn test_payload_checks() {
        let v = validator();
        v.update_config(ValidatorConfig {
            max_payload_bytes: 64,
            ..Default::default()
        });

        let scalar = raw(json!({"event": "game_start", "actor_id": 7, "data": "x"}));
        assert!(matches!(v.validate(&scalar).await, Err(ValidationError::InvalidPayload)));

        let huge = raw(json!({"event": "game_start", "actor_id": 7, "data": {"blob": "x".repeat(100)}}));
        assert!(matches!(
            v.validate(&huge).await,
            Err(ValidationError::PayloadTooLarge { limit: 64, .. })
        ));
    }

    #[tokio::test]
    async fn test_payload_sanitized() {
        let v = validator();
        let event = v
            .validate(&raw(json!({
                "event": "level_complete",
                "actor_id": 7,
                "data": {" level ": 3, "difficulty": "  hard\u{0007} ", "tags": [" a "]}
            })))
            .await
            .unwrap();

        assert_eq!(event.payload.get("difficulty"), Some(&json!("hard")));
        assert_eq!(event.payload.get("tags"), Some(&json!(["a"])));
        assert_eq!(event.level(), Some(3));
    }
}
