//! Event Schema
//!
//! The canonical gamification event and the untyped raw event it is built
//! from. Raw events arrive as JSON objects from the emulator side; adapters
//! rewrite them in place and the validator turns them into [`CanonicalEvent`]s.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::ids::{ActorId, RoomId};

// =============================================================================
// EVENT TYPE
// =============================================================================

/// Canonical event taxonomy.
///
/// The six built-in kinds are always known. Integrators can register
/// further kinds at runtime; those travel as [`EventType::Registered`] and are
/// only accepted once the validator knows their name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A level or stage was cleared.
    LevelComplete,
    /// The game ended.
    GameOver,
    /// A score threshold was crossed.
    ScoreMilestone,
    /// The player lost a life.
    Death,
    /// A game session started.
    GameStart,
    /// An in-game achievement unlocked.
    AchievementUnlock,
    /// Runtime-registered kind.
    Registered(String),
}

impl EventType {
    /// The built-in baseline taxonomy.
    pub const BUILTIN: [EventType; 6] = [
        EventType::LevelComplete,
        EventType::GameOver,
        EventType::ScoreMilestone,
        EventType::Death,
        EventType::GameStart,
        EventType::AchievementUnlock,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::LevelComplete => "level_complete",
            EventType::GameOver => "game_over",
            EventType::ScoreMilestone => "score_milestone",
            EventType::Death => "death",
            EventType::GameStart => "game_start",
            EventType::AchievementUnlock => "achievement_unlock",
            EventType::Registered(name) => name,
        }
    }

    /// Parse a wire name. Unknown names become [`EventType::Registered`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "level_complete" => EventType::LevelComplete,
            "game_over" => EventType::GameOver,
            "score_milestone" => EventType::ScoreMilestone,
            "death" => EventType::Death,
            "game_start" => EventType::GameStart,
            "achievement_unlock" => EventType::AchievementUnlock,
            other => EventType::Registered(other.to_string()),
        }
    }

    /// Whether this is one of the built-in kinds.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, EventType::Registered(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        EventType::from_name(&name)
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

// =============================================================================
// RAW EVENT
// =============================================================================

/// Field names understood on raw events.
pub mod fields {
    /// Native or canonical event name.
    pub const EVENT: &str = "event";
    /// Submitting actor.
    pub const ACTOR_ID: &str = "actor_id";
    /// Numeric score.
    pub const SCORE: &str = "score";
    /// Optional room reference.
    pub const ROOM_ID: &str = "room_id";
    /// Structured payload object.
    pub const DATA: &str = "data";
    /// Emulator tag.
    pub const EMULATOR: &str = "emulator";
    /// System tag.
    pub const SYSTEM: &str = "system";
    /// Emulator core identifier (multi-system emulators).
    pub const CORE: &str = "core";
    /// Native event name before mapping.
    pub const NATIVE_EVENT: &str = "native_event";
}

/// An un-normalized event as produced by an emulator integration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(Map<String, Value>);

impl RawEvent {
    /// Empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value; only objects are events.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a top-level field.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Event name, if present and a string.
    pub fn event_name(&self) -> Option<&str> {
        self.0.get(fields::EVENT).and_then(Value::as_str)
    }

    /// Stamp the submitting actor.
    pub fn set_actor_id(&mut self, actor_id: ActorId) {
        self.set(fields::ACTOR_ID, actor_id.get());
    }

    /// Payload object, if present.
    pub fn data(&self) -> Option<&Value> {
        self.0.get(fields::DATA)
    }

    /// Mutable payload object, created when absent. `None` when `data` is
    /// present but not an object.
    pub fn data_object_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.0
            .entry(fields::DATA.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
    }

    /// String field looked up at top level first, then inside `data`.
    pub fn lookup_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .or_else(|| self.data().and_then(|d| d.get(key)).and_then(Value::as_str))
    }

    /// Emulator tag embedded in the event.
    pub fn emulator_tag(&self) -> Option<&str> {
        self.lookup_str(fields::EMULATOR)
    }

    /// Consume into the underlying JSON object.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Interpret a JSON value as a number, accepting numeric strings.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

// =============================================================================
// CANONICAL EVENT
// =============================================================================

/// One gamification event after normalization and validation.
///
/// Append-only: once persisted it is never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Log identifier.
    pub id: Uuid,
    /// Canonical kind.
    pub event_type: EventType,
    /// Submitting actor.
    pub actor_id: ActorId,
    /// Room the event happened in, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Non-negative bounded score.
    pub score: u64,
    /// Structured payload (level, difficulty, emulator/system tags, metadata).
    pub payload: Map<String, Value>,
    /// When the event was accepted.
    pub created_at: DateTime<Utc>,
}

impl CanonicalEvent {
    /// Emulator tag from the payload.
    pub fn emulator(&self) -> Option<&str> {
        self.payload.get(fields::EMULATOR).and_then(Value::as_str)
    }

    /// System tag from the payload.
    pub fn system(&self) -> Option<&str> {
        self.payload.get(fields::SYSTEM).and_then(Value::as_str)
    }

    /// Level reported by the emulator, if numeric.
    pub fn level(&self) -> Option<u64> {
        self.payload.get("level").and_then(numeric_value).map(|l| l.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_names() {
        for kind in EventType::BUILTIN {
            assert_eq!(EventType::from_name(kind.as_str()), kind);
            assert!(kind.is_builtin());
        }
        let custom = EventType::from_name("boss_defeated");
        assert_eq!(custom, EventType::Registered("boss_defeated".into()));
        assert!(!custom.is_builtin());
    }

    #[test]
    fn test_event_type_serializes_as_string() {
        let json = serde_json::to_string(&EventType::LevelComplete).unwrap();
        assert_eq!(json, "\"level_complete\"");
        let parsed: EventType = serde_json::from_str("\"game_over\"").unwrap();
        assert_eq!(parsed, EventType::GameOver);
    }

    #[test]
    fn test_raw_event_lookup_prefers_top_level() {
        let raw = RawEvent::from_value(json!({
            "event": "level_cleared",
            "emulator": "JSNES",
            "data": { "emulator": "MAME", "core": "snes9x" }
        }))
        .unwrap();

        assert_eq!(raw.event_name(), Some("level_cleared"));
        assert_eq!(raw.emulator_tag(), Some("JSNES"));
        assert_eq!(raw.lookup_str("core"), Some("snes9x"));
    }

    #[test]
    fn test_raw_event_non_object_rejected() {
        assert!(RawEvent::from_value(json!([1, 2, 3])).is_none());
    }

    #[test]
    fn test_data_object_mut_creates_payload() {
        let mut raw = RawEvent::new().with("event", "death");
        raw.data_object_mut().unwrap().insert("system".into(), json!("NES"));
        assert_eq!(raw.lookup_str("system"), Some("NES"));

        let mut scalar = RawEvent::new().with("data", "not-a-map");
        assert!(scalar.data_object_mut().is_none());
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(numeric_value(&json!(12)), Some(12.0));
        assert_eq!(numeric_value(&json!(" 7.5 ")), Some(7.5));
        assert_eq!(numeric_value(&json!("many")), None);
        assert_eq!(numeric_value(&json!(null)), None);
    }
}
