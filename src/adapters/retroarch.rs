//! RetroArch adapter.
//!
//! RetroArch runs many systems through libretro cores; the system tag comes
//! from the `core` the page reports.

use std::collections::BTreeMap;

use crate::adapters::cores::{known_systems, system_for_core, UNKNOWN_SYSTEM};
use crate::adapters::{event_map, AdapterError, EmulatorAdapter};
use crate::events::schema::{fields, EventType, RawEvent};

/// RetroArch (web build).
#[derive(Debug, Clone)]
pub struct RetroArchAdapter {
    event_map: BTreeMap<String, EventType>,
}

impl RetroArchAdapter {
    /// Adapter with the RetroArch / RetroAchievements vocabulary.
    pub fn new() -> Self {
        Self {
            event_map: event_map(&[
                ("level_complete", EventType::LevelComplete),
                ("game_over", EventType::GameOver),
                ("death", EventType::Death),
                ("content_loaded", EventType::GameStart),
                ("game_start", EventType::GameStart),
                ("achievement_triggered", EventType::AchievementUnlock),
                ("leaderboard_submit", EventType::ScoreMilestone),
                ("score_milestone", EventType::ScoreMilestone),
            ]),
        }
    }
}

impl Default for RetroArchAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorAdapter for RetroArchAdapter {
    fn name(&self) -> &str {
        "retroarch"
    }

    fn display_name(&self) -> &str {
        "RetroArch"
    }

    fn supported_systems(&self) -> Vec<String> {
        known_systems()
    }

    fn detection_rule(&self) -> &str {
        "typeof window.Module !== 'undefined' && typeof window.Module.retroarch !== 'undefined'"
    }

    fn event_map(&self) -> &BTreeMap<String, EventType> {
        &self.event_map
    }

    fn system_for(&self, raw: &RawEvent) -> String {
        raw.lookup_str(fields::CORE)
            .and_then(system_for_core)
            .unwrap_or(UNKNOWN_SYSTEM)
            .to_string()
    }

    fn validate(&self, raw: &RawEvent) -> Result<(), AdapterError> {
        match raw.event_name() {
            Some(name) if !name.trim().is_empty() => {}
            _ => return Err(AdapterError::MissingEvent),
        }
        // A core that is present but not a string is a broken integration.
        if raw.get(fields::CORE).is_some_and(|c| !c.is_string() && !c.is_null()) {
            return Err(AdapterError::Rejected {
                adapter: self.name().to_string(),
                reason: "core must be a string".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterConfig;
    use serde_json::json;

    #[test]
    fn test_system_from_core() {
        let adapter = RetroArchAdapter::new();
        let raw = RawEvent::from_value(json!({"event": "death", "core": "Snes9x_Libretro"})).unwrap();
        assert_eq!(adapter.system_for(&raw), "SNES");

        let nested = RawEvent::from_value(json!({"event": "death", "data": {"core": "genesis_plus_gx"}})).unwrap();
        assert_eq!(adapter.system_for(&nested), "Genesis");
    }

    #[test]
    fn test_unknown_core() {
        let adapter = RetroArchAdapter::new();
        let raw = RawEvent::from_value(json!({"event": "death", "core": "dosbox_pure"})).unwrap();
        assert_eq!(adapter.system_for(&raw), "Unknown");

        let missing = RawEvent::from_value(json!({"event": "death"})).unwrap();
        assert_eq!(adapter.system_for(&missing), "Unknown");
    }

    #[test]
    fn test_achievement_transform() {
        let adapter = RetroArchAdapter::new();
        let raw = RawEvent::from_value(json!({
            "event": "achievement_triggered",
            "core": "mgba",
            "score": 25,
        }))
        .unwrap();

        let out = adapter.transform(raw, &AdapterConfig::default());
        assert_eq!(out.event_name(), Some("achievement_unlock"));
        assert_eq!(out.lookup_str("system"), Some("Game Boy Advance"));
        assert_eq!(out.lookup_str("emulator"), Some("RetroArch"));
    }

    #[test]
    fn test_non_string_core_rejected() {
        let adapter = RetroArchAdapter::new();
        let raw = RawEvent::from_value(json!({"event": "death", "core": 12})).unwrap();
        assert!(matches!(adapter.validate(&raw), Err(AdapterError::Rejected { .. })));
    }
}
