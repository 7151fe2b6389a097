//! EmulatorJS adapter.
//!
//! EmulatorJS pages declare `EJS_core` with short aliases (`nes`, `segaMD`,
//! ...). An explicit `system` tag wins; otherwise the alias, then the shared
//! libretro core table.

use std::collections::BTreeMap;

use crate::adapters::cores::{known_systems, system_for_core, UNKNOWN_SYSTEM};
use crate::adapters::{event_map, EmulatorAdapter};
use crate::events::schema::{fields, EventType, RawEvent};

const CORE_ALIASES: &[(&str, &str)] = &[
    ("nes", "NES"),
    ("snes", "SNES"),
    ("gb", "Game Boy"),
    ("gbc", "Game Boy"),
    ("gba", "Game Boy Advance"),
    ("n64", "Nintendo 64"),
    ("nds", "Nintendo DS"),
    ("segamd", "Genesis"),
    ("segams", "Master System"),
    ("psx", "PlayStation"),
    ("arcade", "Arcade"),
    ("mame2003", "Arcade"),
    ("atari2600", "Atari 2600"),
    ("vb", "Virtual Boy"),
];

/// EmulatorJS (multi-system).
#[derive(Debug, Clone)]
pub struct EmulatorJsAdapter {
    event_map: BTreeMap<String, EventType>,
}

impl EmulatorJsAdapter {
    /// Adapter with the EmulatorJS vocabulary.
    pub fn new() -> Self {
        Self {
            event_map: event_map(&[
                ("level_complete", EventType::LevelComplete),
                ("level_end", EventType::LevelComplete),
                ("game_over", EventType::GameOver),
                ("death", EventType::Death),
                ("start", EventType::GameStart),
                ("game_start", EventType::GameStart),
                ("score_milestone", EventType::ScoreMilestone),
                ("achievement", EventType::AchievementUnlock),
            ]),
        }
    }

    fn alias_system(core: &str) -> Option<&'static str> {
        let core = core.trim().to_ascii_lowercase();
        CORE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == core)
            .map(|(_, system)| *system)
    }
}

impl Default for EmulatorJsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorAdapter for EmulatorJsAdapter {
    fn name(&self) -> &str {
        "emulatorjs"
    }

    fn display_name(&self) -> &str {
        "EmulatorJS"
    }

    fn supported_systems(&self) -> Vec<String> {
        let mut systems = known_systems();
        for (_, system) in CORE_ALIASES {
            if !systems.iter().any(|s| s == system) {
                systems.push(system.to_string());
            }
        }
        systems
    }

    fn detection_rule(&self) -> &str {
        "typeof window.EJS_emulator !== 'undefined'"
    }

    fn event_map(&self) -> &BTreeMap<String, EventType> {
        &self.event_map
    }

    fn system_for(&self, raw: &RawEvent) -> String {
        if let Some(system) = raw.lookup_str(fields::SYSTEM).map(str::trim).filter(|s| !s.is_empty()) {
            return system.to_string();
        }
        raw.lookup_str(fields::CORE)
            .and_then(|core| Self::alias_system(core).or_else(|| system_for_core(core)))
            .unwrap_or(UNKNOWN_SYSTEM)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawEvent {
        RawEvent::from_value(value).unwrap()
    }

    #[test]
    fn test_explicit_system_wins() {
        let adapter = EmulatorJsAdapter::new();
        let event = raw(json!({"event": "start", "system": "Neo Geo", "core": "nes"}));
        assert_eq!(adapter.system_for(&event), "Neo Geo");
    }

    #[test]
    fn test_core_alias_then_table() {
        let adapter = EmulatorJsAdapter::new();
        assert_eq!(adapter.system_for(&raw(json!({"event": "start", "core": "segaMD"}))), "Genesis");
        assert_eq!(adapter.system_for(&raw(json!({"event": "start", "core": "fbneo"}))), "Arcade");
        assert_eq!(adapter.system_for(&raw(json!({"event": "start", "core": "3do"}))), "Unknown");
    }

    #[test]
    fn test_supported_systems_include_aliases() {
        let systems = EmulatorJsAdapter::new().supported_systems();
        assert!(systems.contains(&"Virtual Boy".to_string()));
        assert!(systems.contains(&"SNES".to_string()));
    }
}
