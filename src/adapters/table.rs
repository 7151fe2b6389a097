//! Table-driven single-system adapters.
//!
//! JSNES, jSNES, GBA and MAME differ only in their vocabulary, their system
//! and their detection probe, so one struct covers all four. Integrators can
//! build their own with [`TableAdapter::new`] and [`TableAdapter::with_event`].

use std::collections::BTreeMap;

use crate::adapters::{event_map, AdapterConfig, EmulatorAdapter};
use crate::events::schema::{EventType, RawEvent};

/// Adapter for an emulator that always runs one system.
#[derive(Debug, Clone)]
pub struct TableAdapter {
    name: String,
    display_name: String,
    system: String,
    detection_rule: String,
    event_map: BTreeMap<String, EventType>,
    default_config: AdapterConfig,
}

impl TableAdapter {
    /// Adapter with an empty vocabulary.
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        system: impl Into<String>,
        detection_rule: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            display_name: display_name.into(),
            system: system.into(),
            detection_rule: detection_rule.into(),
            event_map: BTreeMap::new(),
            default_config: AdapterConfig::default(),
        }
    }

    /// Add a native → canonical mapping.
    pub fn with_event(mut self, native: &str, event_type: EventType) -> Self {
        self.event_map.insert(native.trim().to_ascii_lowercase(), event_type);
        self
    }

    /// Override the default settings.
    pub fn with_default_config(mut self, config: AdapterConfig) -> Self {
        self.default_config = config;
        self
    }

    fn with_map(mut self, pairs: &[(&str, EventType)]) -> Self {
        self.event_map = event_map(pairs);
        self
    }

    /// JSNES (NES).
    pub fn jsnes() -> Self {
        Self::new("jsnes", "JSNES", "NES", "typeof window.jsnes !== 'undefined'").with_map(&[
            ("level_cleared", EventType::LevelComplete),
            ("stage_complete", EventType::LevelComplete),
            ("game_over", EventType::GameOver),
            ("player_died", EventType::Death),
            ("life_lost", EventType::Death),
            ("rom_loaded", EventType::GameStart),
            ("game_started", EventType::GameStart),
            ("high_score", EventType::ScoreMilestone),
            ("score_milestone", EventType::ScoreMilestone),
            ("achievement", EventType::AchievementUnlock),
        ])
    }

    /// jSNES (SNES).
    pub fn jsnes_snes() -> Self {
        Self::new("jsnes_snes", "jSNES", "SNES", "typeof window.jSNES !== 'undefined'").with_map(&[
            ("level_complete", EventType::LevelComplete),
            ("course_clear", EventType::LevelComplete),
            ("world_clear", EventType::LevelComplete),
            ("game_over", EventType::GameOver),
            ("death", EventType::Death),
            ("game_start", EventType::GameStart),
            ("score_milestone", EventType::ScoreMilestone),
            ("achievement_unlocked", EventType::AchievementUnlock),
        ])
    }

    /// GBA.js (Game Boy Advance).
    pub fn gba() -> Self {
        Self::new("gba", "GBA", "Game Boy Advance", "typeof window.GameBoyAdvance !== 'undefined'")
            .with_map(&[
                ("stage_clear", EventType::LevelComplete),
                ("level_up", EventType::LevelComplete),
                ("game_over", EventType::GameOver),
                ("faint", EventType::Death),
                ("death", EventType::Death),
                ("game_start", EventType::GameStart),
                ("badge_earned", EventType::AchievementUnlock),
                ("score_milestone", EventType::ScoreMilestone),
            ])
    }

    /// MAME (arcade). Arcade scores run large, so the default multiplier scales them down.
    pub fn mame() -> Self {
        Self::new("mame", "MAME", "Arcade", "typeof window.JSMESS !== 'undefined' || typeof window.JSMAME !== 'undefined'")
            .with_map(&[
                ("round_clear", EventType::LevelComplete),
                ("stage_clear", EventType::LevelComplete),
                ("game_over", EventType::GameOver),
                ("life_lost", EventType::Death),
                ("credit_lost", EventType::Death),
                ("coin_inserted", EventType::GameStart),
                ("game_start", EventType::GameStart),
                ("high_score", EventType::ScoreMilestone),
                ("extra_life", EventType::AchievementUnlock),
            ])
            .with_default_config(AdapterConfig::with_multiplier(0.1))
    }
}

impl EmulatorAdapter for TableAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn supported_systems(&self) -> Vec<String> {
        vec![self.system.clone()]
    }

    fn detection_rule(&self) -> &str {
        &self.detection_rule
    }

    fn event_map(&self) -> &BTreeMap<String, EventType> {
        &self.event_map
    }

    fn default_config(&self) -> AdapterConfig {
        self.default_config
    }

    fn system_for(&self, _raw: &RawEvent) -> String {
        self.system.clone()
    }
}
