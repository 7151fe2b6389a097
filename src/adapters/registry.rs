//! Adapter Registry
//!
//! Name-keyed set of adapters with their runtime settings. Resolution and the
//! `transform_event` entry point live here so callers never pick adapters
//! themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::adapters::{
    AdapterConfig, AdapterError, AdapterMetadata, EmulatorAdapter, EmulatorJsAdapter,
    RetroArchAdapter, TableAdapter,
};
use crate::events::schema::RawEvent;

struct Entry {
    adapter: Arc<dyn EmulatorAdapter>,
    config: AdapterConfig,
}

/// An adapter together with the settings it currently runs under.
#[derive(Clone)]
pub struct ResolvedAdapter {
    /// The adapter.
    pub adapter: Arc<dyn EmulatorAdapter>,
    /// Its effective settings.
    pub config: AdapterConfig,
}

impl std::fmt::Debug for ResolvedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAdapter")
            .field("name", &self.adapter.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Registry of emulator adapters.
///
/// Adapters are never removed, only disabled. Settings pushed through
/// [`AdapterRegistry::configure`] survive re-registration of the same name.
#[derive(Default)]
pub struct AdapterRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
    overrides: RwLock<BTreeMap<String, AdapterConfig>>,
}

fn registry_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl AdapterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the six built-in adapters.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(TableAdapter::jsnes()));
        registry.register(Arc::new(TableAdapter::jsnes_snes()));
        registry.register(Arc::new(TableAdapter::gba()));
        registry.register(Arc::new(TableAdapter::mame()));
        registry.register(Arc::new(RetroArchAdapter::new()));
        registry.register(Arc::new(EmulatorJsAdapter::new()));
        registry
    }

    /// Add or replace an adapter. Last registration wins.
    pub fn register(&self, adapter: Arc<dyn EmulatorAdapter>) {
        let key = registry_key(adapter.name());
        let config = self
            .overrides
            .read()
            .get(&key)
            .copied()
            .unwrap_or_else(|| adapter.default_config());

        let replaced = self
            .entries
            .write()
            .insert(key.clone(), Entry { adapter, config })
            .is_some();

        info!(adapter = %key, replaced, enabled = config.enabled, multiplier = config.score_multiplier, "Registered emulator adapter");
    }

    /// Apply settings for `name`.
    ///
    /// The settings are kept and re-applied if the adapter is registered
    /// again later. Returns whether a registered adapter picked them up.
    pub fn configure(&self, name: &str, config: AdapterConfig) -> Result<bool, AdapterError> {
        config.check()?;
        let key = registry_key(name);
        self.overrides.write().insert(key.clone(), config);

        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.config = config;
                info!(adapter = %key, enabled = config.enabled, multiplier = config.score_multiplier, "Adapter reconfigured");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Toggle an adapter.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), AdapterError> {
        let current = self.current_config(name)?;
        self.configure(name, AdapterConfig { enabled, ..current }).map(|_| ())
    }

    /// Change an adapter's score multiplier.
    pub fn set_score_multiplier(&self, name: &str, multiplier: f64) -> Result<(), AdapterError> {
        let current = self.current_config(name)?;
        self.configure(
            name,
            AdapterConfig {
                score_multiplier: multiplier,
                ..current
            },
        )
        .map(|_| ())
    }

    fn current_config(&self, name: &str) -> Result<AdapterConfig, AdapterError> {
        self.entries
            .read()
            .get(&registry_key(name))
            .map(|e| e.config)
            .ok_or_else(|| AdapterError::UnknownAdapter(name.to_string()))
    }

    /// Look up an adapter by key or display name.
    ///
    /// Order: exact display name, then case-insensitive key, then
    /// case-insensitive display name.
    pub fn resolve(&self, name: &str) -> Option<ResolvedAdapter> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let entries = self.entries.read();
        let resolved = |e: &Entry| ResolvedAdapter {
            adapter: Arc::clone(&e.adapter),
            config: e.config,
        };

        if let Some(entry) = entries.values().find(|e| e.adapter.display_name() == name) {
            return Some(resolved(entry));
        }
        if let Some(entry) = entries.get(&registry_key(name)) {
            return Some(resolved(entry));
        }
        entries
            .values()
            .find(|e| e.adapter.display_name().eq_ignore_ascii_case(name))
            .map(resolved)
    }

    /// Adapter for a raw event: the explicit hint if given, else the event's
    /// own emulator tag.
    pub fn resolve_for(&self, raw: &RawEvent, hint: Option<&str>) -> Option<ResolvedAdapter> {
        match hint {
            Some(name) => self.resolve(name),
            None => raw.emulator_tag().and_then(|tag| self.resolve(tag)),
        }
    }

    /// Normalize a raw event.
    ///
    /// Unknown or disabled adapters, and events the adapter rejects, are
    /// returned unchanged.
    pub fn transform_event(&self, raw: RawEvent, hint: Option<&str>) -> RawEvent {
        let Some(ResolvedAdapter { adapter, config }) = self.resolve_for(&raw, hint) else {
            debug!(hint = ?hint, tag = ?raw.emulator_tag(), "No adapter resolved, passing event through");
            return raw;
        };

        if !config.enabled {
            debug!(adapter = adapter.name(), "Adapter disabled, passing event through");
            return raw;
        }

        if let Err(e) = adapter.validate(&raw) {
            debug!(adapter = adapter.name(), error = %e, "Adapter rejected event, passing through");
            return raw;
        }

        adapter.transform(raw, &config)
    }

    /// Metadata of every registered adapter, ordered by key.
    pub fn list_adapters(&self) -> Vec<AdapterMetadata> {
        self.entries
            .read()
            .values()
            .map(|e| e.adapter.metadata(&e.config))
            .collect()
    }

    /// Metadata of one adapter.
    pub fn adapter_metadata(&self, name: &str) -> Option<AdapterMetadata> {
        self.resolve(name).map(|r| r.adapter.metadata(&r.config))
    }

    /// Current multiplier of an adapter.
    pub fn score_multiplier(&self, name: &str) -> Option<f64> {
        self.resolve(name).map(|r| r.config.score_multiplier)
    }

    /// Whether an adapter exists and is enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.resolve(name).is_some_and(|r| r.config.enabled)
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::schema::EventType;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawEvent {
        RawEvent::from_value(value).unwrap()
    }

    #[test]
    fn test_builtins_registered() {
        let registry = AdapterRegistry::with_builtins();
        assert_eq!(registry.len(), 6);

        let names: Vec<String> = registry.list_adapters().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["emulatorjs", "gba", "jsnes", "jsnes_snes", "mame", "retroarch"]);
        assert_eq!(registry.score_multiplier("mame"), Some(0.1));
    }

    #[test]
    fn test_resolution_order() {
        let registry = AdapterRegistry::with_builtins();

        // Exact display names keep JSNES and jSNES apart.
        assert_eq!(registry.resolve("JSNES").unwrap().adapter.name(), "jsnes");
        assert_eq!(registry.resolve("jSNES").unwrap().adapter.name(), "jsnes_snes");
        // Case-insensitive key.
        assert_eq!(registry.resolve("RetroArch").unwrap().adapter.name(), "retroarch");
        assert_eq!(registry.resolve("JSNES_SNES").unwrap().adapter.name(), "jsnes_snes");
        assert!(registry.resolve("nope").is_none());
        assert!(registry.resolve("  ").is_none());

        // Case-insensitive display name.
        registry.register(Arc::new(TableAdapter::new("stella", "Stella 2600", "Atari 2600", "window.Stella")));
        assert_eq!(registry.resolve("STELLA 2600").unwrap().adapter.name(), "stella");
    }

    #[test]
    fn test_scenario_c_through_registry() {
        let registry = AdapterRegistry::with_builtins();
        registry.set_score_multiplier("jsnes", 2.0).unwrap();

        let out = registry.transform_event(
            raw(json!({"event": "level_cleared", "score": 100, "emulator": "JSNES"})),
            None,
        );

        assert_eq!(out.event_name(), Some(EventType::LevelComplete.as_str()));
        assert_eq!(out.get("score"), Some(&json!(200)));
        assert_eq!(out.data().unwrap().get("emulator"), Some(&json!("JSNES")));
        assert_eq!(out.data().unwrap().get("system"), Some(&json!("NES")));
    }

    #[test]
    fn test_unknown_adapter_passes_through() {
        let registry = AdapterRegistry::with_builtins();
        let input = raw(json!({"event": "level_cleared", "score": 100, "emulator": "Dolphin"}));

        assert_eq!(registry.transform_event(input.clone(), None), input);
        assert_eq!(registry.transform_event(input.clone(), Some("dolphin")), input);
    }

    #[test]
    fn test_unresolvable_hint_does_not_fall_back_to_tag() {
        let registry = AdapterRegistry::with_builtins();
        let input = raw(json!({"event": "level_cleared", "emulator": "JSNES"}));
        assert_eq!(registry.transform_event(input.clone(), Some("dolphin")), input);
    }

    #[test]
    fn test_disabled_adapter_passes_through() {
        let registry = AdapterRegistry::with_builtins();
        registry.set_enabled("gba", false).unwrap();
        assert!(!registry.is_enabled("gba"));

        let input = raw(json!({"event": "faint", "score": 3}));
        assert_eq!(registry.transform_event(input.clone(), Some("gba")), input);

        registry.set_enabled("gba", true).unwrap();
        let out = registry.transform_event(input, Some("gba"));
        assert_eq!(out.event_name(), Some("death"));
    }

    #[test]
    fn test_rejected_event_passes_through() {
        let registry = AdapterRegistry::with_builtins();
        let input = raw(json!({"score": 3, "emulator": "RetroArch"}));
        assert_eq!(registry.transform_event(input.clone(), None), input);
    }

    #[test]
    fn test_override_survives_reregistration() {
        let registry = AdapterRegistry::with_builtins();
        registry.configure("mame", AdapterConfig::with_multiplier(0.5)).unwrap();

        registry.register(Arc::new(TableAdapter::mame()));
        assert_eq!(registry.score_multiplier("MAME"), Some(0.5));

        // Settings pushed before registration apply on arrival.
        assert!(!registry.configure("stella", AdapterConfig::with_multiplier(3.0)).unwrap());
        registry.register(Arc::new(TableAdapter::new("stella", "Stella", "Atari 2600", "window.Stella")));
        assert_eq!(registry.score_multiplier("stella"), Some(3.0));
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let registry = AdapterRegistry::with_builtins();
        assert!(matches!(
            registry.set_score_multiplier("jsnes", 0.0),
            Err(AdapterError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            registry.set_enabled("dolphin", true),
            Err(AdapterError::UnknownAdapter(_))
        ));
        assert_eq!(registry.score_multiplier("jsnes"), Some(1.0));
    }

    #[test]
    fn test_metadata() {
        let registry = AdapterRegistry::with_builtins();
        let meta = registry.adapter_metadata("jSNES").unwrap();
        assert_eq!(meta.name, "jsnes_snes");
        assert_eq!(meta.supported_systems, vec!["SNES".to_string()]);
        assert_eq!(meta.event_map.get("course_clear").map(String::as_str), Some("level_complete"));
        assert!(meta.enabled);
    }
}
