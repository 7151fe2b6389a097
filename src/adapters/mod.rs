//! Emulator Adapters
//!
//! Each browser emulator speaks its own event vocabulary. An adapter maps one
//! vocabulary onto the canonical taxonomy, tags the payload with emulator and
//! system, and scales the score. The [`registry::AdapterRegistry`] is the
//! single place where "which vocabulary is this" gets decided.
//!
//! ## Module Structure
//!
//! - `registry`: name-keyed registry, resolution and transform entry point
//! - `table`: data-driven single-system adapters (JSNES, jSNES, GBA, MAME)
//! - `retroarch`: RetroArch, system derived from the libretro core
//! - `emulatorjs`: EmulatorJS, system from explicit tag or core alias
//! - `cores`: shared core → system lookup
//!
//! Adding an emulator means implementing [`EmulatorAdapter`] and calling
//! `register`; nothing else changes.

pub mod cores;
pub mod emulatorjs;
pub mod registry;
pub mod retroarch;
pub mod table;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::events::schema::{fields, numeric_value, EventType, RawEvent};

pub use emulatorjs::EmulatorJsAdapter;
pub use registry::{AdapterRegistry, ResolvedAdapter};
pub use retroarch::RetroArchAdapter;
pub use table::TableAdapter;

/// Runtime-tunable adapter settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Disabled adapters pass events through untouched.
    pub enabled: bool,
    /// Multiplier applied to native scores. Must be positive.
    pub score_multiplier: f64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            score_multiplier: 1.0,
        }
    }
}

impl AdapterConfig {
    /// Config with a custom multiplier.
    pub fn with_multiplier(score_multiplier: f64) -> Self {
        Self {
            score_multiplier,
            ..Default::default()
        }
    }

    /// Reject non-positive or non-finite multipliers.
    pub fn check(&self) -> Result<(), AdapterError> {
        if self.score_multiplier.is_finite() && self.score_multiplier > 0.0 {
            Ok(())
        } else {
            Err(AdapterError::InvalidMultiplier(self.score_multiplier))
        }
    }
}

/// Read-only adapter description for configuration UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterMetadata {
    /// Registry key.
    pub name: String,
    /// Human-readable name, also used as the payload's emulator tag.
    pub display_name: String,
    /// Systems the emulator can run.
    pub supported_systems: Vec<String>,
    /// Client-side probe used to detect the emulator on a page.
    pub detection_rule: String,
    /// Native event name → canonical wire name.
    pub event_map: BTreeMap<String, String>,
    /// Current enabled flag.
    pub enabled: bool,
    /// Current multiplier.
    pub score_multiplier: f64,
}

/// Adapter failures.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Event lacks a native event name.
    #[error("missing native event name")]
    MissingEvent,

    /// Adapter-specific rule rejected the event.
    #[error("rejected by {adapter}: {reason}")]
    Rejected {
        /// Adapter name.
        adapter: String,
        /// Why.
        reason: String,
    },

    /// Multiplier must be a positive finite number.
    #[error("invalid score multiplier: {0}")]
    InvalidMultiplier(f64),

    /// No adapter registered under that name.
    #[error("unknown adapter: {0}")]
    UnknownAdapter(String),
}

/// One emulator integration.
pub trait EmulatorAdapter: Send + Sync {
    /// Unique registry key (lowercase).
    fn name(&self) -> &str;

    /// Human-readable name; becomes the payload's emulator tag.
    fn display_name(&self) -> &str;

    /// Systems the emulator runs.
    fn supported_systems(&self) -> Vec<String>;

    /// Client-side detection probe description.
    fn detection_rule(&self) -> &str;

    /// Native event name (lowercase) → canonical type.
    fn event_map(&self) -> &BTreeMap<String, EventType>;

    /// Settings used until the composition root overrides them.
    fn default_config(&self) -> AdapterConfig {
        AdapterConfig::default()
    }

    /// System tag for an event.
    fn system_for(&self, raw: &RawEvent) -> String;

    /// Adapter-specific acceptance rules. Failing events skip normalization.
    fn validate(&self, raw: &RawEvent) -> Result<(), AdapterError> {
        match raw.event_name() {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(AdapterError::MissingEvent),
        }
    }

    /// Canonical type for a native event name.
    fn map_event(&self, native: &str) -> Option<EventType> {
        self.event_map().get(&native.trim().to_ascii_lowercase()).cloned()
    }

    /// Rewrite a raw event into canonical shape.
    fn transform(&self, raw: RawEvent, config: &AdapterConfig) -> RawEvent {
        normalize(self, raw, config)
    }

    /// Introspection snapshot under the given settings.
    fn metadata(&self, config: &AdapterConfig) -> AdapterMetadata {
        AdapterMetadata {
            name: self.name().to_string(),
            display_name: self.display_name().to_string(),
            supported_systems: self.supported_systems(),
            detection_rule: self.detection_rule().to_string(),
            event_map: self
                .event_map()
                .iter()
                .map(|(native, kind)| (native.clone(), kind.as_str().to_string()))
                .collect(),
            enabled: config.enabled,
            score_multiplier: config.score_multiplier,
        }
    }
}

/// `round(score * multiplier)`, clamped to zero.
pub fn scale_score(score: f64, multiplier: f64) -> u64 {
    let scaled = (score * multiplier).round();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else {
        scaled as u64
    }
}

/// Default transform shared by every built-in adapter.
pub fn normalize<A>(adapter: &A, mut raw: RawEvent, config: &AdapterConfig) -> RawEvent
where
    A: EmulatorAdapter + ?Sized,
{
    let system = adapter.system_for(&raw);

    let native = raw.event_name().map(str::to_string);
    let mapped = native.as_deref().and_then(|n| adapter.map_event(n));
    if let Some(event_type) = &mapped {
        raw.set(fields::EVENT, event_type.as_str());
    }

    if let Some(score) = raw.get(fields::SCORE).and_then(numeric_value) {
        raw.set(fields::SCORE, scale_score(score, config.score_multiplier));
    }

    if let Some(data) = raw.data_object_mut() {
        data.insert(fields::EMULATOR.into(), Value::from(adapter.display_name()));
        data.insert(fields::SYSTEM.into(), Value::from(system));
        if let (Some(native), Some(event_type)) = (native, mapped) {
            if native != event_type.as_str() {
                data.insert(fields::NATIVE_EVENT.into(), Value::from(native));
            }
        }
    }

    raw
}

/// Event map from `(native, canonical)` pairs.
pub(crate) fn event_map(pairs: &[(&str, EventType)]) -> BTreeMap<String, EventType> {
    pairs
        .iter()
        .map(|(native, kind)| (native.to_ascii_lowercase(), kind.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scale_score_rounding() {
        assert_eq!(scale_score(100.0, 2.0), 200);
        assert_eq!(scale_score(5.0, 1.5), 8);
        assert_eq!(scale_score(3.0, 0.1), 0);
        assert_eq!(scale_score(-10.0, 2.0), 0);
        assert_eq!(scale_score(f64::NAN, 2.0), 0);
    }

    #[test]
    fn test_config_check() {
        assert!(AdapterConfig::default().check().is_ok());
        assert!(AdapterConfig::with_multiplier(0.0).check().is_err());
        assert!(AdapterConfig::with_multiplier(-1.0).check().is_err());
        assert!(AdapterConfig::with_multiplier(f64::INFINITY).check().is_err());
    }

    proptest! {
        #[test]
        fn prop_scale_score_matches_rounding(s in 0u32..10_000_000, m in 0.01f64..100.0) {
            let expected = (s as f64 * m).round();
            let scaled = scale_score(s as f64, m);
            prop_assert_eq!(scaled as f64, expected.max(0.0));
            // Deterministic for identical inputs.
            prop_assert_eq!(scaled, scale_score(s as f64, m));
        }
    }
}
