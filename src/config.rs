//! Bridge Configuration
//!
//! Every component has its own config struct with sensible defaults.
//! [`BridgeConfig`] gathers them and overlays values from the environment:
//!
//! | Variable | Component |
//! |---|---|
//! | `BRIDGE_BIND_ADDR`, `BRIDGE_MAX_CONNECTIONS` | gateway |
//! | `BRIDGE_MAX_SCORE`, `BRIDGE_MAX_PAYLOAD_BYTES`, `BRIDGE_EXTRA_EVENT_TYPES` | validator |
//! | `BRIDGE_RATE_LIMIT_ENABLED`, `BRIDGE_RATE_PER_MINUTE`, `BRIDGE_RATE_PER_HOUR`, `BRIDGE_RATE_WHITELIST` | rate limiter |
//! | `BRIDGE_PRESENCE_TIMEOUT_SECS`, `BRIDGE_CLEANUP_INTERVAL_SECS`, `BRIDGE_ROOM_CACHE_TTL_SECS` | rooms |
//! | `BRIDGE_ADAPTER_<NAME>_ENABLED`, `BRIDGE_ADAPTER_<NAME>_MULTIPLIER` | adapters |
//! | `AUTH_*` | token validation |
//!
//! Unset variables keep the default. Malformed values are reported as
//! [`ConfigError`] instead of being silently ignored.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::core::ids::ActorId;
use crate::events::rate_limit::RateLimitConfig;
use crate::events::validator::ValidatorConfig;
use crate::network::auth::AuthConfig;
use crate::network::server::GatewayConfig;
use crate::rooms::manager::RoomConfig;

const ADAPTER_PREFIX: &str = "BRIDGE_ADAPTER_";
const ENABLED_SUFFIX: &str = "_ENABLED";
const MULTIPLIER_SUFFIX: &str = "_MULTIPLIER";

/// Adapter keys probed when the variable set cannot be enumerated.
pub const BUILTIN_ADAPTERS: [&str; 6] = ["jsnes", "jsnes_snes", "gba", "mame", "retroarch", "emulatorjs"];

/// A variable held a value that could not be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Value failed to parse or was out of range.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: &'static str) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason,
        }
    }
}

/// Partial adapter settings from the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdapterOverride {
    /// Enable or disable the adapter.
    pub enabled: Option<bool>,
    /// Replace the score multiplier.
    pub multiplier: Option<f64>,
}

impl AdapterOverride {
    /// Nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.multiplier.is_none()
    }
}

/// Full bridge configuration.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// WebSocket gateway.
    pub gateway: GatewayConfig,
    /// Event validator.
    pub validator: ValidatorConfig,
    /// Rate limiter.
    pub rate_limit: RateLimitConfig,
    /// Room manager.
    pub rooms: RoomConfig,
    /// Adapter overrides keyed by lowercase adapter name.
    pub adapters: BTreeMap<String, AdapterOverride>,
    /// Token validation.
    pub auth: AuthConfig,
}

impl BridgeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit variable set.
    ///
    /// Adapter overrides are discovered from the variable names, so adapters
    /// registered outside the built-in set can be configured too.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();

        let mut names: BTreeSet<String> = BUILTIN_ADAPTERS.iter().map(|n| n.to_string()).collect();
        names.extend(vars.keys().filter_map(|key| adapter_name_from_key(key)));

        Self::load(|key| vars.get(key).cloned(), &names)
    }

    /// Load through a lookup function. Only built-in adapters are probed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let names: BTreeSet<String> = BUILTIN_ADAPTERS.iter().map(|n| n.to_string()).collect();
        Self::load(lookup, &names)
    }

    fn load<F>(lookup: F, adapter_names: &BTreeSet<String>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Gateway
        if let Some(v) = get("BRIDGE_BIND_ADDR") {
            config.gateway.bind_addr = v
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::invalid("BRIDGE_BIND_ADDR", &v, "expected host:port"))?;
        }
        if let Some(v) = get("BRIDGE_MAX_CONNECTIONS") {
            config.gateway.max_connections = parse_positive("BRIDGE_MAX_CONNECTIONS", &v)? as usize;
        }

        // Validator
        if let Some(v) = get("BRIDGE_MAX_SCORE") {
            config.validator.max_score = parse_u64("BRIDGE_MAX_SCORE", &v)?;
        }
        if let Some(v) = get("BRIDGE_MAX_PAYLOAD_BYTES") {
            config.validator.max_payload_bytes = parse_positive("BRIDGE_MAX_PAYLOAD_BYTES", &v)? as usize;
        }
        if let Some(v) = get("BRIDGE_EXTRA_EVENT_TYPES") {
            config.validator.extra_event_types = parse_list(&v).into_iter().collect();
        }

        // Rate limiter
        if let Some(v) = get("BRIDGE_RATE_LIMIT_ENABLED") {
            config.rate_limit.enabled = parse_bool("BRIDGE_RATE_LIMIT_ENABLED", &v)?;
        }
        if let Some(v) = get("BRIDGE_RATE_PER_MINUTE") {
            config.rate_limit.per_minute = parse_u64("BRIDGE_RATE_PER_MINUTE", &v)?;
        }
        if let Some(v) = get("BRIDGE_RATE_PER_HOUR") {
            config.rate_limit.per_hour = parse_u64("BRIDGE_RATE_PER_HOUR", &v)?;
        }
        if let Some(v) = get("BRIDGE_RATE_WHITELIST") {
            config.rate_limit.whitelist = parse_list(&v)
                .iter()
                .map(|item| {
                    item.parse::<ActorId>()
                        .map_err(|_| ConfigError::invalid("BRIDGE_RATE_WHITELIST", item, "expected numeric actor ids"))
                })
                .collect::<Result<_, _>>()?;
        }

        // Rooms
        if let Some(v) = get("BRIDGE_PRESENCE_TIMEOUT_SECS") {
            config.rooms.presence_timeout = Duration::from_secs(parse_positive("BRIDGE_PRESENCE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("BRIDGE_CLEANUP_INTERVAL_SECS") {
            config.rooms.cleanup_interval = Duration::from_secs(parse_positive("BRIDGE_CLEANUP_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("BRIDGE_ROOM_CACHE_TTL_SECS") {
            config.rooms.cache_ttl = Duration::from_secs(parse_u64("BRIDGE_ROOM_CACHE_TTL_SECS", &v)?);
        }

        // Adapters
        for name in adapter_names {
            let upper = name.to_ascii_uppercase();
            let enabled_key = format!("{ADAPTER_PREFIX}{upper}{ENABLED_SUFFIX}");
            let multiplier_key = format!("{ADAPTER_PREFIX}{upper}{MULTIPLIER_SUFFIX}");

            let entry = AdapterOverride {
                enabled: get(&enabled_key).map(|v| parse_bool(&enabled_key, &v)).transpose()?,
                multiplier: get(&multiplier_key)
                    .map(|v| parse_multiplier(&multiplier_key, &v))
                    .transpose()?,
            };
            if !entry.is_empty() {
                config.adapters.insert(name.clone(), entry);
            }
        }

        config.auth = AuthConfig::from_lookup(&get)?;

        Ok(config)
    }
}

/// `BRIDGE_ADAPTER_JSNES_SNES_ENABLED` → `jsnes_snes`.
fn adapter_name_from_key(key: &str) -> Option<String> {
    let rest = key.strip_prefix(ADAPTER_PREFIX)?;
    let name = rest
        .strip_suffix(ENABLED_SUFFIX)
        .or_else(|| rest.strip_suffix(MULTIPLIER_SUFFIX))?;
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

// =============================================================================
// VALUE PARSERS
// =============================================================================

/// Accepts true/false, 1/0, yes/no and on/off in any case.
pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected a boolean")),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(key, value, "expected a non-negative integer"))
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ConfigError> {
    match parse_u64(key, value)? {
        0 => Err(ConfigError::invalid(key, value, "must be greater than zero")),
        n => Ok(n),
    }
}

fn parse_multiplier(key: &str, value: &str) -> Result<f64, ConfigError> {
    match value.parse::<f64>() {
        Ok(m) if m.is_finite() && m > 0.0 => Ok(m),
        _ => Err(ConfigError::invalid(key, value, "expected a positive number")),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = BridgeConfig::from_vars(Vec::new()).unwrap();

        assert_eq!(config.gateway.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8090)));
        assert_eq!(config.validator.max_score, 999_999_999);
        assert_eq!(config.rate_limit.per_minute, 60);
        assert_eq!(config.rate_limit.per_hour, 500);
        assert_eq!(config.rooms.presence_timeout, Duration::from_secs(1800));
        assert!(config.adapters.is_empty());
        assert!(!config.auth.is_configured());
    }

    #[test]
    fn test_overlay_values() {
        let config = BridgeConfig::from_vars(vars(&[
            ("BRIDGE_BIND_ADDR", "127.0.0.1:9000"),
            ("BRIDGE_MAX_CONNECTIONS", "50"),
            ("BRIDGE_MAX_SCORE", "1000"),
            ("BRIDGE_EXTRA_EVENT_TYPES", "boss_defeated, , speedrun_split"),
            ("BRIDGE_RATE_LIMIT_ENABLED", "off"),
            ("BRIDGE_RATE_PER_MINUTE", "5"),
            ("BRIDGE_RATE_WHITELIST", "7,9"),
            ("BRIDGE_PRESENCE_TIMEOUT_SECS", "60"),
            ("BRIDGE_ROOM_CACHE_TTL_SECS", "0"),
            ("AUTH_SECRET", "shh"),
            ("AUTH_SKIP_EXPIRY", "yes"),
        ]))
        .unwrap();

        assert_eq!(config.gateway.bind_addr.port(), 9000);
        assert_eq!(config.gateway.max_connections, 50);
        assert_eq!(config.validator.max_score, 1000);
        assert_eq!(config.validator.extra_event_types.len(), 2);
        assert!(config.validator.extra_event_types.contains("speedrun_split"));
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.per_minute, 5);
        assert!(config.rate_limit.whitelist.contains(&ActorId(9)));
        assert_eq!(config.rooms.presence_timeout, Duration::from_secs(60));
        assert_eq!(config.rooms.cache_ttl, Duration::ZERO);
        assert!(config.auth.is_configured());
        assert!(config.auth.skip_expiry);
    }

    #[test]
    fn test_adapter_overrides_discovered() {
        let config = BridgeConfig::from_vars(vars(&[
            ("BRIDGE_ADAPTER_MAME_MULTIPLIER", "0.5"),
            ("BRIDGE_ADAPTER_JSNES_SNES_ENABLED", "false"),
            ("BRIDGE_ADAPTER_DOSBOX_ENABLED", "true"),
            ("BRIDGE_ADAPTER__ENABLED", "true"),
        ]))
        .unwrap();

        assert_eq!(config.adapters["mame"].multiplier, Some(0.5));
        assert_eq!(config.adapters["mame"].enabled, None);
        assert_eq!(config.adapters["jsnes_snes"].enabled, Some(false));
        assert_eq!(config.adapters["dosbox"].enabled, Some(true));
        assert_eq!(config.adapters.len(), 3);
    }

    #[test]
    fn test_lookup_probes_builtins_only() {
        let config = BridgeConfig::from_lookup(|key| match key {
            "BRIDGE_ADAPTER_GBA_ENABLED" => Some("0".to_string()),
            "BRIDGE_ADAPTER_DOSBOX_ENABLED" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.adapters["gba"].enabled, Some(false));
        assert!(!config.adapters.contains_key("dosbox"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            ("BRIDGE_BIND_ADDR", "not-an-addr"),
            ("BRIDGE_MAX_CONNECTIONS", "0"),
            ("BRIDGE_RATE_PER_HOUR", "-1"),
            ("BRIDGE_RATE_LIMIT_ENABLED", "maybe"),
            ("BRIDGE_RATE_WHITELIST", "7,bob"),
            ("BRIDGE_ADAPTER_MAME_MULTIPLIER", "0"),
            ("BRIDGE_ADAPTER_MAME_MULTIPLIER", "NaN"),
            ("AUTH_SKIP_EXPIRY", "sometimes"),
        ];

        for (key, value) in cases {
            let err = BridgeConfig::from_vars(vars(&[(key, value)])).unwrap_err();
            let ConfigError::Invalid { key: reported, .. } = err;
            assert_eq!(reported, key);
        }
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let config = BridgeConfig::from_vars(vars(&[("BRIDGE_RATE_PER_MINUTE", "  ")])).unwrap();
        assert_eq!(config.rate_limit.per_minute, 60);
    }
}
