//! Rate Limiter
//!
//! Per-actor minute and hour counters gating event ingestion. Advisory:
//! concurrent reservations may briefly overshoot a limit, which is accepted.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::ids::ActorId;
use crate::events::counter::{CounterError, CounterStore};

/// Length of the short window.
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Length of the long window.
pub const HOUR_WINDOW: Duration = Duration::from_secs(3600);

/// Rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Global switch; disabled means every request is allowed.
    pub enabled: bool,
    /// Requests allowed per minute.
    pub per_minute: u64,
    /// Requests allowed per hour.
    pub per_hour: u64,
    /// Actors never limited.
    pub whitelist: BTreeSet<ActorId>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: 60,
            per_hour: 500,
            whitelist: BTreeSet::new(),
        }
    }
}

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted and counted.
    Allowed,
    /// Request refused; nothing was counted.
    Limited {
        /// How long the caller should wait.
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Usage of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    /// Requests counted in the current window.
    pub used: u64,
    /// Window limit.
    pub limit: u64,
    /// Requests left before limiting.
    pub remaining: u64,
}

impl WindowUsage {
    fn new(used: u64, limit: u64) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

/// Rate limit status for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateStatus {
    /// Whether limiting applies to this actor at all.
    pub limited: bool,
    /// Minute window.
    pub minute: WindowUsage,
    /// Hour window.
    pub hour: WindowUsage,
}

/// Two-window per-actor rate limiter.
pub struct RateLimiter {
    config: RwLock<RateLimitConfig>,
    counters: Arc<dyn CounterStore>,
}

impl RateLimiter {
    /// Create a limiter over a counter store.
    pub fn new(config: RateLimitConfig, counters: Arc<dyn CounterStore>) -> Self {
        Self {
            config: RwLock::new(config),
            counters,
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> RateLimitConfig {
        self.config.read().clone()
    }

    /// Swap thresholds at runtime.
    pub fn update_config(&self, config: RateLimitConfig) {
        info!(
            enabled = config.enabled,
            per_minute = config.per_minute,
            per_hour = config.per_hour,
            "rate limit config updated"
        );
        *self.config.write() = config;
    }

    fn minute_key(actor: ActorId) -> String {
        format!("ratelimit:{}:minute", actor)
    }

    fn hour_key(actor: ActorId) -> String {
        format!("ratelimit:{}:hour", actor)
    }

    fn exempt(config: &RateLimitConfig, actor: ActorId) -> bool {
        !config.enabled || config.whitelist.contains(&actor)
    }

    /// Check both windows and, if neither is exhausted, count the request.
    pub async fn check_and_reserve(&self, actor: ActorId) -> Result<RateDecision, CounterError> {
        let config = self.config();
        if Self::exempt(&config, actor) {
            return Ok(RateDecision::Allowed);
        }

        let minute_key = Self::minute_key(actor);
        let hour_key = Self::hour_key(actor);

        let minute = self.counters.get(&minute_key).await?.unwrap_or(0);
        if minute >= config.per_minute {
            debug!(%actor, minute, "minute limit reached");
            return Ok(RateDecision::Limited { retry_after: MINUTE_WINDOW });
        }

        let hour = self.counters.get(&hour_key).await?.unwrap_or(0);
        if hour >= config.per_hour {
            debug!(%actor, hour, "hour limit reached");
            return Ok(RateDecision::Limited { retry_after: HOUR_WINDOW });
        }

        self.counters.increment_with_expiry(&minute_key, MINUTE_WINDOW).await?;
        self.counters.increment_with_expiry(&hour_key, HOUR_WINDOW).await?;
        Ok(RateDecision::Allowed)
    }

    /// Current usage without reserving.
    pub async fn status(&self, actor: ActorId) -> Result<RateStatus, CounterError> {
        let config = self.config();
        let minute = self.counters.get(&Self::minute_key(actor)).await?.unwrap_or(0);
        let hour = self.counters.get(&Self::hour_key(actor)).await?.unwrap_or(0);
        Ok(RateStatus {
            limited: !Self::exempt(&config, actor),
            minute: WindowUsage::new(minute, config.per_minute),
            hour: WindowUsage::new(hour, config.per_hour),
        })
    }

    /// Administrative override: clear an actor's counters.
    pub async fn reset(&self, actor: ActorId) -> Result<(), CounterError> {
        self.counters.delete(&Self::minute_key(actor)).await?;
        self.counters.delete(&Self::hour_key(actor)).await?;
        info!(%actor, "rate limit counters reset");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
