//! Event Layer
//!
//! Canonical event schema, validation, the append-only event log port and
//! per-actor rate limiting.
//!
//! ## Module Structure
//!
//! - `schema`: canonical taxonomy, raw and canonical events
//! - `validator`: raw → canonical validation and sanitizing
//! - `store`: append-only event log port
//! - `counter`: increment-with-expiry counter port
//! - `rate_limit`: minute/hour per-actor limiter

pub mod counter;
pub mod rate_limit;
pub mod schema;
pub mod store;
pub mod validator;

// Re-export key types
pub use counter::{CounterError, CounterStore, InMemoryCounterStore};
pub use rate_limit::{RateDecision, RateLimitConfig, RateLimiter, RateStatus};
pub use schema::{CanonicalEvent, EventType, RawEvent};
pub use store::{EventStore, EventStoreError, InMemoryEventStore};
pub use validator::{EventValidator, ValidationError, ValidatorConfig};
