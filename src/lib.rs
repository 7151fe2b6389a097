//! # Arcade Bridge
//!
//! Gamification backbone for browser-hosted retro emulators: normalizes
//! emulator events into one canonical stream and runs ephemeral multiplayer
//! rooms around them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ARCADE BRIDGE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Identifiers, clock, actor directory       │
//! │                                                              │
//! │  adapters/       - Emulator vocabularies                     │
//! │  ├── registry.rs - Name-keyed registry and transform         │
//! │  ├── table.rs    - JSNES, jSNES, GBA, MAME                   │
//! │  ├── retroarch.rs- RetroArch (system from core)              │
//! │  └── emulatorjs.rs- EmulatorJS (system from tag or alias)    │
//! │                                                              │
//! │  events/         - Canonical events                          │
//! │  ├── schema.rs   - Taxonomy, raw and canonical events        │
//! │  ├── validator.rs- Raw → canonical validation                │
//! │  ├── rate_limit.rs- Minute/hour per-actor limiter            │
//! │  └── store.rs    - Append-only event log port                │
//! │                                                              │
//! │  rooms/          - Multiplayer rooms                         │
//! │  ├── manager.rs  - Lifecycle, membership, presence sweep     │
//! │  └── broadcast.rs- Per-room realtime delivery                │
//! │                                                              │
//! │  ingest/         - transform → validate → limit → persist    │
//! │                    → rewards → broadcast                     │
//! │                                                              │
//! │  network/        - WebSocket gateway and JWT auth            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`bridge::Bridge`] wires the services together from a
//! [`config::BridgeConfig`]; the gateway and tests build on it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod core;
pub mod events;
pub mod ingest;
pub mod network;
pub mod rooms;

// Re-export commonly used types
pub use adapters::{AdapterConfig, AdapterRegistry, EmulatorAdapter};
pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError};
pub use crate::core::{ActorId, RoomId};
pub use events::{CanonicalEvent, EventType, EventValidator, RateLimiter, RawEvent};
pub use ingest::{EventCoordinator, IngestError, IngestReceipt, RewardHandler};
pub use rooms::{Room, RoomError, RoomManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
