//! Room Sessions
//!
//! Ephemeral multiplayer rooms: capacity-bounded membership with presence
//! tracking, a read-through cache, domain events and a per-room broadcast
//! channel for accepted gameplay events.
//!
//! ## Module Structure
//!
//! - `room`: Room/Player records and pure membership rules
//! - `store`: version-checked persistence port + in-memory store
//! - `cache`: TTL read cache
//! - `events`: room domain events
//! - `broadcast`: realtime delivery of gameplay events to room listeners
//! - `manager`: the lifecycle service tying it together

pub mod broadcast;
pub mod cache;
pub mod events;
pub mod manager;
pub mod room;
pub mod store;

pub use broadcast::{ChannelBroadcaster, RoomBroadcast, RoomBroadcaster};
pub use cache::RoomCache;
pub use events::RoomEvent;
pub use manager::{CleanupReport, RoomConfig, RoomManager, RoomStats};
pub use room::{JoinOutcome, Player, Room, RoomError, RoomPatch, RoomState, MAX_PLAYERS, MIN_PLAYERS};
pub use store::{CasOutcome, InMemoryRoomStore, RoomFilter, RoomOrder, RoomStore, SortDirection, StoreError};
