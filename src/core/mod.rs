//! Core primitives.
//!
//! Identifiers, the injectable clock and the actor directory port. Every
//! other module builds on these.

pub mod actor;
pub mod clock;
pub mod ids;

// Re-export core types
pub use actor::{Actor, ActorDirectory, DirectoryError, StaticActorDirectory};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use ids::{ActorId, RoomId, ROOM_ID_PREFIX};
