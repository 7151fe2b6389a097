//! Event Store
//!
//! Append-only log of accepted canonical events. The durable store is an
//! external collaborator; [`InMemoryEventStore`] keeps the log in process.

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::core::ids::{ActorId, RoomId};
use crate::events::schema::CanonicalEvent;

/// Event store failure.
#[derive(Debug, Clone, Error)]
pub enum EventStoreError {
    /// Backend unreachable or write rejected.
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event.
    async fn append(&self, event: &CanonicalEvent) -> Result<(), EventStoreError>;

    /// Number of persisted events referencing a room.
    async fn count_for_room(&self, room_id: &RoomId) -> Result<u64, EventStoreError>;

    /// Most recent events of an actor, newest first.
    async fn recent_for_actor(
        &self,
        actor_id: ActorId,
        limit: usize,
    ) -> Result<Vec<CanonicalEvent>, EventStoreError>;
}

/// Process-local event log.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<CanonicalEvent>>,
}

impl InMemoryEventStore {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total events stored.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Copy of the whole log, oldest first.
    pub fn snapshot(&self) -> Vec<CanonicalEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &CanonicalEvent) -> Result<(), EventStoreError> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn count_for_room(&self, room_id: &RoomId) -> Result<u64, EventStoreError> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.room_id.as_ref() == Some(room_id))
            .count() as u64)
    }

    async fn recent_for_actor(
        &self,
        actor_id: ActorId,
        limit: usize,
    ) -> Result<Vec<CanonicalEvent>, EventStoreError> {
        Ok(self
            .events
            .read()
            .iter()
            .rev()
            .filter(|e| e.actor_id == actor_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
