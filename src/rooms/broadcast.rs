//! Room broadcast channel.
//!
//! Fire-and-forget delivery of accepted events to a room's listeners. The
//! gateway subscribes per connection; nobody listening is not an error.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::trace;

use crate::core::clock::SharedClock;
use crate::core::ids::{ActorId, RoomId};
use crate::events::schema::EventType;

/// Per-room channel depth. Slow listeners skip ahead rather than block.
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// One notification delivered to a room's listeners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomBroadcast {
    /// Room.
    pub room_id: RoomId,
    /// Canonical event kind.
    pub event_type: EventType,
    /// Actor that produced the event.
    pub actor_id: ActorId,
    /// Event payload.
    pub payload: Map<String, Value>,
    /// When it was published.
    pub published_at: DateTime<Utc>,
}

/// Realtime delivery port.
#[async_trait]
pub trait RoomBroadcaster: Send + Sync {
    /// Publish to a room. Returns how many listeners received it.
    async fn publish(
        &self,
        room_id: &RoomId,
        event_type: &EventType,
        actor_id: ActorId,
        payload: &Map<String, Value>,
    ) -> usize;
}

/// In-process broadcaster with one tokio broadcast channel per room.
pub struct ChannelBroadcaster {
    channels: RwLock<HashMap<RoomId, broadcast::Sender<RoomBroadcast>>>,
    clock: SharedClock,
}

impl ChannelBroadcaster {
    /// No channels yet. Messages are stamped with `clock`.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Listen to a room. The channel is created on first use.
    pub fn subscribe(&self, room_id: &RoomId) -> broadcast::Receiver<RoomBroadcast> {
        if let Some(tx) = self.channels.read().get(room_id) {
            return tx.subscribe();
        }
        self.channels
            .write()
            .entry(room_id.clone())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop a room's channel; current listeners see it close.
    pub fn close_room(&self, room_id: &RoomId) {
        self.channels.write().remove(room_id);
    }

    /// Drop channels nobody listens to any more.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.write();
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        before - channels.len()
    }

    /// Rooms with an open channel.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Listeners currently attached to a room.
    pub fn listener_count(&self, room_id: &RoomId) -> usize {
        self.channels
            .read()
            .get(room_id)
            .map_or(0, |tx| tx.receiver_count())
    }
}

#[async_trait]
impl RoomBroadcaster for ChannelBroadcaster {
    async fn publish(
        &self,
        room_id: &RoomId,
        event_type: &EventType,
        actor_id: ActorId,
        payload: &Map<String, Value>,
    ) -> usize {
        let Some(tx) = self.channels.read().get(room_id).cloned() else {
            trace!(room = %room_id, "No listeners for room broadcast");
            return 0;
        };
        let message = RoomBroadcast {
            room_id: room_id.clone(),
            event_type: event_type.clone(),
            actor_id,
            payload: payload.clone(),
            published_at: self.clock.now(),
        };
        tx.send(message).unwrap_or(0)
    }
}
