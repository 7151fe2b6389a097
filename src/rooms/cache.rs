//! Read-through room cache.
//!
//! Non-authoritative: entries expire after a TTL and every room mutator
//! invalidates the entry before it returns. A miss always falls back to the
//! store.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::clock::SharedClock;
use crate::core::ids::RoomId;
use crate::rooms::room::Room;

struct CachedRoom {
    room: Room,
    expires_at: DateTime<Utc>,
}

/// TTL cache keyed by room id.
pub struct RoomCache {
    entries: Mutex<HashMap<RoomId, CachedRoom>>,
    ttl: Duration,
    clock: SharedClock,
}

impl RoomCache {
    /// Empty cache.
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Cached copy, if present and fresh.
    pub fn get(&self, id: &RoomId) -> Option<Room> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(id) {
            Some(entry) if entry.expires_at > now => Some(entry.room.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Store a copy.
    pub fn put(&self, room: &Room) {
        if self.ttl.is_zero() {
            return;
        }
        let Ok(ttl) = chrono::Duration::from_std(self.ttl) else {
            return;
        };
        let expires_at = self.clock.now() + ttl;
        self.entries.lock().insert(
            room.room_id.clone(),
            CachedRoom {
                room: room.clone(),
                expires_at,
            },
        );
    }

    /// Drop one entry.
    pub fn invalidate(&self, id: &RoomId) {
        self.entries.lock().remove(id);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
