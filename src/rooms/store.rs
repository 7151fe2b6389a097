//! Room persistence port and its in-memory implementation.
//!
//! Writes are version-checked: a room is only replaced when the caller saw
//! the latest version, so read-modify-write cycles cannot lose updates.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ids::{ActorId, RoomId};
use crate::rooms::room::Room;

/// Store failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend unreachable.
    #[error("room store unavailable: {0}")]
    Unavailable(String),

    /// Insert of an id that already exists.
    #[error("room {0} already exists")]
    Duplicate(RoomId),

    /// Version-checked writes kept losing to other writers.
    #[error("room {0} is under contention, write abandoned")]
    Contention(RoomId),
}

/// Result of a version-checked write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// Written; carries the stored record with its new version.
    Updated(Room),
    /// Someone else wrote first; carries the current record.
    Conflict(Room),
    /// The room no longer exists.
    NotFound,
}

/// Sort key for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomOrder {
    /// Creation time.
    #[default]
    CreatedAt,
    /// Last mutation time.
    UpdatedAt,
    /// Name.
    Name,
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

/// Listing filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomFilter {
    /// Only rooms with this active flag.
    pub is_active: Option<bool>,
    /// Only rooms owned by this actor.
    pub created_by: Option<ActorId>,
    /// Page size. `None` returns everything after `offset`.
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: usize,
    /// Sort key.
    pub order_by: RoomOrder,
    /// Sort direction.
    pub direction: SortDirection,
}

impl RoomFilter {
    /// Active rooms only.
    pub fn active() -> Self {
        Self {
            is_active: Some(true),
            ..Default::default()
        }
    }

    fn matches(&self, room: &Room) -> bool {
        self.is_active.map_or(true, |a| room.is_active == a)
            && self.created_by.map_or(true, |o| room.created_by == o)
    }
}

/// Room persistence port.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Persist a new room. Its version is set to 1.
    async fn insert(&self, room: Room) -> Result<Room, StoreError>;

    /// Fetch one room.
    async fn get(&self, id: &RoomId) -> Result<Option<Room>, StoreError>;

    /// Filtered, ordered, paginated listing.
    async fn list(&self, filter: &RoomFilter) -> Result<Vec<Room>, StoreError>;

    /// Replace a room only if its stored version is still `expected_version`.
    async fn compare_and_swap(&self, room: Room, expected_version: u64) -> Result<CasOutcome, StoreError>;

    /// Remove a room with its membership. False when absent.
    async fn delete(&self, id: &RoomId) -> Result<bool, StoreError>;
}

/// Process-local room store.
#[derive(Debug, Default)]
pub struct InMemoryRoomStore {
    rooms: RwLock<BTreeMap<RoomId, Room>>,
    unavailable: AtomicBool,
}

impl InMemoryRoomStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored rooms.
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    /// True when no room is stored.
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn insert(&self, mut room: Room) -> Result<Room, StoreError> {
        self.check_available()?;
        let mut rooms = self.rooms.write();
        if rooms.contains_key(&room.room_id) {
            return Err(StoreError::Duplicate(room.room_id));
        }
        room.version = 1;
        rooms.insert(room.room_id.clone(), room.clone());
        Ok(room)
    }

    async fn get(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
        self.check_available()?;
        Ok(self.rooms.read().get(id).cloned())
    }

    async fn list(&self, filter: &RoomFilter) -> Result<Vec<Room>, StoreError> {
        self.check_available()?;
        let mut rooms: Vec<Room> = self
            .rooms
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        rooms.sort_by(|a, b| {
            let ord = match filter.order_by {
                RoomOrder::CreatedAt => a.created_at.cmp(&b.created_at),
                RoomOrder::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                RoomOrder::Name => a.name.cmp(&b.name),
            }
            .then_with(|| a.room_id.cmp(&b.room_id));
            match filter.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        let page = rooms.into_iter().skip(filter.offset);
        Ok(match filter.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        })
    }

    async fn compare_and_swap(&self, mut room: Room, expected_version: u64) -> Result<CasOutcome, StoreError> {
        self.check_available()?;
        let mut rooms = self.rooms.write();
        let Some(current) = rooms.get_mut(&room.room_id) else {
            return Ok(CasOutcome::NotFound);
        };
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict(current.clone()));
        }
        room.version = expected_version + 1;
        *current = room.clone();
        Ok(CasOutcome::Updated(room))
    }

    async fn delete(&self, id: &RoomId) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.rooms.write().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn room(name: &str, owner: u64, offset_secs: i64) -> Room {
        let at = Utc::now() + Duration::seconds(offset_secs);
        Room::new(RoomId::generate(), name, 4, ActorId(owner), at)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryRoomStore::new();
        let stored = store.insert(room("A", 1, 0)).await.unwrap();
        assert_eq!(stored.version, 1);

        let fetched = store.get(&stored.room_id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);

        assert!(matches!(store.insert(stored).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_compare_and_swap_versions() {
        let store = InMemoryRoomStore::new();
        let stored = store.insert(room("A", 1, 0)).await.unwrap();

        let mut renamed = stored.clone();
        renamed.name = "B".into();
        let CasOutcome::Updated(updated) = store.compare_and_swap(renamed, 1).await.unwrap() else {
            panic!("expected update");
        };
        assert_eq!(updated.version, 2);

        // Stale writer loses.
        let mut stale = stored.clone();
        stale.name = "C".into();
        let CasOutcome::Conflict(current) = store.compare_and_swap(stale, 1).await.unwrap() else {
            panic!("expected conflict");
        };
        assert_eq!(current.name, "B");

        store.delete(&stored.room_id).await.unwrap();
        assert_eq!(store.compare_and_swap(stored, 2).await.unwrap(), CasOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_list_filter_order_paginate() {
        let store = InMemoryRoomStore::new();
        store.insert(room("charlie", 1, 0)).await.unwrap();
        store.insert(room("alpha", 2, 10)).await.unwrap();
        let mut inactive = room("bravo", 1, 20);
        inactive.is_active = false;
        store.insert(inactive).await.unwrap();

        let newest_first = store.list(&RoomFilter::default()).await.unwrap();
        let names: Vec<&str> = newest_first.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bravo", "alpha", "charlie"]);

        let by_name = store
            .list(&RoomFilter {
                order_by: RoomOrder::Name,
                direction: SortDirection::Asc,
                limit: Some(2),
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = by_name.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bravo", "charlie"]);

        let owned_active = store
            .list(&RoomFilter {
                created_by: Some(ActorId(1)),
                ..RoomFilter::active()
            })
            .await
            .unwrap();
        assert_eq!(owned_active.len(), 1);
        assert_eq!(owned_active[0].name, "charlie");
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = InMemoryRoomStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.insert(room("A", 1, 0)).await, Err(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.insert(room("A", 1, 0)).await.is_ok());
    }
}
