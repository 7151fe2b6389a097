//! Room Session Manager
//!
//! Owns the room lifecycle: creation, membership, presence and the periodic
//! stale-presence sweep.
//!
//! Every mutator takes the room's async mutex, re-reads the authoritative
//! record, applies a pure change from [`Room`] and writes it back through the
//! store's version-checked swap. The mutex serializes writers inside this
//! process; the version check catches writers outside it. Either the whole
//! change lands or nothing does, and the cache entry is dropped before the
//! call returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::core::actor::{Actor, ActorDirectory};
use crate::core::clock::SharedClock;
use crate::core::ids::{ActorId, RoomId};
use crate::events::store::EventStore;
use crate::rooms::cache::RoomCache;
use crate::rooms::events::RoomEvent;
use crate::rooms::room::{check_capacity, check_name, JoinOutcome, Player, Room, RoomError, RoomPatch};
use crate::rooms::store::{CasOutcome, RoomFilter, RoomStore, StoreError};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Attempts at generating an unused room id before giving up.
const CREATE_ATTEMPTS: usize = 3;

// =============================================================================
// CONFIG & REPORTS
// =============================================================================

/// Room manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Members idle longer than this are evicted by the sweep.
    pub presence_timeout: Duration,
    /// Period of the background sweep.
    pub cleanup_interval: Duration,
    /// Lifetime of cached room reads. Zero disables the cache.
    pub cache_ttl: Duration,
    /// Version-checked write attempts before reporting contention.
    pub max_write_attempts: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            presence_timeout: Duration::from_secs(1800),
            cleanup_interval: Duration::from_secs(3600),
            cache_ttl: Duration::from_secs(3600),
            max_write_attempts: 8,
        }
    }
}

/// Occupancy and activity of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomStats {
    /// Room.
    pub room_id: RoomId,
    /// Current members.
    pub player_count: usize,
    /// Capacity.
    pub max_players: usize,
    /// Persisted events referencing the room.
    pub event_count: u64,
    /// No free slot.
    pub is_full: bool,
    /// Accepting joins.
    pub is_active: bool,
}

/// Outcome of one presence sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Active rooms inspected.
    pub rooms_scanned: usize,
    /// Rooms whose membership was rewritten.
    pub rooms_updated: usize,
    /// Evicted `(room, actor)` pairs.
    pub evicted: Vec<(RoomId, ActorId)>,
}

impl CleanupReport {
    /// Number of evicted members.
    pub fn players_evicted(&self) -> usize {
        self.evicted.len()
    }
}

// =============================================================================
// ROOM MANAGER
// =============================================================================

/// Room lifecycle and membership service.
pub struct RoomManager {
    config: RoomConfig,
    store: Arc<dyn RoomStore>,
    events: Arc<dyn EventStore>,
    directory: Arc<dyn ActorDirectory>,
    clock: SharedClock,
    cache: RoomCache,
    /// One async mutex per room with a mutation in flight or recently done.
    locks: Mutex<HashMap<RoomId, Arc<AsyncMutex<()>>>>,
    event_tx: broadcast::Sender<RoomEvent>,
}

impl RoomManager {
    /// Create a manager over the given collaborators.
    pub fn new(
        config: RoomConfig,
        store: Arc<dyn RoomStore>,
        events: Arc<dyn EventStore>,
        directory: Arc<dyn ActorDirectory>,
        clock: SharedClock,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cache = RoomCache::new(config.cache_ttl, Arc::clone(&clock));
        Self {
            config,
            store,
            events,
            directory,
            clock,
            cache,
            locks: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    /// Active settings.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Subscribe to room domain events.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: RoomEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn room_lock(&self, id: &RoomId) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Forget locks nobody holds.
    fn prune_locks(&self) {
        self.locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    async fn display_name(&self, actor: ActorId) -> String {
        match self.directory.resolve_actor(actor).await {
            Ok(Some(found)) => found.display_name,
            Ok(None) => format!("Player {}", actor),
            Err(e) => {
                warn!(actor = %actor, error = %e, "Actor lookup failed, using placeholder name");
                format!("Player {}", actor)
            }
        }
    }

    /// Serialized read-modify-write of one room.
    ///
    /// `Ok(None)` when the room does not exist. `apply` may run more than
    /// once when an outside writer wins the version check.
    async fn mutate<T, F>(&self, id: &RoomId, apply: F) -> Result<Option<(Room, T)>, RoomError>
    where
        F: FnMut(&mut Room) -> Result<T, RoomError> + Send,
        T: Send,
    {
        let lock = self.room_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.mutate_locked(id, apply).await
        };
        self.cache.invalidate(id);
        result
    }

    async fn mutate_locked<T, F>(&self, id: &RoomId, mut apply: F) -> Result<Option<(Room, T)>, RoomError>
    where
        F: FnMut(&mut Room) -> Result<T, RoomError> + Send,
        T: Send,
    {
        for attempt in 1..=self.config.max_write_attempts.max(1) {
            let Some(current) = self.store.get(id).await? else {
                return Ok(None);
            };

            let mut next = current.clone();
            let output = apply(&mut next)?;
            if next == current {
                return Ok(Some((current, output)));
            }
            next.updated_at = self.clock.now().max(current.updated_at);

            match self.store.compare_and_swap(next, current.version).await? {
                CasOutcome::Updated(room) => return Ok(Some((room, output))),
                CasOutcome::NotFound => return Ok(None),
                CasOutcome::Conflict(_) => {
                    debug!(room = %id, attempt, "Room write lost version check, retrying");
                }
            }
        }
        Err(StoreError::Contention(id.clone()).into())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Create an active, empty room owned by `owner`.
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn create_room(&self, name: &str, max_players: usize, owner: ActorId) -> Result<RoomId, RoomError> {
        let name = check_name(name)?;
        let max_players = check_capacity(max_players)?;
        let now = self.clock.now();

        for _ in 0..CREATE_ATTEMPTS {
            let room = Room::new(RoomId::generate(), name.clone(), max_players, owner, now);
            match self.store.insert(room).await {
                Ok(stored) => {
                    info!(room = %stored.room_id, name = %stored.name, max_players, "Room created");
                    self.emit(RoomEvent::Created {
                        room_id: stored.room_id.clone(),
                        created_by: owner,
                        at: now,
                    });
                    return Ok(stored.room_id);
                }
                Err(StoreError::Duplicate(id)) => {
                    warn!(room = %id, "Generated room id already taken");
                }
                Err(e) => {
                    error!(error = %e, "Room insert failed");
                    return Err(RoomError::CreationFailed(e.to_string()));
                }
            }
        }
        Err(RoomError::CreationFailed("could not allocate a unique room id".into()))
    }

    /// Read a room, through the cache when `use_cache` is set.
    pub async fn get_room(&self, id: &RoomId, use_cache: bool) -> Result<Option<Room>, RoomError> {
        if use_cache {
            if let Some(room) = self.cache.get(id) {
                return Ok(Some(room));
            }
        }
        let room = self.store.get(id).await?;
        if let Some(room) = &room {
            self.cache.put(room);
        }
        Ok(room)
    }

    /// Filtered listing straight from the store.
    pub async fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<Room>, RoomError> {
        Ok(self.store.list(filter).await?)
    }

    /// Partial update. `Ok(false)` when the room does not exist.
    #[instrument(skip_all, fields(room = %id))]
    pub async fn update_room(&self, id: &RoomId, patch: RoomPatch) -> Result<bool, RoomError> {
        let updated = self
            .mutate(id, |room| room.apply_patch(patch.clone()))
            .await?;

        match updated {
            Some((room, ())) => {
                info!(is_active = room.is_active, max_players = room.max_players, "Room updated");
                self.emit(RoomEvent::Updated {
                    room_id: id.clone(),
                    at: room.updated_at,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Hard delete, membership included. `Ok(false)` when absent.
    #[instrument(skip_all, fields(room = %id))]
    pub async fn delete_room(&self, id: &RoomId) -> Result<bool, RoomError> {
        let lock = self.room_lock(id);
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete(id).await
        };
        self.cache.invalidate(id);
        drop(lock);
        self.locks.lock().remove(id);

        if deleted? {
            info!("Room deleted");
            self.emit(RoomEvent::Deleted {
                room_id: id.clone(),
                at: self.clock.now(),
            });
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Check that `actor` may manage the room: its owner or an administrator.
    pub async fn authorize_owner(&self, id: &RoomId, actor: &Actor) -> Result<Room, RoomError> {
        let room = self
            .get_room(id, true)
            .await?
            .ok_or_else(|| RoomError::NotFound(id.clone()))?;
        if actor.is_admin || room.created_by == actor.id {
            Ok(room)
        } else {
            Err(RoomError::Forbidden {
                room_id: id.clone(),
                actor: actor.id,
            })
        }
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Join a room. Joining again only refreshes presence.
    ///
    /// The capacity check and the insert happen in one serialized write, so
    /// concurrent joins for the last slot produce exactly one success.
    #[instrument(skip_all, fields(room = %id, actor = %actor))]
    pub async fn join_room(&self, id: &RoomId, actor: ActorId) -> Result<JoinOutcome, RoomError> {
        let display_name = self.display_name(actor).await;
        let now = self.clock.now();

        let outcome = self
            .mutate(id, |room| room.admit(actor, &display_name, now))
            .await?
            .map(|(_, outcome)| outcome)
            .ok_or_else(|| RoomError::NotFound(id.clone()))?;

        match outcome {
            JoinOutcome::Joined => {
                info!("Player joined room");
                self.emit(RoomEvent::PlayerJoined {
                    room_id: id.clone(),
                    actor_id: actor,
                    at: now,
                });
            }
            JoinOutcome::AlreadyMember => debug!("Repeat join, presence refreshed"),
        }
        Ok(outcome)
    }

    /// Leave a room. `Ok(false)` when `actor` was not a member.
    #[instrument(skip_all, fields(room = %id, actor = %actor))]
    pub async fn leave_room(&self, id: &RoomId, actor: ActorId) -> Result<bool, RoomError> {
        let removed = self
            .mutate(id, |room| Ok(room.remove_player(actor)))
            .await?
            .map(|(_, removed)| removed)
            .ok_or_else(|| RoomError::NotFound(id.clone()))?;

        if removed {
            info!("Player left room");
            self.emit(RoomEvent::PlayerLeft {
                room_id: id.clone(),
                actor_id: actor,
                at: self.clock.now(),
            });
        }
        Ok(removed)
    }

    /// Refresh a member's presence. Never adds a member.
    pub async fn update_presence(&self, id: &RoomId, actor: ActorId) -> Result<bool, RoomError> {
        let now = self.clock.now();
        self.mutate(id, |room| Ok(room.touch_player(actor, now)))
            .await?
            .map(|(_, touched)| touched)
            .ok_or_else(|| RoomError::NotFound(id.clone()))
    }

    /// Members in join order.
    pub async fn get_room_players(&self, id: &RoomId) -> Result<Vec<Player>, RoomError> {
        self.get_room(id, true)
            .await?
            .map(|room| room.players)
            .ok_or_else(|| RoomError::NotFound(id.clone()))
    }

    /// Occupancy plus the number of persisted events referencing the room.
    pub async fn get_room_stats(&self, id: &RoomId) -> Result<RoomStats, RoomError> {
        let room = self
            .get_room(id, true)
            .await?
            .ok_or_else(|| RoomError::NotFound(id.clone()))?;
        let event_count = self
            .events
            .count_for_room(id)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(RoomStats {
            room_id: room.room_id.clone(),
            player_count: room.player_count(),
            max_players: room.max_players,
            event_count,
            is_full: room.is_full(),
            is_active: room.is_active,
        })
    }

    // =========================================================================
    // PRESENCE SWEEP
    // =========================================================================

    /// Evict members of active rooms whose presence is older than the
    /// configured timeout. Eviction events go out before each room is
    /// written.
    #[instrument(skip(self))]
    pub async fn cleanup_inactive_players(&self) -> Result<CleanupReport, RoomError> {
        let now = self.clock.now();
        let timeout = self.config.presence_timeout;
        let rooms = self.store.list(&RoomFilter::active()).await?;

        let mut report = CleanupReport::default();
        for room in rooms {
            report.rooms_scanned += 1;
            let room_id = room.room_id;

            let swept = self
                .mutate(&room_id, |room| {
                    if !room.is_active {
                        return Ok(Vec::new());
                    }
                    let (active, stale) = room.partition_stale(now, timeout);
                    for player in &stale {
                        self.emit(RoomEvent::PlayerEvicted {
                            room_id: room.room_id.clone(),
                            actor_id: player.actor_id,
                            last_seen_at: player.last_seen_at,
                            at: now,
                        });
                    }
                    if !stale.is_empty() {
                        room.players = active;
                    }
                    Ok(stale)
                })
                .await?;

            if let Some((_, stale)) = swept {
                if !stale.is_empty() {
                    info!(room = %room_id, evicted = stale.len(), "Evicted idle players");
                    report.rooms_updated += 1;
                    report
                        .evicted
                        .extend(stale.into_iter().map(|p| (room_id.clone(), p.actor_id)));
                }
            }
        }

        self.prune_locks();
        Ok(report)
    }

    /// Run the presence sweep every `every` until `shutdown` fires.
    pub fn spawn_cleanup_task(
        self: &Arc<Self>,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let every = every.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match manager.cleanup_inactive_players().await {
                            Ok(report) if report.players_evicted() > 0 => {
                                info!(
                                    rooms = report.rooms_updated,
                                    players = report.players_evicted(),
                                    "Presence sweep finished"
                                );
                            }
                            Ok(_) => debug!("Presence sweep found nothing idle"),
                            Err(e) => error!(error = %e, "Presence sweep failed"),
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Room cleanup task stopping");
                        break;
                    }
                }
            }
        })
    }
}
