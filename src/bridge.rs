//! Service Wiring
//!
//! Builds every service from a [`BridgeConfig`] and hands out shared
//! handles. Nothing here is global: tests and the binary each construct
//! their own [`Bridge`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapters::{AdapterConfig, AdapterRegistry};
use crate::config::{AdapterOverride, BridgeConfig};
use crate::core::actor::StaticActorDirectory;
use crate::core::clock::{SharedClock, SystemClock};
use crate::events::counter::InMemoryCounterStore;
use crate::events::rate_limit::RateLimiter;
use crate::events::store::InMemoryEventStore;
use crate::events::validator::EventValidator;
use crate::ingest::coordinator::EventCoordinator;
use crate::ingest::rewards::PointsLedger;
use crate::rooms::broadcast::ChannelBroadcaster;
use crate::rooms::events::RoomEvent;
use crate::rooms::manager::RoomManager;
use crate::rooms::store::InMemoryRoomStore;

/// All bridge services, wired together.
#[derive(Clone)]
pub struct Bridge {
    clock: SharedClock,
    directory: Arc<StaticActorDirectory>,
    registry: Arc<AdapterRegistry>,
    validator: Arc<EventValidator>,
    counters: Arc<InMemoryCounterStore>,
    limiter: Arc<RateLimiter>,
    events: Arc<InMemoryEventStore>,
    rooms: Arc<RoomManager>,
    broadcaster: Arc<ChannelBroadcaster>,
    coordinator: Arc<EventCoordinator>,
    points: Arc<PointsLedger>,
}

impl Bridge {
    /// Build with the system clock.
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build with an explicit clock.
    ///
    /// The directory accepts any actor: the gateway authenticates callers
    /// by token, so every verified subject is a known actor.
    pub fn with_clock(config: &BridgeConfig, clock: SharedClock) -> Self {
        let directory = Arc::new(StaticActorDirectory::permissive());

        let registry = Arc::new(AdapterRegistry::with_builtins());
        for (name, entry) in &config.adapters {
            apply_override(&registry, name, entry);
        }

        let validator = Arc::new(EventValidator::new(
            config.validator.clone(),
            directory.clone(),
            Arc::clone(&clock),
        ));
        let counters = Arc::new(InMemoryCounterStore::new(Arc::clone(&clock)));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), counters.clone()));

        let events = Arc::new(InMemoryEventStore::new());
        let rooms = Arc::new(RoomManager::new(
            config.rooms.clone(),
            Arc::new(InMemoryRoomStore::new()),
            events.clone(),
            directory.clone(),
            Arc::clone(&clock),
        ));
        let broadcaster = Arc::new(ChannelBroadcaster::new(Arc::clone(&clock)));

        let coordinator = Arc::new(EventCoordinator::new(
            registry.clone(),
            validator.clone(),
            limiter.clone(),
            events.clone(),
            rooms.clone(),
            broadcaster.clone(),
        ));
        let points = Arc::new(PointsLedger::new());
        coordinator.register_reward_handler(points.clone());

        info!(
            adapters = registry.len(),
            event_types = validator.allowed_event_types().len(),
            rate_limit = config.rate_limit.enabled,
            "Bridge services ready"
        );

        Self {
            clock,
            directory,
            registry,
            validator,
            counters,
            limiter,
            events,
            rooms,
            broadcaster,
            coordinator,
            points,
        }
    }

    /// Start the periodic presence sweep and housekeeping. The handle
    /// finishes once both have stopped on `shutdown`.
    pub fn spawn_cleanup(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let every = self.rooms.config().cleanup_interval;
        let sweep = self.rooms.spawn_cleanup_task(every, shutdown.resubscribe());
        let housekeeping = self.spawn_housekeeping(every, shutdown);

        tokio::spawn(async move {
            let (sweep, housekeeping) = tokio::join!(sweep, housekeeping);
            if let Err(e) = sweep.and(housekeeping) {
                warn!(error = %e, "Cleanup task ended abnormally");
            }
        })
    }

    /// Closes the channel of every deleted room and, on each tick, drops
    /// unlistened channels and expired rate counters.
    fn spawn_housekeeping(&self, every: Duration, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let broadcaster = Arc::clone(&self.broadcaster);
        let counters = Arc::clone(&self.counters);
        let mut room_events = self.rooms.subscribe();
        let every = every.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let pruned = broadcaster.prune();
                        let purged = counters.purge_expired();
                        if pruned > 0 || purged > 0 {
                            debug!(channels = pruned, counters = purged, "Housekeeping dropped idle state");
                        }
                    }
                    event = room_events.recv() => match event {
                        Ok(RoomEvent::Deleted { room_id, .. }) => broadcaster.close_room(&room_id),
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Housekeeping missed room events");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => {
                        info!("Housekeeping task stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Clock shared by every service.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Actor directory.
    pub fn directory(&self) -> &Arc<StaticActorDirectory> {
        &self.directory
    }

    /// Adapter registry.
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Event validator.
    pub fn validator(&self) -> &Arc<EventValidator> {
        &self.validator
    }

    /// Rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Event log.
    pub fn events(&self) -> &Arc<InMemoryEventStore> {
        &self.events
    }

    /// Room manager.
    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    /// Room broadcaster.
    pub fn broadcaster(&self) -> &Arc<ChannelBroadcaster> {
        &self.broadcaster
    }

    /// Ingestion coordinator.
    pub fn coordinator(&self) -> &Arc<EventCoordinator> {
        &self.coordinator
    }

    /// Built-in points ledger.
    pub fn points(&self) -> &Arc<PointsLedger> {
        &self.points
    }
}

fn apply_override(registry: &AdapterRegistry, name: &str, entry: &AdapterOverride) {
    let current = registry
        .adapter_metadata(name)
        .map(|m| AdapterConfig {
            enabled: m.enabled,
            score_multiplier: m.score_multiplier,
        })
        .unwrap_or_default();
    let config = AdapterConfig {
        enabled: entry.enabled.unwrap_or(current.enabled),
        score_multiplier: entry.multiplier.unwrap_or(current.score_multiplier),
    };

    match registry.configure(name, config) {
        Ok(true) => {}
        Ok(false) => warn!(adapter = name, "Override stored for an adapter that is not registered"),
        Err(e) => warn!(adapter = name, error = %e, "Adapter override rejected"),
    }
}
