//! Event Ingestion Coordinator
//!
//! The single entry point for gameplay events. Steps run strictly in order
//! and the first failure ends the call:
//!
//! 1. adapter transform (the authenticated actor is stamped first)
//! 2. validation
//! 3. rate limiting
//! 4. persistence
//! 5. reward fan-out (best effort)
//! 6. room broadcast (best effort)
//!
//! Nothing after step 4 can fail the call: the event is durable by then.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapters::AdapterRegistry;
use crate::core::ids::ActorId;
use crate::events::counter::CounterError;
use crate::events::rate_limit::{RateDecision, RateLimiter};
use crate::events::schema::{CanonicalEvent, RawEvent};
use crate::events::store::{EventStore, EventStoreError};
use crate::events::validator::{EventValidator, ValidationError};
use crate::ingest::rewards::RewardHandler;
use crate::rooms::broadcast::RoomBroadcaster;
use crate::rooms::manager::RoomManager;

/// Why an event was not accepted.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Schema or reference check failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Actor exceeded a rate window.
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited {
        /// Time until the exhausted window resets.
        retry_after: Duration,
    },

    /// Counter store failed.
    #[error(transparent)]
    Counter(#[from] CounterError),

    /// Event store failed.
    #[error(transparent)]
    Persistence(#[from] EventStoreError),
}

impl IngestError {
    /// Infrastructure failure rather than a client mistake.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            IngestError::Validation(e) => e.is_infrastructure(),
            IngestError::RateLimited { .. } => false,
            IngestError::Counter(_) | IngestError::Persistence(_) => true,
        }
    }
}

/// What happened at the broadcast step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BroadcastStatus {
    /// Event carries no room.
    NoRoom,
    /// Published to the room's listeners.
    Published {
        /// Listeners reached.
        listeners: usize,
    },
    /// Referenced room no longer exists.
    RoomMissing,
    /// Referenced room is inactive.
    RoomInactive,
    /// Room lookup failed; broadcast skipped.
    Skipped,
}

/// Receipt for an accepted event.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    /// The persisted event.
    pub event: CanonicalEvent,
    /// Reward handlers that succeeded.
    pub rewards_notified: usize,
    /// Reward handlers that failed.
    pub rewards_failed: usize,
    /// Broadcast step outcome.
    pub broadcast: BroadcastStatus,
}

/// Runs the ingestion pipeline.
pub struct EventCoordinator {
    registry: Arc<AdapterRegistry>,
    validator: Arc<EventValidator>,
    limiter: Arc<RateLimiter>,
    events: Arc<dyn EventStore>,
    rooms: Arc<RoomManager>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    handlers: RwLock<Vec<Arc<dyn RewardHandler>>>,
}

impl EventCoordinator {
    /// Wire the pipeline. Reward handlers are added afterwards.
    pub fn new(
        registry: Arc<AdapterRegistry>,
        validator: Arc<EventValidator>,
        limiter: Arc<RateLimiter>,
        events: Arc<dyn EventStore>,
        rooms: Arc<RoomManager>,
        broadcaster: Arc<dyn RoomBroadcaster>,
    ) -> Self {
        Self {
            registry,
            validator,
            limiter,
            events,
            rooms,
            broadcaster,
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Add a reward integration.
    pub fn register_reward_handler(&self, handler: Arc<dyn RewardHandler>) {
        info!(handler = handler.name(), "Reward handler registered");
        self.handlers.write().push(handler);
    }

    /// Number of registered reward integrations.
    pub fn reward_handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Ingest one raw event on behalf of `actor`.
    ///
    /// `adapter_hint` names the emulator explicitly; without it the event's
    /// own emulator tag is used.
    #[instrument(skip_all, fields(actor = %actor, hint = ?adapter_hint))]
    pub async fn ingest(
        &self,
        actor: ActorId,
        mut raw: RawEvent,
        adapter_hint: Option<&str>,
    ) -> Result<IngestReceipt, IngestError> {
        raw.set_actor_id(actor);
        let raw = self.registry.transform_event(raw, adapter_hint);

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(raw = ?raw, "Transformed raw event");

        let event = self.validator.validate(&raw).await.map_err(|e| {
            debug!(error = %e, "Event rejected by validator");
            e
        })?;

        if let RateDecision::Limited { retry_after } = self.limiter.check_and_reserve(actor).await? {
            debug!(retry_after_secs = retry_after.as_secs(), "Event rate limited");
            return Err(IngestError::RateLimited { retry_after });
        }

        self.events.append(&event).await?;
        info!(event_id = %event.id, event_type = %event.event_type, score = event.score, "Event accepted");

        let (rewards_notified, rewards_failed) = self.fan_out(&event).await;
        let broadcast = self.broadcast(&event).await;

        Ok(IngestReceipt {
            event,
            rewards_notified,
            rewards_failed,
            broadcast,
        })
    }

    async fn fan_out(&self, event: &CanonicalEvent) -> (usize, usize) {
        let handlers: Vec<Arc<dyn RewardHandler>> = self.handlers.read().clone();
        if handlers.is_empty() {
            return (0, 0);
        }

        // A panicking handler counts as a failure; its siblings still run.
        let results = join_all(handlers.iter().map(|handler| {
            AssertUnwindSafe(handler.on_gamify_event(
                &event.event_type,
                event.actor_id,
                event.score,
                &event.payload,
            ))
            .catch_unwind()
        }))
        .await;

        let mut failed = 0;
        for (handler, result) in handlers.iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(handler = handler.name(), event_id = %event.id, error = %e, "Reward handler failed");
                }
                Err(_) => {
                    failed += 1;
                    warn!(handler = handler.name(), event_id = %event.id, "Reward handler panicked");
                }
            }
        }
        (handlers.len() - failed, failed)
    }

    async fn broadcast(&self, event: &CanonicalEvent) -> BroadcastStatus {
        let Some(room_id) = &event.room_id else {
            return BroadcastStatus::NoRoom;
        };

        match self.rooms.get_room(room_id, true).await {
            Ok(Some(room)) if room.is_active => {
                let listeners = self
                    .broadcaster
                    .publish(room_id, &event.event_type, event.actor_id, &event.payload)
                    .await;
                BroadcastStatus::Published { listeners }
            }
            Ok(Some(_)) => {
                debug!(room = %room_id, "Room inactive, broadcast skipped");
                BroadcastStatus::RoomInactive
            }
            Ok(None) => {
                debug!(room = %room_id, "Room gone, broadcast skipped");
                BroadcastStatus::RoomMissing
            }
            Err(e) => {
                warn!(room = %room_id, error = %e, "Room lookup failed, broadcast skipped");
                BroadcastStatus::Skipped
            }
        }
    }
}
