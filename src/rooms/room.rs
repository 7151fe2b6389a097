//! Room and Player records.
//!
//! Pure membership rules live here; persistence, locking and notification are
//! the manager's job.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::clock::elapsed;
use crate::core::ids::{ActorId, RoomId};
use crate::rooms::store::StoreError;

/// Smallest allowed room capacity.
pub const MIN_PLAYERS: usize = 2;

/// Largest allowed room capacity.
pub const MAX_PLAYERS: usize = 100;

// =============================================================================
// PLAYER
// =============================================================================

/// One member of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Member.
    pub actor_id: ActorId,
    /// Name shown to the other members.
    pub display_name: String,
    /// When the member joined.
    pub joined_at: DateTime<Utc>,
    /// Last heartbeat or join. Never earlier than `joined_at`.
    pub last_seen_at: DateTime<Utc>,
}

impl Player {
    /// Fresh member.
    pub fn new(actor_id: ActorId, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            actor_id,
            display_name: display_name.into(),
            joined_at: now,
            last_seen_at: now,
        }
    }

    /// Record presence.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = now.max(self.joined_at);
    }

    /// Time since the last presence signal.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        elapsed(self.last_seen_at, now)
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// Lifecycle state derived from the active flag. Deletion is terminal and
/// leaves no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// Accepting joins.
    Active,
    /// Administratively paused; membership kept.
    Inactive,
}

/// What a successful join did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    /// A new member was added.
    Joined,
    /// Already a member; presence refreshed.
    AlreadyMember,
}

/// An ephemeral multiplayer room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Identifier.
    pub room_id: RoomId,
    /// Human-readable name.
    pub name: String,
    /// Owner.
    pub created_by: ActorId,
    /// Capacity, within `MIN_PLAYERS..=MAX_PLAYERS`.
    pub max_players: usize,
    /// Whether joins are accepted.
    pub is_active: bool,
    /// Members in join order, unique per actor.
    pub players: Vec<Player>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last persisted mutation.
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped by the store on every write.
    pub version: u64,
}

impl Room {
    /// New active room without members.
    pub fn new(
        room_id: RoomId,
        name: impl Into<String>,
        max_players: usize,
        created_by: ActorId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            room_id,
            name: name.into(),
            created_by,
            max_players,
            is_active: true,
            players: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> RoomState {
        if self.is_active {
            RoomState::Active
        } else {
            RoomState::Inactive
        }
    }

    /// Number of members.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// No free slot left.
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// Whether `actor` is a member.
    pub fn is_member(&self, actor: ActorId) -> bool {
        self.players.iter().any(|p| p.actor_id == actor)
    }

    /// A member's record.
    pub fn player(&self, actor: ActorId) -> Option<&Player> {
        self.players.iter().find(|p| p.actor_id == actor)
    }

    /// Add `actor`, or refresh presence if already a member.
    ///
    /// Members are refreshed even while the room is inactive or full.
    pub fn admit(
        &mut self,
        actor: ActorId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, RoomError> {
        if let Some(player) = self.players.iter_mut().find(|p| p.actor_id == actor) {
            player.touch(now);
            return Ok(JoinOutcome::AlreadyMember);
        }
        if !self.is_active {
            return Err(RoomError::Inactive(self.room_id.clone()));
        }
        if self.is_full() {
            return Err(RoomError::Full(self.room_id.clone()));
        }
        self.players.push(Player::new(actor, display_name, now));
        Ok(JoinOutcome::Joined)
    }

    /// Remove a member. False when `actor` was not one.
    pub fn remove_player(&mut self, actor: ActorId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.actor_id != actor);
        self.players.len() != before
    }

    /// Refresh a member's presence. False when `actor` is not a member.
    pub fn touch_player(&mut self, actor: ActorId, now: DateTime<Utc>) -> bool {
        match self.players.iter_mut().find(|p| p.actor_id == actor) {
            Some(player) => {
                player.touch(now);
                true
            }
            None => false,
        }
    }

    /// Split members into `(active, stale)` by idle time. A member is stale
    /// once its idle time exceeds `timeout`. Join order is kept on both sides.
    pub fn partition_stale(&self, now: DateTime<Utc>, timeout: Duration) -> (Vec<Player>, Vec<Player>) {
        // A timeout beyond chrono's range never expires anyone.
        let Ok(limit) = chrono::Duration::from_std(timeout) else {
            return (self.players.clone(), Vec::new());
        };
        self.players
            .iter()
            .cloned()
            .partition(|p| p.idle_for(now) <= limit)
    }

    /// Apply a partial update. Nothing changes when the patch is invalid.
    pub fn apply_patch(&mut self, patch: RoomPatch) -> Result<(), RoomError> {
        let mut next = self.clone();

        if let Some(name) = patch.name {
            next.name = check_name(&name)?;
        }
        if let Some(max_players) = patch.max_players {
            next.max_players = check_capacity(max_players)?;
        }
        if let Some(is_active) = patch.is_active {
            next.is_active = is_active;
        }
        if let Some(players) = patch.players {
            let mut members: Vec<Player> = Vec::with_capacity(players.len());
            for mut player in players {
                if members.iter().any(|p| p.actor_id == player.actor_id) {
                    continue;
                }
                player.last_seen_at = player.last_seen_at.max(player.joined_at);
                members.push(player);
            }
            next.players = members;
        }
        if next.players.len() > next.max_players {
            return Err(RoomError::InvalidCapacity(next.max_players));
        }

        *self = next;
        Ok(())
    }
}

/// Partial room update. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomPatch {
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<usize>,
    /// Activate or deactivate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Replacement membership list. Duplicate actors are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<Player>>,
}

impl RoomPatch {
    /// Patch that only toggles the active flag.
    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Default::default()
        }
    }
}

/// Trimmed, non-blank room name.
pub fn check_name(name: &str) -> Result<String, RoomError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(RoomError::InvalidName)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Capacity within `MIN_PLAYERS..=MAX_PLAYERS`.
pub fn check_capacity(max_players: usize) -> Result<usize, RoomError> {
    if (MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
        Ok(max_players)
    } else {
        Err(RoomError::InvalidCapacity(max_players))
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Room operation errors.
#[derive(Debug, Clone, Error)]
pub enum RoomError {
    /// No such room.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Room is not accepting joins.
    #[error("room {0} is inactive")]
    Inactive(RoomId),

    /// Room has no free slot.
    #[error("room {0} is full")]
    Full(RoomId),

    /// The store refused the new room.
    #[error("room creation failed: {0}")]
    CreationFailed(String),

    /// Capacity outside the allowed range, or below the current member count.
    #[error("invalid room capacity: {0}")]
    InvalidCapacity(usize),

    /// Blank name.
    #[error("room name must not be blank")]
    InvalidName,

    /// Caller may not manage this room.
    #[error("actor {actor} may not manage room {room_id}")]
    Forbidden {
        /// Room.
        room_id: RoomId,
        /// Caller.
        actor: ActorId,
    },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoomError {
    /// Infrastructure failure rather than an expected business outcome.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, RoomError::Store(_) | RoomError::CreationFailed(_))
    }
}
