//! Actor Directory
//!
//! The backend's user directory is an external collaborator. The validator
//! uses it to confirm an actor exists; rooms use it for display names and
//! ownership checks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ids::ActorId;

/// A known user of the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identifier.
    pub id: ActorId,
    /// Name shown to other room members.
    pub display_name: String,
    /// Administrators may manage rooms they do not own.
    pub is_admin: bool,
}

impl Actor {
    /// Regular (non-admin) actor.
    pub fn new(id: ActorId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_admin: false,
        }
    }

    /// Administrator.
    pub fn admin(id: ActorId, display_name: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(id, display_name)
        }
    }
}

/// Directory lookup failed (backend unreachable).
#[derive(Debug, Clone, Error)]
#[error("actor directory unavailable: {0}")]
pub struct DirectoryError(pub String);

/// User directory port.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// Look up an actor by id.
    async fn resolve_actor(&self, id: ActorId) -> Result<Option<Actor>, DirectoryError>;
}

/// In-memory directory used by the bundled gateway and tests.
#[derive(Debug, Default)]
pub struct StaticActorDirectory {
    actors: RwLock<BTreeMap<ActorId, Actor>>,
    /// Accept ids that were never registered (gateway mode: the JWT is the source of truth).
    accept_unknown: bool,
}

impl StaticActorDirectory {
    /// Empty directory that only knows registered actors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory that synthesizes an actor for any id.
    pub fn permissive() -> Self {
        Self {
            actors: RwLock::new(BTreeMap::new()),
            accept_unknown: true,
        }
    }

    /// Register or replace an actor.
    pub fn insert(&self, actor: Actor) {
        self.actors.write().insert(actor.id, actor);
    }

    /// Builder-style registration.
    pub fn with(self, actor: Actor) -> Self {
        self.insert(actor);
        self
    }
}

#[async_trait]
impl ActorDirectory for StaticActorDirectory {
    async fn resolve_actor(&self, id: ActorId) -> Result<Option<Actor>, DirectoryError> {
        if let Some(actor) = self.actors.read().get(&id) {
            return Ok(Some(actor.clone()));
        }
        if self.accept_unknown && id.get() > 0 {
            return Ok(Some(Actor::new(id, format!("Player {}", id))));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_lookup() {
        let directory = StaticActorDirectory::new()
            .with(Actor::new(ActorId(7), "Ada"))
            .with(Actor::admin(ActorId(1), "Root"));

        let ada = directory.resolve_actor(ActorId(7)).await.unwrap().unwrap();
        assert_eq!(ada.display_name, "Ada");
        assert!(!ada.is_admin);
        assert!(directory.resolve_actor(ActorId(1)).await.unwrap().unwrap().is_admin);
        assert!(directory.resolve_actor(ActorId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permissive_directory() {
        let directory = StaticActorDirectory::permissive();
        let actor = directory.resolve_actor(ActorId(99)).await.unwrap().unwrap();
        assert_eq!(actor.display_name, "Player 99");
        assert!(directory.resolve_actor(ActorId(0)).await.unwrap().is_none());
    }
}
