//! Identifiers
//!
//! Actor and room identifiers shared by every layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// ACTOR ID
// =============================================================================

/// Opaque user identifier, as issued by the backend's user directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl ActorId {
    /// Create from a raw numeric id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActorId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

// =============================================================================
// ROOM ID
// =============================================================================

/// Prefix carried by every room identifier.
pub const ROOM_ID_PREFIX: &str = "room_";

/// Length of the alphanumeric token generated for new rooms.
pub const ROOM_TOKEN_LEN: usize = 12;

/// Globally unique room identifier (`room_` + alphanumeric token).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        let token = hex::encode(uuid::Uuid::new_v4().as_bytes());
        Self(format!("{}{}", ROOM_ID_PREFIX, &token[..ROOM_TOKEN_LEN]))
    }

    /// Parse an identifier, rejecting anything that a generated id could not be.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let token = s.strip_prefix(ROOM_ID_PREFIX)?;
        if token.len() >= ROOM_TOKEN_LEN && token.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
