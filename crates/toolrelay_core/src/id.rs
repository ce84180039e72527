//! Unique identifiers for TOOLRELAY entities.
//!
//! All IDs are random UUIDs. Invocation ids cross the boundary as plain
//! hyphenated strings, so their `Display` form carries no prefix.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Correlation identifier - links an outbound tool request to its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Create a new random InvocationId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse the wire form of an id
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a UUID
    pub fn parse(text: &str) -> CoreResult<Self> {
        Uuid::parse_str(text.trim())
            .map(Self)
            .map_err(|e| CoreError::InvalidId {
                reason: e.to_string(),
            })
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for InvocationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Session identifier - identifies one configured generation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random SessionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session_{}", self.0)
    }
}
