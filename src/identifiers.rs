//! Type-safe identifiers for SockJS sessions.
//!
//! Every transport URL embeds a server id and a session id:
//! `<base>/<server_id>/<session_id>/<transport>`. Newtype wrappers keep the
//! two from being swapped by accident.
//!
//! Generation is injected through [`IdGenerator`] so the transport layer
//! never reaches for ambient randomness.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rand::Rng;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Generated server ids are drawn from `0..MAX_SERVER_ID`.
const MAX_SERVER_ID: u32 = 999;

// ============================================================================
// ServerId
// ============================================================================

/// Server identifier path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId(String);

impl ServerId {
    /// Creates a server id from any string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ServerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Session identifier path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id from any string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// IdGenerator
// ============================================================================

/// Strategy for producing identifiers the caller did not configure.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Produces a server id.
    fn server_id(&self) -> ServerId;

    /// Produces a session id.
    fn session_id(&self) -> SessionId;
}

/// Default generator.
///
/// Server ids are zero-padded random integers below 999 (`"007"`), session
/// ids are random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn server_id(&self) -> ServerId {
        let value = rand::rng().random_range(0..MAX_SERVER_ID);
        ServerId(padded(value, MAX_SERVER_ID))
    }

    fn session_id(&self) -> SessionId {
        SessionId(Uuid::new_v4().to_string())
    }
}

/// Zero-pads `value` to the digit count of `max`.
fn padded(value: u32, max: u32) -> String {
    let width = max.to_string().len();
    format!("{value:0width$}")
}

// ============================================================================
// Tests
// ============================================================================
