//! Transport layer.
//!
//! Two interchangeable transports sit behind the [`Connection`] trait:
//!
//! ```text
//! ┌─────────────────┐        WebSocket         ┌─────────────────┐
//! │                 │◄────────────────────────►│                 │
//! │  Client (Rust)  │   <session>/websocket    │  SockJS Server  │
//! │  → Connection   │                          │                 │
//! │                 │   POST <session>/xhr     │                 │
//! │                 │◄─────────────────────────│                 │
//! │                 │   POST <session>/xhr_send│                 │
//! │                 │─────────────────────────►│                 │
//! └─────────────────┘                          └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. Dialer builds the session address and opens the transport
//! 2. First frame must be `o`, otherwise the dial fails
//! 3. A background task feeds the inbound queue
//! 4. The task ends with exactly one terminal error, always read last
//! 5. `close` (or drop) cancels the connection
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `address` | Session address builder |
//! | `websocket` | Persistent websocket transport |
//! | `xhr` | XHR long-polling transport |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Session address builder.
pub mod address;

/// Inbound message queue with terminal error slot.
pub(crate) mod inbound;

/// Persistent websocket transport.
pub mod websocket;

/// XHR long-polling transport.
pub mod xhr;

// ============================================================================
// Re-exports
// ============================================================================

pub use address::transport_address;
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_TIMEOUT, WebSocketConnection, WebSocketDialer,
};
pub use xhr::{MIN_POLL_TIMEOUT, XhrConnection, XhrDialer};

// ============================================================================
// TransportKind
// ============================================================================

/// Which transport backs a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Persistent websocket.
    WebSocket,
    /// XHR long polling.
    Xhr,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => f.write_str("websocket"),
            Self::Xhr => f.write_str("xhr"),
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A live session, independent of the transport behind it.
///
/// All methods take `&self`; a connection can be shared between a reading
/// task and a writing task.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Waits for the next message.
    ///
    /// Messages arrive in the order the server sent them. Once the session
    /// ends, the terminal error is returned exactly once; every later call
    /// returns [`Error::ClosedConnection`](crate::Error::ClosedConnection).
    async fn read_msg(&self) -> Result<Vec<u8>>;

    /// Writes a batch of messages as one frame.
    ///
    /// Fails with [`Error::ClosedConnection`](crate::Error::ClosedConnection)
    /// once the connection is closed. A failed write closes the connection.
    async fn write_msgs(&self, msgs: &[&[u8]]) -> Result<()>;

    /// Closes the connection.
    ///
    /// Idempotent. The connection is closed afterwards even when an error
    /// is returned.
    async fn close(&self) -> Result<()>;

    /// Returns the transport behind this connection.
    fn kind(&self) -> TransportKind;

    /// Returns `true` once the connection is cancelled, however that happened.
    fn is_closed(&self) -> bool;
}

// ============================================================================
// Tests
// ============================================================================
