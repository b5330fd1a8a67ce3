//! Error types for the SockJS client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use sockjs_client::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let msg = client.read_msg().await?;
//!     client.write_msg(msg).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::NoAddress`], [`Error::InvalidAddress`], [`Error::MissingIdentifier`] |
//! | Client | [`Error::NotConnected`], [`Error::CannotConnect`] |
//! | Connection | [`Error::ClosedConnection`], [`Error::ClosedByRemote`], [`Error::ClosingConnection`], [`Error::NoHeartbeat`], [`Error::HandshakeTimeout`] |
//! | Protocol | [`Error::InvalidResponse`], [`Error::UnexpectedResponse`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::FrameType;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Transport errors are classified once, where they are detected. The
/// [`Client`](crate::Client) surfaces them unchanged, except that failed
/// connection attempts are folded into [`Error::CannotConnect`].
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// No server address was configured.
    #[error("No address provided")]
    NoAddress,

    /// The configured server address could not be parsed.
    #[error("Invalid address '{address}': {message}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Why it was rejected.
        message: String,
    },

    /// A server or session identifier was empty.
    #[error("No {name} provided")]
    MissingIdentifier {
        /// Which identifier was missing.
        name: &'static str,
    },

    // ========================================================================
    // Client Errors
    // ========================================================================
    /// The client holds no connection.
    #[error("Client not connected")]
    NotConnected,

    /// Establishing a connection failed.
    ///
    /// `source` is the last failure (the info fetch or the xhr dial). When the
    /// websocket transport was attempted first, its failure is kept in
    /// `websocket`.
    #[error("Cannot connect: {context}: {source}")]
    CannotConnect {
        /// Which stage failed.
        context: String,
        /// The final failure.
        #[source]
        source: Box<Error>,
        /// The earlier websocket failure, if websocket was attempted.
        websocket: Option<Box<Error>>,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Use of a closed connection.
    ///
    /// Also reported when the remote went away without a close frame and
    /// when an I/O failure was caused by our own cancellation.
    #[error("Use of a closed connection{}", reason_suffix(.reason))]
    ClosedConnection {
        /// Extra detail about how the connection ended.
        reason: Option<String>,
    },

    /// The remote sent a close frame.
    #[error("Connection closed by remote ({})", close_detail(.code, .reason))]
    ClosedByRemote {
        /// Close code sent by the remote, if it could be read.
        code: Option<u16>,
        /// Close reason sent by the remote, if it could be read.
        reason: Option<String>,
    },

    /// Releasing the underlying connection failed.
    ///
    /// The connection is still considered closed.
    #[error("Error closing connection: {message}")]
    ClosingConnection {
        /// Description of the failure.
        message: String,
    },

    /// No heartbeat frame arrived within the deadline.
    #[error("No heartbeat received within {timeout_ms}ms")]
    NoHeartbeat {
        /// The heartbeat deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The websocket upgrade or open frame did not arrive in time.
    ///
    /// Returned by the websocket dial; the client then falls back to xhr.
    #[error("WebSocket handshake timeout after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The server sent a frame that violates the protocol.
    #[error("Invalid server response: {message}")]
    InvalidResponse {
        /// Frame type involved, when known.
        frame_type: Option<FrameType>,
        /// Description of the violation.
        message: String,
    },

    /// The server answered a polling request with an unexpected status.
    #[error("Unexpected server response (HTTP {status})")]
    UnexpectedResponse {
        /// HTTP status code returned.
        status: u16,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Display Helpers
// ============================================================================

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" ({reason})"),
        None => String::new(),
    }
}

fn close_detail(code: &Option<u16>, reason: &Option<String>) -> String {
    match (code, reason) {
        (None, None) => "extra close data was missing/invalid".to_string(),
        (Some(code), Some(reason)) => format!("{code}, {reason}"),
        (Some(code), None) => code.to_string(),
        (None, Some(reason)) => reason.clone(),
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid address error.
    #[inline]
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a missing identifier error.
    #[inline]
    pub fn missing_identifier(name: &'static str) -> Self {
        Self::MissingIdentifier { name }
    }

    /// Creates a closed connection error without detail.
    #[inline]
    pub fn closed_connection() -> Self {
        Self::ClosedConnection { reason: None }
    }

    /// Creates a closed connection error with detail.
    #[inline]
    pub fn closed_connection_with(reason: impl Into<String>) -> Self {
        Self::ClosedConnection {
            reason: Some(reason.into()),
        }
    }

    /// Creates a closed by remote error.
    #[inline]
    pub fn closed_by_remote(code: Option<u16>, reason: Option<String>) -> Self {
        Self::ClosedByRemote { code, reason }
    }

    /// Creates a closing connection error.
    #[inline]
    pub fn closing_connection(message: impl Into<String>) -> Self {
        Self::ClosingConnection {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[inline]
    pub fn invalid_response(frame_type: Option<FrameType>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            frame_type,
            message: message.into(),
        }
    }

    /// Creates an unexpected response error.
    #[inline]
    pub fn unexpected_response(status: u16) -> Self {
        Self::UnexpectedResponse { status }
    }

    /// Creates a no heartbeat error.
    #[inline]
    pub fn no_heartbeat(timeout_ms: u64) -> Self {
        Self::NoHeartbeat { timeout_ms }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Wraps a failed server info fetch.
    pub fn cannot_connect_info(source: Error) -> Self {
        Self::CannotConnect {
            context: "connecting to info endpoint".to_string(),
            source: Box::new(source),
            websocket: None,
        }
    }

    /// Wraps a failed xhr dial, keeping the websocket failure if there was one.
    pub fn cannot_connect(websocket: Option<Error>, xhr: Error) -> Self {
        match websocket {
            Some(ws) => Self::CannotConnect {
                context: format!("connecting to ws, xhr endpoints (websocket: {ws})"),
                source: Box::new(xhr),
                websocket: Some(Box::new(ws)),
            },
            None => Self::CannotConnect {
                context: "connecting to xhr endpoint".to_string(),
                source: Box::new(xhr),
                websocket: None,
            },
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a client or connection not connected error.
    #[inline]
    #[must_use]
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ClosedConnection { .. })
    }

    /// Returns `true` if the connection is over, however it ended.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::ClosedConnection { .. } | Self::ClosedByRemote { .. } | Self::NoHeartbeat { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::CannotConnect { .. }
                | Self::ClosedConnection { .. }
                | Self::ClosedByRemote { .. }
                | Self::ClosingConnection { .. }
                | Self::NoHeartbeat { .. }
                | Self::HandshakeTimeout { .. }
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }

    /// Returns `true` if this is a protocol violation by the server.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidResponse { .. } | Self::UnexpectedResponse { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
