//! SockJS client - framed messaging over websocket or xhr polling.
//!
//! This library connects to a SockJS server and exchanges discrete
//! messages with it, without the caller caring which transport is in use.
//!
//! # Architecture
//!
//! The client follows a fetch-dial-fallback model:
//!
//! - **Capabilities**: `GET <address>/info` tells whether websocket is available
//! - **WebSocket**: one persistent duplex socket, supervised by heartbeats
//! - **XHR**: long-polling receive requests plus a separate send endpoint
//!
//! Key design principles:
//!
//! - Both transports implement one [`Connection`] trait
//! - Each connection owns one cancellation token and one background task
//! - Messages are delivered in order; one terminal error always comes last
//! - No automatic reconnect; recovery is a fresh [`Client::connect`]
//!
//! # Quick Start
//!
//! ```no_run
//! use sockjs_client::{Client, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .address("http://127.0.0.1:8081/echo")
//!         .build()?;
//!
//!     client.connect().await?;
//!     println!("websocket: {}", client.is_websocket());
//!
//!     client.write_msg("hello").await?;
//!     loop {
//!         let msg = client.read_msg().await?;
//!         println!("{}", String::from_utf8_lossy(&msg));
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`] and [`ClientBuilder`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Server and session ids |
//! | [`protocol`] | Frame codec and server info |
//! | [`transport`] | WebSocket and XHR transports |

// ============================================================================
// Modules
// ============================================================================

/// Application-facing client.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for sessions.
///
/// Newtype wrappers prevent swapping server and session ids.
pub mod identifiers;

/// SockJS wire protocol.
///
/// Frame parsing, batch serialization and the `/info` document.
pub mod protocol;

/// Transport layer.
///
/// Dialers and connections for websocket and xhr polling.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{IdGenerator, RandomIdGenerator, ServerId, SessionId};

// Protocol types
pub use protocol::{FrameType, ServerInfo};

// Transport types
pub use transport::{Connection, TransportKind};
