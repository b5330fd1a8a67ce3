//! SockJS client coordinator.
//!
//! The [`Client`] fetches server capabilities, dials the preferred
//! transport, falls back to xhr, and holds the resulting [`Connection`].
//!
//! # States
//!
//! ```text
//! Disconnected ──connect──► Connecting ──ok──► Connected
//!      ▲                        │                  │
//!      └────────── error ───────┘        close / terminal error
//!      ▲                                           │
//!      └───────────────────────────────────────────┘
//! ```
//!
//! There is no automatic reconnect. After a terminal error the dead
//! connection stays installed until [`Client::close`] or the next
//! successful [`Client::connect`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{IdGenerator, ServerId, SessionId};
use crate::protocol::{ServerInfo, fetch_server_info};
use crate::transport::{Connection, TransportKind, WebSocketDialer, XhrDialer};

use super::builder::ClientBuilder;

// ============================================================================
// Types
// ============================================================================

/// Validated configuration produced by [`ClientBuilder`].
pub(crate) struct ClientConfig {
    /// Base server address as given by the caller.
    pub address: String,

    /// Fixed server id, if configured.
    pub server_id: Option<ServerId>,

    /// Fixed session id, if configured.
    pub session_id: Option<SessionId>,

    /// Headers sent with every transport request.
    pub headers: HeaderMap,

    /// Whether websocket is tried first.
    pub websocket: bool,

    /// HTTP client for the info fetch.
    pub http: reqwest::Client,

    /// Websocket transport dialer.
    pub ws_dialer: WebSocketDialer,

    /// XHR transport dialer.
    pub xhr_dialer: XhrDialer,

    /// Strategy for ids that were not fixed.
    pub id_generator: Arc<dyn IdGenerator>,
}

/// Fields replaced together on connect and cleared together on close.
#[derive(Default)]
struct ClientState {
    connection: Option<Arc<dyn Connection>>,
    server_info: Option<ServerInfo>,
}

/// Internal shared state for the client.
struct ClientInner {
    config: ClientConfig,
    state: Mutex<ClientState>,
}

// ============================================================================
// Client
// ============================================================================

/// SockJS client with websocket to xhr fallback.
///
/// Cloning is cheap; clones share the same connection.
///
/// # Concurrency
///
/// The internal lock only guards reading and replacing the installed
/// connection. Dials run unlocked, so two concurrent [`connect`](Self::connect)
/// calls both dial and the last one to finish wins. The displaced connection
/// is dropped, which cancels its background task once no other handle to it
/// remains.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.inner.config.address)
            .field("websocket", &self.inner.config.websocket)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client for `address` with default settings.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn with_address(address: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().address(address).build()
    }

    /// Creates a client from validated configuration.
    pub(crate) fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: Mutex::new(ClientState::default()),
            }),
        }
    }

    /// Returns the configured base address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.config.address
    }

    /// Connects, replacing any installed connection on success.
    ///
    /// # Errors
    ///
    /// - [`Error::NoAddress`] if the address is empty
    /// - [`Error::CannotConnect`] if the info fetch or every dial failed
    pub async fn connect(&self) -> Result<()> {
        self.connect_with_cancel(&CancellationToken::new()).await
    }

    /// Connects, aborting the attempt when `cancel` fires.
    ///
    /// `cancel` only bounds connection establishment; it has no effect on
    /// the connection once installed.
    ///
    /// # Errors
    ///
    /// As [`connect`](Self::connect), plus [`Error::ClosedConnection`] when
    /// cancelled during the info fetch.
    pub async fn connect_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        let config = &self.inner.config;
        if config.address.is_empty() {
            return Err(Error::NoAddress);
        }

        let fetched = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(Error::closed_connection()),

            fetched = fetch_server_info(&config.http, &config.address) => fetched,
        };
        let (server_info, base) = fetched.map_err(|e| match e {
            Error::NoAddress => Error::NoAddress,
            e => Error::cannot_connect_info(e),
        })?;

        let server_id = config
            .server_id
            .clone()
            .unwrap_or_else(|| config.id_generator.server_id());
        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(|| config.id_generator.session_id());

        debug!(%base, %server_id, %session_id, "Connecting");

        let mut websocket_err = None;
        if config.websocket && server_info.websocket {
            match config
                .ws_dialer
                .dial(base.as_str(), &server_id, &session_id, &config.headers, cancel)
                .await
            {
                Ok(connection) => {
                    self.install(Arc::new(connection), server_info);
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "WebSocket failed, using xhr fallback");
                    websocket_err = Some(e);
                }
            }
        }

        match config
            .xhr_dialer
            .dial(base.as_str(), &server_id, &session_id, &config.headers, cancel)
            .await
        {
            Ok(connection) => {
                self.install(Arc::new(connection), server_info);
                Ok(())
            }
            Err(e) => Err(Error::cannot_connect(websocket_err, e)),
        }
    }

    /// Returns the installed connection, if any.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.inner.state.lock().connection.clone()
    }

    /// Returns `true` if the installed connection is a websocket.
    #[inline]
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        self.connection()
            .is_some_and(|connection| connection.kind() == TransportKind::WebSocket)
    }

    /// Returns `true` if a live connection is installed.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection()
            .is_some_and(|connection| !connection.is_closed())
    }

    /// Returns the capabilities fetched by the last successful connect.
    ///
    /// Empty when not connected.
    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        self.inner
            .state
            .lock()
            .server_info
            .clone()
            .unwrap_or_default()
    }

    /// Waits for the next message.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is installed
    /// - Otherwise whatever [`Connection::read_msg`] reports
    pub async fn read_msg(&self) -> Result<Vec<u8>> {
        self.require_connection()?.read_msg().await
    }

    /// Writes one message.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is installed
    /// - Otherwise whatever [`Connection::write_msgs`] reports
    pub async fn write_msg(&self, msg: impl AsRef<[u8]>) -> Result<()> {
        self.write_msgs(&[msg.as_ref()]).await
    }

    /// Writes a batch of messages as one frame.
    ///
    /// # Errors
    ///
    /// As [`write_msg`](Self::write_msg).
    pub async fn write_msgs(&self, msgs: &[&[u8]]) -> Result<()> {
        self.require_connection()?.write_msgs(msgs).await
    }

    /// Reads the next message and decodes it as JSON.
    ///
    /// # Errors
    ///
    /// As [`read_msg`](Self::read_msg), plus [`Error::Json`] if decoding fails.
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T> {
        let msg = self.read_msg().await?;
        Ok(serde_json::from_slice(&msg)?)
    }

    /// Encodes `value` as JSON and writes it as one message.
    ///
    /// # Errors
    ///
    /// As [`write_msg`](Self::write_msg), plus [`Error::Json`] if encoding fails.
    pub async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let msg = serde_json::to_vec(value)?;
        self.write_msg(msg).await
    }

    /// Closes and uninstalls the connection.
    ///
    /// A no-op when not connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClosingConnection`] if releasing the transport
    /// failed. The client is disconnected either way.
    pub async fn close(&self) -> Result<()> {
        let connection = {
            let mut state = self.inner.state.lock();
            state.server_info = None;
            state.connection.take()
        };

        match connection {
            Some(connection) => {
                debug!(kind = %connection.kind(), "Closing connection");
                connection.close().await
            }
            None => Ok(()),
        }
    }
}

// ============================================================================
// Client - Internal
// ============================================================================

impl Client {
    /// Installs a fresh connection and its server capabilities.
    fn install(&self, connection: Arc<dyn Connection>, server_info: ServerInfo) {
        let kind = connection.kind();

        let previous = {
            let mut state = self.inner.state.lock();
            state.server_info = Some(server_info);
            state.connection.replace(connection)
        };

        if previous.is_some() {
            debug!("Replaced previous connection");
        }
        info!(%kind, "Connected");
    }

    fn require_connection(&self) -> Result<Arc<dyn Connection>> {
        self.connection().ok_or(Error::NotConnected)
    }
}

// ============================================================================
// Tests
// ============================================================================
