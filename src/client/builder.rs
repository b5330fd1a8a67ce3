//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use sockjs_client::Client;
//!
//! # fn example() -> sockjs_client::Result<()> {
//! let client = Client::builder()
//!     .address("wss://example.com/sockjs")
//!     .query("token", "secret")
//!     .poll_timeout(Duration::from_secs(60))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{Error, Result};
use crate::identifiers::{IdGenerator, RandomIdGenerator, ServerId, SessionId};
use crate::protocol::http_base;
use crate::transport::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_TIMEOUT, WebSocketDialer, XhrDialer,
};

use super::core::{Client, ClientConfig};

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    /// Base server address.
    address: Option<String>,
    /// Fixed server id; generated per connect when unset.
    server_id: Option<ServerId>,
    /// Fixed session id; generated per connect when unset.
    session_id: Option<SessionId>,
    /// Headers sent with every transport request.
    headers: HeaderMap,
    /// Query parameters for the websocket endpoint.
    query: Vec<(String, String)>,
    /// Whether to try websocket before xhr.
    websocket: bool,
    /// HTTP client for the info fetch and xhr transport.
    http: Option<reqwest::Client>,
    /// XHR poll timeout.
    poll_timeout: Option<Duration>,
    /// WebSocket heartbeat deadline.
    heartbeat_timeout: Duration,
    /// WebSocket upgrade and open frame bound.
    handshake_timeout: Duration,
    /// Identifier strategy.
    id_generator: Option<Arc<dyn IdGenerator>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            address: None,
            server_id: None,
            session_id: None,
            headers: HeaderMap::new(),
            query: Vec::new(),
            websocket: true,
            http: None,
            poll_timeout: None,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            id_generator: None,
        }
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base server address.
    ///
    /// `ws`/`wss`/`http`/`https` schemes are accepted; a missing scheme
    /// means `https`.
    ///
    /// # Arguments
    ///
    /// * `address` - Base address (e.g., "http://127.0.0.1:8081/echo")
    #[inline]
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Uses a fixed server id on every connect.
    #[inline]
    #[must_use]
    pub fn server_id(mut self, server_id: impl Into<ServerId>) -> Self {
        self.server_id = Some(server_id.into()).filter(|id: &ServerId| !id.is_empty());
        self
    }

    /// Uses a fixed session id on every connect.
    #[inline]
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into()).filter(|id: &SessionId| !id.is_empty());
        self
    }

    /// Adds one header sent with every transport request.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Adds headers sent with every transport request.
    #[inline]
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Appends a query parameter to the websocket endpoint.
    #[inline]
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets whether websocket is tried before xhr. Defaults to `true`.
    #[inline]
    #[must_use]
    pub fn websocket(mut self, enabled: bool) -> Self {
        self.websocket = enabled;
        self
    }

    /// Uses `http` for the info fetch and the xhr transport.
    #[inline]
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Sets the xhr poll timeout. Values below 30 seconds are raised.
    #[inline]
    #[must_use]
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Sets the websocket heartbeat deadline. Defaults to 30 seconds.
    #[inline]
    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets how long the websocket dial may wait for the upgrade and the
    /// open frame before falling back to xhr. Defaults to 45 seconds.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the strategy for ids that were not fixed.
    #[inline]
    #[must_use]
    pub fn id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::NoAddress`] if no address was set
    /// - [`Error::InvalidAddress`] if the address cannot be parsed
    pub fn build(self) -> Result<Client> {
        let address = self.validate_address()?;
        let http = self.http.unwrap_or_default();

        let mut ws_dialer = WebSocketDialer::new()
            .with_heartbeat_timeout(self.heartbeat_timeout)
            .with_handshake_timeout(self.handshake_timeout);
        for (key, value) in self.query {
            ws_dialer = ws_dialer.with_query(key, value);
        }

        let mut xhr_dialer = XhrDialer::new().with_http_client(http.clone());
        if let Some(timeout) = self.poll_timeout {
            xhr_dialer = xhr_dialer.with_poll_timeout(timeout);
        }

        Ok(Client::new(ClientConfig {
            address,
            server_id: self.server_id,
            session_id: self.session_id,
            headers: self.headers,
            websocket: self.websocket,
            http,
            ws_dialer,
            xhr_dialer,
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(RandomIdGenerator)),
        }))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the address configuration.
    fn validate_address(&self) -> Result<String> {
        let address = self
            .address
            .clone()
            .filter(|address| !address.is_empty())
            .ok_or(Error::NoAddress)?;

        http_base(&address)?;

        Ok(address)
    }
}

// ============================================================================
// Tests
// ============================================================================
