//! XHR long-polling transport.
//!
//! Receives by repeatedly POSTing to `<session>/xhr`, each response carrying
//! one frame. Sends by POSTing a JSON batch to `<session>/xhr_send`.
//!
//! There is no heartbeat watchdog here; each poll request is bounded by the
//! poll timeout instead.
//!
//! # Status Handling
//!
//! | Endpoint | Status | Outcome |
//! |----------|--------|---------|
//! | `xhr` | 200 | Frame parsed and dispatched |
//! | `xhr` | 404 | [`Error::ClosedConnection`] (session gone) |
//! | `xhr` | other | [`Error::UnexpectedResponse`] |
//! | `xhr_send` | 204 | Written |
//! | `xhr_send` | 404 | [`Error::ClosedConnection`] |
//! | `xhr_send` | other | [`Error::UnexpectedResponse`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ServerId, SessionId};
use crate::protocol::frame::{self, Frame, FrameType};

use super::address::transport_address;
use super::inbound::{self, InboundReceiver, InboundSender, mask_cancelled};
use super::{Connection, TransportKind};

// ============================================================================
// Constants
// ============================================================================

/// Lower bound for the per-request poll timeout.
pub const MIN_POLL_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// XhrDialer
// ============================================================================

/// Opens [`XhrConnection`]s.
#[derive(Debug, Clone)]
pub struct XhrDialer {
    /// Shared HTTP client; pooled connections are reused across polls.
    http: reqwest::Client,
    /// Requested poll timeout, before flooring.
    poll_timeout: Duration,
}

impl Default for XhrDialer {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
            poll_timeout: MIN_POLL_TIMEOUT,
        }
    }
}

impl XhrDialer {
    /// Creates a dialer with a fresh HTTP client.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `http` for every request of produced connections.
    #[inline]
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Sets the poll timeout. Values below [`MIN_POLL_TIMEOUT`] are raised.
    #[inline]
    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Returns the effective poll timeout.
    #[inline]
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout.max(MIN_POLL_TIMEOUT)
    }

    /// Opens a polling session and waits for the open frame.
    ///
    /// `headers` are sent with every request of the session.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] / [`Error::MissingIdentifier`] for bad input
    /// - [`Error::Http`] if the opening request fails
    /// - [`Error::InvalidResponse`] if the body is not an open frame
    /// - [`Error::ClosedConnection`] if `cancel` fires first
    pub async fn dial(
        &self,
        address: &str,
        server_id: &ServerId,
        session_id: &SessionId,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<XhrConnection> {
        let session = transport_address(address, server_id, session_id)?;
        let recv_url = endpoint(&session, "xhr")?;
        let send_url = endpoint(&session, "xhr_send")?;

        debug!(url = %recv_url, "Dialing xhr transport");

        let shared = XhrShared {
            http: self.http.clone(),
            recv_url,
            send_url,
            headers: headers.clone(),
            poll_timeout: self.poll_timeout(),
            cancel: CancellationToken::new(),
        };

        let body = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(Error::closed_connection()),

            body = shared.open() => body?,
        };

        if !matches!(frame::parse(&body), Ok(Frame::Open)) {
            return Err(Error::invalid_response(
                Some(FrameType::Open),
                "opening sockjs session",
            ));
        }

        info!(url = %shared.recv_url, "XHR session opened");

        Ok(XhrConnection::start(shared))
    }
}

/// Appends an endpoint suffix to a session address.
fn endpoint(session: &str, suffix: &str) -> Result<Url> {
    let endpoint = format!("{session}/{suffix}");
    Url::parse(&endpoint).map_err(|e| Error::invalid_address(&endpoint, e.to_string()))
}

// ============================================================================
// Shared State
// ============================================================================

/// State shared by the connection handle and its poll loop.
struct XhrShared {
    http: reqwest::Client,
    recv_url: Url,
    send_url: Url,
    headers: HeaderMap,
    poll_timeout: Duration,
    /// Cancelled exactly when the connection is dead.
    cancel: CancellationToken,
}

impl XhrShared {
    /// Issues the opening receive request and returns its body.
    async fn open(&self) -> Result<Vec<u8>> {
        let response = self.receive_request().send().await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn receive_request(&self) -> reqwest::RequestBuilder {
        self.http
            .post(self.recv_url.clone())
            .headers(self.headers.clone())
            .timeout(self.poll_timeout)
    }

    /// Performs one poll, dispatching whatever frame comes back.
    async fn poll_once(&self, sender: &InboundSender) -> Result<()> {
        let response = self.receive_request().send().await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(Error::closed_connection_with("no close frame received"));
            }
            status => return Err(Error::unexpected_response(status.as_u16())),
        }

        let body = response.bytes().await?;

        match frame::parse(&body)? {
            Frame::Heartbeat => trace!("Heartbeat received"),
            Frame::Data(payload) => {
                let messages = frame::decode_messages(payload)?;
                trace!(count = messages.len(), "Data frame received");
                for message in messages {
                    sender.push(message.into_bytes()).await?;
                }
            }
            Frame::Open => trace!("Ignoring repeated open frame"),
        }

        Ok(())
    }

    /// Posts one serialized batch to the send endpoint.
    async fn send(&self, batch: String) -> Result<()> {
        let response = self
            .http
            .post(self.send_url.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(batch)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::closed_connection()),
            status => Err(Error::unexpected_response(status.as_u16())),
        }
    }
}

// ============================================================================
// XhrConnection
// ============================================================================

/// A live polling-backed [`Connection`].
///
/// Dropping the handle stops the poll loop.
pub struct XhrConnection {
    shared: Arc<XhrShared>,
    inbound: InboundReceiver,
}

impl fmt::Debug for XhrConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XhrConnection")
            .field("recv_url", &self.shared.recv_url.as_str())
            .field("closed", &self.shared.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl XhrConnection {
    fn start(shared: XhrShared) -> Self {
        let (sender, inbound) = inbound::inbound(shared.cancel.clone());
        let shared = Arc::new(shared);

        tokio::spawn(poll_loop(Arc::clone(&shared), sender));

        Self { shared, inbound }
    }

    /// Returns the receive endpoint.
    #[inline]
    #[must_use]
    pub fn recv_url(&self) -> &Url {
        &self.shared.recv_url
    }

    /// Returns the send endpoint.
    #[inline]
    #[must_use]
    pub fn send_url(&self) -> &Url {
        &self.shared.send_url
    }
}

#[async_trait]
impl Connection for XhrConnection {
    async fn read_msg(&self) -> Result<Vec<u8>> {
        self.inbound.recv().await
    }

    async fn write_msgs(&self, msgs: &[&[u8]]) -> Result<()> {
        let cancel = &self.shared.cancel;
        if cancel.is_cancelled() {
            return Err(Error::closed_connection());
        }

        let batch = frame::serialize(msgs)?;

        let result = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(Error::closed_connection()),

            result = self.shared.send(batch) => result,
        };

        match result {
            Ok(()) => {
                trace!(count = msgs.len(), "Batch posted");
                Ok(())
            }
            Err(e) => {
                let e = mask_cancelled(cancel, e);
                cancel.cancel();
                debug!(error = %e, "XHR send failed, connection closed");
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.inbound.shut();
        self.shared.cancel.cancel();
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Xhr
    }

    fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl Drop for XhrConnection {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

// ============================================================================
// Poll Loop
// ============================================================================

/// Polls until a request fails or the connection is cancelled.
async fn poll_loop(shared: Arc<XhrShared>, sender: InboundSender) {
    let err = loop {
        let polled = tokio::select! {
            biased;

            () = shared.cancel.cancelled() => Err(Error::closed_connection()),

            polled = shared.poll_once(&sender) => polled,
        };

        if let Err(e) = polled {
            break e;
        }
    };

    let err = mask_cancelled(&shared.cancel, err);
    debug!(error = %err, "XHR poll loop exited");

    shared.cancel.cancel();
    sender.finish(err);
}

// ============================================================================
// Tests
// ============================================================================
