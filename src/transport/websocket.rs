//! WebSocket transport.
//!
//! One persistent duplex connection to `<session>/websocket`. Outbound
//! batches are written as text messages; inbound frames are read by a
//! background supervise task.
//!
//! # Supervision
//!
//! Each connection spawns two tokio tasks:
//!
//! - The read loop: parses frames, feeds data into the inbound queue, and
//!   reports the terminal error when the socket ends
//! - The heartbeat watcher: closes the connection with
//!   [`Error::NoHeartbeat`] if no `h` frame arrives within the deadline

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::header::HeaderMap;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ServerId, SessionId};
use crate::protocol::frame::{self, Frame, FrameType};

use super::address::transport_address;
use super::inbound::{self, InboundReceiver, InboundSender, Terminal, mask_cancelled};
use super::{Connection, TransportKind};

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed between heartbeat frames.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for the upgrade request plus the open frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

/// Upper bound for the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// ============================================================================
// WebSocketDialer
// ============================================================================

/// Opens [`WebSocketConnection`]s.
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    /// Heartbeat deadline for produced connections.
    heartbeat_timeout: Duration,
    /// Bound for the upgrade and the open frame.
    handshake_timeout: Duration,
    /// Query parameters appended to the endpoint URL.
    query: Vec<(String, String)>,
}

impl Default for WebSocketDialer {
    fn default() -> Self {
        Self {
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            query: Vec::new(),
        }
    }
}

impl WebSocketDialer {
    /// Creates a dialer with the default heartbeat deadline.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the heartbeat deadline.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, heartbeat_timeout: Duration) -> Self {
        self.heartbeat_timeout = heartbeat_timeout;
        self
    }

    /// Sets the bound for the upgrade request and the open frame.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Appends a query parameter to the endpoint URL.
    #[inline]
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Returns the heartbeat deadline.
    #[inline]
    #[must_use]
    pub const fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Returns the handshake bound.
    #[inline]
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Dials the websocket endpoint and waits for the open frame.
    ///
    /// `address` may use an `http`/`https` scheme; it is mapped to
    /// `ws`/`wss`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] / [`Error::MissingIdentifier`] for bad input
    /// - [`Error::WebSocket`] if the upgrade or first read fails
    /// - [`Error::InvalidResponse`] if the first frame is not an open frame
    /// - [`Error::HandshakeTimeout`] if the open frame is not received within
    ///   the handshake bound
    /// - [`Error::ClosedConnection`] if `cancel` fires first
    pub async fn dial(
        &self,
        address: &str,
        server_id: &ServerId,
        session_id: &SessionId,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<WebSocketConnection> {
        let url = self.endpoint(address, server_id, session_id)?;
        let request = upgrade_request(&url, headers)?;

        debug!(%url, "Dialing websocket transport");

        let handshake = async {
            let (ws, _response) = connect_async(request).await?;
            let (sink, mut source) = ws.split();
            expect_open(source.next().await)?;
            Ok::<_, Error>((sink, source))
        };

        let (sink, source) = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(Error::closed_connection()),

            opened = timeout(self.handshake_timeout, handshake) => opened
                .map_err(|_| Error::handshake_timeout(duration_ms(self.handshake_timeout)))??,
        };

        info!(%url, "WebSocket session opened");

        Ok(WebSocketConnection::start(
            sink,
            source,
            self.heartbeat_timeout,
        ))
    }

    /// Builds `<session>/websocket` with a websocket scheme and query.
    fn endpoint(&self, address: &str, server_id: &ServerId, session_id: &SessionId) -> Result<Url> {
        let session = transport_address(address, server_id, session_id)?;
        let endpoint = format!("{session}/websocket");
        let mut url =
            Url::parse(&endpoint).map_err(|e| Error::invalid_address(&endpoint, e.to_string()))?;

        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            _ => None,
        };
        if let Some(scheme) = scheme
            && url.set_scheme(scheme).is_err()
        {
            return Err(Error::invalid_address(endpoint, "cannot rewrite scheme"));
        }

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }

        Ok(url)
    }
}

/// Builds the upgrade request carrying the caller's headers.
fn upgrade_request(url: &Url, headers: &HeaderMap) -> Result<Request> {
    let mut request = url.as_str().into_client_request()?;

    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|e| WsError::HttpFormat(e.into()))?;
        let value =
            HeaderValue::from_bytes(value.as_bytes()).map_err(|e| WsError::HttpFormat(e.into()))?;
        request.headers_mut().append(name, value);
    }

    Ok(request)
}

/// Validates the first message of a new session.
fn expect_open(first: Option<std::result::Result<Message, WsError>>) -> Result<()> {
    let message = match first {
        Some(Ok(message)) => message,
        Some(Err(e)) => return Err(e.into()),
        None => return Err(Error::closed_connection_with("no open frame received")),
    };

    match frame_bytes(&message).map(frame::parse) {
        Some(Ok(Frame::Open)) => Ok(()),
        _ => Err(Error::invalid_response(
            Some(FrameType::Open),
            "opening sockjs session",
        )),
    }
}

/// Returns the payload of a message that can carry a frame.
fn frame_bytes(message: &Message) -> Option<&[u8]> {
    match message {
        Message::Text(text) => Some(text.as_str().as_bytes()),
        Message::Binary(data) => Some(data.as_ref()),
        _ => None,
    }
}

/// Converts a duration to whole milliseconds, saturating.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Returns `true` if a websocket error means the socket is gone.
pub(crate) fn is_websocket_closed(err: &WsError) -> bool {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(io) => matches!(
            io.kind(),
            ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// State shared by the connection handle and its background tasks.
struct WsShared {
    /// Write half; `None` once released.
    sink: AsyncMutex<Option<WsSink>>,
    /// Cancelled exactly when the connection is dead.
    cancel: CancellationToken,
}

impl WsShared {
    /// Closes the connection unless already cancelled.
    ///
    /// The token is cancelled on every path out of this function.
    async fn close(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let _cancel_on_exit = self.cancel.clone().drop_guard();

        match timeout(CLOSE_TIMEOUT, self.release()).await {
            Ok(result) => result,
            Err(_) => Err(Error::closing_connection(format!(
                "close handshake timed out after {}ms",
                duration_ms(CLOSE_TIMEOUT)
            ))),
        }
    }

    /// Sends a close frame and releases the write half, at most once.
    async fn release(&self) -> Result<()> {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = sink.send(Message::Close(None)).await {
            if is_websocket_closed(&e) {
                return Ok(());
            }
            debug!(error = %e, "Failed to send close frame");
        }

        match sink.close().await {
            Ok(()) => Ok(()),
            Err(e) if is_websocket_closed(&e) => Ok(()),
            Err(e) => Err(Error::closing_connection(e.to_string())),
        }
    }
}

// ============================================================================
// WebSocketConnection
// ============================================================================

/// A live websocket-backed [`Connection`].
///
/// Dropping the last handle cancels the background tasks.
pub struct WebSocketConnection {
    /// Shared with the supervise tasks.
    shared: Arc<WsShared>,
    /// Messages produced by the read loop.
    inbound: InboundReceiver,
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("closed", &self.shared.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl WebSocketConnection {
    /// Wraps an opened session and spawns its supervise tasks.
    fn start(sink: WsSink, source: WsSource, heartbeat_timeout: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (sender, inbound) = inbound::inbound(cancel.clone());
        let shared = Arc::new(WsShared {
            sink: AsyncMutex::new(Some(sink)),
            cancel,
        });
        let beat = Arc::new(Notify::new());

        tokio::spawn(watch_heartbeat(
            Arc::clone(&shared),
            sender.terminal(),
            Arc::clone(&beat),
            heartbeat_timeout,
        ));
        tokio::spawn(supervise(Arc::clone(&shared), source, sender, beat));

        Self { shared, inbound }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn read_msg(&self) -> Result<Vec<u8>> {
        self.inbound.recv().await
    }

    async fn write_msgs(&self, msgs: &[&[u8]]) -> Result<()> {
        if self.shared.cancel.is_cancelled() {
            return Err(Error::closed_connection());
        }

        let batch = frame::serialize(msgs)?;

        let mut guard = self.shared.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(Error::closed_connection());
        };

        if let Err(e) = sink.send(Message::Text(batch.into())).await {
            if self.shared.cancel.is_cancelled() {
                return Err(Error::closed_connection());
            }
            self.shared.cancel.cancel();

            if is_websocket_closed(&e) {
                return Err(Error::closed_connection_with(e.to_string()));
            }
            return Err(e.into());
        }

        trace!(count = msgs.len(), "Batch written to websocket");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inbound.shut();
        self.shared.close().await
    }

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

// ============================================================================
// Supervise Tasks
// ============================================================================

/// Runs the read loop, then releases the socket and reports the exit.
async fn supervise(
    shared: Arc<WsShared>,
    source: WsSource,
    sender: InboundSender,
    beat: Arc<Notify>,
) {
    let err = read_loop(&shared.cancel, source, &sender, &beat).await;
    let err = mask_cancelled(&shared.cancel, err);
    debug!(error = %err, "WebSocket read loop exited");

    match timeout(CLOSE_TIMEOUT, shared.release()).await {
        Ok(Err(e)) => debug!(error = %e, "Error releasing websocket"),
        Err(_) => debug!("Timed out releasing websocket"),
        Ok(Ok(())) => {}
    }
    shared.cancel.cancel();

    sender.finish(err);
}

/// Reads frames until the socket fails or the connection is cancelled.
async fn read_loop(
    cancel: &CancellationToken,
    mut source: WsSource,
    sender: &InboundSender,
    beat: &Notify,
) -> Error {
    loop {
        let next = tokio::select! {
            biased;

            () = cancel.cancelled() => return Error::closed_connection(),

            next = source.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) if is_websocket_closed(&e) => {
                return Error::closed_connection_with(format!("no close frame received: {e}"));
            }
            Some(Err(e)) => return Error::WebSocket(e),
            None => return Error::closed_connection_with("no close frame received"),
        };

        if let Message::Close(close) = &message {
            let detail = match close {
                Some(close) => format!("no close frame received: websocket close {}", close.code),
                None => "no close frame received: websocket close".to_string(),
            };
            return Error::closed_connection_with(detail);
        }

        let Some(bytes) = frame_bytes(&message) else {
            continue;
        };

        if let Err(e) = handle_frame(bytes, sender, beat).await {
            return e;
        }
    }
}

/// Dispatches one inbound frame.
async fn handle_frame(bytes: &[u8], sender: &InboundSender, beat: &Notify) -> Result<()> {
    match frame::parse(bytes)? {
        Frame::Heartbeat => {
            trace!("Heartbeat received");
            beat.notify_one();
        }
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

/// Closes the connection if heartbeats stop arriving.
async fn watch_heartbeat(
    shared: Arc<WsShared>,
    terminal: Terminal,
    beat: Arc<Notify>,
    deadline: Duration,
) {
    loop {
        tokio::select! {
            biased;

            () = shared.cancel.cancelled() => return,

            () = beat.notified() => trace!("Heartbeat deadline reset"),

            () = tokio::time::sleep(deadline) => {
                let timeout_ms = duration_ms(deadline);
                warn!(timeout_ms, "No heartbeat received, closing websocket");

                terminal.fail(Error::no_heartbeat(timeout_ms));
                if let Err(e) = shared.close().await {
                    debug!(error = %e, "Error closing websocket after missed heartbeat");
                }
                return;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
