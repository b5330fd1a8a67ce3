//! Scripted in-process SockJS server for integration tests.
//!
//! Serves `/sockjs/info`, the websocket endpoint and both xhr endpoints on
//! `127.0.0.1:0`. Each test describes the server's behaviour with a
//! [`Script`] and inspects what the client did through [`TestServer`].

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::{Interval, interval, sleep};

// ============================================================================
// Script
// ============================================================================

/// One response to an xhr poll.
#[derive(Debug, Clone)]
pub enum Poll {
    /// 200 with this frame as body.
    Frame(String),
    /// Bare status code.
    Status(u16),
}

impl Poll {
    pub fn frame(frame: impl Into<String>) -> Self {
        Self::Frame(frame.into())
    }
}

/// Server behaviour for one test.
#[derive(Debug, Clone)]
pub struct Script {
    /// `websocket` field of the info document.
    pub websocket: bool,
    /// Never answer the websocket upgrade request.
    pub ws_silent: bool,
    /// First websocket frame.
    pub ws_open: String,
    /// Websocket frames sent right after the open frame.
    pub ws_frames: Vec<String>,
    /// Websocket heartbeat interval; `None` sends no heartbeats.
    pub heartbeat: Option<Duration>,
    /// Body of the first xhr poll of a session.
    pub xhr_open: String,
    /// Responses to later xhr polls. Polls hang once these run out.
    pub xhr_polls: Vec<Poll>,
    /// Status returned by `xhr_send`.
    pub send_status: u16,
    /// Echo every received batch back as a data frame.
    pub echo: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            websocket: true,
            ws_silent: false,
            ws_open: "o".to_string(),
            ws_frames: Vec::new(),
            heartbeat: None,
            xhr_open: "o\n".to_string(),
            xhr_polls: Vec::new(),
            send_status: 204,
            echo: false,
        }
    }
}

// ============================================================================
// Server State
// ============================================================================

/// Poll responses waiting to be served.
struct Mailbox {
    queue: Mutex<VecDeque<Poll>>,
    ready: Notify,
}

impl Mailbox {
    fn push(&self, poll: Poll) {
        self.queue.lock().push_back(poll);
        self.ready.notify_one();
    }

    async fn next(&self) -> Poll {
        loop {
            let ready = self.ready.notified();
            if let Some(poll) = self.queue.lock().pop_front() {
                return poll;
            }
            ready.await;
        }
    }
}

struct ServerState {
    script: Script,
    ws_attempts: AtomicUsize,
    opened: Mutex<HashSet<String>>,
    mailbox: Mailbox,
    received: Mutex<Vec<String>>,
    sessions: Mutex<Vec<(String, String)>>,
    tokens: Mutex<Vec<String>>,
    ws_queries: Mutex<Vec<Option<String>>>,
}

impl ServerState {
    fn record_request(&self, server: String, session: String, headers: &HeaderMap) {
        self.sessions.lock().push((server, session));
        if let Some(token) = headers.get("x-token").and_then(|v| v.to_str().ok()) {
            self.tokens.lock().push(token.to_string());
        }
    }

    /// Records a client batch; returns it re-encoded as a data frame.
    fn receive_batch(&self, body: &str) -> Option<String> {
        let batch: Vec<String> = serde_json::from_str(body).ok()?;
        self.received.lock().extend(batch);
        Some(format!("a{body}"))
    }
}

// ============================================================================
// TestServer
// ============================================================================

/// Handle to a running scripted server.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    pub async fn start(script: Script) -> Self {
        let mailbox = Mailbox {
            queue: Mutex::new(script.xhr_polls.iter().cloned().collect()),
            ready: Notify::new(),
        };
        let state = Arc::new(ServerState {
            script,
            ws_attempts: AtomicUsize::new(0),
            opened: Mutex::new(HashSet::new()),
            mailbox,
            received: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            ws_queries: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/sockjs/info", get(info))
            .route("/sockjs/{server}/{session}/websocket", get(websocket))
            .route("/sockjs/{server}/{session}/xhr", post(xhr_poll))
            .route("/sockjs/{server}/{session}/xhr_send", post(xhr_send))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    /// Base address clients should connect to.
    pub fn address(&self) -> String {
        format!("http://{}/sockjs", self.addr)
    }

    pub fn ws_attempts(&self) -> usize {
        self.state.ws_attempts.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().clone()
    }

    pub fn sessions(&self) -> Vec<(String, String)> {
        self.state.sessions.lock().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.state.tokens.lock().clone()
    }

    pub fn ws_queries(&self) -> Vec<Option<String>> {
        self.state.ws_queries.lock().clone()
    }

    /// Queues a response for the next xhr poll.
    pub fn push_poll(&self, poll: Poll) {
        self.state.mailbox.push(poll);
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn info(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "websocket": state.script.websocket,
        "cookie_needed": false,
        "origins": ["*:*"],
        "entropy": 42,
    }))
}

async fn websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    Path((server, session)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    state.ws_attempts.fetch_add(1, Ordering::SeqCst);
    state.ws_queries.lock().push(query);
    state.record_request(server, session, &headers);

    if state.script.ws_silent {
        return std::future::pending().await;
    }

    ws.on_upgrade(move |socket| run_websocket(socket, state))
}

async fn run_websocket(mut socket: WebSocket, state: Arc<ServerState>) {
    let script = &state.script;

    if socket
        .send(Message::Text(script.ws_open.clone().into()))
        .await
        .is_err()
    {
        return;
    }
    for frame in &script.ws_frames {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            return;
        }
    }

    let mut heartbeat = script.heartbeat.map(|period| {
        let mut ticker = interval(period);
        ticker.reset();
        ticker
    });

    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let echo = state.receive_batch(text.as_str());
                    if script.echo
                        && let Some(frame) = echo
                        && socket.send(Message::Text(frame.into())).await.is_err()
                    {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            () = tick(&mut heartbeat) => {
                if socket.send(Message::Text("h".into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn xhr_poll(
    State(state): State<Arc<ServerState>>,
    Path((server, session)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let first = state.opened.lock().insert(session.clone());
    state.record_request(server, session, &headers);

    if first {
        return (StatusCode::OK, state.script.xhr_open.clone()).into_response();
    }

    match state.mailbox.next().await {
        Poll::Frame(frame) => (StatusCode::OK, format!("{frame}\n")).into_response(),
        Poll::Status(status) => status_code(status).into_response(),
    }
}

async fn xhr_send(
    State(state): State<Arc<ServerState>>,
    Path((server, session)): Path<(String, String)>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.record_request(server, session, &headers);

    let status = state.script.send_status;
    if status == 204 {
        let echo = state.receive_batch(&body);
        if state.script.echo
            && let Some(frame) = echo
        {
            state.mailbox.push(Poll::Frame(frame));
        }
    }

    status_code(status).into_response()
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Helpers
// ============================================================================

/// Opt-in logs: `RUST_LOG=sockjs_client=trace cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits up to two seconds for `check` to hold.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

/// Returns an address nothing listens on.
pub async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/sockjs")
}
