//! Inbound message queue shared by both transports.
//!
//! A supervise loop owns the [`InboundSender`], the connection owns the
//! [`InboundReceiver`]. Messages flow through a bounded channel; the single
//! terminal error sits in a separate slot and is handed to the reader only
//! after the channel drains and the sender is gone, so it is always the
//! last value observed.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Messages buffered before the supervise loop blocks.
pub(crate) const INBOUND_CAPACITY: usize = 10;

// ============================================================================
// Terminal
// ============================================================================

enum TerminalState {
    Pending,
    Ready(Error),
    Taken,
}

/// Write-once slot for the error that ends a connection.
#[derive(Clone)]
pub(crate) struct Terminal(Arc<Mutex<TerminalState>>);

impl Terminal {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(TerminalState::Pending)))
    }

    /// Records `err` unless a terminal error was already recorded.
    pub(crate) fn fail(&self, err: Error) -> bool {
        let mut state = self.0.lock();
        if matches!(*state, TerminalState::Pending) {
            trace!(error = %err, "Terminal error recorded");
            *state = TerminalState::Ready(err);
            true
        } else {
            trace!(error = %err, "Terminal error already recorded, dropping");
            false
        }
    }

    /// Hands out the terminal error once, then closed connection forever.
    fn take(&self) -> Error {
        let mut state = self.0.lock();
        match std::mem::replace(&mut *state, TerminalState::Taken) {
            TerminalState::Ready(err) => err,
            TerminalState::Pending | TerminalState::Taken => Error::closed_connection(),
        }
    }
}

// ============================================================================
// Constructor
// ============================================================================

/// Creates a connected sender/receiver pair bound to `cancel`.
pub(crate) fn inbound(cancel: CancellationToken) -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    let terminal = Terminal::new();

    let sender = InboundSender {
        tx,
        terminal: terminal.clone(),
        cancel,
    };
    let receiver = InboundReceiver {
        rx: AsyncMutex::new(rx),
        terminal,
        shut: AtomicBool::new(false),
    };

    (sender, receiver)
}

// ============================================================================
// InboundSender
// ============================================================================

/// Supervise loop half of the queue.
pub(crate) struct InboundSender {
    tx: mpsc::Sender<Vec<u8>>,
    terminal: Terminal,
    cancel: CancellationToken,
}

impl InboundSender {
    /// Enqueues one message, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClosedConnection`] once the connection is cancelled.
    pub(crate) async fn push(&self, msg: Vec<u8>) -> Result<()> {
        tokio::select! {
            biased;

            () = self.cancel.cancelled() => Err(Error::closed_connection()),

            sent = self.tx.send(msg) => sent.map_err(|_| Error::closed_connection()),
        }
    }

    /// Returns a handle for recording the terminal error from another task.
    pub(crate) fn terminal(&self) -> Terminal {
        self.terminal.clone()
    }

    /// Records the loop's exit error and closes the queue.
    ///
    /// Callers mask with [`mask_cancelled`] before cancelling themselves.
    pub(crate) fn finish(self, err: Error) {
        self.terminal.fail(err);
    }
}

// ============================================================================
// InboundReceiver
// ============================================================================

/// Connection half of the queue.
pub(crate) struct InboundReceiver {
    rx: AsyncMutex<mpsc::Receiver<Vec<u8>>>,
    terminal: Terminal,
    shut: AtomicBool,
}

impl InboundReceiver {
    /// Waits for the next message.
    ///
    /// # Errors
    ///
    /// - The terminal error, exactly once, after all queued messages
    /// - [`Error::ClosedConnection`] after [`shut`](Self::shut) or once the
    ///   terminal error was consumed
    pub(crate) async fn recv(&self) -> Result<Vec<u8>> {
        if self.is_shut() {
            return Err(Error::closed_connection());
        }

        let mut rx = self.rx.lock().await;
        if self.is_shut() {
            return Err(Error::closed_connection());
        }

        match rx.recv().await {
            Some(msg) => Ok(msg),
            None => Err(self.terminal.take()),
        }
    }

    /// Marks the queue as closed by the local side.
    pub(crate) fn shut(&self) {
        self.shut.store(true, Ordering::Release);
    }

    fn is_shut(&self) -> bool {
        self.shut.load(Ordering::Acquire)
    }
}

// ============================================================================
// Masking
// ============================================================================

/// Reports I/O failures caused by our own cancellation as closed connection.
pub(crate) fn mask_cancelled(cancel: &CancellationToken, err: Error) -> Error {
    if cancel.is_cancelled()
        && matches!(err, Error::Http(_) | Error::WebSocket(_) | Error::Io(_))
    {
        trace!(error = %err, "Masking error caused by cancellation");
        return Error::closed_connection();
    }
    err
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;
    use std::time::Duration;

    use tokio::time::timeout;

    #[tokio::test]
    async fn test_messages_then_terminal() {
        let (tx, rx) = inbound(CancellationToken::new());

        tx.push(b"one".to_vec()).await.unwrap();
        tx.push(b"two".to_vec()).await.unwrap();
        tx.finish(Error::no_heartbeat(30_000));

        assert_eq!(rx.recv().await.unwrap(), b"one");
        assert_eq!(rx.recv().await.unwrap(), b"two");
        assert!(matches!(
            rx.recv().await,
            Err(Error::NoHeartbeat { timeout_ms: 30_000 })
        ));
        assert!(matches!(
            rx.recv().await,
            Err(Error::ClosedConnection { .. })
        ));
    }

    #[tokio::test]
    async fn test_first_terminal_wins() {
        let (tx, rx) = inbound(CancellationToken::new());

        assert!(tx.terminal().fail(Error::no_heartbeat(10)));
        assert!(!tx.terminal().fail(Error::closed_by_remote(None, None)));
        tx.finish(Error::closed_connection());

        assert!(matches!(rx.recv().await, Err(Error::NoHeartbeat { .. })));
    }

    #[tokio::test]
    async fn test_terminal_waits_for_sender() {
        let (tx, rx) = inbound(CancellationToken::new());
        tx.terminal().fail(Error::no_heartbeat(10));

        let pending = timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(pending.is_err(), "terminal must not overtake a live sender");

        drop(tx);
        assert!(matches!(rx.recv().await, Err(Error::NoHeartbeat { .. })));
    }

    #[tokio::test]
    async fn test_shut_rejects_queued_messages() {
        let (tx, rx) = inbound(CancellationToken::new());
        tx.push(b"queued".to_vec()).await.unwrap();

        rx.shut();
        assert!(matches!(
            rx.recv().await,
            Err(Error::ClosedConnection { .. })
        ));
    }

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let (tx, _rx) = inbound(CancellationToken::new());
        for i in 0..INBOUND_CAPACITY {
            tx.push(vec![i as u8]).await.unwrap();
        }

        let blocked = timeout(Duration::from_millis(50), tx.push(b"extra".to_vec())).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_push_fails_after_cancel() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = inbound(cancel.clone());
        for i in 0..INBOUND_CAPACITY {
            tx.push(vec![i as u8]).await.unwrap();
        }

        cancel.cancel();
        assert!(matches!(
            tx.push(b"late".to_vec()).await,
            Err(Error::ClosedConnection { .. })
        ));
    }

    #[tokio::test]
    async fn test_finish_after_cancel_keeps_error() {
        let cancel = CancellationToken::new();
        let (tx, rx) = inbound(cancel.clone());
        cancel.cancel();

        tx.finish(Error::unexpected_response(500));
        assert!(matches!(
            rx.recv().await,
            Err(Error::UnexpectedResponse { status: 500 })
        ));
    }

    #[test]
    fn test_mask_cancelled_io() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let io = Error::Io(std::io::Error::new(ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(
            mask_cancelled(&cancel, io),
            Error::ClosedConnection { reason: None }
        ));
    }

    #[test]
    fn test_mask_keeps_uncancelled_and_protocol_errors() {
        let cancel = CancellationToken::new();
        let io = Error::Io(std::io::Error::new(ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(mask_cancelled(&cancel, io), Error::Io(_)));

        cancel.cancel();
        let protocol = Error::unexpected_response(500);
        assert!(matches!(
            mask_cancelled(&cancel, protocol),
            Error::UnexpectedResponse { status: 500 }
        ));
    }
}
