//! Test utilities for the status channel
//!
//! Provides [`MockConnector`], a [`Connector`] whose connections are driven
//! by the test instead of a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::channel::{Connection, ConnectionDriver, Connector, ReadyState};

/// Status frame used across tests.
pub const RUNNING_FRAME: &str = r#"{"type":"status_update","data":{"status":"running","last_check":"2024-01-01T00:00:00Z","has_error":false}}"#;

/// Build a `status_update` frame.
pub fn status_frame(status: &str, last_check: &str, has_error: bool) -> String {
    serde_json::json!({
        "type": "status_update",
        "data": {
            "status": status,
            "last_check": last_check,
            "has_error": has_error,
        }
    })
    .to_string()
}

/// Connector that hands every opened connection to the test.
///
/// Clones share the same connection log.
#[derive(Clone)]
pub struct MockConnector {
    opened_tx: mpsc::UnboundedSender<MockConnection>,
    opened: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    /// Create a connector and the receiver that yields each connection it opens.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockConnection>) {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        (
            Self {
                opened_tx,
                opened: Arc::new(AtomicUsize::new(0)),
                urls: Arc::new(Mutex::new(Vec::new())),
            },
            opened_rx,
        )
    }

    /// Number of physical connections opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// URLs passed to `open`, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str) -> Connection {
        let (connection, driver, close_rx) = Connection::pair();
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.urls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        let _ = self.opened_tx.send(MockConnection {
            url: url.to_string(),
            driver,
            close_rx,
        });
        connection
    }
}

/// Test-side handle of one connection opened by [`MockConnector`].
pub struct MockConnection {
    pub url: String,
    driver: ConnectionDriver,
    close_rx: oneshot::Receiver<()>,
}

impl MockConnection {
    pub fn open(&self) {
        self.driver.opened();
    }

    pub fn send_text(&self, text: &str) {
        self.driver.message(text);
    }

    pub fn error(&self, message: &str) {
        self.driver.error(message);
    }

    /// Close from the server side (abnormal from the client's view).
    pub fn close(&self) {
        self.driver.closed();
    }

    /// Fail the handshake: error followed by close, never opened.
    pub fn refuse(&self) {
        self.driver.error("connection refused");
        self.driver.closed();
    }

    /// `true` once the client has asked this connection to close (or dropped it).
    pub fn close_requested(&mut self) -> bool {
        !matches!(
            self.close_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }

    /// Acknowledge a client-initiated close, as a real transport would.
    pub fn finish_close(&self) {
        self.driver.set_state(ReadyState::Closed);
        self.driver.closed();
    }
}
