//! Physical connection abstraction for the status channel.
//!
//! A [`Connector`] opens a [`Connection`] without blocking, the same way a
//! browser socket constructor returns immediately and reports progress through
//! events. Transports push [`TransportEvent`]s through a [`ConnectionDriver`]
//! and keep the live [`ReadyState`] current; the client reads that state to
//! answer `is_connected()` and to avoid opening a second connection.
//!
//! [`WsConnector`] is the production transport, backed by `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Readiness of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Lifecycle notifications emitted by a physical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Open,
    /// One text frame.
    Message(String),
    /// Transport-level failure. Always followed by [`TransportEvent::Closed`].
    Error(String),
    /// The connection ended, for whatever reason.
    Closed,
}

/// Opens physical connections to the daemon.
pub trait Connector: Send + Sync + 'static {
    /// Begin connecting to `url` and return immediately.
    ///
    /// Called from within a Tokio runtime context. Must not block.
    fn open(&self, url: &str) -> Connection;
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Client side of one physical connection.
#[derive(Debug)]
pub struct Connection {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    control: ConnectionControl,
}

impl Connection {
    /// Create a connection together with the driver a transport uses to feed
    /// it and the signal that fires when the client asks to close.
    ///
    /// Dropping the [`Connection`] (or its [`ConnectionControl`]) also fires
    /// the close signal.
    pub fn pair() -> (Self, ConnectionDriver, oneshot::Receiver<()>) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (ready_tx, ready) = watch::channel(ReadyState::Connecting);
        let (close_tx, close_rx) = oneshot::channel();

        let connection = Self {
            events,
            control: ConnectionControl {
                ready,
                close_tx: Some(close_tx),
            },
        };
        let driver = ConnectionDriver {
            events_tx,
            ready_tx,
        };
        (connection, driver, close_rx)
    }

    pub fn ready_state(&self) -> ReadyState {
        self.control.ready_state()
    }

    /// Separate the control half (kept by the client) from the event stream
    /// (consumed by the connection's pump task).
    pub fn split(self) -> (ConnectionControl, mpsc::UnboundedReceiver<TransportEvent>) {
        (self.control, self.events)
    }
}

/// Live readiness and close request for a connection.
#[derive(Debug)]
pub struct ConnectionControl {
    ready: watch::Receiver<ReadyState>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl ConnectionControl {
    pub fn ready_state(&self) -> ReadyState {
        *self.ready.borrow()
    }

    /// `true` while the connection is connecting or open.
    pub fn is_live(&self) -> bool {
        matches!(self.ready_state(), ReadyState::Connecting | ReadyState::Open)
    }

    /// Ask the transport to close. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Transport side of a connection.
#[derive(Debug)]
pub struct ConnectionDriver {
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    ready_tx: watch::Sender<ReadyState>,
}

impl ConnectionDriver {
    pub fn set_state(&self, state: ReadyState) {
        self.ready_tx.send_replace(state);
    }

    pub fn opened(&self) {
        self.set_state(ReadyState::Open);
        let _ = self.events_tx.send(TransportEvent::Open);
    }

    pub fn message(&self, text: impl Into<String>) {
        let _ = self.events_tx.send(TransportEvent::Message(text.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        let _ = self.events_tx.send(TransportEvent::Error(message.into()));
    }

    pub fn closed(&self) {
        self.set_state(ReadyState::Closed);
        let _ = self.events_tx.send(TransportEvent::Closed);
    }
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

/// [`Connector`] that speaks WebSocket via `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &str) -> Connection {
        let (connection, driver, close_rx) = Connection::pair();
        tokio::spawn(run_ws_connection(url.to_string(), driver, close_rx));
        connection
    }
}

/// Drive one WebSocket connection until it closes.
async fn run_ws_connection(
    url: String,
    driver: ConnectionDriver,
    mut close_rx: oneshot::Receiver<()>,
) {
    debug!("Status channel: connecting to {}", url);

    let ws_stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws_stream, _response)) => ws_stream,
            Err(err) => {
                driver.error(format!("failed to connect to {url}: {err}"));
                driver.closed();
                return;
            }
        },
        _ = &mut close_rx => {
            debug!("Status channel: close requested before handshake completed");
            driver.closed();
            return;
        }
    };

    driver.opened();
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        driver.message(text.as_str());
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!("Status channel: received Close frame: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary: ignore
                    }
                    Some(Err(err)) => {
                        warn!("Status channel: WebSocket read error: {}", err);
                        driver.error(err.to_string());
                        break;
                    }
                    None => {
                        debug!("Status channel: WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = &mut close_rx => {
                driver.set_state(ReadyState::Closing);
                if let Err(err) = ws_sink.send(WsMessage::Close(None)).await {
                    debug!("Status channel: failed to send Close frame: {}", err);
                }
                let _ = ws_sink.close().await;
                break;
            }
        }
    }

    driver.closed();
}
