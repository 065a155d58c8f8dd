//! Status channel client: the I/O adapter around [`ChannelMachine`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    StatusChannelClient                        │
//! │                                                               │
//! │  start() / stop() ──┐                                         │
//! │                     ▼                                         │
//! │  pump task ──▶ dispatch ──▶ ChannelMachine::handle            │
//! │  (per conn)     (core lock)        │                          │
//! │  retry task ──▶                    ▼                          │
//! │                        OpenConnection → Connector::open       │
//! │                        CloseConnection → ConnectionControl    │
//! │                        ScheduleRetry  → spawn sleep task      │
//! │                        CancelRetry    → abort sleep task      │
//! │                        Deliver        → subscriber callback   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state transitions run under one mutex, so they never interleave. Each
//! physical connection has a single pump task, which keeps delivery order
//! equal to frame arrival order. The subscriber callback is taken out of its
//! slot and invoked with no lock held, so it may call `start()` or `stop()`.
//! `stop()` waits for a callback running on another thread to return, so
//! once `stop()` returns the callback is never called again.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use anidl_core::prelude::*;
use anidl_core::StatusEvent;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::address::{status_channel_url, AddressResolver};
use super::state::{
    ChannelAction, ChannelInput, ChannelMachine, ChannelState, ConnectionId, ReconnectPolicy,
    TimerToken, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL,
};
use super::transport::{ConnectionControl, Connector, ReadyState, TransportEvent, WsConnector};

/// Subscriber callback. Called at most once per status event and never
/// concurrently with itself. It may call any method of the client it is bound
/// to, including `stop()` and `start()`.
pub type StatusCallback = Box<dyn FnMut(&StatusEvent) + Send + 'static>;

/// Construction options for [`StatusChannelClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Host (or URL) to connect to instead of the origin's host.
    pub host_override: Option<String>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            host_override: None,
        }
    }
}

impl ChannelOptions {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: self.reconnect_interval,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State mutated by transitions. Guarded by `Shared::core`.
struct Core {
    machine: ChannelMachine,
    connection: Option<(ConnectionId, ConnectionControl)>,
    retry: Option<(TimerToken, JoinHandle<()>)>,
    /// Bumped by every `stop()`; deliveries from an older session are dropped.
    session: u64,
}

impl Core {
    fn connection_live(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|(_, control)| control.is_live())
    }
}

struct Subscriber {
    session: u64,
    /// Bumped whenever the slot is rebound or cleared.
    binding: u64,
    callback: Option<StatusCallback>,
    /// Thread currently running the callback outside the lock.
    delivering: Option<ThreadId>,
}

impl Subscriber {
    /// Returns the previous callback so it can be dropped after the lock is
    /// released; its captures may own the client.
    #[must_use]
    fn bind(&mut self, session: u64, callback: Option<StatusCallback>) -> Option<StatusCallback> {
        self.session = session;
        self.binding += 1;
        std::mem::replace(&mut self.callback, callback)
    }
}

struct Shared {
    url: String,
    connector: Box<dyn Connector>,
    runtime: Handle,
    core: Mutex<Core>,
    subscriber: Mutex<Subscriber>,
    delivery_done: Condvar,
    state_tx: watch::Sender<ChannelState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// StatusChannelClient
// ---------------------------------------------------------------------------

/// Resilient client for the daemon's status event stream.
///
/// Create once per consumer session; the address is derived at construction
/// and never changes. Dropping the client stops it.
pub struct StatusChannelClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for StatusChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusChannelClient")
            .field("url", &self.shared.url)
            .field("state", &self.state())
            .finish()
    }
}

impl StatusChannelClient {
    /// Create a client that connects through `connector`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoRuntime`] when called outside a Tokio runtime.
    /// - [`Error::InvalidAddress`] when no usable address can be derived.
    pub fn new(
        resolver: &dyn AddressResolver,
        connector: impl Connector,
        options: ChannelOptions,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let url = status_channel_url(&resolver.origin(), options.host_override.as_deref())?;
        let (state_tx, _) = watch::channel(ChannelState::Idle);

        debug!("Status channel client created for {}", url);

        Ok(Self {
            shared: Arc::new(Shared {
                url,
                connector: Box::new(connector),
                runtime,
                core: Mutex::new(Core {
                    machine: ChannelMachine::new(options.policy()),
                    connection: None,
                    retry: None,
                    session: 0,
                }),
                subscriber: Mutex::new(Subscriber {
                    session: 0,
                    binding: 0,
                    callback: None,
                    delivering: None,
                }),
                delivery_done: Condvar::new(),
                state_tx,
            }),
        })
    }

    /// Create a client that connects over WebSocket.
    pub fn websocket(resolver: &dyn AddressResolver, options: ChannelOptions) -> Result<Self> {
        Self::new(resolver, WsConnector, options)
    }

    /// The derived `ws(s)://host/api/v1/ws` address.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Bind `callback` and connect unless a connection is already connecting
    /// or open. Resets the reconnect attempt counter.
    pub fn start<F>(&self, callback: F)
    where
        F: FnMut(&StatusEvent) + Send + 'static,
    {
        let session = lock(&self.shared.core).session;
        let previous = lock(&self.shared.subscriber).bind(session, Some(Box::new(callback)));
        drop(previous);
        self.shared.dispatch(|core| ChannelInput::Start {
            connection_live: core.connection_live(),
        });
    }

    /// Stop reconnecting, close the connection, and detach the subscriber.
    ///
    /// Safe to call repeatedly, from any state, and from inside the callback.
    /// After it returns no retry fires and the callback is not invoked again.
    pub fn stop(&self) {
        self.shared.dispatch(|core| {
            core.session += 1;
            ChannelInput::Stop
        });
        let session = lock(&self.shared.core).session;
        let mut subscriber = lock(&self.shared.subscriber);
        let previous = subscriber.bind(session, None);

        // A callback running on another thread finishes before we return. On
        // the delivering thread itself there is nothing to wait for.
        let me = thread::current().id();
        while subscriber.delivering.is_some_and(|t| t != me) {
            subscriber = self
                .shared
                .delivery_done
                .wait(subscriber)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(subscriber);
        drop(previous);
    }

    /// `true` iff the live physical connection reports open right now.
    pub fn is_connected(&self) -> bool {
        lock(&self.shared.core)
            .connection
            .as_ref()
            .is_some_and(|(_, control)| control.ready_state() == ReadyState::Open)
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.shared.core).machine.state()
    }

    /// Reconnection attempts since the last `start()` or successful open.
    pub fn attempts(&self) -> u32 {
        lock(&self.shared.core).machine.attempts()
    }

    /// Observe state changes, including the difference between a retry in
    /// progress and having given up.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state_tx.subscribe()
    }
}

impl Drop for StatusChannelClient {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Dispatch and action execution
// ---------------------------------------------------------------------------

impl Shared {
    /// Run one transition. `make_input` sees the core under the lock so it can
    /// read live connection state or update bookkeeping atomically with the
    /// transition.
    fn dispatch(self: &Arc<Self>, make_input: impl FnOnce(&mut Core) -> ChannelInput) {
        let (deliveries, session) = {
            let mut core = lock(&self.core);
            let input = make_input(&mut *core);
            let actions = core.machine.handle(input);

            let deliveries: Vec<StatusEvent> = actions
                .into_iter()
                .filter_map(|action| self.execute(&mut core, action))
                .collect();

            let state = core.machine.state();
            self.state_tx.send_if_modified(|current| {
                if *current == state {
                    false
                } else {
                    *current = state;
                    true
                }
            });
            (deliveries, core.session)
        };

        if !deliveries.is_empty() {
            self.deliver(session, &deliveries);
        }
    }

    /// Perform one action. Status events are handed back so they can be
    /// delivered after the core lock is released.
    fn execute(self: &Arc<Self>, core: &mut Core, action: ChannelAction) -> Option<StatusEvent> {
        match action {
            ChannelAction::OpenConnection(id) => self.open_connection(core, id),
            ChannelAction::CloseConnection(id) => {
                if core.connection.as_ref().is_some_and(|(cid, _)| *cid == id) {
                    if let Some((_, mut control)) = core.connection.take() {
                        control.close();
                    }
                }
            }
            ChannelAction::ScheduleRetry { token, delay } => {
                self.schedule_retry(core, token, delay)
            }
            ChannelAction::CancelRetry(token) => {
                if let Some((pending, handle)) = core.retry.take() {
                    if pending != token {
                        debug!("Status channel: cancelling {:?}, expected {:?}", pending, token);
                    }
                    handle.abort();
                }
            }
            ChannelAction::Deliver(event) => return Some(event),
        }
        None
    }

    fn open_connection(self: &Arc<Self>, core: &mut Core, id: ConnectionId) {
        info!("Status channel: connecting to {}", self.url);
        let connection = {
            let _guard = self.runtime.enter();
            self.connector.open(&self.url)
        };
        let (control, events) = connection.split();
        if let Some((_, mut previous)) = core.connection.replace((id, control)) {
            previous.close();
        }
        self.runtime
            .spawn(pump_connection(Arc::downgrade(self), id, events));
    }

    fn schedule_retry(self: &Arc<Self>, core: &mut Core, token: TimerToken, delay: Duration) {
        let weak = Arc::downgrade(self);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(|_| ChannelInput::RetryFired(token));
            }
        });
        if let Some((_, previous)) = core.retry.replace((token, handle)) {
            previous.abort();
        }
    }

    /// Hand `events` to the subscriber without holding any lock across the
    /// callback. The session and binding are re-checked before every event,
    /// so a `stop()` or `start()` made by the callback takes effect at once.
    fn deliver(&self, session: u64, events: &[StatusEvent]) {
        let me = thread::current().id();
        let mut subscriber = lock(&self.subscriber);
        while subscriber.delivering.is_some_and(|t| t != me) {
            subscriber = self
                .delivery_done
                .wait(subscriber)
                .unwrap_or_else(|e| e.into_inner());
        }
        if subscriber.delivering.is_some() {
            trace!("Status channel: nested delivery of {} event(s) skipped", events.len());
            return;
        }
        subscriber.delivering = Some(me);
        drop(subscriber);
        let _delivering = DeliveryGuard(self);

        let mut held: Option<(u64, StatusCallback)> = None;
        let mut retired: Vec<StatusCallback> = Vec::new();
        for event in events {
            let mut subscriber = lock(&self.subscriber);
            if subscriber.session != session {
                trace!("Status channel: dropping event(s) from a stopped session");
                break;
            }
            if held.as_ref().map(|(binding, _)| *binding) != Some(subscriber.binding) {
                retired.extend(held.take().map(|(_, callback)| callback));
                held = subscriber
                    .callback
                    .take()
                    .map(|callback| (subscriber.binding, callback));
            }
            drop(subscriber);

            match held.as_mut() {
                Some((_, callback)) => callback(event),
                None => break,
            }
        }

        if let Some((binding, callback)) = held {
            let mut subscriber = lock(&self.subscriber);
            if subscriber.binding == binding && subscriber.callback.is_none() {
                subscriber.callback = Some(callback);
            } else {
                drop(subscriber);
                retired.push(callback);
            }
        }
    }
}

/// Clears the delivering mark even if the callback panics.
struct DeliveryGuard<'a>(&'a Shared);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        lock(&self.0.subscriber).delivering = None;
        self.0.delivery_done.notify_all();
    }
}

/// Forward one connection's transport events into the state machine.
async fn pump_connection(
    shared: Weak<Shared>,
    id: ConnectionId,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let closed = event == TransportEvent::Closed;
        shared.dispatch(|core| match event {
            TransportEvent::Open => ChannelInput::Opened(id),
            TransportEvent::Message(text) => ChannelInput::Frame {
                connection: id,
                text,
            },
            TransportEvent::Error(message) => ChannelInput::TransportError {
                connection: id,
                message,
            },
            TransportEvent::Closed => {
                release_connection(core, id);
                ChannelInput::Closed(id)
            }
        });
        if closed {
            return;
        }
    }

    // The transport went away without reporting a close.
    if let Some(shared) = shared.upgrade() {
        shared.dispatch(|core| {
            release_connection(core, id);
            ChannelInput::Closed(id)
        });
    }
}

fn release_connection(core: &mut Core, id: ConnectionId) {
    if core.connection.as_ref().is_some_and(|(cid, _)| *cid == id) {
        core.connection = None;
    }
}
