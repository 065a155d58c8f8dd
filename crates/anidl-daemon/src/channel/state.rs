//! Status channel state machine.
//!
//! [`ChannelMachine`] holds every lifecycle decision of the status channel and
//! performs no I/O. Each [`ChannelInput`] (a consumer call, a connection
//! event, or a retry timer firing) produces a list of [`ChannelAction`]s that
//! the client adapter executes.
//!
//! ```text
//!  Idle ──start──▶ Connecting ──opened──▶ Open
//!                     ▲   │                 │
//!          retry fired│   └─────closed──────┤
//!                     │                     ▼
//!               ClosedRetrying ◀── attempts < max
//!                                           │ attempts == max
//!                                           ▼
//!                 stop (any state) ──▶ Shutdown
//! ```
//!
//! Connection events carry the [`ConnectionId`] they belong to and timer
//! fires carry their [`TimerToken`]; anything that does not match the current
//! connection or the pending timer is stale and ignored.

use std::time::Duration;

use anidl_core::{decode_frame, FrameDecode, StatusEvent};
use tracing::{debug, error, info, trace, warn};

/// Delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Reconnection attempts allowed before the channel gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifies one physical connection opened by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// Identifies one scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

// ---------------------------------------------------------------------------
// Policy and state
// ---------------------------------------------------------------------------

/// Fixed-interval, attempt-limited reconnection. No jitter, no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Why the channel stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The consumer called `stop()`.
    Requested,
    /// Every reconnection attempt failed.
    RetriesExhausted,
}

/// Lifecycle state of the status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection attempted yet.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; frames may arrive.
    Open,
    /// Connection lost, retry scheduled.
    ClosedRetrying {
        /// The reconnection attempt this retry will make (1-indexed).
        attempt: u32,
    },
    /// Terminal until the next `start()`.
    Shutdown(ShutdownReason),
}

impl ChannelState {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ChannelState::Shutdown(_))
    }
}

// ---------------------------------------------------------------------------
// Inputs and actions
// ---------------------------------------------------------------------------

/// Everything that can happen to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelInput {
    /// Consumer called `start()`. `connection_live` reports whether the
    /// adapter's physical connection is currently connecting or open.
    Start { connection_live: bool },
    /// Consumer called `stop()`.
    Stop,
    Opened(ConnectionId),
    Frame {
        connection: ConnectionId,
        text: String,
    },
    TransportError {
        connection: ConnectionId,
        message: String,
    },
    Closed(ConnectionId),
    RetryFired(TimerToken),
}

/// Side effects for the adapter to perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    OpenConnection(ConnectionId),
    CloseConnection(ConnectionId),
    ScheduleRetry { token: TimerToken, delay: Duration },
    CancelRetry(TimerToken),
    Deliver(StatusEvent),
}

// ---------------------------------------------------------------------------
// ChannelMachine
// ---------------------------------------------------------------------------

/// Pure decision logic of the status channel.
#[derive(Debug)]
pub struct ChannelMachine {
    policy: ReconnectPolicy,
    state: ChannelState,
    attempts: u32,
    auto_reconnect: bool,
    current: Option<ConnectionId>,
    pending_retry: Option<TimerToken>,
    next_id: u64,
}

impl ChannelMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ChannelState::Idle,
            attempts: 0,
            auto_reconnect: false,
            current: None,
            pending_retry: None,
            next_id: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Reconnection attempts made since the last `start()` or successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn pending_retry(&self) -> Option<TimerToken> {
        self.pending_retry
    }

    /// Apply one input and return the actions it requires.
    pub fn handle(&mut self, input: ChannelInput) -> Vec<ChannelAction> {
        match input {
            ChannelInput::Start { connection_live } => self.on_start(connection_live),
            ChannelInput::Stop => self.on_stop(),
            ChannelInput::Opened(id) => self.on_opened(id),
            ChannelInput::Frame { connection, text } => self.on_frame(connection, &text),
            ChannelInput::TransportError {
                connection,
                message,
            } => {
                if self.is_current(connection) {
                    warn!("Status channel error: {}", message);
                } else {
                    debug!("Status channel: error on stale connection: {}", message);
                }
                Vec::new()
            }
            ChannelInput::Closed(id) => self.on_closed(id),
            ChannelInput::RetryFired(token) => self.on_retry_fired(token),
        }
    }

    fn on_start(&mut self, connection_live: bool) -> Vec<ChannelAction> {
        let mut actions = Vec::new();
        self.attempts = 0;
        self.auto_reconnect = true;

        if let Some(token) = self.pending_retry.take() {
            actions.push(ChannelAction::CancelRetry(token));
        }

        if connection_live && self.current.is_some() {
            debug!("Status channel: start while {:?}, rebinding subscriber only", self.state);
            return actions;
        }

        // The machine believes a connection exists but the transport says it
        // is gone; its close event has not been processed yet.
        if let Some(stale) = self.current.take() {
            debug!("Status channel: discarding stale connection {:?}", stale);
            actions.push(ChannelAction::CloseConnection(stale));
        }

        actions.push(self.open_new());
        actions
    }

    fn on_stop(&mut self) -> Vec<ChannelAction> {
        let mut actions = Vec::new();
        self.auto_reconnect = false;

        if let Some(token) = self.pending_retry.take() {
            actions.push(ChannelAction::CancelRetry(token));
        }
        if let Some(id) = self.current.take() {
            actions.push(ChannelAction::CloseConnection(id));
        }

        if !matches!(self.state, ChannelState::Shutdown(ShutdownReason::Requested)) {
            info!("Status channel stopped");
        }
        self.state = ChannelState::Shutdown(ShutdownReason::Requested);
        actions
    }

    fn on_opened(&mut self, id: ConnectionId) -> Vec<ChannelAction> {
        if !self.is_current(id) || self.state != ChannelState::Connecting {
            debug!("Status channel: ignoring open of stale connection {:?}", id);
            return Vec::new();
        }
        info!("Status channel connected");
        self.state = ChannelState::Open;
        self.attempts = 0;
        Vec::new()
    }

    fn on_frame(&mut self, id: ConnectionId, text: &str) -> Vec<ChannelAction> {
        if !self.is_current(id) || self.state != ChannelState::Open {
            trace!("Status channel: dropping frame from stale connection {:?}", id);
            return Vec::new();
        }
        match decode_frame(text) {
            FrameDecode::Status(event) => vec![ChannelAction::Deliver(event)],
            FrameDecode::Ignored => {
                trace!("Status channel: ignoring non-status frame");
                Vec::new()
            }
            FrameDecode::Malformed(err) => {
                warn!("Failed to parse status channel message: {}", err);
                Vec::new()
            }
        }
    }

    fn on_closed(&mut self, id: ConnectionId) -> Vec<ChannelAction> {
        if !self.is_current(id) {
            debug!("Status channel: ignoring close of stale connection {:?}", id);
            return Vec::new();
        }
        info!("Status channel disconnected");
        self.current = None;

        if !self.auto_reconnect {
            self.state = ChannelState::Shutdown(ShutdownReason::Requested);
            return Vec::new();
        }

        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            let token = TimerToken(self.bump_id());
            self.pending_retry = Some(token);
            self.state = ChannelState::ClosedRetrying {
                attempt: self.attempts,
            };
            info!(
                "Reconnecting status channel in {:?} (attempt {}/{})",
                self.policy.interval, self.attempts, self.policy.max_attempts
            );
            vec![ChannelAction::ScheduleRetry {
                token,
                delay: self.policy.interval,
            }]
        } else {
            error!(
                "Max status channel reconnection attempts reached ({})",
                self.policy.max_attempts
            );
            self.state = ChannelState::Shutdown(ShutdownReason::RetriesExhausted);
            Vec::new()
        }
    }

    fn on_retry_fired(&mut self, token: TimerToken) -> Vec<ChannelAction> {
        if self.pending_retry != Some(token) || !self.auto_reconnect {
            debug!("Status channel: ignoring cancelled retry {:?}", token);
            return Vec::new();
        }
        self.pending_retry = None;
        vec![self.open_new()]
    }

    fn open_new(&mut self) -> ChannelAction {
        let id = ConnectionId(self.bump_id());
        self.current = Some(id);
        self.state = ChannelState::Connecting;
        ChannelAction::OpenConnection(id)
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        self.current == Some(id)
    }

    fn bump_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}
