//! Streaming Session State Machine
//!
//! Pure transition logic for the ticker session. The session actor owns an
//! instance of [`SessionMachine`], feeds it operator calls and transport
//! events, and performs whatever [`SessionAction`] comes back.
//!
//! ```text
//!   Idle ──ensure_started──► Connecting ──Connected──► Connected
//!    ▲                           ▲                         │
//!    │ stop / auth / NoReconnect │ reconnect timer          │ Disconnected
//!    │                           │                         ▼
//!    └───────────────────────────┴──────────────────── Disconnected
//! ```

use serde::Serialize;

use crate::domain::tick::RawTick;

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of the ticker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport exists.
    #[default]
    Idle,
    /// Transport created, connect requested.
    Connecting,
    /// Transport reported a successful connect.
    Connected,
    /// Transport reported a disconnect.
    Disconnected,
}

impl SessionState {
    /// Lowercase name used in logs and status payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

// =============================================================================
// Transport Events
// =============================================================================

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The venue rejected the credential.
    Authentication,
    /// Network or handshake failure.
    Connection,
    /// A frame could not be understood or sent.
    Protocol,
    /// A control call was made while the transport was not connected.
    NotConnected,
}

impl TransportErrorKind {
    /// Label used for metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::NotConnected => "not_connected",
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a ticker transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    /// What went wrong.
    pub kind: TransportErrorKind,
    /// Human-readable detail for logs.
    pub message: String,
}

impl TransportError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Authentication failure.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Authentication, message)
    }

    /// Connection failure.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connection, message)
    }

    /// Protocol failure.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }

    /// Control call on a transport that is not connected.
    #[must_use]
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotConnected, message)
    }

    /// Classify a free-text error reported by the venue.
    ///
    /// Only the HTTP status markers 400, 401 and 403 count as
    /// authentication failures; everything else is a protocol error.
    #[must_use]
    pub fn from_venue_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if AUTH_STATUS_MARKERS.iter().any(|m| message.contains(m)) {
            TransportErrorKind::Authentication
        } else {
            TransportErrorKind::Protocol
        };
        Self { kind, message }
    }

    /// Whether the error means the credential is no longer valid.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Authentication)
    }
}

/// Status codes in venue error text that mean the credential was rejected.
const AUTH_STATUS_MARKERS: [&str; 3] = ["400", "401", "403"];

/// Event emitted by a ticker transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is open.
    Connected,
    /// The connection closed. `manual` is true when `close()` caused it.
    Disconnected {
        /// Whether the close was requested locally.
        manual: bool,
    },
    /// A batch of raw tick items, in delivery order.
    TickBatch(Vec<RawTick>),
    /// A transport-level error.
    Error(TransportError),
    /// The transport exhausted its own connect retry budget.
    NoReconnect,
}

// =============================================================================
// State Machine
// =============================================================================

/// Why the session was torn down without operator involvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// The venue rejected the credential.
    AuthenticationFailed,
    /// The transport gave up reconnecting on its own.
    RetriesExhausted,
}

/// Side effect the session actor must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Nothing to do.
    None,
    /// Load the durable subscription set and replay it on the transport.
    ReplaySubscriptions,
    /// Arm the fixed-delay reconnect timer.
    ScheduleReconnect,
    /// Drop the transport and return to idle.
    Teardown(TeardownReason),
    /// Log the error; the session continues.
    LogError,
}

/// Session state plus the manual-stop flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionMachine {
    state: SessionState,
    manual_stop: bool,
}

impl SessionMachine {
    /// Create an idle machine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle,
            manual_stop: false,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the operator stopped the session.
    #[must_use]
    pub const fn is_manually_stopped(&self) -> bool {
        self.manual_stop
    }

    /// A fresh transport was created and asked to connect.
    pub const fn begin_connect(&mut self) {
        self.manual_stop = false;
        self.state = SessionState::Connecting;
    }

    /// Record a stop request. Must be called before the transport is closed
    /// so a late disconnect sees the flag.
    pub const fn request_stop(&mut self, manual: bool) {
        if manual {
            self.manual_stop = true;
        }
    }

    /// The transport is gone.
    pub const fn torn_down(&mut self) {
        self.state = SessionState::Idle;
    }

    /// Whether an armed reconnect timer may start a new transport.
    #[must_use]
    pub const fn may_reconnect(&self) -> bool {
        !self.manual_stop
    }

    /// Apply a transport lifecycle event.
    ///
    /// Tick batches carry no lifecycle meaning and yield [`SessionAction::None`].
    pub fn on_event(&mut self, event: &TransportEvent) -> SessionAction {
        match event {
            TransportEvent::Connected => {
                self.state = SessionState::Connected;
                SessionAction::ReplaySubscriptions
            }
            TransportEvent::Disconnected { manual } => {
                self.state = SessionState::Disconnected;
                if *manual || self.manual_stop {
                    SessionAction::None
                } else {
                    SessionAction::ScheduleReconnect
                }
            }
            TransportEvent::Error(error) if error.is_authentication() && !self.manual_stop => {
                SessionAction::Teardown(TeardownReason::AuthenticationFailed)
            }
            TransportEvent::Error(_) => SessionAction::LogError,
            TransportEvent::NoReconnect if self.manual_stop => SessionAction::None,
            TransportEvent::NoReconnect => SessionAction::Teardown(TeardownReason::RetriesExhausted),
            TransportEvent::TickBatch(_) => SessionAction::None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
