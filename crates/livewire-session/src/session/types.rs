//! Session state, configuration, and events.

use std::fmt;
use std::time::Duration;

use crate::error::SessionError;
use crate::protocol::{Message, DEFAULT_MAX_FRAME_BYTES};
use crate::transport::CloseInfo;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of one session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether a transport exists or is being created.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Connection target, fixed for the life of the session.
    pub endpoint: String,
    /// Largest frame accepted or produced.
    pub max_frame_bytes: usize,
    /// Upper bound for one tool invocation.
    pub tool_timeout: Duration,
    /// Buffer size of the `subscribe()` broadcast.
    pub event_capacity: usize,
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            tool_timeout: Duration::from_secs(30),
            event_capacity: 256,
        }
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Everything a session reports to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened,
    Message(Message),
    Error(SessionError),
    Closed(CloseInfo),
}
