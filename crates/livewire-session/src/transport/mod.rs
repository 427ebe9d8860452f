//! Abstract duplex transport the session is written against.
//!
//! A `Connector` constructs a `Transport` and hands it an event channel.
//! Construction may fail synchronously (bad endpoint); everything after that
//! arrives as `TransportEvent`s. Every transport ends with exactly one
//! `Closed` event.

pub mod memory;
pub mod websocket;

use std::fmt;

use tokio::sync::mpsc;

use crate::error::TransportError;

/// Raw events delivered by a transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed; frames may now flow.
    Opened,
    /// One inbound text frame.
    Message(String),
    /// Transport-level failure. Not necessarily fatal.
    Error(String),
    /// Connection ended.
    Closed(CloseInfo),
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Why a connection ended. Codes follow WebSocket close-code conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub const NORMAL: u16 = 1000;
    pub const ABNORMAL: u16 = 1006;

    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::NORMAL,
            reason: reason.into(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::ABNORMAL,
            reason: reason.into(),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == Self::NORMAL
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "code {}: {}", self.code, self.reason)
        }
    }
}

/// Write side of a live connection.
///
/// Both methods are non-blocking; frames are queued in order.
pub trait Transport: Send + Sync {
    /// Queue one text frame.
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Begin closing. The transport reports completion with `Closed`.
    fn close(&self);
}

/// Factory for transports.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        endpoint: &str,
        events: EventSender,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
