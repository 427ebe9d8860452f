//! Session and transport error types.

use livewire_common::LivewireError;

use crate::protocol::CodecError;
use crate::session::SessionState;

/// Errors surfaced through `on_error` or returned from `try_send`.
///
/// None of these are fatal to the process; only `TransportClosed` and a
/// failed `Establish` coincide with the session ending.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("failed to establish connection: {0}")]
    Establish(String),

    #[error("failed to decode frame: {0}")]
    Decode(CodecError),

    #[error("send rejected: session is {0}")]
    SendRejected(SessionState),

    #[error("failed to encode message: {0}")]
    Encode(CodecError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport closed: {0}")]
    TransportClosed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("transport is closed")]
    Closed,

    #[error("transport i/o error: {0}")]
    Io(String),
}

impl From<SessionError> for LivewireError {
    fn from(err: SessionError) -> Self {
        LivewireError::Session(err.to_string())
    }
}

impl From<TransportError> for LivewireError {
    fn from(err: TransportError) -> Self {
        LivewireError::Transport(err.to_string())
    }
}
