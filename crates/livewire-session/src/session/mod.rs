//! The streaming session.
//!
//! ```text
//! Idle ──connect()──▶ Connecting ──opened──▶ Open ──close()──▶ Closing ──closed──▶ Closed
//!                         │                   │                                  ▲
//!                         └──── failure ──────┴──────── peer close / error ──────┘
//! ```
//!
//! A session is single-use: once `Closed` it never reconnects. Owners that
//! want to reconnect build a new `Session`. Dropping the last handle to a
//! connecting or open session closes its transport.

mod dispatch;
mod handlers;
mod inner;
mod types;

#[cfg(test)]
mod tests;

use std::sync::{Arc, PoisonError};

use livewire_common::SessionId;
use livewire_tools::ToolRegistry;
use tokio::sync::broadcast;

use crate::error::SessionError;
use crate::protocol::Message;
use crate::transport::{CloseInfo, Connector};

use inner::Inner;

pub use types::{SessionConfig, SessionEvent, SessionState};

/// Handle to one streaming session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    handle: Arc<Handle>,
}

/// Owner-side reference. Internal tasks hold `Inner` directly, so only the
/// last `Session` clone dropping this releases the session.
struct Handle {
    inner: Arc<Inner>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.inner.abandon();
    }
}

impl Session {
    /// Create an idle session. Nothing touches the network until `connect`.
    pub fn new(
        config: SessionConfig,
        registry: Arc<ToolRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            handle: Arc::new(Handle {
                inner: Arc::new(Inner::new(config, registry, connector)),
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.inner().id
    }

    pub fn endpoint(&self) -> &str {
        &self.inner().config.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.inner().state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Start connecting. Only acts from `Idle`; returns whether a transport
    /// was created. Must be called inside a tokio runtime.
    pub fn connect(&self) -> bool {
        self.inner().connect()
    }

    /// Send `message` if the session is `Open`.
    pub fn try_send(&self, message: &Message) -> Result<(), SessionError> {
        self.inner().try_send(message)
    }

    /// Like `try_send`, reporting only whether the frame was handed to the transport.
    pub fn send(&self, message: &Message) -> bool {
        self.try_send(message).is_ok()
    }

    /// Begin a graceful close. A no-op unless `Open`; to abandon a pending
    /// connect, drop every handle.
    pub fn close(&self) {
        self.inner().close();
    }

    pub fn on_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers_mut(|h| h.on_open = Some(Arc::new(f)));
    }

    pub fn on_message<F>(&self, f: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.handlers_mut(|h| h.on_message = Some(Arc::new(f)));
    }

    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(SessionError) + Send + Sync + 'static,
    {
        self.handlers_mut(|h| h.on_error = Some(Arc::new(f)));
    }

    pub fn on_close<F>(&self, f: F)
    where
        F: Fn(CloseInfo) + Send + Sync + 'static,
    {
        self.handlers_mut(|h| h.on_close = Some(Arc::new(f)));
    }

    /// Receive every event after this call. Slow receivers may lag.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner().subscribe()
    }

    /// Tool calls currently running.
    pub fn in_flight_tools(&self) -> usize {
        self.inner().tasks.len()
    }

    /// Resolves once the session is `Closed`.
    pub async fn closed(&self) {
        self.inner().cancel.cancelled().await;
    }

    /// Resolves once the session is `Closed` and every tool task has exited.
    pub async fn tools_finished(&self) {
        self.inner().tasks.wait().await;
    }

    fn inner(&self) -> &Arc<Inner> {
        &self.handle.inner
    }

    fn handlers_mut(&self, f: impl FnOnce(&mut handlers::Handlers)) {
        let mut handlers = self
            .inner()
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut handlers);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner().id)
            .field("endpoint", &self.inner().config.endpoint)
            .field("state", &self.state())
            .finish()
    }
}
