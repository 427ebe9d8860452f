//! In-memory transport.
//!
//! `MemoryConnector` hands out transports whose far end is a `MemoryPeer`
//! controlled by the caller: it records every frame the session writes and
//! lets the caller inject open, message, error, and close events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::{CloseInfo, Connector, EventSender, Transport, TransportEvent};
use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConnectorState {
    peers: Vec<MemoryPeer>,
    fail_next: Option<String>,
}

/// Connector producing in-memory transports. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` fail synchronously with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.lock().fail_next = Some(reason.into());
    }

    /// Number of transports constructed so far.
    pub fn connect_count(&self) -> usize {
        self.lock().peers.len()
    }

    /// Far end of the most recently constructed transport.
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.lock().peers.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        endpoint: &str,
        events: EventSender,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = self.lock();
        if let Some(reason) = state.fail_next.take() {
            return Err(TransportError::Io(reason));
        }

        let link = Arc::new(Link {
            endpoint: endpoint.to_string(),
            events,
            written: Mutex::new(Vec::new()),
            written_notify: Notify::new(),
            closed: AtomicBool::new(false),
        });
        state.peers.push(MemoryPeer {
            link: Arc::clone(&link),
        });
        Ok(Box::new(MemoryTransport { link }))
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

struct Link {
    endpoint: String,
    events: EventSender,
    written: Mutex<Vec<String>>,
    written_notify: Notify,
    closed: AtomicBool,
}

impl Link {
    fn written(&self) -> MutexGuard<'_, Vec<String>> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TransportEvent) {
        // The session may already have dropped its receiver.
        let _ = self.events.send(event);
    }

    /// Mark closed and emit `Closed` once.
    fn close_with(&self, info: CloseInfo) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.emit(TransportEvent::Closed(info));
        }
    }
}

struct MemoryTransport {
    link: Arc<Link>,
}

impl Transport for MemoryTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.link.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.link.written().push(frame);
        self.link.written_notify.notify_waiters();
        Ok(())
    }

    fn close(&self) {
        self.link.close_with(CloseInfo::normal("closed by client"));
    }
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// The remote end of an in-memory transport.
#[derive(Clone)]
pub struct MemoryPeer {
    link: Arc<Link>,
}

impl MemoryPeer {
    pub fn endpoint(&self) -> &str {
        &self.link.endpoint
    }

    /// Complete the handshake.
    pub fn open(&self) {
        self.link.emit(TransportEvent::Opened);
    }

    /// Deliver one inbound frame to the session.
    pub fn deliver(&self, frame: impl Into<String>) {
        self.link.emit(TransportEvent::Message(frame.into()));
    }

    /// Report a transport-level error (does not close).
    pub fn fail(&self, detail: impl Into<String>) {
        self.link.emit(TransportEvent::Error(detail.into()));
    }

    /// Close from the remote side.
    pub fn close(&self, info: CloseInfo) {
        self.link.close_with(info);
    }

    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::Acquire)
    }

    /// Frames written by the session so far.
    pub fn written(&self) -> Vec<String> {
        self.link.written().clone()
    }

    /// Wait until at least `count` frames have been written, then return all of them.
    pub async fn wait_for_written(&self, count: usize) -> Vec<String> {
        loop {
            let notified = self.link.written_notify.notified();
            {
                let written = self.link.written();
                if written.len() >= count {
                    return written.clone();
                }
            }
            notified.await;
        }
    }
}
