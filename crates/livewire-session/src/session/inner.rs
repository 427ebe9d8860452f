//! Shared session state and its transitions.
//!
//! `state` and the transport handle sit behind one mutex, so a send can
//! never slip through after the session has left `Open`. Callbacks always
//! fire after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use livewire_common::SessionId;
use livewire_tools::ToolRegistry;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::protocol::{Codec, Message};
use crate::transport::{CloseInfo, Connector, Transport};

use super::dispatch::run_event_loop;
use super::handlers::Handlers;
use super::types::{SessionConfig, SessionEvent, SessionState};

struct Core {
    state: SessionState,
    transport: Option<Box<dyn Transport>>,
    /// `close()` was called locally.
    close_requested: bool,
    /// `on_close` has fired.
    finished: bool,
}

pub(crate) struct Inner {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) codec: Codec,
    pub(crate) registry: Arc<ToolRegistry>,
    connector: Arc<dyn Connector>,
    core: Mutex<Core>,
    pub(crate) handlers: RwLock<Handlers>,
    events: broadcast::Sender<SessionEvent>,
    /// Cancelled on entry to `Closed`; stops in-flight tool tasks.
    pub(crate) cancel: CancellationToken,
    pub(crate) tasks: TaskTracker,
}

impl Inner {
    pub(crate) fn new(
        config: SessionConfig,
        registry: Arc<ToolRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            id: SessionId::new(),
            codec: Codec::new(config.max_frame_bytes),
            config,
            registry,
            connector,
            core: Mutex::new(Core {
                state: SessionState::Idle,
                transport: None,
                close_requested: false,
                finished: false,
            }),
            handlers: RwLock::new(Handlers::default()),
            events,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, core: &mut Core, to: SessionState) {
        debug!(session = %self.id, from = %core.state, to = %to, "State transition");
        core.state = to;
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock().state
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Fire the matching callback, then fan out to subscribers.
    pub(crate) fn emit(&self, event: SessionEvent) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        handlers.fire(&event);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Caller-driven transitions
    // -----------------------------------------------------------------------

    /// `Idle → Connecting`. Returns whether a transport was created.
    pub(crate) fn connect(self: &Arc<Self>) -> bool {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let failure = {
            let mut core = self.lock();
            match core.state {
                SessionState::Idle => {}
                SessionState::Connecting | SessionState::Open => {
                    warn!(
                        session = %self.id,
                        state = %core.state,
                        "connect() ignored: session already live"
                    );
                    return false;
                }
                SessionState::Closing | SessionState::Closed => {
                    warn!(
                        session = %self.id,
                        state = %core.state,
                        "connect() ignored: sessions are single-use"
                    );
                    return false;
                }
            }

            self.transition(&mut core, SessionState::Connecting);
            info!(session = %self.id, endpoint = %self.config.endpoint, "Connecting");

            match tokio::runtime::Handle::try_current() {
                Err(e) => Some(format!("no tokio runtime: {e}")),
                Ok(runtime) => match self.connector.connect(&self.config.endpoint, event_tx) {
                    Ok(transport) => {
                        core.transport = Some(transport);
                        runtime.spawn(run_event_loop(Arc::clone(self), event_rx));
                        None
                    }
                    Err(e) => Some(e.to_string()),
                },
            }
        };

        match failure {
            None => true,
            Some(detail) => {
                warn!(session = %self.id, error = %detail, "Failed to establish transport");
                self.emit(SessionEvent::Error(SessionError::Establish(detail.clone())));
                self.finish(CloseInfo::abnormal(detail));
                false
            }
        }
    }

    pub(crate) fn try_send(&self, message: &Message) -> Result<(), SessionError> {
        let frame = self.codec.encode(message).map_err(|e| {
            warn!(
                session = %self.id,
                kind = message.kind(),
                error = %e,
                "Failed to encode message"
            );
            SessionError::Encode(e)
        })?;

        let core = self.lock();
        let transport = match (core.state, core.transport.as_ref()) {
            (SessionState::Open, Some(transport)) => transport,
            (state, _) => {
                warn!(
                    session = %self.id,
                    state = %state,
                    kind = message.kind(),
                    "Send rejected: session not open"
                );
                return Err(SessionError::SendRejected(state));
            }
        };

        transport.send(frame).map_err(|e| {
            warn!(session = %self.id, error = %e, "Transport write failed");
            SessionError::Transport(e.to_string())
        })
    }

    /// `Open → Closing`. The transport's `Closed` event completes the close.
    pub(crate) fn close(&self) {
        let mut core = self.lock();
        if core.state != SessionState::Open {
            debug!(session = %self.id, state = %core.state, "close() ignored: session not open");
            return;
        }
        core.close_requested = true;
        self.transition(&mut core, SessionState::Closing);
        info!(session = %self.id, "Closing session");
        if let Some(transport) = core.transport.as_ref() {
            transport.close();
        }
    }

    // -----------------------------------------------------------------------
    // Transport-driven transitions
    // -----------------------------------------------------------------------

    /// `Connecting → Open`.
    pub(crate) fn handle_opened(&self) {
        {
            let mut core = self.lock();
            if core.state != SessionState::Connecting {
                debug!(session = %self.id, state = %core.state, "Ignoring late open signal");
                return;
            }
            self.transition(&mut core, SessionState::Open);
        }
        info!(session = %self.id, "Session open");
        self.emit(SessionEvent::Opened);
    }

    /// A transport error ends a connecting or open session.
    pub(crate) fn handle_transport_error(&self, detail: String) {
        let (prior, transport) = {
            let mut core = self.lock();
            let prior = core.state;
            match prior {
                SessionState::Connecting => (prior, core.transport.take()),
                SessionState::Open => {
                    self.transition(&mut core, SessionState::Closing);
                    (prior, core.transport.take())
                }
                SessionState::Closing => (prior, None),
                SessionState::Idle | SessionState::Closed => {
                    debug!(
                        session = %self.id,
                        state = %prior,
                        error = %detail,
                        "Ignoring transport error"
                    );
                    return;
                }
            }
        };

        let error = match prior {
            SessionState::Connecting => SessionError::Establish(detail.clone()),
            _ => SessionError::Transport(detail.clone()),
        };
        warn!(session = %self.id, error = %error, "Transport error");
        self.emit(SessionEvent::Error(error));

        if let Some(transport) = transport {
            transport.close();
            drop(transport);
            self.finish(CloseInfo::abnormal(detail));
        }
    }

    /// The last `Session` handle is gone: close the transport and finish.
    /// Nothing happens for a session that never connected.
    pub(crate) fn abandon(&self) {
        let transport = {
            let mut core = self.lock();
            if core.finished || core.state == SessionState::Idle {
                return;
            }
            core.close_requested = true;
            core.transport.take()
        };
        debug!(session = %self.id, "Session dropped, releasing transport");
        if let Some(transport) = transport {
            transport.close();
        }
        self.finish(CloseInfo::normal("session dropped"));
    }

    /// Enter `Closed`, release the transport, cancel tool tasks, and fire
    /// `on_close`. Runs at most once.
    pub(crate) fn finish(&self, info: CloseInfo) {
        let (transport, prior, close_requested) = {
            let mut core = self.lock();
            if core.finished {
                return;
            }
            core.finished = true;
            let prior = core.state;
            if prior == SessionState::Open {
                self.transition(&mut core, SessionState::Closing);
            }
            self.transition(&mut core, SessionState::Closed);
            (core.transport.take(), prior, core.close_requested)
        };
        drop(transport);

        self.cancel.cancel();
        self.tasks.close();

        if prior == SessionState::Open && !close_requested && !info.is_normal() {
            self.emit(SessionEvent::Error(SessionError::TransportClosed(
                info.to_string(),
            )));
        }

        info!(session = %self.id, code = info.code, reason = %info.reason, "Session closed");
        self.emit(SessionEvent::Closed(info));
    }
}
