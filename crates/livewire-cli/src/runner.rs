//! Session owner: drives one session at a time and reconnects by building
//! a fresh `Session` per attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use livewire_session::{CloseInfo, Connector, Message, Session, SessionConfig, SessionEvent};
use livewire_tools::ToolRegistry;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::reconnect::Backoff;

/// How long to wait for a graceful close on exit.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Why the runner returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// Shutdown was requested.
    Shutdown,
    /// Input ended.
    InputClosed,
    /// The session ended and reconnecting is disabled.
    Ended(CloseInfo),
    /// Reconnect attempts are exhausted.
    GaveUp,
}

enum Ended {
    Closed(CloseInfo),
    Exit(Exit),
}

pub struct Runner {
    config: SessionConfig,
    registry: Arc<ToolRegistry>,
    connector: Arc<dyn Connector>,
    /// `None` disables reconnecting.
    backoff: Option<Backoff>,
}

impl Runner {
    pub fn new(
        config: SessionConfig,
        registry: Arc<ToolRegistry>,
        connector: Arc<dyn Connector>,
        backoff: Option<Backoff>,
    ) -> Self {
        Self {
            config,
            registry,
            connector,
            backoff,
        }
    }

    /// Forward `input` lines to the current session until input ends,
    /// `shutdown` resolves, or the reconnect policy gives up.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<String>,
        shutdown: impl Future<Output = ()>,
    ) -> Exit {
        tokio::pin!(shutdown);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let session = Session::new(
                self.config.clone(),
                Arc::clone(&self.registry),
                Arc::clone(&self.connector),
            );
            let mut events = session.subscribe();
            info!(
                attempt,
                session = %session.id(),
                endpoint = %session.endpoint(),
                "Starting session"
            );
            session.connect();

            let info = match self
                .drive(&session, &mut events, &mut input, shutdown.as_mut())
                .await
            {
                Ended::Exit(exit) => return exit,
                Ended::Closed(info) => info,
            };

            let Some(backoff) = self.backoff.as_mut() else {
                info!(code = info.code, reason = %info.reason, "Session ended; reconnect disabled");
                return Exit::Ended(info);
            };
            let Some(delay) = backoff.next_delay() else {
                warn!(failures = backoff.failures(), "Giving up after repeated failures");
                return Exit::GaveUp;
            };

            info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.as_mut() => return Exit::Shutdown,
            }
        }
    }

    async fn drive(
        &mut self,
        session: &Session,
        events: &mut broadcast::Receiver<SessionEvent>,
        input: &mut mpsc::Receiver<String>,
        mut shutdown: std::pin::Pin<&mut impl Future<Output = ()>>,
    ) -> Ended {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(SessionEvent::Opened) => {
                        if let Some(backoff) = self.backoff.as_mut() {
                            backoff.reset();
                        }
                    }
                    Ok(SessionEvent::Message(message)) => print_message(&message),
                    Ok(SessionEvent::Error(e)) => {
                        warn!(session = %session.id(), error = %e, "Session error");
                    }
                    Ok(SessionEvent::Closed(info)) => return Ended::Closed(info),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(session = %session.id(), skipped, "Event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Ended::Closed(CloseInfo::abnormal("event channel closed"));
                    }
                },

                line = input.recv() => match line {
                    Some(line) => {
                        if let Err(e) = session.try_send(&parse_line(&line)) {
                            warn!(session = %session.id(), error = %e, "Input not sent");
                        }
                    }
                    None => {
                        close_and_wait(session).await;
                        return Ended::Exit(Exit::InputClosed);
                    }
                },

                _ = shutdown.as_mut() => {
                    close_and_wait(session).await;
                    return Ended::Exit(Exit::Shutdown);
                }
            }
        }
    }
}

/// Close an open session and wait briefly for the peer to acknowledge.
/// A session that is still connecting is left to its drop, which abandons
/// the attempt.
async fn close_and_wait(session: &Session) {
    if !session.is_open() {
        debug!(
            session = %session.id(),
            state = %session.state(),
            "Not open, skipping graceful close"
        );
        return;
    }
    session.close();
    if tokio::time::timeout(CLOSE_GRACE, session.closed()).await.is_err() {
        debug!(
            session = %session.id(),
            state = %session.state(),
            "Session did not close in time"
        );
    }
}

/// A line of valid JSON is sent as-is; anything else as a JSON string.
fn parse_line(line: &str) -> Message {
    let payload = serde_json::from_str::<Value>(line)
        .unwrap_or_else(|_| Value::String(line.to_string()));
    Message::data(payload)
}

fn print_message(message: &Message) {
    match message {
        Message::Data { payload } => println!("{payload}"),
        Message::Error { detail } => {
            warn!(detail = %detail, "Peer reported an error");
            eprintln!("error: {detail}");
        }
        other => debug!(kind = other.kind(), "Ignoring unexpected message"),
    }
}
