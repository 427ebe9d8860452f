//! WebSocket transport over `tokio-tungstenite`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::{CloseInfo, Connector, EventSender, Transport, TransportEvent};
use crate::error::TransportError;

/// How long to wait for the peer to answer our close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Connector for `ws://` and `wss://` endpoints.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        endpoint: &str,
        events: EventSender,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let request = endpoint
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Io(format!("no tokio runtime: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        runtime.spawn(socket_task(request, self.connect_timeout, command_rx, events));
        Ok(Box::new(WebSocketTransport {
            commands: command_tx,
        }))
    }
}

// ---------------------------------------------------------------------------
// Transport handle
// ---------------------------------------------------------------------------

enum Command {
    Send(String),
    Close,
}

struct WebSocketTransport {
    commands: mpsc::UnboundedSender<Command>,
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

/// Owns the socket: connects, pumps frames both ways, reports `Closed` once.
async fn socket_task(
    request: Request,
    connect_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventSender,
) {
    let uri = request.uri().clone();
    let connect = tokio::time::timeout(connect_timeout, connect_async(request));
    let connected = tokio::select! {
        result = connect => result,
        // Only `Close` (or a dropped handle) can arrive before the session is open.
        _ = commands.recv() => {
            debug!(endpoint = %uri, "Connect abandoned");
            let _ = events.send(TransportEvent::Closed(CloseInfo::normal("closed by client")));
            return;
        }
    };
    let ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            error!(endpoint = %uri, error = %e, "WebSocket connect failed");
            let _ = events.send(TransportEvent::Error(format!("connect failed: {e}")));
            let _ = events.send(TransportEvent::Closed(CloseInfo::abnormal("connect failed")));
            return;
        }
        Err(_elapsed) => {
            error!(
                endpoint = %uri,
                timeout_secs = connect_timeout.as_secs(),
                "WebSocket connect timed out"
            );
            let _ = events.send(TransportEvent::Error(format!(
                "connect timed out after {}s",
                connect_timeout.as_secs()
            )));
            let _ = events.send(TransportEvent::Closed(CloseInfo::abnormal(
                "connect timed out",
            )));
            return;
        }
    };

    info!(endpoint = %uri, "WebSocket connected");
    let _ = events.send(TransportEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    let mut closing = false;
    let mut close_info: Option<CloseInfo> = None;
    let grace = tokio::time::sleep(CLOSE_GRACE);
    tokio::pin!(grace);

    loop {
        tokio::select! {
            command = commands.recv(), if !closing => match command {
                Some(Command::Send(frame)) => {
                    if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                        warn!(error = %e, "WebSocket send failed");
                        let _ = events.send(TransportEvent::Error(format!("send failed: {e}")));
                        close_info = Some(CloseInfo::abnormal("send failed"));
                        break;
                    }
                }
                // An explicit close, or every handle dropped.
                Some(Command::Close) | None => {
                    debug!(endpoint = %uri, "Sending close frame");
                    closing = true;
                    grace
                        .as_mut()
                        .reset(tokio::time::Instant::now() + CLOSE_GRACE);
                    if sink.send(WsMessage::Close(None)).await.is_err() {
                        break;
                    }
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(TransportEvent::Message(text));
                    }
                    Err(_) => {
                        let _ = events.send(TransportEvent::Error(
                            "binary frame is not valid UTF-8".into(),
                        ));
                    }
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    close_info = Some(match frame {
                        Some(frame) => CloseInfo {
                            code: u16::from(frame.code),
                            reason: frame.reason.to_string(),
                        },
                        None => CloseInfo::normal(""),
                    });
                    info!(endpoint = %uri, "WebSocket closed by peer");
                    break;
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if !closing {
                        warn!(error = %e, "WebSocket error");
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        close_info = Some(CloseInfo::abnormal(e.to_string()));
                    }
                    break;
                }
                None => break,
            },

            _ = &mut grace, if closing => {
                debug!(endpoint = %uri, "Close handshake timed out");
                break;
            }
        }
    }

    // Flush a pending close reply, if any.
    let _ = sink.close().await;

    let info = close_info.unwrap_or_else(|| {
        if closing {
            CloseInfo::normal("closed by client")
        } else {
            CloseInfo::abnormal("connection lost")
        }
    });
    let _ = events.send(TransportEvent::Closed(info));
}
