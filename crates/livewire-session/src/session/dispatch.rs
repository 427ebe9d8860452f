//! Inbound event loop and tool-call dispatch.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::protocol::{Message, ToolCallRequest, ToolCallResult};
use crate::transport::{CloseInfo, TransportEvent};

use super::inner::Inner;
use super::types::{SessionEvent, SessionState};

/// Drain transport events until the transport reports `Closed`.
pub(crate) async fn run_event_loop(
    inner: Arc<Inner>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Opened => inner.handle_opened(),
            TransportEvent::Message(frame) => handle_frame(&inner, &frame),
            TransportEvent::Error(detail) => inner.handle_transport_error(detail),
            TransportEvent::Closed(info) => {
                inner.finish(info);
                return;
            }
        }
    }

    // Every sender dropped without a close notification.
    inner.finish(CloseInfo::abnormal("transport dropped"));
}

fn handle_frame(inner: &Arc<Inner>, frame: &str) {
    let state = inner.state();
    if state != SessionState::Open {
        debug!(session = %inner.id, state = %state, "Dropping frame: session not open");
        return;
    }

    match inner.codec.decode(frame) {
        Ok(Message::ToolCall(request)) => spawn_tool_call(inner, request),
        Ok(message) => inner.emit(SessionEvent::Message(message)),
        Err(e) => {
            warn!(session = %inner.id, error = %e, "Dropping undecodable frame");
            inner.emit(SessionEvent::Error(SessionError::Decode(e)));
        }
    }
}

fn spawn_tool_call(inner: &Arc<Inner>, request: ToolCallRequest) {
    debug!(
        session = %inner.id,
        tool = %request.name,
        correlation_id = %request.correlation_id,
        "Dispatching tool call"
    );
    inner
        .tasks
        .spawn(run_tool_call(Arc::clone(inner), request));
}

/// Run one tool and write back its result. Abandoned if the session closes first.
async fn run_tool_call(inner: Arc<Inner>, request: ToolCallRequest) {
    let ToolCallRequest {
        correlation_id,
        name,
        arguments,
    } = request;

    let outcome = tokio::select! {
        biased;
        _ = inner.cancel.cancelled() => {
            debug!(
                session = %inner.id,
                tool = %name,
                correlation_id = %correlation_id,
                "Tool call cancelled"
            );
            return;
        }
        outcome = inner
            .registry
            .invoke_with_timeout(&name, arguments, inner.config.tool_timeout) => outcome,
    };

    let result = ToolCallResult::from_outcome(correlation_id, outcome);
    if let Err(e) = inner.try_send(&Message::ToolResult(result)) {
        warn!(session = %inner.id, tool = %name, error = %e, "Could not deliver tool result");
    }
}
