use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use livewire_tools::{register_builtin_tools, tool_fn, BoxError, ToolRegistry};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::*;
use crate::transport::memory::{MemoryConnector, MemoryPeer};

const WAIT: Duration = Duration::from_secs(5);

fn registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    register_builtin_tools(&registry).unwrap();
    Arc::new(registry)
}

fn session_with(
    config: SessionConfig,
    registry: Arc<ToolRegistry>,
) -> (Session, MemoryConnector) {
    let connector = MemoryConnector::new();
    let session = Session::new(config, registry, Arc::new(connector.clone()));
    (session, connector)
}

fn session() -> (Session, MemoryConnector) {
    session_with(SessionConfig::new("mem://backend"), registry())
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Connect, complete the handshake, and wait for `Opened`.
async fn open(
    session: &Session,
    connector: &MemoryConnector,
) -> (MemoryPeer, broadcast::Receiver<SessionEvent>) {
    let mut events = session.subscribe();
    assert!(session.connect());
    let peer = connector.last_peer().unwrap();
    peer.open();
    assert_eq!(next_event(&mut events).await, SessionEvent::Opened);
    (peer, events)
}

async fn written(peer: &MemoryPeer, count: usize) -> Vec<Value> {
    tokio::time::timeout(WAIT, peer.wait_for_written(count))
        .await
        .expect("timed out waiting for frames")
        .iter()
        .map(|frame| serde_json::from_str(frame).unwrap())
        .collect()
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn starts_idle() {
    let (session, connector) = session();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.endpoint(), "mem://backend");
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn connect_is_idempotent_while_live() {
    let (session, connector) = session();

    assert!(session.connect());
    assert_eq!(session.state(), SessionState::Connecting);
    assert!(!session.connect());
    assert_eq!(connector.connect_count(), 1);

    connector.last_peer().unwrap().open();
    tokio::time::timeout(WAIT, async {
        while !session.is_open() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("session never opened");
    assert!(!session.connect());
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(connector.last_peer().unwrap().endpoint(), "mem://backend");
}

#[tokio::test]
async fn on_open_fires_once() {
    let (session, connector) = session();
    let opens = counter();
    let seen = Arc::clone(&opens);
    session.on_open(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let (peer, _events) = open(&session, &connector).await;
    // A duplicate open signal is ignored.
    peer.open();
    peer.deliver(r#"{"kind":"data","payload":0}"#);
    tokio::task::yield_now().await;

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert!(session.is_open());
}

#[tokio::test]
async fn close_before_connect_is_a_noop() {
    let (session, connector) = session();
    let mut events = session.subscribe();
    let closes = counter();
    let seen = Arc::clone(&closes);
    session.on_close(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    session.close();

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(closes.load(Ordering::SeqCst), 0);
    assert!(events.try_recv().is_err());

    // Still usable afterwards.
    assert!(session.connect());
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test]
async fn local_close_completes_without_error() {
    let (session, connector) = session();
    let errors = counter();
    let seen = Arc::clone(&errors);
    session.on_error(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let (peer, mut events) = open(&session, &connector).await;

    session.close();

    assert!(peer.is_closed());
    match next_event(&mut events).await {
        SessionEvent::Closed(info) => assert!(info.is_normal()),
        other => panic!("expected Closed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(errors.load(Ordering::SeqCst), 0);

    // Closing again does nothing.
    session.close();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn closed_session_is_single_use() {
    let (session, connector) = session();
    let (peer, mut events) = open(&session, &connector).await;

    peer.close(CloseInfo::normal("bye"));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseInfo::normal("bye"))
    );

    assert!(!session.connect());
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn establish_failure_reports_error_then_close() {
    let (session, connector) = session();
    connector.fail_next("connection refused");
    let mut events = session.subscribe();

    assert!(!session.connect());

    match next_event(&mut events).await {
        SessionEvent::Error(SessionError::Establish(detail)) => {
            assert!(detail.contains("connection refused"));
        }
        other => panic!("expected Establish error, got {other:?}"),
    }
    match next_event(&mut events).await {
        SessionEvent::Closed(info) => assert!(!info.is_normal()),
        other => panic!("expected Closed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn handshake_failure_reports_establish_error() {
    let (session, connector) = session();
    let mut events = session.subscribe();
    assert!(session.connect());

    let peer = connector.last_peer().unwrap();
    peer.fail("handshake rejected");
    peer.close(CloseInfo::abnormal("handshake rejected"));

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Error(SessionError::Establish("handshake rejected".into()))
    );
    assert!(matches!(next_event(&mut events).await, SessionEvent::Closed(_)));
}

#[tokio::test]
async fn abnormal_peer_close_reports_transport_closed() {
    let (session, connector) = session();
    let (peer, mut events) = open(&session, &connector).await;

    peer.close(CloseInfo::abnormal("connection reset"));

    match next_event(&mut events).await {
        SessionEvent::Error(SessionError::TransportClosed(detail)) => {
            assert!(detail.contains("connection reset"));
        }
        other => panic!("expected TransportClosed, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, SessionEvent::Closed(_)));
}

#[tokio::test]
async fn transport_error_while_open_closes_session() {
    let (session, connector) = session();
    let closes = counter();
    let seen = Arc::clone(&closes);
    session.on_close(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let (peer, mut events) = open(&session, &connector).await;

    peer.fail("socket error");

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Error(SessionError::Transport("socket error".into()))
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseInfo::abnormal("socket error"))
    );
    assert_eq!(session.state(), SessionState::Closed);
    assert!(peer.is_closed());
    assert!(!session.send(&Message::data(1)));

    // The transport's own close notification does not fire on_close again.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn transport_error_while_connecting_ends_attempt() {
    let (session, connector) = session();
    let mut events = session.subscribe();
    assert!(session.connect());

    connector.last_peer().unwrap().fail("tls handshake failed");

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Error(SessionError::Establish("tls handshake failed".into()))
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseInfo::abnormal("tls handshake failed"))
    );
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn dropping_last_handle_releases_connecting_session() {
    let (session, connector) = session();
    assert!(session.connect());
    let peer = connector.last_peer().unwrap();
    let inner = Arc::downgrade(session.inner());

    drop(session);
    // A late open must not revive anything.
    peer.open();

    tokio::time::timeout(WAIT, async {
        while inner.upgrade().is_some() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("session state still alive after drop");
    assert!(peer.is_closed());
}

#[tokio::test]
async fn dropping_a_clone_keeps_session_alive() {
    let (session, connector) = session();
    let (peer, _events) = open(&session, &connector).await;

    drop(session.clone());

    assert!(session.is_open());
    assert!(!peer.is_closed());
}

#[tokio::test]
async fn dropping_open_session_fires_on_close() {
    let (session, connector) = session();
    let closes = counter();
    let seen = Arc::clone(&closes);
    session.on_close(move |info| {
        assert!(info.is_normal());
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let (peer, _events) = open(&session, &connector).await;

    drop(session);

    assert!(peer.is_closed());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropping_idle_session_is_silent() {
    let (session, connector) = session();
    let closes = counter();
    let seen = Arc::clone(&closes);
    session.on_close(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    drop(session);

    assert_eq!(closes.load(Ordering::SeqCst), 0);
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn panicking_handler_does_not_stop_the_session() {
    let (session, connector) = session();
    let closes = counter();
    let seen = Arc::clone(&closes);
    session.on_message(|_| panic!("observer bug"));
    session.on_close(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let (peer, mut events) = open(&session, &connector).await;

    peer.deliver(r#"{"kind":"data","payload":1}"#);
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Message(Message::data(1))
    );

    // Tool calls are still answered.
    peer.deliver(r#"{"kind":"toolCall","correlationId":"1","name":"echo","arguments":2}"#);
    assert_eq!(written(&peer, 1).await[0]["value"], 2);

    peer.close(CloseInfo::normal("bye"));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseInfo::normal("bye"))
    );
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_is_rejected_unless_open() {
    let (session, connector) = session();
    let message = Message::data("hello");

    assert_eq!(
        session.try_send(&message),
        Err(SessionError::SendRejected(SessionState::Idle))
    );

    assert!(session.connect());
    assert!(!session.send(&message));
    assert_eq!(
        session.try_send(&message),
        Err(SessionError::SendRejected(SessionState::Connecting))
    );
    assert!(connector.last_peer().unwrap().written().is_empty());
}

#[tokio::test]
async fn send_writes_one_frame_per_message() {
    let (session, connector) = session();
    let (peer, _events) = open(&session, &connector).await;

    assert!(session.send(&Message::data(json!({"text": "hi"}))));
    assert!(session.send(&Message::error("oops")));

    assert_eq!(
        peer.written(),
        vec![
            r#"{"kind":"data","payload":{"text":"hi"}}"#.to_string(),
            r#"{"kind":"error","detail":"oops"}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn oversized_message_is_not_sent() {
    let config = SessionConfig::new("mem://backend").with_max_frame_bytes(32);
    let (session, connector) = session_with(config, registry());
    let (peer, _events) = open(&session, &connector).await;

    let result = session.try_send(&Message::data("x".repeat(64)));

    assert!(matches!(result, Err(SessionError::Encode(_))));
    assert!(peer.written().is_empty());
    assert!(session.is_open());
}

#[tokio::test]
async fn send_after_close_is_rejected() {
    let (session, connector) = session();
    let (peer, mut events) = open(&session, &connector).await;

    session.close();
    assert!(!session.send(&Message::data(1)));
    let _ = next_event(&mut events).await;

    assert_eq!(
        session.try_send(&Message::data(1)),
        Err(SessionError::SendRejected(SessionState::Closed))
    );
    assert!(peer.written().is_empty());
}

// ---------------------------------------------------------------------------
// Receiving
// ---------------------------------------------------------------------------

#[tokio::test]
async fn data_frames_reach_on_message() {
    let (session, connector) = session();
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    session.on_message(move |message| sink.lock().unwrap().push(message));
    let (peer, mut events) = open(&session, &connector).await;

    peer.deliver(r#"{"kind":"data","payload":{"text":"hello"}}"#);

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Message(Message::data(json!({"text": "hello"})))
    );
    assert_eq!(
        *received.lock().unwrap(),
        vec![Message::data(json!({"text": "hello"}))]
    );
}

#[tokio::test]
async fn malformed_frame_reports_one_decode_error() {
    let (session, connector) = session();
    let errors = counter();
    let seen = Arc::clone(&errors);
    session.on_error(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let (peer, mut events) = open(&session, &connector).await;

    peer.deliver("{not json");

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Error(SessionError::Decode(_))
    ));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(session.is_open());

    // The stream continues.
    peer.deliver(r#"{"kind":"data","payload":2}"#);
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Message(Message::data(2))
    );
}

#[tokio::test]
async fn frames_before_open_are_dropped() {
    let (session, connector) = session();
    let mut events = session.subscribe();
    assert!(session.connect());
    let peer = connector.last_peer().unwrap();

    peer.deliver(r#"{"kind":"data","payload":"early"}"#);
    peer.open();
    peer.deliver(r#"{"kind":"data","payload":"late"}"#);

    assert_eq!(next_event(&mut events).await, SessionEvent::Opened);
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Message(Message::data("late"))
    );
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn echo_tool_call_round_trip() {
    let (session, connector) = session();
    let (peer, _events) = open(&session, &connector).await;

    peer.deliver(
        r#"{"kind":"toolCall","correlationId":"1","name":"echo","arguments":{"x":5}}"#,
    );

    let frames = written(&peer, 1).await;
    assert_eq!(
        frames[0],
        json!({"kind": "toolResult", "correlationId": "1", "ok": true, "value": {"x": 5}})
    );
}

#[tokio::test]
async fn tool_calls_do_not_reach_on_message() {
    let (session, connector) = session();
    let messages = counter();
    let seen = Arc::clone(&messages);
    session.on_message(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let (peer, _events) = open(&session, &connector).await;

    peer.deliver(r#"{"kind":"toolCall","correlationId":"7","name":"clock"}"#);

    let frames = written(&peer, 1).await;
    assert_eq!(frames[0]["correlationId"], "7");
    assert!(frames[0]["value"]["utc"].is_string());
    assert_eq!(messages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_tool_reports_not_found() {
    let (session, connector) = session();
    let (peer, _events) = open(&session, &connector).await;

    peer.deliver(
        r#"{"kind":"toolCall","correlationId":"9","name":"nope","arguments":{}}"#,
    );

    let frames = written(&peer, 1).await;
    assert_eq!(frames[0]["ok"], false);
    assert_eq!(frames[0]["correlationId"], "9");
    assert_eq!(frames[0]["error"]["code"], "tool_not_found");
    assert!(session.is_open());
}

#[tokio::test]
async fn failing_tool_reports_execution_failed() {
    let registry = registry();
    registry
        .register(
            "broken",
            tool_fn(|_| async { Err::<Value, BoxError>("disk on fire".into()) }),
        )
        .unwrap();
    let (session, connector) = session_with(SessionConfig::new("mem://backend"), registry);
    let (peer, _events) = open(&session, &connector).await;

    peer.deliver(r#"{"kind":"toolCall","correlationId":"2","name":"broken"}"#);

    let frames = written(&peer, 1).await;
    assert_eq!(frames[0]["ok"], false);
    assert_eq!(frames[0]["error"]["code"], "execution_failed");
    assert!(frames[0]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("disk on fire"));
}

#[tokio::test]
async fn concurrent_tool_calls_keep_their_correlation_ids() {
    let registry = registry();
    registry
        .register(
            "sleep",
            tool_fn(|args: Value| async move {
                let ms = args["ms"].as_u64().unwrap_or_default();
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, BoxError>(json!({ "slept": ms }))
            }),
        )
        .unwrap();
    let (session, connector) = session_with(SessionConfig::new("mem://backend"), registry);
    let (peer, _events) = open(&session, &connector).await;

    peer.deliver(
        r#"{"kind":"toolCall","correlationId":"slow","name":"sleep","arguments":{"ms":200}}"#,
    );
    peer.deliver(
        r#"{"kind":"toolCall","correlationId":"fast","name":"sleep","arguments":{"ms":0}}"#,
    );

    let frames = written(&peer, 2).await;
    // The fast call is not held up behind the slow one.
    assert_eq!(frames[0]["correlationId"], "fast");
    assert_eq!(frames[0]["value"]["slept"], 0);
    assert_eq!(frames[1]["correlationId"], "slow");
    assert_eq!(frames[1]["value"]["slept"], 200);
}

#[tokio::test]
async fn slow_tool_times_out() {
    let registry = registry();
    registry
        .register(
            "stall",
            tool_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, BoxError>(Value::Null)
            }),
        )
        .unwrap();
    let config =
        SessionConfig::new("mem://backend").with_tool_timeout(Duration::from_millis(20));
    let (session, connector) = session_with(config, registry);
    let (peer, _events) = open(&session, &connector).await;

    peer.deliver(r#"{"kind":"toolCall","correlationId":"t","name":"stall"}"#);

    let frames = written(&peer, 1).await;
    assert_eq!(frames[0]["ok"], false);
    assert_eq!(frames[0]["correlationId"], "t");
    assert_eq!(frames[0]["error"]["code"], "timeout");
}

/// Counts live tool futures; decremented when a future is dropped.
struct Live(Arc<AtomicUsize>);

impl Drop for Live {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn peer_close_cancels_in_flight_tools() {
    let live = counter();
    let registry = registry();
    let tracked = Arc::clone(&live);
    registry
        .register(
            "hang",
            tool_fn(move |_| {
                let tracked = Arc::clone(&tracked);
                async move {
                    tracked.fetch_add(1, Ordering::SeqCst);
                    let _guard = Live(tracked);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, BoxError>(Value::Null)
                }
            }),
        )
        .unwrap();
    let (session, connector) = session_with(SessionConfig::new("mem://backend"), registry);
    let closes = counter();
    let seen = Arc::clone(&closes);
    session.on_close(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let (peer, mut events) = open(&session, &connector).await;

    for id in ["a", "b", "c"] {
        peer.deliver(format!(
            r#"{{"kind":"toolCall","correlationId":"{id}","name":"hang"}}"#
        ));
    }
    tokio::time::timeout(WAIT, async {
        while live.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("tools never started");
    assert_eq!(session.in_flight_tools(), 3);

    peer.close(CloseInfo::normal("server going away"));

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Closed(CloseInfo::normal("server going away"))
    );
    tokio::time::timeout(WAIT, session.tools_finished())
        .await
        .expect("tool tasks still running");

    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(session.in_flight_tools(), 0);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(peer.written().is_empty());
}

#[tokio::test]
async fn closed_resolves_after_close() {
    let (session, connector) = session();
    let (peer, _events) = open(&session, &connector).await;

    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.closed().await })
    };
    peer.close(CloseInfo::normal(""));

    tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}
