//! Scenario tests for [`StatusChannelClient`] driven through [`MockConnector`].
//!
//! Time is paused, so retry delays are advanced explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anidl_core::{Error, StatusEvent};
use tokio::sync::mpsc;

use super::*;
use crate::test_utils::{status_frame, MockConnection, MockConnector, RUNNING_FRAME};

const RETRY: Duration = Duration::from_millis(3000);

type Received = Arc<Mutex<Vec<StatusEvent>>>;

fn origin() -> StaticOrigin {
    StaticOrigin::new(PageOrigin::new(false, "localhost:8091"))
}

fn options(max_reconnect_attempts: u32) -> ChannelOptions {
    ChannelOptions {
        reconnect_interval: RETRY,
        max_reconnect_attempts,
        host_override: None,
    }
}

fn new_client(
    max_reconnect_attempts: u32,
) -> (
    StatusChannelClient,
    MockConnector,
    mpsc::UnboundedReceiver<MockConnection>,
) {
    let (connector, opened) = MockConnector::new();
    let client = StatusChannelClient::new(&origin(), connector.clone(), options(max_reconnect_attempts))
        .expect("client");
    (client, connector, opened)
}

fn recorder() -> (Received, impl FnMut(&StatusEvent) + Send + 'static) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    (received, move |event: &StatusEvent| {
        sink.lock().unwrap().push(event.clone())
    })
}

/// Let spawned pump and timer tasks run.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn next_connection(opened: &mut mpsc::UnboundedReceiver<MockConnection>) -> MockConnection {
    settle().await;
    opened.try_recv().expect("expected a new connection attempt")
}

fn running() -> StatusEvent {
    StatusEvent::new("running", "2024-01-01T00:00:00Z", false)
}

// ─────────────────────────────────────────────────────────
// Construction
// ─────────────────────────────────────────────────────────

#[test]
fn test_new_outside_runtime_fails() {
    let (connector, _opened) = MockConnector::new();
    let err = StatusChannelClient::new(&origin(), connector, ChannelOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NoRuntime));
}

#[tokio::test]
async fn test_address_derived_once_at_construction() {
    let (connector, mut opened) = MockConnector::new();
    let client = StatusChannelClient::new(
        &StaticOrigin::new(PageOrigin::new(true, "ui.example.com")),
        connector,
        ChannelOptions {
            host_override: Some("nas.local:8091".into()),
            ..ChannelOptions::default()
        },
    )
    .unwrap();

    assert_eq!(client.url(), "wss://nas.local:8091/api/v1/ws");
    assert_eq!(client.state(), ChannelState::Idle);
    assert!(!client.is_connected());

    client.start(|_| {});
    let conn = next_connection(&mut opened).await;
    assert_eq!(conn.url, "wss://nas.local:8091/api/v1/ws");
}

// ─────────────────────────────────────────────────────────
// Delivery
// ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_status_update_delivered_exactly_once() {
    let (client, _connector, mut opened) = new_client(10);
    let (received, callback) = recorder();

    client.start(callback);
    let conn = next_connection(&mut opened).await;
    assert_eq!(client.state(), ChannelState::Connecting);
    assert!(!client.is_connected());

    conn.open();
    settle().await;
    assert_eq!(client.state(), ChannelState::Open);
    assert!(client.is_connected());

    conn.send_text(RUNNING_FRAME);
    settle().await;
    assert_eq!(*received.lock().unwrap(), vec![running()]);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_changes_nothing() {
    let (client, _connector, mut opened) = new_client(10);
    let (received, callback) = recorder();

    client.start(callback);
    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;

    conn.send_text(r#"{"type":"heartbeat"}"#);
    settle().await;

    assert!(received.lock().unwrap().is_empty());
    assert!(client.is_connected());
    assert_eq!(client.state(), ChannelState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_frames_are_dropped_and_connection_stays_open() {
    let (client, connector, mut opened) = new_client(10);
    let (received, callback) = recorder();

    client.start(callback);
    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;

    for payload in [
        "definitely not json",
        "{\"type\":",
        "null",
        r#"{"data":{"status":"running","last_check":"x","has_error":false}}"#,
        r#"{"type":"status_update"}"#,
        r#"{"type":"STATUS_UPDATE","data":{"status":"running","last_check":"x","has_error":false}}"#,
    ] {
        conn.send_text(payload);
    }
    settle().await;

    assert!(received.lock().unwrap().is_empty());
    assert!(client.is_connected());
    assert_eq!(connector.open_count(), 1);

    // The connection still delivers afterwards.
    conn.send_text(RUNNING_FRAME);
    settle().await;
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_preserves_arrival_order() {
    let (client, _connector, mut opened) = new_client(10);
    let (received, callback) = recorder();

    client.start(callback);
    let conn = next_connection(&mut opened).await;
    conn.open();

    let labels = ["stopped", "running", "checking", "running", "stopped"];
    for (i, label) in labels.iter().enumerate() {
        conn.send_text(&status_frame(label, &format!("2024-01-01T00:00:0{i}Z"), false));
    }
    settle().await;

    let got: Vec<String> = received
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.status.clone())
        .collect();
    assert_eq!(got, labels);
}

// ─────────────────────────────────────────────────────────
// Single connection
// ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_repeated_start_keeps_one_connection_and_rebinds() {
    let (client, connector, mut opened) = new_client(10);
    let (first, first_cb) = recorder();
    let (second, second_cb) = recorder();

    client.start(first_cb);
    let conn = next_connection(&mut opened).await;

    // While connecting.
    client.start(|_| {});
    settle().await;
    assert_eq!(connector.open_count(), 1);

    conn.open();
    settle().await;

    // While open.
    client.start(second_cb);
    settle().await;
    assert_eq!(connector.open_count(), 1);
    assert!(opened.try_recv().is_err());
    assert_eq!(client.state(), ChannelState::Open);

    conn.send_text(RUNNING_FRAME);
    settle().await;
    assert!(first.lock().unwrap().is_empty());
    assert_eq!(*second.lock().unwrap(), vec![running()]);
}

// ─────────────────────────────────────────────────────────
// Reconnection
// ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_retries_after_fixed_delay() {
    let (client, connector, mut opened) = new_client(10);
    client.start(|_| {});

    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;
    conn.close();
    settle().await;

    assert_eq!(client.state(), ChannelState::ClosedRetrying { attempt: 1 });
    assert_eq!(client.attempts(), 1);
    assert!(!client.is_connected());

    tokio::time::advance(RETRY - Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(connector.open_count(), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    let retry = next_connection(&mut opened).await;
    assert_eq!(connector.open_count(), 2);
    assert_eq!(client.state(), ChannelState::Connecting);

    // Second attempt fails too: counter reaches 2 and another delay is scheduled.
    retry.refuse();
    settle().await;
    assert_eq!(client.attempts(), 2);
    assert_eq!(client.state(), ChannelState::ClosedRetrying { attempt: 2 });
    assert!(opened.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_resets_attempts() {
    let (client, _connector, mut opened) = new_client(10);
    let (received, callback) = recorder();
    client.start(callback);

    let conn = next_connection(&mut opened).await;
    conn.refuse();
    settle().await;
    assert_eq!(client.attempts(), 1);

    tokio::time::advance(RETRY).await;
    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;
    assert_eq!(client.attempts(), 0);
    assert!(client.is_connected());

    conn.send_text(RUNNING_FRAME);
    settle().await;
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_retries_then_shutdown() {
    let max = 3;
    let (client, connector, mut opened) = new_client(max);
    let mut state_rx = client.subscribe_state();
    client.start(|_| {});

    let conn = next_connection(&mut opened).await;
    conn.refuse();
    for _ in 0..max {
        settle().await;
        tokio::time::advance(RETRY).await;
        let conn = next_connection(&mut opened).await;
        conn.refuse();
    }
    settle().await;

    assert_eq!(connector.open_count(), (max + 1) as usize);
    assert_eq!(
        client.state(),
        ChannelState::Shutdown(ShutdownReason::RetriesExhausted)
    );
    assert_eq!(
        *state_rx.borrow_and_update(),
        ChannelState::Shutdown(ShutdownReason::RetriesExhausted)
    );

    tokio::time::sleep(RETRY * 10).await;
    settle().await;
    assert_eq!(connector.open_count(), (max + 1) as usize);
}

#[tokio::test(start_paused = true)]
async fn test_connection_that_opens_then_drops_retries_without_limit() {
    // Every successful open resets the counter, so the limit only bounds
    // consecutive failed handshakes.
    let max = 2;
    let (client, connector, mut opened) = new_client(max);
    client.start(|_| {});

    let first = next_connection(&mut opened).await;
    first.open();
    settle().await;
    first.close();

    let cycles = max * 3;
    for _ in 0..cycles {
        settle().await;
        assert_eq!(client.state(), ChannelState::ClosedRetrying { attempt: 1 });
        tokio::time::advance(RETRY).await;

        let conn = next_connection(&mut opened).await;
        conn.open();
        settle().await;
        assert_eq!(client.attempts(), 0);
        conn.close();
    }
    settle().await;

    assert_eq!(connector.open_count(), (cycles + 1) as usize);
    assert!(!client.state().is_shutdown());
}

#[tokio::test(start_paused = true)]
async fn test_start_after_exhaustion_fully_resets() {
    let (client, connector, mut opened) = new_client(1);
    client.start(|_| {});

    next_connection(&mut opened).await.refuse();
    settle().await;
    tokio::time::advance(RETRY).await;
    next_connection(&mut opened).await.refuse();
    settle().await;
    assert!(client.state().is_shutdown());
    assert_eq!(client.attempts(), 1);

    let (received, callback) = recorder();
    client.start(callback);
    assert_eq!(client.attempts(), 0);
    assert_eq!(client.state(), ChannelState::Connecting);

    let conn = next_connection(&mut opened).await;
    assert_eq!(connector.open_count(), 3);
    conn.open();
    conn.send_text(RUNNING_FRAME);
    settle().await;
    assert_eq!(*received.lock().unwrap(), vec![running()]);
}

#[tokio::test(start_paused = true)]
async fn test_stream_end_without_close_event_counts_as_close() {
    let (client, _connector, mut opened) = new_client(10);
    client.start(|_| {});

    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;
    drop(conn);
    settle().await;

    assert_eq!(client.state(), ChannelState::ClosedRetrying { attempt: 1 });
}

// ─────────────────────────────────────────────────────────
// Stop
// ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stop_during_retry_delay_prevents_reconnect() {
    let (client, connector, mut opened) = new_client(10);
    client.start(|_| {});

    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;
    conn.close();
    settle().await;
    assert_eq!(client.state(), ChannelState::ClosedRetrying { attempt: 1 });

    client.stop();
    tokio::time::sleep(RETRY * 3).await;
    settle().await;

    assert_eq!(connector.open_count(), 1);
    assert!(!client.is_connected());
    assert_eq!(client.state(), ChannelState::Shutdown(ShutdownReason::Requested));
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_in_every_state() {
    let (client, _connector, mut opened) = new_client(10);

    // Never started.
    client.stop();
    client.stop();
    assert_eq!(client.state(), ChannelState::Shutdown(ShutdownReason::Requested));

    // Mid-connect.
    client.start(|_| {});
    let mut conn = next_connection(&mut opened).await;
    client.stop();
    client.stop();
    assert!(conn.close_requested());
    assert!(!client.is_connected());
    assert_eq!(client.state(), ChannelState::Shutdown(ShutdownReason::Requested));

    // Open.
    client.start(|_| {});
    let mut conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;
    client.stop();
    client.stop();
    assert!(conn.close_requested());
    assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_no_callback_after_stop() {
    let (client, _connector, mut opened) = new_client(10);
    let (received, callback) = recorder();

    client.start(callback);
    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;

    client.stop();
    conn.send_text(RUNNING_FRAME);
    conn.finish_close();
    settle().await;
    tokio::time::sleep(RETRY * 3).await;
    settle().await;

    assert!(received.lock().unwrap().is_empty());
    assert!(opened.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_close_racing_stop_does_not_schedule_retry() {
    let (client, connector, mut opened) = new_client(10);
    client.start(|_| {});
    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;

    // Server close is already queued when stop runs.
    conn.close();
    client.stop();
    settle().await;
    tokio::time::sleep(RETRY * 3).await;
    settle().await;

    assert_eq!(connector.open_count(), 1);
    assert_eq!(client.state(), ChannelState::Shutdown(ShutdownReason::Requested));
}

#[tokio::test(start_paused = true)]
async fn test_restart_ignores_events_from_previous_connection() {
    let (client, connector, mut opened) = new_client(10);
    let (received, callback) = recorder();

    client.start(|_| {});
    let old = next_connection(&mut opened).await;
    client.stop();

    client.start(callback);
    let new = next_connection(&mut opened).await;
    assert_eq!(connector.open_count(), 2);

    // The old transport finishes its handshake late and talks.
    old.open();
    old.send_text(RUNNING_FRAME);
    old.close();
    settle().await;
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(client.state(), ChannelState::Connecting);

    new.open();
    new.send_text(RUNNING_FRAME);
    settle().await;
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(client.state(), ChannelState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_closes_connection() {
    let (client, connector, mut opened) = new_client(10);
    client.start(|_| {});
    let mut conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;

    drop(client);
    assert!(conn.close_requested());

    conn.finish_close();
    tokio::time::sleep(RETRY * 3).await;
    settle().await;
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_state_watch_reports_transitions() {
    let (client, _connector, mut opened) = new_client(10);
    let mut state_rx = client.subscribe_state();
    assert_eq!(*state_rx.borrow(), ChannelState::Idle);

    client.start(|_| {});
    assert!(state_rx.has_changed().unwrap());
    assert_eq!(*state_rx.borrow_and_update(), ChannelState::Connecting);

    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;
    assert_eq!(*state_rx.borrow_and_update(), ChannelState::Open);

    conn.close();
    settle().await;
    assert_eq!(
        *state_rx.borrow_and_update(),
        ChannelState::ClosedRetrying { attempt: 1 }
    );

    client.stop();
    assert_eq!(
        *state_rx.borrow_and_update(),
        ChannelState::Shutdown(ShutdownReason::Requested)
    );
}

// ─────────────────────────────────────────────────────────
// Re-entrancy
// ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stop_from_inside_callback() {
    let (client, connector, mut opened) = new_client(10);
    let client = Arc::new(client);
    let weak = Arc::downgrade(&client);
    let (received, mut record) = recorder();

    client.start(move |event| {
        record(event);
        if let Some(client) = weak.upgrade() {
            client.stop();
        }
    });
    let mut conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;

    conn.send_text(RUNNING_FRAME);
    conn.send_text(&status_frame("stopped", "2024-01-01T00:05:00Z", false));
    settle().await;

    assert_eq!(*received.lock().unwrap(), vec![running()]);
    assert!(conn.close_requested());
    assert_eq!(client.state(), ChannelState::Shutdown(ShutdownReason::Requested));

    conn.finish_close();
    tokio::time::sleep(RETRY * 3).await;
    settle().await;
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_from_inside_callback_rebinds() {
    let (client, connector, mut opened) = new_client(10);
    let client = Arc::new(client);
    let weak = Arc::downgrade(&client);
    let (first, mut record_first) = recorder();
    let (second, record_second) = recorder();
    let mut record_second = Some(record_second);

    client.start(move |event| {
        record_first(event);
        if let (Some(client), Some(next)) = (weak.upgrade(), record_second.take()) {
            client.start(next);
        }
    });
    let conn = next_connection(&mut opened).await;
    conn.open();
    settle().await;

    conn.send_text(RUNNING_FRAME);
    conn.send_text(RUNNING_FRAME);
    settle().await;

    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.lock().unwrap().len(), 1);
    assert_eq!(connector.open_count(), 1);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_restart_from_inside_callback() {
    let (client, connector, mut opened) = new_client(10);
    let client = Arc::new(client);
    let weak = Arc::downgrade(&client);
    let (second, record_second) = recorder();
    let mut record_second = Some(record_second);

    client.start(move |_| {
        if let (Some(client), Some(next)) = (weak.upgrade(), record_second.take()) {
            client.stop();
            client.start(next);
        }
    });
    let mut old = next_connection(&mut opened).await;
    old.open();
    settle().await;

    old.send_text(RUNNING_FRAME);
    let new = next_connection(&mut opened).await;
    assert!(old.close_requested());
    assert_eq!(connector.open_count(), 2);
    assert_eq!(client.state(), ChannelState::Connecting);

    new.open();
    new.send_text(RUNNING_FRAME);
    settle().await;
    assert_eq!(*second.lock().unwrap(), vec![running()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_waits_for_callback_running_elsewhere() {
    let (connector, mut opened) = MockConnector::new();
    let client = StatusChannelClient::new(&origin(), connector, options(10)).unwrap();

    let (entered_tx, entered_rx) = std::sync::mpsc::channel();
    let finished = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&finished);
    client.start(move |_| {
        let _ = entered_tx.send(());
        std::thread::sleep(Duration::from_millis(100));
        done.store(true, Ordering::SeqCst);
    });

    let conn = opened.recv().await.unwrap();
    conn.open();
    conn.send_text(RUNNING_FRAME);
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .expect("callback never ran");

    client.stop();
    assert!(finished.load(Ordering::SeqCst));
}
