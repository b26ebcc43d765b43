mod support;

use dispatch_core::{
    EventBus,
    channel::{
        BackoffConfig, ChannelConfig, ConnectionState, HeartbeatConfig,
        PushChannel,
    },
};
use dispatch_model::{PushFrame, events::names};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use support::ScriptedTransport;
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, timeout},
};

fn config() -> ChannelConfig {
    ChannelConfig {
        backoff: BackoffConfig {
            base_ms: 100,
            cap_ms: 1_000,
            jitter_max_ms: 0,
        },
        heartbeat: HeartbeatConfig {
            interval_ms: 1_000,
            timeout_ms: 300,
        },
    }
}

fn channel(transport: &Arc<ScriptedTransport>) -> PushChannel {
    PushChannel::new(transport.clone(), config(), EventBus::default())
}

async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    want: ConnectionState,
) {
    timeout(Duration::from_secs(60), rx.wait_for(|state| *state == want))
        .await
        .expect("state reached in time")
        .expect("channel alive");
}

#[tokio::test(start_paused = true)]
async fn frames_reach_registered_handlers() {
    let transport = Arc::new(ScriptedTransport::default());
    let peer = transport.queue_session();
    let channel = channel(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = channel.on(names::INCIDENT_CREATED, move |frame| {
        let _ = tx.send(frame.clone());
    });

    let mut state = channel.watch_state();
    channel.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    peer.push(names::INCIDENT_UPDATED, json!({"id": "INC-0"})).await;
    peer.push(names::INCIDENT_CREATED, json!({"id": "INC-1"})).await;
    let frame = rx.recv().await.unwrap();
    assert_eq!(frame.event, names::INCIDENT_CREATED);
    assert_eq!(frame.data["id"], "INC-1");

    channel.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_ack_measures_round_trip() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut peer = transport.queue_session();
    let channel = channel(&transport);
    let mut health = channel.watch_health();
    channel.connect();

    let text = peer.from_client.recv().await.unwrap();
    let heartbeat = PushFrame::parse(&text).unwrap();
    assert_eq!(heartbeat.event, names::HEARTBEAT);
    let nonce = heartbeat.data["nonce"].as_u64().unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    peer.push(names::HEARTBEAT_ACK, json!({ "nonce": nonce })).await;

    let measured = timeout(
        Duration::from_secs(5),
        health.wait_for(|health| health.rtt.is_some()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    let rtt = measured.rtt.unwrap();
    assert!(rtt >= Duration::from_millis(50));
    assert!(rtt < Duration::from_millis(300));
    assert!(!measured.is_stale());

    channel.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_heartbeat_marks_stale_without_teardown() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut peer = transport.queue_session();
    let channel = channel(&transport);
    let mut health = channel.watch_health();
    channel.connect();

    let _ignored = peer.from_client.recv().await.unwrap();
    timeout(
        Duration::from_secs(5),
        health.wait_for(|health| health.is_stale()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(channel.state(), ConnectionState::Connected);
    assert_eq!(transport.opens(), 1);

    channel.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn lost_session_is_re_established() {
    let transport = Arc::new(ScriptedTransport::default());
    let first = transport.queue_session();
    let _second = transport.queue_session();
    let channel = channel(&transport);
    let mut state = channel.watch_state();
    channel.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    drop(first);
    wait_for_state(&mut state, ConnectionState::Reconnecting).await;
    wait_for_state(&mut state, ConnectionState::Connected).await;
    assert_eq!(transport.opens(), 2);

    channel.disconnect().await;
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_a_session_starts_from_the_base_delay() {
    let transport = Arc::new(ScriptedTransport::default());
    let channel = channel(&transport);
    let mut state = channel.watch_state();
    channel.connect();

    // Refused at 0, 100, 300 and 700ms; the next try waits the full 800ms.
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(transport.opens(), 4);
    let first = transport.queue_session();
    let _second = transport.queue_session();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    assert_eq!(transport.opens(), 5);

    let lost_at = Instant::now();
    drop(first);
    wait_for_state(&mut state, ConnectionState::Reconnecting).await;
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let gap = lost_at.elapsed();
    assert!(gap >= Duration::from_millis(100), "reconnected after {gap:?}");
    assert!(gap < Duration::from_millis(200), "reconnected after {gap:?}");
    assert_eq!(transport.opens(), 6);

    channel.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn stalled_writer_cannot_block_disconnect() {
    let transport = Arc::new(ScriptedTransport::default());
    // Keeps the session open but never reads what the client writes.
    let _peer = transport.queue_session();
    let channel = PushChannel::new(
        transport.clone(),
        ChannelConfig {
            heartbeat: HeartbeatConfig {
                interval_ms: 100,
                timeout_ms: 60_000,
            },
            ..config()
        },
        EventBus::default(),
    );
    let mut state = channel.watch_state();
    channel.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    let health = channel.health();
    assert!(health.is_stale());
    assert_eq!(health.state, ConnectionState::Connected);
    assert_eq!(transport.opens(), 1);

    timeout(Duration::from_secs(5), channel.disconnect())
        .await
        .expect("disconnect completes with a full outbound buffer");
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnects() {
    let transport = Arc::new(ScriptedTransport::default());
    let channel = channel(&transport);
    let mut state = channel.watch_state();
    channel.connect();
    wait_for_state(&mut state, ConnectionState::Reconnecting).await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    channel.disconnect().await;
    let attempts = transport.opens();
    assert!(attempts >= 2);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.opens(), attempts);
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn send_needs_an_open_session() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut peer = transport.queue_session();
    let channel = channel(&transport);
    let frame = PushFrame::new("operator:typing", json!({"console": 3}));
    assert!(channel.send(&frame).await.is_err());

    let mut state = channel.watch_state();
    channel.connect();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    channel.send(&frame).await.unwrap();
    let sent = PushFrame::parse(&peer.from_client.recv().await.unwrap()).unwrap();
    assert_eq!(sent, frame);

    channel.disconnect().await;
}
