mod support;

use dispatch_core::{
    EventBus, ManualClock, Signal, Topic,
    channel::ConnectionState,
    poll::{PollBatch, PollConfig, PollScheduler},
};
use parking_lot::Mutex;
use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};
use support::{FakePollSource, t0};
use tokio::{sync::watch, time::sleep};

struct Harness {
    source: Arc<FakePollSource>,
    state: watch::Sender<ConnectionState>,
    batches: Arc<Mutex<Vec<PollBatch>>>,
    bus: EventBus,
    scheduler: PollScheduler,
}

fn harness(config: PollConfig, initial: ConnectionState) -> Harness {
    let source = Arc::new(FakePollSource::default());
    let (state, connection) = watch::channel(initial);
    let batches = Arc::new(Mutex::new(Vec::new()));
    let bus = EventBus::default();
    let sink = Arc::clone(&batches);
    let scheduler = PollScheduler::new(
        source.clone(),
        config,
        connection,
        Arc::new(ManualClock::new(t0())),
        bus.clone(),
        move |batch| sink.lock().push(batch),
    );
    Harness {
        source,
        state,
        batches,
        bus,
        scheduler,
    }
}

fn config() -> PollConfig {
    PollConfig {
        connected_interval_ms: 5_000,
        disconnected_interval_ms: 2_000,
        request_timeout_ms: 1_000,
        posts_every: 1,
        ..PollConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn cadence_tracks_connection_state() {
    let h = harness(config(), ConnectionState::Connected);
    h.scheduler.start();

    sleep(Duration::from_millis(4_900)).await;
    assert_eq!(h.source.incident_calls(), 1);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(h.source.incident_calls(), 2);

    // Second cycle started at 5s; dropping to the fallback cadence pulls the
    // next one in to 7s.
    h.state.send_replace(ConnectionState::Reconnecting);
    sleep(Duration::from_millis(1_800)).await;
    assert_eq!(h.source.incident_calls(), 2);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(h.source.incident_calls(), 3);
    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(h.source.incident_calls(), 4);

    h.scheduler.stop().await;
    assert!(!h.scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn losing_the_channel_wakes_a_long_wait() {
    let h = harness(
        PollConfig {
            connected_interval_ms: 60_000,
            ..config()
        },
        ConnectionState::Connected,
    );
    h.scheduler.start();
    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(h.source.incident_calls(), 1);

    h.state.send_replace(ConnectionState::Disconnected);
    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(h.source.incident_calls(), 2);

    h.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn hanging_cycles_are_aborted_and_reported() {
    let h = harness(
        PollConfig {
            request_timeout_ms: 30_000,
            failure_alert_threshold: 2,
            ..config()
        },
        ConnectionState::Disconnected,
    );
    let health = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&health);
    let _sub = h.bus.subscribe(Topic::PollHealth, move |signal| {
        if let Signal::PollHealth { degraded, .. } = signal {
            seen.lock().push(*degraded);
        }
    });

    h.source.hang.store(true, Ordering::SeqCst);
    h.scheduler.start();
    sleep(Duration::from_millis(4_500)).await;
    assert_eq!(h.scheduler.consecutive_failures(), 2);
    assert_eq!(*health.lock(), vec![true]);
    assert!(h.batches.lock().is_empty());

    // The cycle started at 4s is still stuck and gets aborted at 6s; the one
    // started then succeeds.
    h.source.hang.store(false, Ordering::SeqCst);
    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(h.scheduler.consecutive_failures(), 0);
    assert_eq!(*health.lock(), vec![true, false]);
    assert_eq!(h.batches.lock().len(), 1);

    h.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn timed_out_requests_still_deliver_a_partial_batch() {
    let h = harness(config(), ConnectionState::Disconnected);
    h.source.hang.store(true, Ordering::SeqCst);
    h.scheduler.start();

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.scheduler.consecutive_failures(), 1);
    let batches = h.batches.lock().clone();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].incidents.is_none());
    assert!(batches[0].personnel.is_none());
    assert!(batches[0].posts.is_none());
    assert_eq!(batches[0].requested_at, t0());

    h.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn posts_refresh_on_every_nth_cycle() {
    let h = harness(
        PollConfig {
            disconnected_interval_ms: 1_000,
            posts_every: 3,
            ..config()
        },
        ConnectionState::Disconnected,
    );
    h.scheduler.start();
    sleep(Duration::from_millis(5_500)).await;
    h.scheduler.stop().await;

    assert_eq!(h.scheduler.cycles(), 6);
    assert_eq!(h.source.post_calls.load(Ordering::SeqCst), 2);
    let with_posts: Vec<bool> = h
        .batches
        .lock()
        .iter()
        .map(|batch| batch.posts.is_some())
        .collect();
    assert_eq!(with_posts, vec![true, false, false, true, false, false]);
}

#[tokio::test(start_paused = true)]
async fn poll_once_reports_failures() {
    let h = harness(config(), ConnectionState::Connected);
    h.scheduler.poll_once().await.unwrap();
    assert_eq!(h.source.post_calls.load(Ordering::SeqCst), 1);

    h.source.fail.store(true, Ordering::SeqCst);
    assert!(h.scheduler.poll_once().await.is_err());
    assert_eq!(h.scheduler.consecutive_failures(), 1);
    assert_eq!(h.batches.lock().len(), 2);
}
