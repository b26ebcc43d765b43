use super::source::PollSource;
use crate::{
    bus::{EventBus, Signal},
    channel::ConnectionState,
    clock::{Clock, millis},
    error::{Result, SyncError},
};

use chrono::{DateTime, Utc};
use dispatch_model::{
    DutyStatus, Incident, IncidentStatus, Listing, Personnel, Post,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Cadence while the push channel is connected.
    pub connected_interval_ms: u64,
    /// Cadence while the push channel is down or reconnecting.
    pub disconnected_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub incident_page_limit: usize,
    /// Posts are refreshed on every Nth cycle.
    pub posts_every: u32,
    /// Consecutive failed cycles before poll health is reported degraded.
    pub failure_alert_threshold: u32,
    /// Remove records missing from a complete snapshot.
    pub prune_missing: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            connected_interval_ms: 5_000,
            disconnected_interval_ms: 2_000,
            request_timeout_ms: 1_500,
            incident_page_limit: 200,
            posts_every: 12,
            failure_alert_threshold: 3,
            prune_missing: true,
        }
    }
}

impl PollConfig {
    pub fn interval_for(&self, state: ConnectionState) -> Duration {
        if state.is_connected() {
            millis(self.connected_interval_ms)
        } else {
            millis(self.disconnected_interval_ms)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        millis(self.request_timeout_ms)
    }
}

/// Results of one poll cycle. A resource whose request failed is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollBatch {
    /// Wall-clock time the cycle started; bounds snapshot pruning.
    pub requested_at: DateTime<Utc>,
    pub incident_limit: usize,
    pub incidents: Option<Listing<Incident>>,
    pub personnel: Option<Listing<Personnel>>,
    pub posts: Option<Listing<Post>>,
}

#[derive(Debug, Default)]
struct PollHealth {
    consecutive_failures: u32,
    degraded: bool,
}

impl PollHealth {
    /// Returns the new degraded flag when it flips.
    fn record(&mut self, ok: bool, threshold: u32) -> Option<bool> {
        if ok {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        let degraded = self.consecutive_failures >= threshold.max(1);
        if degraded == self.degraded {
            return None;
        }
        self.degraded = degraded;
        Some(degraded)
    }
}

type BatchHandler = Arc<dyn Fn(PollBatch) + Send + Sync>;

struct Shared {
    source: Arc<dyn PollSource>,
    config: PollConfig,
    connection: watch::Receiver<ConnectionState>,
    handler: BatchHandler,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    health: Mutex<PollHealth>,
    cycles: AtomicU64,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

/// Self re-arming poll loop. The wait before the next cycle follows the
/// push channel state and is recomputed as soon as that state changes.
#[derive(Clone)]
pub struct PollScheduler {
    shared: Arc<Shared>,
}

impl fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollScheduler")
            .field("source", &self.shared.source)
            .field("config", &self.shared.config)
            .field("cycles", &self.shared.cycles.load(Ordering::Relaxed))
            .field("health", &*self.shared.health.lock())
            .finish()
    }
}

impl PollScheduler {
    pub fn new<F>(
        source: Arc<dyn PollSource>,
        config: PollConfig,
        connection: watch::Receiver<ConnectionState>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
        handler: F,
    ) -> Self
    where
        F: Fn(PollBatch) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                source,
                config,
                connection,
                handler: Arc::new(handler),
                clock,
                bus,
                health: Mutex::new(PollHealth::default()),
                cycles: AtomicU64::new(0),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn start(&self) {
        let mut worker = self.shared.worker.lock();
        if worker
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
        {
            return;
        }
        let cancel = CancellationToken::new();
        let handle =
            tokio::spawn(run(Arc::clone(&self.shared), cancel.clone()));
        *worker = Some((cancel, handle));
    }

    /// Stop polling and abort any request still in flight.
    pub async fn stop(&self) {
        let worker = self.shared.worker.lock().take();
        if let Some((cancel, handle)) = worker {
            cancel.cancel();
            if let Err(err) = handle.await {
                warn!(error = %err, "poll worker ended abnormally");
            }
        }
    }

    pub(crate) fn cancel(&self) {
        if let Some((cancel, _)) = self.shared.worker.lock().as_ref() {
            cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .worker
            .lock()
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Run a single full cycle (posts included) outside the schedule.
    pub async fn poll_once(&self) -> Result<()> {
        let outcome = self.shared.fetch_and_apply(true).await;
        self.shared.record(outcome.is_ok());
        outcome
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.shared.health.lock().consecutive_failures
    }

    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }
}

impl Shared {
    fn record(&self, ok: bool) {
        let (flipped, failures) = {
            let mut health = self.health.lock();
            let flipped =
                health.record(ok, self.config.failure_alert_threshold);
            (flipped, health.consecutive_failures)
        };
        if let Some(degraded) = flipped {
            if degraded {
                warn!(consecutive_failures = failures, "polling degraded");
            } else {
                info!("polling recovered");
            }
            self.bus.publish(Signal::PollHealth {
                degraded,
                consecutive_failures: failures,
            });
        }
    }

    async fn fetch_and_apply(&self, include_posts: bool) -> Result<()> {
        let requested_at = self.clock.now();
        let timeout = self.config.request_timeout();
        let limit = self.config.incident_page_limit;

        let (incidents, personnel, posts) = tokio::join!(
            within(
                timeout,
                self.source.incidents(&IncidentStatus::ACTIVE, limit)
            ),
            within(timeout, self.source.personnel(&DutyStatus::PROJECTABLE)),
            async {
                if include_posts {
                    Some(within(timeout, self.source.posts()).await)
                } else {
                    None
                }
            },
        );

        let mut first_error = None;
        let batch = PollBatch {
            requested_at,
            incident_limit: limit,
            incidents: settle("incidents", incidents, &mut first_error),
            personnel: settle("personnel", personnel, &mut first_error),
            posts: posts
                .and_then(|posts| settle("posts", posts, &mut first_error)),
        };
        (self.handler)(batch);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn within<T>(
    limit: Duration,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, request)
        .await
        .map_err(|_| SyncError::Timeout(limit))?
}

fn settle<T>(
    resource: &str,
    outcome: Result<T>,
    first_error: &mut Option<SyncError>,
) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(resource, error = %err, "poll request failed, skipping");
            first_error.get_or_insert(err);
            None
        }
    }
}

async fn cycle(shared: Arc<Shared>, include_posts: bool) {
    let ok = shared.fetch_and_apply(include_posts).await.is_ok();
    shared.record(ok);
}

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut connection = shared.connection.clone();
    let mut in_flight: Option<JoinHandle<()>> = None;
    let posts_every = u64::from(shared.config.posts_every.max(1));

    'cycles: loop {
        if let Some(previous) = in_flight.take()
            && !previous.is_finished()
        {
            previous.abort();
            warn!("previous poll cycle still pending, aborting it");
            shared.record(false);
        }

        let started = Instant::now();
        let cycle_no = shared.cycles.fetch_add(1, Ordering::Relaxed);
        in_flight = Some(tokio::spawn(cycle(
            Arc::clone(&shared),
            cycle_no % posts_every == 0,
        )));

        let mut watching = true;
        loop {
            let state = *connection.borrow();
            let deadline = started + shared.config.interval_for(state);
            tokio::select! {
                _ = cancel.cancelled() => break 'cycles,
                _ = tokio::time::sleep_until(deadline) => continue 'cycles,
                changed = connection.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    debug!(state = ?*connection.borrow(), "connection state changed, re-arming poll timer");
                }
            }
        }
    }

    if let Some(pending) = in_flight {
        pending.abort();
    }
}
