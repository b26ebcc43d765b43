//! Push channel: one persistent bidirectional session to the dispatch
//! server, re-established forever with capped exponential backoff.
//!
//! Connection state is published on a watch channel so the poll scheduler
//! can adapt its cadence. Heartbeats measure round-trip time; a heartbeat
//! left unanswered marks the channel stale without tearing it down.

mod backoff;
mod heartbeat;
mod transport;

pub use backoff::BackoffConfig;
pub use heartbeat::HeartbeatConfig;
pub use transport::{Link, PushTransport, WsTransport};

use crate::{
    bus::{EventBus, Listeners, Signal, Subscription},
    error::{Result, SyncError},
};
use heartbeat::HeartbeatTracker;

use chrono::Utc;
use dispatch_model::events::{Heartbeat, HeartbeatAck, PushFrame, names};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelHealth {
    pub state: ConnectionState,
    /// Round-trip time of the most recent acknowledged heartbeat.
    pub rtt: Option<Duration>,
    /// Heartbeats that went unanswered since the last acknowledgement.
    pub stale_heartbeats: u32,
}

impl ChannelHealth {
    pub fn is_stale(&self) -> bool {
        self.stale_heartbeats > 0
    }
}

impl Default for ChannelHealth {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            rtt: None,
            stale_heartbeats: 0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub backoff: BackoffConfig,
    pub heartbeat: HeartbeatConfig,
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Cancelled,
}

#[derive(Debug, PartialEq, Eq)]
enum HeartbeatSend {
    Sent,
    /// Writer is not draining; the heartbeat was dropped.
    Backlogged,
    Closed,
}

struct Shared {
    transport: Arc<dyn PushTransport>,
    config: ChannelConfig,
    state: watch::Sender<ConnectionState>,
    health: watch::Sender<ChannelHealth>,
    handlers: RwLock<HashMap<String, Listeners<PushFrame>>>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    bus: EventBus,
}

#[derive(Clone)]
pub struct PushChannel {
    shared: Arc<Shared>,
}

impl fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushChannel")
            .field("transport", &self.shared.transport)
            .field("state", &*self.shared.state.borrow())
            .field("handlers", &self.shared.handlers.read().len())
            .field("running", &self.shared.worker.lock().is_some())
            .finish()
    }
}

impl PushChannel {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        config: ChannelConfig,
        bus: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (health, _) = watch::channel(ChannelHealth::default());
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                state,
                health,
                handlers: RwLock::new(HashMap::new()),
                outbound: Mutex::new(None),
                worker: Mutex::new(None),
                bus,
            }),
        }
    }

    /// Start the connect/reconnect loop. Calling it while the loop is
    /// running is a no-op.
    pub fn connect(&self) {
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

    /// Close the session and cancel any pending reconnect.
    pub async fn disconnect(&self) {
        let worker = self.shared.worker.lock().take();
        if let Some((cancel, handle)) = worker {
            cancel.cancel();
            if let Err(err) = handle.await {
                warn!(error = %err, "push channel worker ended abnormally");
            }
        }
        *self.shared.outbound.lock() = None;
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Signal the worker to stop without waiting for it.
    pub(crate) fn cancel(&self) {
        if let Some((cancel, _)) = self.shared.worker.lock().as_ref() {
            cancel.cancel();
        }
    }

    /// Register `handler` for frames named `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&PushFrame) + Send + Sync + 'static,
    {
        self.shared
            .handlers
            .write()
            .entry(event.to_string())
            .or_insert_with(Listeners::new)
            .add(handler)
    }

    pub async fn send(&self, frame: &PushFrame) -> Result<()> {
        let sender = self.shared.outbound.lock().clone().ok_or_else(|| {
            SyncError::Transport("push channel is not connected".to_string())
        })?;
        sender.send(frame.to_text()?).await.map_err(|_| {
            SyncError::Transport("push session closed".to_string())
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn health(&self) -> ChannelHealth {
        self.shared.health.borrow().clone()
    }

    pub fn watch_health(&self) -> watch::Receiver<ChannelHealth> {
        self.shared.health.subscribe()
    }
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            debug!(state = ?next, "push channel state changed");
            self.update_health(|health| {
                health.state = next;
                if next.is_connected() {
                    health.stale_heartbeats = 0;
                }
            });
        }
    }

    fn update_health(&self, apply: impl FnOnce(&mut ChannelHealth)) {
        self.health.send_modify(apply);
        let snapshot = self.health.borrow().clone();
        self.bus.publish(Signal::ConnectionHealth(snapshot));
    }

    async fn session(
        &self,
        link: Link,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let Link {
            outbound,
            mut inbound,
        } = link;
        *self.outbound.lock() = Some(outbound.clone());

        let heartbeat = &self.config.heartbeat;
        let mut tracker = HeartbeatTracker::default();
        let mut ticker = tokio::time::interval_at(
            Instant::now() + heartbeat.interval(),
            heartbeat.interval(),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = tracker.next_deadline(heartbeat.timeout());
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                _ = ticker.tick() => match self.send_heartbeat(&outbound, &mut tracker) {
                    HeartbeatSend::Sent => {}
                    HeartbeatSend::Backlogged => {
                        warn!("outbound buffer full, heartbeat dropped");
                        self.update_health(|health| {
                            health.stale_heartbeats += 1;
                        });
                    }
                    HeartbeatSend::Closed => return SessionEnd::Closed,
                },
                _ = sleep_until(deadline) => {
                    let expired = tracker.expire(Instant::now(), heartbeat.timeout());
                    if expired > 0 {
                        warn!(expired, "heartbeat unanswered, push channel is stale");
                        self.update_health(|health| {
                            health.stale_heartbeats += expired as u32;
                        });
                    }
                }
                frame = inbound.recv() => match frame {
                    Some(text) => self.dispatch(&text, &mut tracker),
                    None => return SessionEnd::Closed,
                },
            }
        }
    }

    // Never waits on the writer, so a stalled socket cannot block the
    // session loop.
    fn send_heartbeat(
        &self,
        outbound: &mpsc::Sender<String>,
        tracker: &mut HeartbeatTracker,
    ) -> HeartbeatSend {
        let permit = match outbound.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                return HeartbeatSend::Backlogged;
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("heartbeat send failed, session closed");
                return HeartbeatSend::Closed;
            }
        };
        let nonce = tracker.start(Instant::now());
        let text = PushFrame::heartbeat(&Heartbeat {
            nonce,
            sent_at: Utc::now(),
        })
        .and_then(|frame| frame.to_text());
        match text {
            Ok(text) => permit.send(text),
            Err(err) => warn!(error = %err, "failed to encode heartbeat"),
        }
        HeartbeatSend::Sent
    }

    fn dispatch(&self, text: &str, tracker: &mut HeartbeatTracker) {
        let frame = match PushFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping malformed push frame");
                return;
            }
        };

        if frame.event == names::HEARTBEAT_ACK {
            match serde_json::from_value::<HeartbeatAck>(frame.data.clone()) {
                Ok(ack) => {
                    if let Some(rtt) = tracker.ack(ack.nonce, Instant::now()) {
                        debug!(rtt_ms = rtt.as_millis() as u64, "heartbeat acknowledged");
                        self.update_health(|health| {
                            health.rtt = Some(rtt);
                            health.stale_heartbeats = 0;
                        });
                    }
                }
                Err(err) => warn!(error = %err, "malformed heartbeat ack"),
            }
        }

        let listeners = self.handlers.read().get(&frame.event).cloned();
        if let Some(listeners) = listeners {
            listeners.notify(&frame);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut attempt: u32 = 0;
    loop {
        shared.set_state(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        });

        let opened = tokio::select! {
            _ = cancel.cancelled() => break,
            opened = shared.transport.open() => opened,
        };
        match opened {
            Ok(link) => {
                attempt = 0;
                info!("push channel connected");
                shared.set_state(ConnectionState::Connected);
                let end = shared.session(link, &cancel).await;
                *shared.outbound.lock() = None;
                if end == SessionEnd::Cancelled {
                    break;
                }
                info!("push channel lost, reconnecting");
            }
            Err(err) => {
                debug!(attempt, error = %err, "push channel connect failed");
            }
        }

        shared.set_state(ConnectionState::Reconnecting);
        let delay = shared.config.backoff.delay(attempt);
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling push reconnect"
        );
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    shared.set_state(ConnectionState::Disconnected);
}
