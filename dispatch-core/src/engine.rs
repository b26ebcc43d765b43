//! Wiring of push channel, poller, store, alerts, enrichment and projection
//! into one engine.

use crate::{
    alerts::{AlertConfig, AlertRecord},
    bus::{EventBus, Subscription, Topic},
    channel::{ChannelConfig, ConnectionState, PushChannel, PushTransport},
    clock::Clock,
    enrichment::{AssetFetcher, EnrichmentConfig, MarkerEnrichmentCache},
    error::Result,
    ingest::Reconciler,
    poll::{PollConfig, PollScheduler, PollSource},
    projector::{MarkerList, ViewProjector},
};

use dispatch_model::{EntityId, OperatorFilters, events::names};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub channel: ChannelConfig,
    pub poll: PollConfig,
    pub enrichment: EnrichmentConfig,
    pub alerts: AlertConfig,
}

/// External collaborators the engine talks to.
#[derive(Debug, Clone)]
pub struct EngineParts {
    pub transport: Arc<dyn PushTransport>,
    pub source: Arc<dyn PollSource>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub clock: Arc<dyn Clock>,
}

pub struct SyncEngine {
    reconciler: Arc<Reconciler>,
    projector: ViewProjector,
    channel: PushChannel,
    poller: PollScheduler,
    filters: RwLock<OperatorFilters>,
    bus: EventBus,
    config: EngineConfig,
    subscriptions: Mutex<Vec<Subscription>>,
    housekeeping: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("channel", &self.channel)
            .field("poller", &self.poller)
            .field("revision", &self.reconciler.revision())
            .field("filters", &*self.filters.read())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(config: EngineConfig, parts: EngineParts) -> Self {
        let bus = EventBus::default();
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&parts.clock),
            bus.clone(),
            config.alerts.clone(),
            config.poll.prune_missing,
        ));
        let cache = MarkerEnrichmentCache::new(
            config.enrichment.clone(),
            parts.fetcher,
            bus.clone(),
        );
        let channel =
            PushChannel::new(parts.transport, config.channel.clone(), bus.clone());

        let sink = Arc::clone(&reconciler);
        let poller = PollScheduler::new(
            parts.source,
            config.poll.clone(),
            channel.watch_state(),
            parts.clock,
            bus.clone(),
            move |batch| {
                sink.apply_batch(batch);
            },
        );

        let mut subscriptions = Vec::new();
        for event in names::ENTITY_EVENTS {
            let sink = Arc::clone(&reconciler);
            subscriptions.push(channel.on(event, move |frame| {
                sink.apply_frame(frame);
            }));
        }
        let sink = Arc::clone(&reconciler);
        subscriptions.push(bus.subscribe(Topic::IconReady, move |_| {
            sink.invalidate();
        }));

        Self {
            reconciler,
            projector: ViewProjector::new(cache),
            channel,
            poller,
            filters: RwLock::new(OperatorFilters::default()),
            bus,
            config,
            subscriptions: Mutex::new(subscriptions),
            housekeeping: Mutex::new(None),
        }
    }

    /// Connect the push channel, start polling and the alert expiry sweep.
    pub fn start(&self) {
        info!("starting sync engine");
        self.channel.connect();
        self.poller.start();

        let mut housekeeping = self.housekeeping.lock();
        if housekeeping.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let reconciler = Arc::clone(&self.reconciler);
        let sweep = self.config.alerts.expiry_sweep();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = reconciler.expire_notices();
                        if !expired.is_empty() {
                            debug!(count = expired.len(), "expired alert notices");
                        }
                    }
                }
            }
        });
        *housekeeping = Some((cancel, handle));
    }

    pub async fn shutdown(&self) {
        info!("stopping sync engine");
        self.poller.stop().await;
        self.channel.disconnect().await;
        let housekeeping = self.housekeeping.lock().take();
        if let Some((cancel, handle)) = housekeeping {
            cancel.cancel();
            if let Err(err) = handle.await {
                warn!(error = %err, "housekeeping task ended abnormally");
            }
        }
    }

    /// One out-of-band poll cycle.
    pub async fn poll_once(&self) -> Result<()> {
        self.poller.poll_once().await
    }

    pub fn project(&self) -> MarkerList {
        let snapshot = self.reconciler.snapshot();
        let filters = self.filters.read().clone();
        self.projector.project(&snapshot, &filters)
    }

    pub fn filters(&self) -> OperatorFilters {
        self.filters.read().clone()
    }

    pub fn set_filters(&self, filters: OperatorFilters) {
        *self.filters.write() = filters;
        self.reconciler.invalidate();
    }

    /// Operator touched a marker. Returns whether an alert was dismissed.
    pub fn interact(&self, entity: &EntityId) -> bool {
        match entity {
            EntityId::Incident(incident) => self.reconciler.dismiss(incident),
            _ => false,
        }
    }

    pub fn showing_alerts(&self) -> Vec<AlertRecord> {
        self.reconciler.showing_alerts()
    }

    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.reconciler.watch_revision()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn channel(&self) -> &PushChannel {
        &self.channel
    }

    pub fn poller(&self) -> &PollScheduler {
        &self.poller
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn cache(&self) -> &MarkerEnrichmentCache {
        self.projector.cache()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.poller.cancel();
        self.channel.cancel();
        self.subscriptions.lock().clear();
        if let Some((cancel, _)) = self.housekeeping.lock().take() {
            cancel.cancel();
        }
    }
}
