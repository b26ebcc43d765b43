//! Marker enrichment cache.
//!
//! [`MarkerEnrichmentCache::get_icon`] answers synchronously with the best
//! icon available. The first request for a key that carries a secondary
//! asset returns a pending fallback and schedules a background fetch; the
//! resolved entry replaces the pending one and an
//! [`Signal::IconReady`](crate::bus::Signal::IconReady) is published.

mod encode;
mod fetch;
mod icon;
mod key;

pub use encode::{decode_data_uri, thumbnail_data_uri};
pub use fetch::{AssetFetcher, HttpAssetFetcher};
pub use icon::{CacheEntry, EnrichmentState, MarkerIcon};
pub use key::CacheKey;

use crate::bus::{EventBus, Signal};

use dashmap::{DashMap, mapref::entry::Entry};
use dispatch_model::{Entity, EntityId};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("URL resolution error: {0}")]
    UrlResolution(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Maximum concurrent asset fetches.
    pub max_concurrent: usize,
    pub fetch_timeout_ms: u64,
    /// Longest edge of the generated thumbnail, in pixels.
    pub thumbnail_edge: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            fetch_timeout_ms: 5_000,
            thumbnail_edge: 48,
        }
    }
}

impl EnrichmentConfig {
    pub fn fetch_timeout(&self) -> Duration {
        crate::clock::millis(self.fetch_timeout_ms)
    }
}

struct CacheInner {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    // Latest key requested per entity; results for older keys are dropped.
    current: DashMap<EntityId, CacheKey>,
    fetcher: Arc<dyn AssetFetcher>,
    limiter: Arc<Semaphore>,
    config: EnrichmentConfig,
    bus: EventBus,
    fetches: AtomicU64,
}

#[derive(Clone)]
pub struct MarkerEnrichmentCache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for MarkerEnrichmentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerEnrichmentCache")
            .field("entries", &self.inner.entries.len())
            .field("tracked_entities", &self.inner.current.len())
            .field("fetches", &self.inner.fetches.load(Ordering::Relaxed))
            .field("config", &self.inner.config)
            .finish()
    }
}

impl MarkerEnrichmentCache {
    pub fn new(
        config: EnrichmentConfig,
        fetcher: Arc<dyn AssetFetcher>,
        bus: EventBus,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                current: DashMap::new(),
                fetcher,
                limiter,
                config,
                bus,
                fetches: AtomicU64::new(0),
            }),
        }
    }

    /// Best icon currently available for `entity`.
    pub fn get_icon(&self, entity: &Entity) -> Arc<CacheEntry> {
        let key = CacheKey::for_entity(entity);
        self.inner.current.insert(key.entity.clone(), key.clone());

        let fallback = MarkerIcon::fallback(entity, &key);
        let pending = match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(slot) => return Arc::clone(slot.get()),
            Entry::Vacant(slot) => {
                let state = if key.has_asset() {
                    EnrichmentState::Pending
                } else {
                    EnrichmentState::Ready
                };
                let entry = Arc::new(CacheEntry {
                    key: key.clone(),
                    icon: fallback.clone(),
                    state,
                });
                slot.insert(Arc::clone(&entry));
                entry
            }
        };

        if pending.state == EnrichmentState::Pending {
            self.schedule(key, fallback);
        }
        pending
    }

    /// Cached entry for `key`, if any.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.inner.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Number of asset fetches started so far.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Relaxed)
    }

    fn schedule(&self, key: CacheKey, fallback: MarkerIcon) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(enrich(Arc::clone(&self.inner), key, fallback));
            }
            Err(_) => {
                warn!(key = %key, "no runtime available for enrichment");
                self.inner.entries.insert(
                    key.clone(),
                    Arc::new(CacheEntry {
                        key,
                        icon: fallback,
                        state: EnrichmentState::Failed,
                    }),
                );
            }
        }
    }
}

async fn enrich(inner: Arc<CacheInner>, key: CacheKey, fallback: MarkerIcon) {
    let Some(reference) = key.asset.clone() else {
        return;
    };
    let outcome = fetch_thumbnail(&inner, &reference).await;

    let superseded = inner
        .current
        .get(&key.entity)
        .is_none_or(|latest| *latest != key);
    if superseded {
        // The entry stays settled on its fallback so a later return to this
        // key neither waits on nor re-runs a fetch.
        debug!(key = %key, "discarding superseded enrichment");
        inner.entries.insert(
            key.clone(),
            Arc::new(CacheEntry {
                key,
                icon: fallback,
                state: EnrichmentState::Failed,
            }),
        );
        return;
    }

    let entry = match outcome {
        Ok(data_uri) => CacheEntry {
            key: key.clone(),
            icon: fallback.with_photo(data_uri),
            state: EnrichmentState::Ready,
        },
        Err(err) => {
            warn!(key = %key, error = %err, "enrichment failed, keeping fallback icon");
            CacheEntry {
                key: key.clone(),
                icon: fallback,
                state: EnrichmentState::Failed,
            }
        }
    };
    inner.entries.insert(key.clone(), Arc::new(entry));
    inner.bus.publish(Signal::IconReady(key));
}

async fn fetch_thumbnail(
    inner: &CacheInner,
    reference: &str,
) -> Result<String, EnrichmentError> {
    let _permit = Arc::clone(&inner.limiter)
        .acquire_owned()
        .await
        .map_err(|_| EnrichmentError::Cancelled)?;
    inner.fetches.fetch_add(1, Ordering::Relaxed);

    let bytes = tokio::time::timeout(
        inner.config.fetch_timeout(),
        inner.fetcher.fetch(reference),
    )
    .await
    .map_err(|_| EnrichmentError::Timeout)??;

    let edge = inner.config.thumbnail_edge;
    tokio::task::spawn_blocking(move || thumbnail_data_uri(&bytes, edge))
        .await
        .map_err(|e| EnrichmentError::Processing(e.to_string()))?
}
