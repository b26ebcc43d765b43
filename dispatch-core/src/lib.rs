//! Real-time entity synchronization for dispatch consoles.
//!
//! Two unordered, overlapping sources feed the engine: a push channel
//! ([`channel::PushChannel`]) and a fallback poller
//! ([`poll::PollScheduler`]). Both converge through the timestamp merge in
//! [`store::EntityStore`]; [`alerts::AlertDispatcher`] and
//! [`enrichment::MarkerEnrichmentCache`] react to the changes and
//! [`projector::ViewProjector`] turns everything into map markers.
#![allow(missing_docs)]

pub mod alerts;
pub mod bus;
pub mod channel;
pub mod clock;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod ingest;
pub mod poll;
pub mod projector;
pub mod store;
pub mod visual;

pub use alerts::{AlertConfig, AlertDispatcher, AlertKind, AlertRecord};
pub use bus::{EventBus, Signal, Subscription, Topic};
pub use channel::{
    ChannelConfig, ChannelHealth, ConnectionState, PushChannel, PushTransport,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineConfig, EngineParts, SyncEngine};
pub use enrichment::{CacheEntry, CacheKey, EnrichmentConfig, EnrichmentState};
pub use error::{Result, SyncError};
pub use ingest::Reconciler;
pub use poll::{PollBatch, PollConfig, PollScheduler, PollSource};
pub use projector::{Marker, MarkerList, ViewProjector};
pub use store::{EntityStore, StoreChange, StoreSnapshot};
