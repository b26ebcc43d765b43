//! Process-wide publish/subscribe bus.
//!
//! Signals are grouped into enumerable [`Topic`]s. Callbacks are registered
//! per topic and receive every signal published on it; the returned
//! [`Subscription`] releases the callback when dropped or unsubscribed. An
//! async stream of all signals is available through [`EventBus::stream`].

use crate::{
    alerts::AlertRecord, channel::ChannelHealth, enrichment::CacheKey,
};

use dispatch_model::IncidentId;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Acknowledgements,
    ConnectionHealth,
    PollHealth,
    IconReady,
    Alerts,
    ViewInvalidated,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Acknowledgements,
        Topic::ConnectionHealth,
        Topic::PollHealth,
        Topic::IconReady,
        Topic::Alerts,
        Topic::ViewInvalidated,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// An incident's responder count changed.
    AcknowledgementsChanged {
        incident: IncidentId,
        responders: Option<u32>,
    },
    ConnectionHealth(ChannelHealth),
    PollHealth {
        degraded: bool,
        consecutive_failures: u32,
    },
    IconReady(CacheKey),
    AlertRaised(AlertRecord),
    AlertDismissed(IncidentId),
    ViewInvalidated {
        revision: u64,
    },
}

impl Signal {
    pub fn topic(&self) -> Topic {
        match self {
            Signal::AcknowledgementsChanged { .. } => Topic::Acknowledgements,
            Signal::ConnectionHealth(_) => Topic::ConnectionHealth,
            Signal::PollHealth { .. } => Topic::PollHealth,
            Signal::IconReady(_) => Topic::IconReady,
            Signal::AlertRaised(_) | Signal::AlertDismissed(_) => Topic::Alerts,
            Signal::ViewInvalidated { .. } => Topic::ViewInvalidated,
        }
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerSet<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Ordered callback registry shared by the bus, the store and the push
/// channel. Callbacks run outside the registry lock, so a callback may
/// publish or subscribe again.
pub(crate) struct Listeners<T> {
    inner: Arc<RwLock<ListenerSet<T>>>,
}

impl<T: 'static> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ListenerSet {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn add<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut set = self.inner.write();
            let id = set.next_id;
            set.next_id += 1;
            set.entries.push((id, Arc::new(callback)));
            id
        };
        let weak: Weak<RwLock<ListenerSet<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.write().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    pub(crate) fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .read()
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().entries.len()
    }
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.inner.read().entries.len())
            .finish()
    }
}

/// Handle for a registered callback. Releases it on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct EventBus {
    topics: Arc<HashMap<Topic, Listeners<Signal>>>,
    sender: broadcast::Sender<Signal>,
    capacity: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks: usize = self.topics.values().map(Listeners::len).sum();
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("callbacks", &callbacks)
            .field("stream_subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let topics = Topic::ALL
            .iter()
            .map(|topic| (*topic, Listeners::new()))
            .collect();
        Self {
            topics: Arc::new(topics),
            sender,
            capacity,
        }
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        match self.topics.get(&topic) {
            Some(listeners) => listeners.add(callback),
            None => Subscription::new(|| {}),
        }
    }

    /// Receiver for every signal, regardless of topic.
    pub fn stream(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    pub fn publish(&self, signal: Signal) {
        if let Some(listeners) = self.topics.get(&signal.topic()) {
            listeners.notify(&signal);
        }
        let _ = self.sender.send(signal);
    }
}
