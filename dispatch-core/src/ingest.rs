//! Routes push events and poll batches through the store and reacts to the
//! resulting changes: alerts, acknowledgement signals and view revisions.

use crate::{
    alerts::{AlertConfig, AlertDispatcher, AlertRecord},
    bus::{EventBus, Signal},
    clock::Clock,
    poll::PollBatch,
    store::{EntityStore, StoreChange, StoreSnapshot},
};

use dispatch_model::{
    Entity, EntityId, EntityKind, IncidentId, IncidentStatus, Listing,
    PushEvent, PushFrame,
};
use parking_lot::{Mutex, RwLock};
use std::{collections::HashSet, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Tombstones older than this are forgotten after each poll batch.
fn tombstone_retention() -> chrono::Duration {
    chrono::Duration::hours(6)
}

#[derive(Debug)]
pub struct Reconciler {
    store: RwLock<EntityStore>,
    alerts: Mutex<AlertDispatcher>,
    bus: EventBus,
    revision: watch::Sender<u64>,
    clock: Arc<dyn Clock>,
    prune_missing: bool,
}

impl Reconciler {
    pub fn new(
        clock: Arc<dyn Clock>,
        bus: EventBus,
        alerts: AlertConfig,
        prune_missing: bool,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store: RwLock::new(EntityStore::new(Arc::clone(&clock))),
            alerts: Mutex::new(AlertDispatcher::new(
                alerts,
                bus.clone(),
                Arc::clone(&clock),
            )),
            bus,
            revision,
            clock,
            prune_missing,
        }
    }

    /// Decode and apply a raw push frame. Malformed payloads are logged and
    /// dropped.
    pub fn apply_frame(&self, frame: &PushFrame) -> Vec<StoreChange> {
        match PushEvent::decode(&frame.event, frame.data.clone()) {
            Ok(Some(event)) => self.apply_event(event),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(event = %frame.event, error = %err, "dropping undecodable push event");
                Vec::new()
            }
        }
    }

    pub fn apply_event(&self, event: PushEvent) -> Vec<StoreChange> {
        debug!(event = event.name(), "applying push event");
        let change = {
            let mut store = self.store.write();
            match event {
                PushEvent::IncidentCreated(incident)
                | PushEvent::IncidentUpdated(incident) => store.upsert(incident),
                PushEvent::IncidentDeleted(id)
                | PushEvent::IncidentInvalidated(id) => {
                    store.remove(&EntityId::Incident(id))
                }
                PushEvent::PersonnelLocation(ping) => {
                    store.upsert(ping.into_personnel())
                }
                PushEvent::PersonnelStatus(change) => {
                    store.upsert(change.into_personnel())
                }
                PushEvent::HeartbeatAck(_) => None,
            }
        };
        let changes: Vec<StoreChange> = change.into_iter().collect();
        self.react(&changes);
        changes
    }

    pub fn apply_batch(&self, batch: PollBatch) -> Vec<StoreChange> {
        let prune = self.prune_missing;
        let mut changes = Vec::new();
        {
            let mut store = self.store.write();
            if let Some(listing) = batch.incidents {
                let complete = listing.is_complete(batch.incident_limit);
                changes.extend(merge_listing(
                    &mut store,
                    listing,
                    (prune && complete).then_some(batch.requested_at),
                    EntityKind::Incident,
                    |entity| {
                        entity
                            .as_incident()
                            .and_then(|incident| incident.status.as_ref())
                            .is_none_or(|status| {
                                IncidentStatus::ACTIVE.contains(status)
                            })
                    },
                ));
            }
            if let Some(listing) = batch.personnel {
                let complete = listing.is_complete(usize::MAX);
                changes.extend(merge_listing(
                    &mut store,
                    listing,
                    (prune && complete).then_some(batch.requested_at),
                    EntityKind::Personnel,
                    |entity| {
                        entity
                            .as_personnel()
                            .and_then(|person| person.duty_status)
                            .is_none_or(|status| status.is_projectable())
                    },
                ));
            }
            if let Some(listing) = batch.posts {
                let complete = listing.is_complete(usize::MAX);
                changes.extend(merge_listing(
                    &mut store,
                    listing,
                    (prune && complete).then_some(batch.requested_at),
                    EntityKind::Post,
                    |_| true,
                ));
            }
            let forgotten =
                store.forget_tombstones(self.clock.now() - tombstone_retention());
            if forgotten > 0 {
                debug!(forgotten, "expired tombstones");
            }
        }
        self.react(&changes);
        changes
    }

    fn react(&self, changes: &[StoreChange]) {
        if changes.is_empty() {
            return;
        }
        {
            let mut alerts = self.alerts.lock();
            for change in changes {
                match change {
                    StoreChange::Created(Entity::Incident(incident)) => {
                        alerts.on_created(incident);
                    }
                    StoreChange::Updated {
                        previous: Entity::Incident(previous),
                        current: Entity::Incident(current),
                    } => {
                        alerts.on_updated(previous, current);
                    }
                    StoreChange::Removed(Entity::Incident(incident)) => {
                        alerts.forget(&incident.id);
                    }
                    _ => {}
                }
            }
        }

        for change in changes {
            if let StoreChange::Updated {
                previous: Entity::Incident(previous),
                current: Entity::Incident(current),
            } = change
                && previous.responders_count != current.responders_count
            {
                self.bus.publish(Signal::AcknowledgementsChanged {
                    incident: current.id.clone(),
                    responders: current.responders_count,
                });
            }
        }
        self.invalidate();
    }

    /// Bump the view revision.
    pub fn invalidate(&self) {
        self.revision.send_modify(|revision| *revision += 1);
        let revision = *self.revision.borrow();
        self.bus.publish(Signal::ViewInvalidated { revision });
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Operator interaction with an incident's marker.
    pub fn dismiss(&self, incident: &IncidentId) -> bool {
        self.alerts.lock().dismiss(incident)
    }

    pub fn expire_notices(&self) -> Vec<IncidentId> {
        self.alerts.lock().expire()
    }

    pub fn alert(&self, incident: &IncidentId) -> Option<AlertRecord> {
        self.alerts.lock().get(incident).cloned()
    }

    pub fn showing_alerts(&self) -> Vec<AlertRecord> {
        self.alerts.lock().showing().cloned().collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.read().snapshot()
    }

    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        self.store.read().get(id)
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.store.read().len(kind)
    }
}

fn merge_listing<T: Into<Entity>>(
    store: &mut EntityStore,
    listing: Listing<T>,
    prune_before: Option<chrono::DateTime<chrono::Utc>>,
    kind: EntityKind,
    in_scope: impl Fn(&Entity) -> bool,
) -> Vec<StoreChange> {
    let mut present = HashSet::new();
    let mut changes = Vec::new();
    for item in listing.into_items() {
        let entity: Entity = item.into();
        present.insert(entity.id());
        changes.extend(store.upsert(entity));
    }
    if let Some(requested_at) = prune_before {
        let pruned = store.prune_missing(kind, &present, requested_at, in_scope);
        if !pruned.is_empty() {
            debug!(kind = %kind, pruned = pruned.len(), "pruned records missing from snapshot");
        }
        changes.extend(pruned);
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::Topic, clock::ManualClock};
    use chrono::{DateTime, Duration, Utc};
    use dispatch_model::{
        Incident, IncidentPriority, Personnel, PersonnelId,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_714_557_600, 0).unwrap()
    }

    fn reconciler() -> (Reconciler, ManualClock) {
        let clock = ManualClock::new(t0());
        let reconciler = Reconciler::new(
            Arc::new(clock.clone()),
            EventBus::default(),
            AlertConfig::default(),
            true,
        );
        (reconciler, clock)
    }

    fn incident(id: &str, at: DateTime<Utc>) -> Incident {
        Incident::new(IncidentId::new(id).unwrap())
            .with_status(IncidentStatus::Verified)
            .with_priority(IncidentPriority::Low)
            .with_last_event_at(at)
    }

    fn batch(incidents: Vec<Incident>, requested_at: DateTime<Utc>) -> PollBatch {
        PollBatch {
            requested_at,
            incident_limit: 50,
            incidents: Some(Listing::Bare(incidents)),
            ..Default::default()
        }
    }

    #[test]
    fn push_then_poll_creates_one_alert() {
        let (reconciler, _) = reconciler();
        let created = incident("INC-1", t0());
        reconciler.apply_event(PushEvent::IncidentCreated(created.clone()));
        reconciler.apply_batch(batch(vec![created], t0()));
        assert_eq!(reconciler.len(EntityKind::Incident), 1);
        assert_eq!(reconciler.showing_alerts().len(), 1);
    }

    #[test]
    fn responder_count_change_signals_acknowledgement() {
        let (reconciler, _) = reconciler();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = reconciler.bus.subscribe(Topic::Acknowledgements, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        reconciler.apply_event(PushEvent::IncidentCreated(incident("INC-1", t0())));
        let mut acked = incident("INC-1", t0() + Duration::seconds(5));
        acked.responders_count = Some(1);
        reconciler.apply_event(PushEvent::IncidentUpdated(acked));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn complete_snapshot_prunes_missed_deletions() {
        let (reconciler, clock) = reconciler();
        reconciler.apply_batch(batch(
            vec![incident("INC-1", t0()), incident("INC-2", t0())],
            t0(),
        ));
        clock.advance(Duration::minutes(1));
        let changes =
            reconciler.apply_batch(batch(vec![incident("INC-1", t0())], clock.now()));

        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0], StoreChange::Removed(_)));
        assert_eq!(reconciler.len(EntityKind::Incident), 1);
        assert!(
            reconciler
                .alert(&IncidentId::new("INC-2").unwrap())
                .is_none()
        );
    }

    #[test]
    fn truncated_snapshot_does_not_prune() {
        let (reconciler, clock) = reconciler();
        reconciler.apply_batch(batch(
            vec![incident("INC-1", t0()), incident("INC-2", t0())],
            t0(),
        ));
        clock.advance(Duration::minutes(1));
        let mut page = batch(vec![incident("INC-1", t0())], clock.now());
        page.incident_limit = 1;
        reconciler.apply_batch(page);
        assert_eq!(reconciler.len(EntityKind::Incident), 2);
    }

    #[test]
    fn off_duty_personnel_survive_snapshots_without_them() {
        let (reconciler, clock) = reconciler();
        reconciler.apply_frame(&PushFrame::new(
            "personnel:status",
            json!({"personnelId": "P-7", "status": "OFF_DUTY"}),
        ));
        clock.advance(Duration::minutes(1));
        reconciler.apply_batch(PollBatch {
            requested_at: clock.now(),
            personnel: Some(Listing::Bare(Vec::<Personnel>::new())),
            ..Default::default()
        });
        let id = EntityId::Personnel(PersonnelId::new("P-7").unwrap());
        assert!(reconciler.get(&id).is_some());
    }

    #[test]
    fn every_change_bumps_the_revision() {
        let (reconciler, _) = reconciler();
        let rx = reconciler.watch_revision();
        reconciler.apply_event(PushEvent::IncidentCreated(incident("INC-1", t0())));
        reconciler.apply_event(PushEvent::IncidentCreated(incident("INC-1", t0())));
        assert_eq!(*rx.borrow(), 1);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let (reconciler, _) = reconciler();
        let changes = reconciler.apply_frame(&PushFrame::new(
            "incident:created",
            json!({"status": "VERIFIED"}),
        ));
        assert!(changes.is_empty());
        assert_eq!(reconciler.revision(), 0);
    }
}
