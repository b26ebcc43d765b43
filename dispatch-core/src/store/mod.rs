//! In-memory authoritative collections.
//!
//! The store is synchronous and owned by a single component. Every mutation
//! returns the resulting [`StoreChange`] (or `None` for a no-op) and fans it
//! out to registered listeners. Listeners run while the caller still holds
//! the store, so they must not try to lock it again.

mod merge;

use merge::{Merge, Stamped};

use crate::{
    bus::{Listeners, Subscription},
    clock::Clock,
};

use chrono::{DateTime, Utc};
use dispatch_model::{
    Entity, EntityId, EntityKind, Incident, IncidentId, Personnel,
    PersonnelId, Post, PostId,
};
use std::{
    collections::{HashMap, HashSet, hash_map},
    hash::Hash,
    sync::Arc,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Created(Entity),
    Updated { previous: Entity, current: Entity },
    Removed(Entity),
}

impl StoreChange {
    /// The record as it stands after the change (or as it was removed).
    pub fn entity(&self) -> &Entity {
        match self {
            StoreChange::Created(entity)
            | StoreChange::Updated {
                current: entity, ..
            }
            | StoreChange::Removed(entity) => entity,
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity().id()
    }
}

/// Point-in-time copy of every collection, ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub incidents: Vec<Incident>,
    pub personnel: Vec<Personnel>,
    pub posts: Vec<Post>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.incidents.len() + self.personnel.len() + self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct EntityStore {
    incidents: HashMap<IncidentId, Stamped<Incident>>,
    personnel: HashMap<PersonnelId, Stamped<Personnel>>,
    posts: HashMap<PostId, Stamped<Post>>,
    // Removal time per id; events at or before it are stale.
    tombstones: HashMap<EntityId, DateTime<Utc>>,
    clock: Arc<dyn Clock>,
    listeners: Listeners<StoreChange>,
}

impl EntityStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            incidents: HashMap::new(),
            personnel: HashMap::new(),
            posts: HashMap::new(),
            tombstones: HashMap::new(),
            clock,
            listeners: Listeners::new(),
        }
    }

    /// Register a change listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    /// Merge `entity` into its collection.
    ///
    /// An event without `lastEventAt` is stamped with the receipt time.
    pub fn upsert(&mut self, entity: impl Into<Entity>) -> Option<StoreChange> {
        let mut entity = entity.into();
        let at = match entity.last_event_at() {
            Some(at) => at,
            None => {
                let now = self.clock.now();
                entity.set_last_event_at(now);
                now
            }
        };

        let id = entity.id();
        if let Some(removed_at) = self.tombstones.get(&id) {
            if at <= *removed_at {
                debug!(entity = %id, %at, %removed_at, "ignoring event for removed entity");
                return None;
            }
            debug!(entity = %id, "newer event reopens removed entity");
            self.tombstones.remove(&id);
        }

        let change = match entity {
            Entity::Incident(incident) => self.upsert_incident(incident, at),
            Entity::Personnel(person) => upsert_record(
                &mut self.personnel,
                person.id.clone(),
                person,
                at,
                Entity::Personnel,
            ),
            Entity::Post(post) => upsert_record(
                &mut self.posts,
                post.id.clone(),
                post,
                at,
                Entity::Post,
            ),
        };

        if let Some(change) = &change {
            self.listeners.notify(change);
        }
        change
    }

    // Terminal incidents leave the active set; the removal is reported once
    // and tombstoned so replays cannot report it again.
    fn upsert_incident(
        &mut self,
        incoming: Incident,
        at: DateTime<Utc>,
    ) -> Option<StoreChange> {
        let id = incoming.id.clone();
        let Some(stored) = self.incidents.get_mut(&id) else {
            if incoming.is_terminal() {
                debug!(incident = %id, "terminal incident never entered the active set");
                self.tombstones.insert(EntityId::Incident(id), at);
                return None;
            }
            let created = Stamped::create(incoming, at);
            let record = created.record.clone();
            self.incidents.insert(id, created);
            return Some(StoreChange::Created(Entity::Incident(record)));
        };

        let previous = stored.record.clone();
        stored.apply(incoming, at);
        let stored = &stored.record;

        if stored.is_terminal() {
            let merged = stored.clone();
            let removed_at = merged.last_event_at.unwrap_or(at);
            self.incidents.remove(&id);
            self.tombstones.insert(EntityId::Incident(id), removed_at);
            return Some(StoreChange::Removed(Entity::Incident(merged)));
        }

        if *stored == previous {
            return None;
        }
        Some(StoreChange::Updated {
            previous: Entity::Incident(previous),
            current: Entity::Incident(stored.clone()),
        })
    }

    /// Remove `id`, stamping the tombstone with the receipt time.
    /// Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &EntityId) -> Option<StoreChange> {
        let now = self.clock.now();
        self.remove_at(id, now)
    }

    pub fn remove_at(
        &mut self,
        id: &EntityId,
        at: DateTime<Utc>,
    ) -> Option<StoreChange> {
        let removed = match id {
            EntityId::Incident(id) => {
                self.incidents.remove(id).map(|s| Entity::Incident(s.record))
            }
            EntityId::Personnel(id) => {
                self.personnel.remove(id).map(|s| Entity::Personnel(s.record))
            }
            EntityId::Post(id) => {
                self.posts.remove(id).map(|s| Entity::Post(s.record))
            }
        }?;

        let removed_at = removed.last_event_at().map_or(at, |last| last.max(at));
        self.tombstones.insert(id.clone(), removed_at);
        let change = StoreChange::Removed(removed);
        self.listeners.notify(&change);
        Some(change)
    }

    /// Remove records of `kind` missing from a complete snapshot.
    ///
    /// `in_scope` selects the records the snapshot query could have
    /// returned. Only records whose last event predates `requested_at` are
    /// pruned; anything newer arrived while the snapshot was in flight.
    pub fn prune_missing(
        &mut self,
        kind: EntityKind,
        present: &HashSet<EntityId>,
        requested_at: DateTime<Utc>,
        in_scope: impl Fn(&Entity) -> bool,
    ) -> Vec<StoreChange> {
        let stale: Vec<EntityId> = self
            .get_all(kind)
            .into_iter()
            .filter(|entity| {
                in_scope(entity)
                    && !present.contains(&entity.id())
                    && entity.last_event_at().is_some_and(|at| at < requested_at)
            })
            .map(|entity| entity.id())
            .collect();

        stale
            .iter()
            .filter_map(|id| self.remove_at(id, requested_at))
            .collect()
    }

    /// Drop tombstones recorded before `cutoff`.
    pub fn forget_tombstones(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.tombstones.len();
        self.tombstones.retain(|_, removed_at| *removed_at >= cutoff);
        before - self.tombstones.len()
    }

    pub fn is_tombstoned(&self, id: &EntityId) -> bool {
        self.tombstones.contains_key(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        match id {
            EntityId::Incident(id) => {
                self.incident(id).cloned().map(Entity::Incident)
            }
            EntityId::Personnel(id) => {
                self.person(id).cloned().map(Entity::Personnel)
            }
            EntityId::Post(id) => self.post(id).cloned().map(Entity::Post),
        }
    }

    pub fn incident(&self, id: &IncidentId) -> Option<&Incident> {
        self.incidents.get(id).map(|stamped| &stamped.record)
    }

    pub fn person(&self, id: &PersonnelId) -> Option<&Personnel> {
        self.personnel.get(id).map(|stamped| &stamped.record)
    }

    pub fn post(&self, id: &PostId) -> Option<&Post> {
        self.posts.get(id).map(|stamped| &stamped.record)
    }

    /// Every record of `kind`, ordered by id.
    pub fn get_all(&self, kind: EntityKind) -> Vec<Entity> {
        match kind {
            EntityKind::Incident => sorted(&self.incidents)
                .into_iter()
                .map(Entity::Incident)
                .collect(),
            EntityKind::Personnel => sorted(&self.personnel)
                .into_iter()
                .map(Entity::Personnel)
                .collect(),
            EntityKind::Post => {
                sorted(&self.posts).into_iter().map(Entity::Post).collect()
            }
        }
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Incident => self.incidents.len(),
            EntityKind::Personnel => self.personnel.len(),
            EntityKind::Post => self.posts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
            && self.personnel.is_empty()
            && self.posts.is_empty()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            incidents: sorted(&self.incidents),
            personnel: sorted(&self.personnel),
            posts: sorted(&self.posts),
        }
    }
}

fn sorted<K: Ord, V: Clone>(map: &HashMap<K, Stamped<V>>) -> Vec<V> {
    let mut entries: Vec<(&K, &Stamped<V>)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(_, stamped)| stamped.record.clone())
        .collect()
}

fn upsert_record<K, T>(
    map: &mut HashMap<K, Stamped<T>>,
    key: K,
    incoming: T,
    at: DateTime<Utc>,
    wrap: fn(T) -> Entity,
) -> Option<StoreChange>
where
    K: Eq + Hash,
    T: Merge,
{
    match map.entry(key) {
        hash_map::Entry::Vacant(slot) => {
            let created = slot.insert(Stamped::create(incoming, at));
            Some(StoreChange::Created(wrap(created.record.clone())))
        }
        hash_map::Entry::Occupied(mut slot) => {
            let previous = slot.get().record.clone();
            slot.get_mut().apply(incoming, at);
            let current = &slot.get().record;
            if *current == previous {
                return None;
            }
            Some(StoreChange::Updated {
                previous: wrap(previous),
                current: wrap(current.clone()),
            })
        }
    }
}
