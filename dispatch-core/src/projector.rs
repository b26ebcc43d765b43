//! Final marker list from store contents, cached icons and operator filters.

use crate::{
    enrichment::{CacheEntry, MarkerEnrichmentCache},
    store::StoreSnapshot,
    visual::{ColorToken, Glyph, tokens_for},
};

use dispatch_model::{
    Entity, EntityId, EntityKind, OperatorFilters, Position,
};
use serde::{Serialize, Serializer};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Position,
    pub label: String,
    pub color: ColorToken,
    pub glyph: Glyph,
    /// HIGH/CRITICAL incidents.
    pub urgent: bool,
    #[serde(serialize_with = "serialize_entry")]
    pub icon: Arc<CacheEntry>,
}

fn serialize_entry<S: Serializer>(
    entry: &Arc<CacheEntry>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    entry.as_ref().serialize(serializer)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MarkerList {
    markers: Vec<Marker>,
}

impl MarkerList {
    pub fn iter(&self) -> std::slice::Iter<'_, Marker> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.markers.iter().filter(|m| m.kind == kind).count()
    }

    pub fn find(&self, id: &EntityId) -> Option<&Marker> {
        self.markers.iter().find(|m| &m.id == id)
    }

    pub fn into_vec(self) -> Vec<Marker> {
        self.markers
    }
}

impl<'a> IntoIterator for &'a MarkerList {
    type Item = &'a Marker;
    type IntoIter = std::slice::Iter<'a, Marker>;

    fn into_iter(self) -> Self::IntoIter {
        self.markers.iter()
    }
}

#[derive(Debug, Clone)]
pub struct ViewProjector {
    cache: MarkerEnrichmentCache,
}

impl ViewProjector {
    pub fn new(cache: MarkerEnrichmentCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &MarkerEnrichmentCache {
        &self.cache
    }

    /// Markers for every live, filtered and visible entity, incidents first,
    /// then personnel, then posts, each ordered by id.
    pub fn project(
        &self,
        snapshot: &StoreSnapshot,
        filters: &OperatorFilters,
    ) -> MarkerList {
        let entities = snapshot
            .incidents
            .iter()
            .cloned()
            .map(Entity::Incident)
            .chain(snapshot.personnel.iter().cloned().map(Entity::Personnel))
            .chain(snapshot.posts.iter().cloned().map(Entity::Post));

        let markers = entities
            .filter(is_live)
            .filter(|entity| passes_filters(entity, filters))
            .filter(|entity| filters.shows(entity.kind()))
            .filter_map(|entity| self.marker(entity))
            .collect();
        MarkerList { markers }
    }

    fn marker(&self, entity: Entity) -> Option<Marker> {
        let position = entity.position()?;
        let (color, glyph) = tokens_for(&entity);
        let urgent = entity
            .as_incident()
            .and_then(|incident| incident.priority)
            .is_some_and(|priority| priority.is_urgent());
        let icon = self.cache.get_icon(&entity);
        Some(Marker {
            id: entity.id(),
            kind: entity.kind(),
            position,
            label: entity.label(),
            color,
            glyph,
            urgent,
            icon,
        })
    }
}

/// Terminal incidents, off-shift personnel and anything without a usable
/// position never reach the map.
fn is_live(entity: &Entity) -> bool {
    if !entity.position().is_some_and(|position| position.is_known()) {
        return false;
    }
    match entity {
        Entity::Incident(incident) => !incident.is_terminal(),
        Entity::Personnel(person) => person
            .duty_status
            .is_some_and(|status| status.is_projectable()),
        Entity::Post(_) => true,
    }
}

fn passes_filters(entity: &Entity, filters: &OperatorFilters) -> bool {
    match entity {
        Entity::Incident(incident) => {
            incident
                .status
                .as_ref()
                .is_none_or(|status| filters.allows_incident_status(status))
                && filters.allows_priority(incident.priority)
        }
        Entity::Personnel(person) => person
            .duty_status
            .is_none_or(|status| filters.allows_duty_status(status)),
        Entity::Post(_) => true,
    }
}
