use crate::visual::initials;

use dispatch_model::{Entity, EntityId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a derived marker icon.
///
/// Any input that changes the rendered icon is part of the key, so a
/// changed input yields a new key and a fresh entry instead of an edit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub entity: EntityId,
    pub status: String,
    pub initials: String,
    /// Secondary asset reference, when the entity has one.
    pub asset: Option<String>,
}

impl CacheKey {
    pub fn for_entity(entity: &Entity) -> Self {
        let status = match entity {
            Entity::Incident(incident) => incident
                .status
                .as_ref()
                .map_or("UNKNOWN", |status| status.as_wire())
                .to_string(),
            Entity::Personnel(person) => person
                .duty_status
                .map_or("UNKNOWN", |status| status.as_wire())
                .to_string(),
            Entity::Post(_) => "POST".to_string(),
        };
        let asset = entity
            .as_personnel()
            .and_then(|person| person.photo())
            .map(str::to_string);

        Self {
            entity: entity.id(),
            status,
            initials: initials(&entity.label()),
            asset,
        }
    }

    pub fn has_asset(&self) -> bool {
        self.asset.is_some()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.entity,
            self.status,
            if self.has_asset() { "asset" } else { "plain" }
        )
    }
}
