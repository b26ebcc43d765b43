use crate::{
    ids::{EntityId, EntityKind},
    incident::Incident,
    personnel::Personnel,
    position::Position,
    post::Post,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Any record kept by the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Entity {
    Incident(Incident),
    Personnel(Personnel),
    Post(Post),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Incident(incident) => EntityId::Incident(incident.id.clone()),
            Entity::Personnel(person) => EntityId::Personnel(person.id.clone()),
            Entity::Post(post) => EntityId::Post(post.id.clone()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Incident(_) => EntityKind::Incident,
            Entity::Personnel(_) => EntityKind::Personnel,
            Entity::Post(_) => EntityKind::Post,
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            Entity::Incident(incident) => incident.position,
            Entity::Personnel(person) => person.position,
            Entity::Post(post) => post.position,
        }
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Entity::Incident(incident) => incident.last_event_at,
            Entity::Personnel(person) => person.last_event_at,
            Entity::Post(post) => post.last_event_at,
        }
    }

    pub fn set_last_event_at(&mut self, at: DateTime<Utc>) {
        match self {
            Entity::Incident(incident) => incident.last_event_at = Some(at),
            Entity::Personnel(person) => person.last_event_at = Some(at),
            Entity::Post(post) => post.last_event_at = Some(at),
        }
    }

    /// Human label used for markers and fallback initials.
    pub fn label(&self) -> String {
        match self {
            Entity::Incident(incident) => incident
                .title
                .clone()
                .unwrap_or_else(|| incident.id.to_string()),
            Entity::Personnel(person) => person
                .name
                .clone()
                .or_else(|| person.callsign.clone())
                .unwrap_or_else(|| person.id.to_string()),
            Entity::Post(post) => {
                post.name.clone().unwrap_or_else(|| post.id.to_string())
            }
        }
    }

    pub fn as_incident(&self) -> Option<&Incident> {
        match self {
            Entity::Incident(incident) => Some(incident),
            _ => None,
        }
    }

    pub fn as_personnel(&self) -> Option<&Personnel> {
        match self {
            Entity::Personnel(person) => Some(person),
            _ => None,
        }
    }

    pub fn as_post(&self) -> Option<&Post> {
        match self {
            Entity::Post(post) => Some(post),
            _ => None,
        }
    }
}

impl From<Incident> for Entity {
    fn from(incident: Incident) -> Self {
        Entity::Incident(incident)
    }
}

impl From<Personnel> for Entity {
    fn from(person: Personnel) -> Self {
        Entity::Personnel(person)
    }
}

impl From<Post> for Entity {
    fn from(post: Post) -> Self {
        Entity::Post(post)
    }
}
