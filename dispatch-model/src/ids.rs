use crate::error::ModelError;

use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;

/// Ids arrive as strings from the push channel but some poll endpoints emit
/// bare integers for legacy rows.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> Result<String, ModelError> {
        match self {
            RawId::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Err(ModelError::InvalidId("id cannot be empty".to_string()))
                } else {
                    Ok(trimmed.to_string())
                }
            }
            RawId::Number(n) => Ok(n.to_string()),
        }
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, ModelError> {
                RawId::Text(id.into()).into_string().map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                RawId::deserialize(deserializer)?
                    .into_string()
                    .map(Self)
                    .map_err(de::Error::custom)
            }
        }
    };
}

entity_id!(
    /// Strongly typed id for incidents.
    IncidentId
);
entity_id!(
    /// Strongly typed id for personnel.
    PersonnelId
);
entity_id!(
    /// Strongly typed id for fixed posts.
    PostId
);

/// The three entity collections kept by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Incident,
    Personnel,
    Post,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] =
        [EntityKind::Incident, EntityKind::Personnel, EntityKind::Post];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Incident => "incident",
            EntityKind::Personnel => "personnel",
            EntityKind::Post => "post",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Id of any entity, tagged with its collection.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityId {
    Incident(IncidentId),
    Personnel(PersonnelId),
    Post(PostId),
}

impl EntityId {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityId::Incident(_) => EntityKind::Incident,
            EntityId::Personnel(_) => EntityKind::Personnel,
            EntityId::Post(_) => EntityKind::Post,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntityId::Incident(id) => id.as_str(),
            EntityId::Personnel(id) => id.as_str(),
            EntityId::Post(id) => id.as_str(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_str())
    }
}

impl From<IncidentId> for EntityId {
    fn from(id: IncidentId) -> Self {
        EntityId::Incident(id)
    }
}

impl From<PersonnelId> for EntityId {
    fn from(id: PersonnelId) -> Self {
        EntityId::Personnel(id)
    }
}

impl From<PostId> for EntityId {
    fn from(id: PostId) -> Self {
        EntityId::Post(id)
    }
}
