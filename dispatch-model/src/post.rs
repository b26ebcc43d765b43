use crate::{ids::PostId, position::Position};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fixed post (station, checkpoint, depot). Read-mostly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    #[serde(
        default,
        alias = "location",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "type",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(
        default,
        alias = "updatedAt",
        with = "crate::time::flexible",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn new(id: PostId) -> Self {
        Self {
            id,
            position: None,
            name: None,
            kind: None,
            contact: None,
            last_event_at: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
