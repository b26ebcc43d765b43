//! Push-channel vocabulary.
//!
//! Every frame on the wire is `{"event": <name>, "data": <payload>}`. Frames
//! are decoded into [`PushEvent`]; names outside the vocabulary decode to
//! `None` so newer servers can add events without breaking older consoles.

use crate::{
    error::{ModelError, Result},
    ids::{IncidentId, PersonnelId},
    incident::Incident,
    personnel::{DutyStatus, Personnel},
    position::Position,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Event names used on the push channel.
pub mod names {
    pub const INCIDENT_CREATED: &str = "incident:created";
    pub const INCIDENT_UPDATED: &str = "incident:updated";
    pub const INCIDENT_DELETED: &str = "incident:deleted";
    pub const INCIDENT_INVALIDATED: &str = "incident:invalidated";
    pub const PERSONNEL_LOCATION: &str = "personnel:location";
    pub const PERSONNEL_LOCATION_UPDATED: &str = "personnel:location:updated";
    pub const PERSONNEL_STATUS: &str = "personnel:status";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const HEARTBEAT_ACK: &str = "heartbeat:ack";

    /// Entity events the sync engine subscribes to.
    pub const ENTITY_EVENTS: [&str; 7] = [
        INCIDENT_CREATED,
        INCIDENT_UPDATED,
        INCIDENT_DELETED,
        INCIDENT_INVALIDATED,
        PERSONNEL_LOCATION,
        PERSONNEL_LOCATION_UPDATED,
        PERSONNEL_STATUS,
    ];
}

/// Raw frame envelope, both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PushFrame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn heartbeat(heartbeat: &Heartbeat) -> Result<Self> {
        Ok(Self::new(names::HEARTBEAT, serde_json::to_value(heartbeat)?))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outbound liveness ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub nonce: u64,
    pub sent_at: DateTime<Utc>,
}

/// Server echo of a [`Heartbeat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub nonce: u64,
}

/// Id-only payloads come either bare or wrapped in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdPayload<T> {
    Bare(T),
    Wrapped {
        #[serde(alias = "incidentId", alias = "personnelId")]
        id: T,
    },
}

impl<T> IdPayload<T> {
    fn into_id(self) -> T {
        match self {
            IdPayload::Bare(id) | IdPayload::Wrapped { id } => id,
        }
    }
}

/// Location ping for a responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonnelLocation {
    #[serde(alias = "id", alias = "userId")]
    pub personnel_id: PersonnelId,
    #[serde(default, alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(default, alias = "longitude", alias = "lon")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub location: Option<Position>,
    #[serde(
        default,
        alias = "lastEventAt",
        with = "crate::time::flexible"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PersonnelLocation {
    pub fn position(&self) -> Option<Position> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Position::new(lat, lng)),
            _ => self.location,
        }
    }

    /// Position-only partial record.
    pub fn into_personnel(self) -> Personnel {
        let position = self.position();
        let mut person = Personnel::new(self.personnel_id);
        person.position = position;
        person.last_event_at = self.timestamp;
        person
    }
}

/// Duty status change for a responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonnelStatusChange {
    #[serde(alias = "id", alias = "userId")]
    pub personnel_id: PersonnelId,
    #[serde(alias = "dutyStatus")]
    pub status: DutyStatus,
    #[serde(
        default,
        alias = "lastEventAt",
        with = "crate::time::flexible"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PersonnelStatusChange {
    /// Status-only partial record.
    pub fn into_personnel(self) -> Personnel {
        let mut person =
            Personnel::new(self.personnel_id).with_duty_status(self.status);
        person.last_event_at = self.timestamp;
        person
    }
}

/// Decoded push-channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    IncidentCreated(Incident),
    IncidentUpdated(Incident),
    IncidentDeleted(IncidentId),
    IncidentInvalidated(IncidentId),
    PersonnelLocation(PersonnelLocation),
    PersonnelStatus(PersonnelStatusChange),
    HeartbeatAck(HeartbeatAck),
}

impl PushEvent {
    /// Decode a payload for `event`. Unknown names yield `Ok(None)`.
    pub fn decode(event: &str, data: serde_json::Value) -> Result<Option<Self>> {
        let decoded = match event {
            names::INCIDENT_CREATED => {
                PushEvent::IncidentCreated(from_value(data)?)
            }
            names::INCIDENT_UPDATED => {
                PushEvent::IncidentUpdated(from_value(data)?)
            }
            names::INCIDENT_DELETED => PushEvent::IncidentDeleted(
                from_value::<IdPayload<IncidentId>>(data)?.into_id(),
            ),
            names::INCIDENT_INVALIDATED => PushEvent::IncidentInvalidated(
                from_value::<IdPayload<IncidentId>>(data)?.into_id(),
            ),
            names::PERSONNEL_LOCATION | names::PERSONNEL_LOCATION_UPDATED => {
                let ping: PersonnelLocation = from_value(data)?;
                if ping.position().is_none() {
                    return Err(ModelError::InvalidPayload(format!(
                        "location ping for {} has no coordinates",
                        ping.personnel_id
                    )));
                }
                PushEvent::PersonnelLocation(ping)
            }
            names::PERSONNEL_STATUS => {
                PushEvent::PersonnelStatus(from_value(data)?)
            }
            names::HEARTBEAT_ACK => PushEvent::HeartbeatAck(from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }

    pub fn decode_frame(frame: PushFrame) -> Result<Option<Self>> {
        Self::decode(&frame.event, frame.data)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::IncidentCreated(_) => names::INCIDENT_CREATED,
            PushEvent::IncidentUpdated(_) => names::INCIDENT_UPDATED,
            PushEvent::IncidentDeleted(_) => names::INCIDENT_DELETED,
            PushEvent::IncidentInvalidated(_) => names::INCIDENT_INVALIDATED,
            PushEvent::PersonnelLocation(_) => names::PERSONNEL_LOCATION,
            PushEvent::PersonnelStatus(_) => names::PERSONNEL_STATUS,
            PushEvent::HeartbeatAck(_) => names::HEARTBEAT_ACK,
        }
    }
}

fn from_value<T: DeserializeOwned>(data: serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(data)?)
}
