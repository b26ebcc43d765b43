use crate::{
    error::ModelError, ids::PersonnelId, incident::normalize, position::Position,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Duty state of a responder.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum DutyStatus {
    OnDuty,
    OnBreak,
    OffDuty,
    Responding,
    OnScene,
}

impl DutyStatus {
    /// Statuses shown on the map as available personnel.
    pub const PROJECTABLE: [DutyStatus; 2] =
        [DutyStatus::OnDuty, DutyStatus::OnBreak];

    pub fn is_projectable(&self) -> bool {
        matches!(self, DutyStatus::OnDuty | DutyStatus::OnBreak)
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            DutyStatus::OnDuty => "ON_DUTY",
            DutyStatus::OnBreak => "ON_BREAK",
            DutyStatus::OffDuty => "OFF_DUTY",
            DutyStatus::Responding => "RESPONDING",
            DutyStatus::OnScene => "ON_SCENE",
        }
    }
}

impl TryFrom<String> for DutyStatus {
    type Error = ModelError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match normalize(&raw).as_str() {
            "ON_DUTY" => Ok(DutyStatus::OnDuty),
            "ON_BREAK" => Ok(DutyStatus::OnBreak),
            "OFF_DUTY" => Ok(DutyStatus::OffDuty),
            "RESPONDING" => Ok(DutyStatus::Responding),
            "ON_SCENE" => Ok(DutyStatus::OnScene),
            _ => Err(ModelError::UnknownStatus(raw)),
        }
    }
}

impl From<DutyStatus> for String {
    fn from(status: DutyStatus) -> Self {
        status.as_wire().to_string()
    }
}

impl FromStr for DutyStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DutyStatus::try_from(s.to_string())
    }
}

impl fmt::Display for DutyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A responder. Location pings carry only `position` and a timestamp, status
/// changes only `duty_status`, so everything but the id is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personnel {
    pub id: PersonnelId,
    #[serde(
        default,
        alias = "status",
        skip_serializing_if = "Option::is_none"
    )]
    pub duty_status: Option<DutyStatus>,
    #[serde(
        default,
        alias = "location",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<Position>,
    #[serde(
        default,
        alias = "photoUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(
        default,
        alias = "updatedAt",
        with = "crate::time::flexible",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl Personnel {
    pub fn new(id: PersonnelId) -> Self {
        Self {
            id,
            duty_status: None,
            position: None,
            photo_ref: None,
            name: None,
            callsign: None,
            last_event_at: None,
        }
    }

    pub fn with_duty_status(mut self, status: DutyStatus) -> Self {
        self.duty_status = Some(status);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_photo_ref(mut self, photo_ref: impl Into<String>) -> Self {
        self.photo_ref = Some(photo_ref.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_last_event_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_event_at = Some(at);
        self
    }

    /// A non-blank photo reference is a secondary asset worth enriching.
    pub fn photo(&self) -> Option<&str> {
        self.photo_ref
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_on_duty_and_on_break_are_projectable() {
        assert!(DutyStatus::OnDuty.is_projectable());
        assert!(DutyStatus::OnBreak.is_projectable());
        assert!(!DutyStatus::OffDuty.is_projectable());
        assert!(!DutyStatus::OnScene.is_projectable());
    }

    #[test]
    fn blank_photo_is_not_an_asset() {
        let id = PersonnelId::new("P-1").unwrap();
        assert!(Personnel::new(id.clone()).with_photo_ref("  ").photo().is_none());
        assert_eq!(
            Personnel::new(id).with_photo_ref("/p/1.jpg").photo(),
            Some("/p/1.jpg")
        );
    }
}
