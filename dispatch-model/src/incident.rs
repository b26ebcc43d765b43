use crate::{error::ModelError, ids::IncidentId, position::Position};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Lifecycle state of an incident.
///
/// The server adds states from time to time; anything unrecognised is kept
/// verbatim in [`IncidentStatus::Other`] and treated as live.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum IncidentStatus {
    PendingVerification,
    Verified,
    Responding,
    Arrived,
    PendingResolve,
    Resolved,
    Spam,
    Other(String),
}

impl IncidentStatus {
    /// States that are served by the active-incidents endpoint.
    pub const ACTIVE: [IncidentStatus; 5] = [
        IncidentStatus::PendingVerification,
        IncidentStatus::Verified,
        IncidentStatus::Responding,
        IncidentStatus::Arrived,
        IncidentStatus::PendingResolve,
    ];

    /// Terminal for the live view: the incident leaves the active set.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Spam)
    }

    pub fn as_wire(&self) -> &str {
        match self {
            IncidentStatus::PendingVerification => "PENDING_VERIFICATION",
            IncidentStatus::Verified => "VERIFIED",
            IncidentStatus::Responding => "RESPONDING",
            IncidentStatus::Arrived => "ARRIVED",
            IncidentStatus::PendingResolve => "PENDING_RESOLVE",
            IncidentStatus::Resolved => "RESOLVED",
            IncidentStatus::Spam => "SPAM",
            IncidentStatus::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for IncidentStatus {
    fn from(raw: String) -> Self {
        match normalize(&raw).as_str() {
            "PENDING_VERIFICATION" => IncidentStatus::PendingVerification,
            "VERIFIED" => IncidentStatus::Verified,
            "RESPONDING" => IncidentStatus::Responding,
            "ARRIVED" => IncidentStatus::Arrived,
            "PENDING_RESOLVE" => IncidentStatus::PendingResolve,
            "RESOLVED" => IncidentStatus::Resolved,
            "SPAM" => IncidentStatus::Spam,
            _ => IncidentStatus::Other(raw),
        }
    }
}

impl From<IncidentStatus> for String {
    fn from(status: IncidentStatus) -> Self {
        match status {
            IncidentStatus::Other(raw) => raw,
            known => known.as_wire().to_string(),
        }
    }
}

impl FromStr for IncidentStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IncidentStatus::from(s.to_string()))
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Triage priority of an incident, ordered from least to most urgent.
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
pub enum IncidentPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl IncidentPriority {
    pub const ALL: [IncidentPriority; 4] = [
        IncidentPriority::Low,
        IncidentPriority::Medium,
        IncidentPriority::High,
        IncidentPriority::Critical,
    ];

    /// HIGH and CRITICAL demand an audible, persistent alert.
    pub fn is_urgent(&self) -> bool {
        matches!(self, IncidentPriority::High | IncidentPriority::Critical)
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            IncidentPriority::Low => "LOW",
            IncidentPriority::Medium => "MEDIUM",
            IncidentPriority::High => "HIGH",
            IncidentPriority::Critical => "CRITICAL",
        }
    }
}

impl TryFrom<String> for IncidentPriority {
    type Error = ModelError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match normalize(&raw).as_str() {
            "LOW" => Ok(IncidentPriority::Low),
            "MEDIUM" | "NORMAL" => Ok(IncidentPriority::Medium),
            "HIGH" => Ok(IncidentPriority::High),
            "CRITICAL" | "URGENT" => Ok(IncidentPriority::Critical),
            _ => Err(ModelError::UnknownStatus(raw)),
        }
    }
}

impl From<IncidentPriority> for String {
    fn from(priority: IncidentPriority) -> Self {
        priority.as_wire().to_string()
    }
}

impl FromStr for IncidentPriority {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IncidentPriority::try_from(s.to_string())
    }
}

impl fmt::Display for IncidentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

pub(crate) fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

/// An incident as carried by push events and poll snapshots.
///
/// Every mutable attribute is optional: partial payloads leave fields out and
/// the store backfills them from whichever event carried them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: IncidentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<IncidentPriority>,
    #[serde(
        default,
        alias = "location",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responders_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(
        default,
        with = "crate::time::flexible",
        skip_serializing_if = "Option::is_none"
    )]
    pub reported_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "updatedAt",
        with = "crate::time::flexible",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn new(id: IncidentId) -> Self {
        Self {
            id,
            status: None,
            priority: None,
            position: None,
            responders_count: None,
            title: None,
            category: None,
            address: None,
            reported_at: None,
            last_event_at: None,
        }
    }

    pub fn with_status(mut self, status: IncidentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: IncidentPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_last_event_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_event_at = Some(at);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(IncidentStatus::is_terminal)
    }
}
