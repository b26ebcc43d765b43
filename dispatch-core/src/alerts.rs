//! Operator-facing incident alerts.
//!
//! Urgent incidents raise an audible call-to-action that stays until the
//! operator interacts with the marker; everything else gets a silent notice
//! that expires on its own. There is at most one [`AlertRecord`] per
//! incident for as long as the incident is live.

use crate::{
    bus::{EventBus, Signal},
    clock::{Clock, MAX_DELAY_MS, millis},
};

use chrono::{DateTime, Utc};
use dispatch_model::{Incident, IncidentId, IncidentPriority};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Lifetime of a silent notice.
    pub notice_ttl_ms: u64,
    /// How often the engine sweeps expired notices.
    pub expiry_sweep_ms: u64,
    /// Upgrade a showing or dismissed notice when priority becomes urgent.
    pub escalate_on_update: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            notice_ttl_ms: 8_000,
            expiry_sweep_ms: 1_000,
            escalate_on_update: true,
        }
    }
}

impl AlertConfig {
    pub fn notice_ttl(&self) -> chrono::Duration {
        let ms = self.notice_ttl_ms.min(MAX_DELAY_MS);
        chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }

    pub fn expiry_sweep(&self) -> std::time::Duration {
        millis(self.expiry_sweep_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Audible and persistent until dismissed.
    CallToAction,
    /// Silent and short-lived.
    Notice,
}

impl AlertKind {
    pub fn for_priority(priority: Option<IncidentPriority>) -> Self {
        match priority {
            Some(priority) if priority.is_urgent() => AlertKind::CallToAction,
            _ => AlertKind::Notice,
        }
    }

    pub fn is_audible(&self) -> bool {
        matches!(self, AlertKind::CallToAction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub incident: IncidentId,
    pub kind: AlertKind,
    pub priority: Option<IncidentPriority>,
    pub showing: bool,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AlertDispatcher {
    records: HashMap<IncidentId, AlertRecord>,
    config: AlertConfig,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig, bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: HashMap::new(),
            config,
            bus,
            clock,
        }
    }

    /// Raise the alert for a newly observed incident. A second creation for
    /// the same id is a no-op.
    pub fn on_created(&mut self, incident: &Incident) -> Option<AlertRecord> {
        if incident.is_terminal() {
            return None;
        }
        if self.records.contains_key(&incident.id) {
            debug!(incident = %incident.id, "alert already raised");
            return None;
        }

        let record = AlertRecord {
            incident: incident.id.clone(),
            kind: AlertKind::for_priority(incident.priority),
            priority: incident.priority,
            showing: true,
            raised_at: self.clock.now(),
        };
        info!(
            incident = %record.incident,
            kind = ?record.kind,
            priority = ?record.priority,
            "raising incident alert"
        );
        self.records.insert(record.incident.clone(), record.clone());
        self.bus.publish(Signal::AlertRaised(record.clone()));
        Some(record)
    }

    /// Escalate a notice when an update makes the incident urgent, or
    /// dismiss when it reaches a terminal status.
    pub fn on_updated(
        &mut self,
        previous: &Incident,
        current: &Incident,
    ) -> Option<AlertRecord> {
        if current.is_terminal() {
            self.dismiss(&current.id);
            return None;
        }
        if !self.config.escalate_on_update {
            return None;
        }

        let became_urgent = current.priority.is_some_and(|p| p.is_urgent())
            && !previous.priority.is_some_and(|p| p.is_urgent());
        if !became_urgent {
            return None;
        }

        let now = self.clock.now();
        let Some(record) = self.records.get_mut(&current.id) else {
            return self.on_created(current);
        };
        if record.kind != AlertKind::Notice {
            return None;
        }
        record.kind = AlertKind::CallToAction;
        record.priority = current.priority;
        record.showing = true;
        record.raised_at = now;
        let record = record.clone();
        info!(incident = %record.incident, "escalating notice to call-to-action");
        self.bus.publish(Signal::AlertRaised(record.clone()));
        Some(record)
    }

    /// Hide the alert for `incident`. Returns whether one was showing.
    pub fn dismiss(&mut self, incident: &IncidentId) -> bool {
        let Some(record) = self.records.get_mut(incident) else {
            return false;
        };
        if !record.showing {
            return false;
        }
        record.showing = false;
        debug!(incident = %incident, "alert dismissed");
        self.bus.publish(Signal::AlertDismissed(incident.clone()));
        true
    }

    /// Hide notices older than the configured lifetime.
    pub fn expire(&mut self) -> Vec<IncidentId> {
        let Some(cutoff) =
            self.clock.now().checked_sub_signed(self.config.notice_ttl())
        else {
            return Vec::new();
        };
        let expired: Vec<IncidentId> = self
            .records
            .values()
            .filter(|record| {
                record.showing
                    && record.kind == AlertKind::Notice
                    && record.raised_at <= cutoff
            })
            .map(|record| record.incident.clone())
            .collect();
        for incident in &expired {
            self.dismiss(incident);
        }
        expired
    }

    /// Drop the record of a removed incident, dismissing it first.
    pub fn forget(&mut self, incident: &IncidentId) {
        self.dismiss(incident);
        self.records.remove(incident);
    }

    pub fn get(&self, incident: &IncidentId) -> Option<&AlertRecord> {
        self.records.get(incident)
    }

    pub fn showing(&self) -> impl Iterator<Item = &AlertRecord> {
        self.records.values().filter(|record| record.showing)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
