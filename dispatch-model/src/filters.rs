use crate::{
    ids::EntityKind,
    incident::{IncidentPriority, IncidentStatus},
    personnel::DutyStatus,
};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Operator-controlled visibility state for the map.
///
/// Empty status/priority sets mean "no restriction".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatorFilters {
    pub show_incidents: bool,
    pub show_personnel: bool,
    pub show_posts: bool,
    pub incident_statuses: HashSet<IncidentStatus>,
    pub priorities: HashSet<IncidentPriority>,
    pub personnel_statuses: HashSet<DutyStatus>,
}

impl Default for OperatorFilters {
    fn default() -> Self {
        Self {
            show_incidents: true,
            show_personnel: true,
            show_posts: true,
            incident_statuses: HashSet::new(),
            priorities: HashSet::new(),
            personnel_statuses: HashSet::new(),
        }
    }
}

impl OperatorFilters {
    pub fn shows(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Incident => self.show_incidents,
            EntityKind::Personnel => self.show_personnel,
            EntityKind::Post => self.show_posts,
        }
    }

    pub fn set_visible(&mut self, kind: EntityKind, visible: bool) {
        match kind {
            EntityKind::Incident => self.show_incidents = visible,
            EntityKind::Personnel => self.show_personnel = visible,
            EntityKind::Post => self.show_posts = visible,
        }
    }

    pub fn allows_incident_status(&self, status: &IncidentStatus) -> bool {
        self.incident_statuses.is_empty()
            || self.incident_statuses.contains(status)
    }

    /// Incidents without a priority pass only an unrestricted filter.
    pub fn allows_priority(&self, priority: Option<IncidentPriority>) -> bool {
        if self.priorities.is_empty() {
            return true;
        }
        priority.is_some_and(|p| self.priorities.contains(&p))
    }

    pub fn allows_duty_status(&self, status: DutyStatus) -> bool {
        self.personnel_statuses.is_empty()
            || self.personnel_statuses.contains(&status)
    }
}
