//! Marker color and glyph tokens.
//!
//! Visuals are a pure mapping from entity kind and status; enrichment never
//! changes them, it only adds a photo overlay.

use dispatch_model::{DutyStatus, Entity, IncidentStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorToken {
    Red,
    Orange,
    Amber,
    Blue,
    Green,
    Purple,
    Teal,
    Grey,
}

impl ColorToken {
    pub fn hex(&self) -> &'static str {
        match self {
            ColorToken::Red => "#d32f2f",
            ColorToken::Orange => "#f57c00",
            ColorToken::Amber => "#ffa000",
            ColorToken::Blue => "#1976d2",
            ColorToken::Green => "#388e3c",
            ColorToken::Purple => "#7b1fa2",
            ColorToken::Teal => "#00796b",
            ColorToken::Grey => "#757575",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Glyph {
    Incident,
    Responder,
    Post,
}

pub fn incident_color(status: Option<&IncidentStatus>) -> ColorToken {
    match status {
        Some(IncidentStatus::PendingVerification) => ColorToken::Red,
        Some(IncidentStatus::Verified) => ColorToken::Orange,
        Some(IncidentStatus::Responding) => ColorToken::Amber,
        Some(IncidentStatus::Arrived) => ColorToken::Blue,
        Some(IncidentStatus::PendingResolve) => ColorToken::Green,
        Some(IncidentStatus::Resolved | IncidentStatus::Spam) => {
            ColorToken::Grey
        }
        Some(IncidentStatus::Other(_)) | None => ColorToken::Purple,
    }
}

pub fn duty_color(status: Option<DutyStatus>) -> ColorToken {
    match status {
        Some(DutyStatus::OnDuty) => ColorToken::Green,
        Some(DutyStatus::OnBreak) => ColorToken::Amber,
        Some(DutyStatus::Responding) => ColorToken::Blue,
        Some(DutyStatus::OnScene) => ColorToken::Purple,
        Some(DutyStatus::OffDuty) | None => ColorToken::Grey,
    }
}

pub fn tokens_for(entity: &Entity) -> (ColorToken, Glyph) {
    match entity {
        Entity::Incident(incident) => {
            (incident_color(incident.status.as_ref()), Glyph::Incident)
        }
        Entity::Personnel(person) => {
            (duty_color(person.duty_status), Glyph::Responder)
        }
        Entity::Post(_) => (ColorToken::Teal, Glyph::Post),
    }
}

/// Up to two uppercase initials from a label.
pub fn initials(label: &str) -> String {
    let words: Vec<&str> = label
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|word| !word.is_empty())
        .collect();
    let picked: String = match words.as_slice() {
        [] => String::new(),
        [only] => only.chars().take(2).collect(),
        [first, .., last] => first
            .chars()
            .take(1)
            .chain(last.chars().take(1))
            .collect(),
    };
    picked.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initials_take_first_and_last_words() {
        assert_eq!(initials("Budi Santoso"), "BS");
        assert_eq!(initials("Ayu Dewi Lestari"), "AL");
        assert_eq!(initials("kilo"), "KI");
        assert_eq!(initials("   "), "");
    }

    #[test]
    fn status_changes_color() {
        assert_ne!(
            incident_color(Some(&IncidentStatus::PendingVerification)),
            incident_color(Some(&IncidentStatus::Responding))
        );
        assert_eq!(duty_color(Some(DutyStatus::OffDuty)), ColorToken::Grey);
    }
}
