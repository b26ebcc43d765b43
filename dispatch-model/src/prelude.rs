//! Snapshot of the model surface for engine and console code.

pub use super::entity::Entity;
pub use super::error::{ModelError, Result as ModelResult};
pub use super::events::{
    Heartbeat, HeartbeatAck, PersonnelLocation, PersonnelStatusChange,
    PushEvent, PushFrame, names as event_names,
};
pub use super::filters::OperatorFilters;
pub use super::ids::{EntityId, EntityKind, IncidentId, PersonnelId, PostId};
pub use super::incident::{Incident, IncidentPriority, IncidentStatus};
pub use super::personnel::{DutyStatus, Personnel};
pub use super::position::Position;
pub use super::post::Post;
pub use super::snapshot::Listing;
