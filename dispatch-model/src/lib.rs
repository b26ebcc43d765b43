//! Core data model shared across the dispatch crates: entity records, their
//! statuses, the push-channel vocabulary and poll payload shapes.
#![allow(missing_docs)]

pub mod entity;
pub mod error;
pub mod events;
pub mod filters;
pub mod ids;
pub mod incident;
pub mod personnel;
pub mod position;
pub mod post;
pub mod prelude;
pub mod snapshot;
pub mod time;

// Intentionally curated re-exports for downstream consumers.
pub use entity::Entity;
pub use error::{ModelError, Result as ModelResult};
pub use events::{PushEvent, PushFrame};
pub use filters::OperatorFilters;
pub use ids::{EntityId, EntityKind, IncidentId, PersonnelId, PostId};
pub use incident::{Incident, IncidentPriority, IncidentStatus};
pub use personnel::{DutyStatus, Personnel};
pub use position::Position;
pub use post::Post;
pub use snapshot::Listing;
