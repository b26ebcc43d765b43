//! Field-level last-write-wins merge.
//!
//! Every field remembers the time of the event that last wrote it. An
//! incoming field overwrites only when its event is strictly newer than that
//! stamp; a field never written before is always taken. The record's
//! `last_event_at` is the newest event time applied to it.

use chrono::{DateTime, Utc};
use dispatch_model::{Incident, Personnel, Post};
use std::collections::HashMap;

/// Write time per field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FieldStamps(HashMap<&'static str, DateTime<Utc>>);

impl FieldStamps {
    #[cfg(test)]
    pub(crate) fn get(&self, field: &str) -> Option<DateTime<Utc>> {
        self.0.get(field).copied()
    }
}

/// A stored record together with its field stamps.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Stamped<T> {
    pub(crate) record: T,
    pub(crate) stamps: FieldStamps,
}

impl<T: Merge> Stamped<T> {
    pub(crate) fn create(incoming: T, at: DateTime<Utc>) -> Self {
        let mut stamped = Self {
            record: incoming.blank(),
            stamps: FieldStamps::default(),
        };
        stamped.apply(incoming, at);
        stamped
    }

    pub(crate) fn apply(&mut self, incoming: T, at: DateTime<Utc>) {
        let mut fields = Fields {
            stamps: &mut self.stamps,
            at,
        };
        self.record.merge_fields(incoming, &mut fields);
        let last = self.record.last_event_at().map_or(at, |last| last.max(at));
        self.record.set_last_event_at(last);
    }
}

pub(crate) struct Fields<'a> {
    stamps: &'a mut FieldStamps,
    at: DateTime<Utc>,
}

impl Fields<'_> {
    fn take<T>(
        &mut self,
        name: &'static str,
        stored: &mut Option<T>,
        incoming: Option<T>,
    ) {
        let Some(value) = incoming else {
            return;
        };
        let at = self.at;
        let newer = self.stamps.0.get(name).is_none_or(|stamp| at > *stamp);
        if newer || stored.is_none() {
            *stored = Some(value);
            self.stamps.0.insert(name, at);
        }
    }
}

/// Records the store can merge field by field.
pub(crate) trait Merge: Clone + PartialEq {
    /// Same id, every mutable field empty.
    fn blank(&self) -> Self;
    fn merge_fields(&mut self, incoming: Self, fields: &mut Fields<'_>);
    fn last_event_at(&self) -> Option<DateTime<Utc>>;
    fn set_last_event_at(&mut self, at: DateTime<Utc>);
}

impl Merge for Incident {
    fn blank(&self) -> Self {
        Incident::new(self.id.clone())
    }

    fn merge_fields(&mut self, incoming: Self, fields: &mut Fields<'_>) {
        fields.take("status", &mut self.status, incoming.status);
        fields.take("priority", &mut self.priority, incoming.priority);
        fields.take("position", &mut self.position, incoming.position);
        fields.take(
            "responders_count",
            &mut self.responders_count,
            incoming.responders_count,
        );
        fields.take("title", &mut self.title, incoming.title);
        fields.take("category", &mut self.category, incoming.category);
        fields.take("address", &mut self.address, incoming.address);
        fields.take("reported_at", &mut self.reported_at, incoming.reported_at);
    }

    fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.last_event_at
    }

    fn set_last_event_at(&mut self, at: DateTime<Utc>) {
        self.last_event_at = Some(at);
    }
}

impl Merge for Personnel {
    fn blank(&self) -> Self {
        Personnel::new(self.id.clone())
    }

    fn merge_fields(&mut self, incoming: Self, fields: &mut Fields<'_>) {
        fields.take("duty_status", &mut self.duty_status, incoming.duty_status);
        fields.take("position", &mut self.position, incoming.position);
        fields.take("photo_ref", &mut self.photo_ref, incoming.photo_ref);
        fields.take("name", &mut self.name, incoming.name);
        fields.take("callsign", &mut self.callsign, incoming.callsign);
    }

    fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.last_event_at
    }

    fn set_last_event_at(&mut self, at: DateTime<Utc>) {
        self.last_event_at = Some(at);
    }
}

impl Merge for Post {
    fn blank(&self) -> Self {
        Post::new(self.id.clone())
    }

    fn merge_fields(&mut self, incoming: Self, fields: &mut Fields<'_>) {
        fields.take("position", &mut self.position, incoming.position);
        fields.take("name", &mut self.name, incoming.name);
        fields.take("kind", &mut self.kind, incoming.kind);
        fields.take("contact", &mut self.contact, incoming.contact);
    }

    fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.last_event_at
    }

    fn set_last_event_at(&mut self, at: DateTime<Utc>) {
        self.last_event_at = Some(at);
    }
}
