use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::*;

use super::pricing::round_money;

/// Textual form of an absent value.
pub const NONE_MARKER: &str = "none";

/// Date format used in audit values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// The audited, mutable part of a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSnapshot {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub total_price: Option<Decimal>,
    pub extras: BTreeSet<Ulid>,
}

impl From<&Booking> for BookingSnapshot {
    fn from(b: &Booking) -> Self {
        Self {
            check_in: b.stay.check_in(),
            check_out: b.stay.check_out(),
            guests: b.guests,
            total_price: b.total_price,
            extras: b.extras.clone(),
        }
    }
}

/// A tracked field's value, compared by equality and rendered by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Date(NaiveDate),
    Count(u32),
    Money(Option<Decimal>),
    Extras(BTreeSet<Ulid>),
}

impl FieldValue {
    pub fn render(&self, extras: &HashMap<Ulid, ExtraService>) -> String {
        match self {
            FieldValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            FieldValue::Count(n) => n.to_string(),
            FieldValue::Money(Some(m)) => round_money(*m).to_string(),
            FieldValue::Money(None) => NONE_MARKER.to_string(),
            FieldValue::Extras(ids) if ids.is_empty() => NONE_MARKER.to_string(),
            FieldValue::Extras(ids) => {
                let mut names: Vec<String> = ids
                    .iter()
                    .map(|id| extras.get(id).map_or_else(|| id.to_string(), |e| e.name.clone()))
                    .collect();
                names.sort();
                names.join(", ")
            }
        }
    }
}

pub struct TrackedField {
    pub name: &'static str,
    pub extract: fn(&BookingSnapshot) -> FieldValue,
}

/// Tracked fields. Adding one is a new row here, nothing else.
pub const TRACKED_FIELDS: &[TrackedField] = &[
    TrackedField { name: "check_in", extract: |s| FieldValue::Date(s.check_in) },
    TrackedField { name: "check_out", extract: |s| FieldValue::Date(s.check_out) },
    TrackedField { name: "guests", extract: |s| FieldValue::Count(s.guests) },
    TrackedField { name: "total_price", extract: |s| FieldValue::Money(s.total_price) },
    TrackedField { name: "extras", extract: |s| FieldValue::Extras(s.extras.clone()) },
];

/// Who changed what, and why. Shared by every record of one edit.
#[derive(Debug, Clone)]
pub struct EditContext {
    pub booking_id: Ulid,
    pub actor: Option<UserId>,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Compare two states of a booking and emit one record per changed field.
/// No differences, no records.
pub fn diff_and_record(
    before: &BookingSnapshot,
    after: &BookingSnapshot,
    ctx: &EditContext,
    extras: &HashMap<Ulid, ExtraService>,
) -> Vec<ModificationRecord> {
    TRACKED_FIELDS
        .iter()
        .filter_map(|tracked| {
            let old = (tracked.extract)(before);
            let new = (tracked.extract)(after);
            (old != new).then(|| ModificationRecord {
                id: Ulid::new(),
                booking_id: ctx.booking_id,
                at: ctx.at,
                field: tracked.name.to_string(),
                old_value: old.render(extras),
                new_value: new.render(extras),
                reason: ctx.reason.clone(),
                actor: ctx.actor,
            })
        })
        .collect()
}

/// Records of one edit, for "what changed in this save" display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditGroup {
    pub at: DateTime<Utc>,
    pub actor: Option<UserId>,
    pub reason: Option<String>,
    pub changes: Vec<ModificationRecord>,
}

/// Fold records into edit groups keyed by `(at, actor)`, oldest first.
pub fn group_edits(records: &[ModificationRecord]) -> Vec<EditGroup> {
    let mut sorted: Vec<&ModificationRecord> = records.iter().collect();
    sorted.sort_by_key(|r| (r.at, r.actor));

    let mut groups: Vec<EditGroup> = Vec::new();
    for r in sorted {
        if let Some(last) = groups.last_mut()
            && last.at == r.at
            && last.actor == r.actor
        {
            last.changes.push(r.clone());
            continue;
        }
        groups.push(EditGroup {
            at: r.at,
            actor: r.actor,
            reason: r.reason.clone(),
            changes: vec![r.clone()],
        });
    }
    groups
}
