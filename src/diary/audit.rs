//! Audit trail for entry mutations.
//!
//! Every mutation pushes the entry's current visible fields onto its history
//! before applying the new ones, so a delete or a time correction never loses
//! what the entry used to say.

use chrono::{DateTime, FixedOffset};

use super::types::{Entry, EntryFields};

/// Snapshot `entry`'s visible fields into its history, then replace them with `next`.
///
/// The snapshot excludes the identifier and the history itself by construction.
pub fn snapshot_and_apply(entry: &Entry, next: EntryFields) -> Entry {
    let mut history = entry.history.clone();
    history.push(entry.fields.clone());
    Entry {
        id: entry.id.clone(),
        fields: next,
        history,
    }
}

/// Visible fields of a tombstone: content cleared, deletion time and actor recorded.
pub fn tombstone(actor: &str, at: DateTime<FixedOffset>) -> EntryFields {
    let mut fields = EntryFields::created_at(actor, None, at);
    fields.deleted = true;
    fields
}

/// Visible fields after a time correction: same payload, new timestamps.
pub fn retimed(current: &EntryFields, actor: &str, at: DateTime<FixedOffset>) -> EntryFields {
    EntryFields::created_at(actor, current.payload.clone(), at)
}
