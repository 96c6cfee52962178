//! Diary entry type definitions.
//!
//! Defines [`Payload`] (free text or a structured key-value set), [`EntryFields`]
//! (the visible part of a stored document, also used as an audit snapshot) and
//! [`Entry`] (a full stored document with its identifier and audit history).

use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured input as stored: keys and values from the bot's choice tree.
///
/// A `BTreeMap` keeps the pairs sorted, which is also the stored order.
pub type Kvs = BTreeMap<String, String>;

/// What an owner wrote. Exactly one kind per live entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Free text, stored verbatim.
    Text(String),
    /// A fixed-vocabulary key-value set picked from the structured-input tree.
    Structured(Kvs),
}

impl Payload {
    pub fn text(msg: impl Into<String>) -> Self {
        Self::Text(msg.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Kvs> {
        match self {
            Self::Text(_) => None,
            Self::Structured(kvs) => Some(kvs),
        }
    }
}

/// The visible fields of an entry document.
///
/// Everything except the identifier and the audit history. Audit snapshots are
/// stored in exactly this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFields {
    /// Creation instant in UTC, used for sorting and filtering.
    pub created: DateTime<Utc>,
    /// The same instant with the writer's local offset, for display.
    pub created_local: String,
    /// User identifier of whoever wrote (or last touched) the entry.
    pub creator: String,
    /// `None` only once the entry has been deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl EntryFields {
    /// Fields for a brand new entry written now by `creator`.
    pub fn created_now(creator: &str, payload: Payload) -> Self {
        let now = Local::now().fixed_offset();
        Self::created_at(creator, Some(payload), now)
    }

    /// Fields stamped with an explicit time; both representations come from `at`.
    pub fn created_at(creator: &str, payload: Option<Payload>, at: DateTime<FixedOffset>) -> Self {
        Self {
            created: at.with_timezone(&Utc),
            created_local: at.to_rfc3339_opts(SecondsFormat::Micros, false),
            creator: creator.to_string(),
            payload,
            deleted: false,
        }
    }
}

/// A stored diary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    #[serde(flatten)]
    pub fields: EntryFields,
    /// Prior versions of this entry, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<EntryFields>,
}

impl Entry {
    pub fn payload(&self) -> Option<&Payload> {
        self.fields.payload.as_ref()
    }

    pub fn is_deleted(&self) -> bool {
        self.fields.deleted
    }
}

/// Returned from a successful save.
#[derive(Debug, Clone, Serialize)]
pub struct SavedEntry {
    pub id: String,
    pub uri: String,
}
