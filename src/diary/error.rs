//! Error types for the diary engine.

use thiserror::Error;

/// Failures of the underlying entry store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("malformed stored entry {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("entry store lock poisoned")]
    LockPoisoned,

    #[error("history offset of {days_ago} days is out of range")]
    OffsetOutOfRange { days_ago: i64 },
}

/// Errors surfaced to callers of [`Bot`](crate::diary::bot::Bot) operations.
///
/// Notification failures never show up here: they are logged and swallowed
/// once the entry has been written.
#[derive(Debug, Error)]
pub enum BotError {
    /// The acting user is not one of the bot's owners. Nothing was written.
    #[error("forbidden: {actor} is not an owner of {bot}")]
    Forbidden { bot: String, actor: String },

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("no history query at {0:?}")]
    UnknownQuery(String),

    #[error("invalid entry: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
