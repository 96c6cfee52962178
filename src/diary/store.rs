//! Entry storage: the [`EntryStore`] contract and its SQLite implementation.
//!
//! The store behaves like an ordered document collection: single-document
//! insert, point lookup, point update, and a filtered scan sorted by creation
//! time. "Not deleted" is the default filter everywhere; audit tooling has to
//! ask for deleted rows explicitly.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::StoreError;
use super::types::{Entry, EntryFields, Kvs, Payload};

/// Which entries a filter admits by deletion status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletedState {
    #[default]
    Active,
    Any,
}

/// Filter over one collection. The default admits every live entry.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub id: Option<String>,
    pub state: DeletedState,
    /// Strictly earlier than this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// Strictly later than this instant.
    pub created_after: Option<DateTime<Utc>>,
    pub structured_only: bool,
}

impl EntryFilter {
    pub fn active() -> Self {
        Self::default()
    }

    /// Live entry with the given id.
    pub fn active_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    /// Entry with the given id whether or not it has been deleted.
    pub fn any_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            state: DeletedState::Any,
            ..Self::default()
        }
    }

    pub fn created_before(mut self, t: DateTime<Utc>) -> Self {
        self.created_before = Some(t);
        self
    }

    pub fn created_after(mut self, t: DateTime<Utc>) -> Self {
        self.created_after = Some(t);
        self
    }

    pub fn structured_only(mut self) -> Self {
        self.structured_only = true;
        self
    }

    fn to_sql(&self, collection: &str) -> (String, Vec<Value>) {
        let mut clauses = vec!["collection = ?".to_string()];
        let mut values = vec![Value::Text(collection.to_string())];

        if let Some(id) = &self.id {
            clauses.push("id = ?".into());
            values.push(Value::Text(id.clone()));
        }
        match self.state {
            DeletedState::Active => clauses.push("deleted IS NULL".into()),
            DeletedState::Any => {}
        }
        if let Some(t) = &self.created_before {
            clauses.push("created < ?".into());
            values.push(Value::Text(encode_instant(t)));
        }
        if let Some(t) = &self.created_after {
            clauses.push("created > ?".into());
            values.push(Value::Text(encode_instant(t)));
        }
        if self.structured_only {
            clauses.push("structured IS NOT NULL".into());
        }

        (clauses.join(" AND "), values)
    }
}

/// Sort order for [`EntryStore::find`]. Ties keep insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAsc,
    CreatedDesc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            Self::CreatedAsc => "created ASC, rowid ASC",
            Self::CreatedDesc => "created DESC, rowid DESC",
        }
    }
}

/// Replacement contents for [`EntryStore::find_one_and_update`]: new visible
/// fields plus the full audit history.
#[derive(Debug, Clone)]
pub struct EntryUpdate {
    pub fields: EntryFields,
    pub history: Vec<EntryFields>,
}

impl From<Entry> for EntryUpdate {
    fn from(entry: Entry) -> Self {
        Self {
            fields: entry.fields,
            history: entry.history,
        }
    }
}

/// An ordered collection of diary entries belonging to one bot.
///
/// Implementations must make single-document insert and update atomic.
/// Methods are synchronous; each call is a short local transaction.
pub trait EntryStore: Send + Sync {
    /// Insert a new entry and return its identifier.
    fn insert(&self, fields: &EntryFields) -> Result<String, StoreError>;

    /// First entry matching `filter`, newest first.
    fn find_one(&self, filter: &EntryFilter) -> Result<Option<Entry>, StoreError>;

    /// Atomically replace the first entry matching `filter`. Returns the
    /// updated entry, or `None` if nothing matched.
    fn find_one_and_update(
        &self,
        filter: &EntryFilter,
        update: &EntryUpdate,
    ) -> Result<Option<Entry>, StoreError>;

    /// Entries matching `filter` in `sort` order, at most `limit` of them.
    fn find(
        &self,
        filter: &EntryFilter,
        sort: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, StoreError>;
}

/// [`EntryStore`] over one collection of the shared SQLite `entries` table.
#[derive(Clone)]
pub struct SqliteEntryStore {
    db: Arc<Mutex<Connection>>,
    collection: String,
}

impl SqliteEntryStore {
    pub fn new(db: Arc<Mutex<Connection>>, collection: impl Into<String>) -> Self {
        Self {
            db,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

const SELECT_COLUMNS: &str =
    "id, created, created_local, creator, content, structured, deleted, history";

impl EntryStore for SqliteEntryStore {
    fn insert(&self, fields: &EntryFields) -> Result<String, StoreError> {
        let id = uuid::Uuid::now_v7().to_string();
        let columns = EncodedFields::new(fields)?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO entries (id, collection, created, created_local, creator, content, structured, deleted, history) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, '[]')",
            params![
                id,
                self.collection,
                columns.created,
                fields.created_local,
                fields.creator,
                columns.content,
                columns.structured,
                columns.deleted,
            ],
        )?;

        tracing::debug!(collection = %self.collection, id = %id, "entry inserted");
        Ok(id)
    }

    fn find_one(&self, filter: &EntryFilter) -> Result<Option<Entry>, StoreError> {
        Ok(self
            .find(filter, SortOrder::CreatedDesc, Some(1))?
            .into_iter()
            .next())
    }

    fn find_one_and_update(
        &self,
        filter: &EntryFilter,
        update: &EntryUpdate,
    ) -> Result<Option<Entry>, StoreError> {
        let (where_sql, values) = filter.to_sql(&self.collection);
        let columns = EncodedFields::new(&update.fields)?;
        let history_json = serde_json::to_string(&update.history)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let id: Option<String> = tx
            .query_row(
                &format!(
                    "SELECT id FROM entries WHERE {where_sql} ORDER BY {} LIMIT 1",
                    SortOrder::CreatedDesc.as_sql()
                ),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE entries SET created = ?1, created_local = ?2, creator = ?3, content = ?4, \
             structured = ?5, deleted = ?6, history = ?7 WHERE id = ?8",
            params![
                columns.created,
                update.fields.created_local,
                update.fields.creator,
                columns.content,
                columns.structured,
                columns.deleted,
                history_json,
                id,
            ],
        )?;
        tx.commit()?;

        tracing::debug!(collection = %self.collection, id = %id, deleted = update.fields.deleted, "entry updated");
        Ok(Some(Entry {
            id,
            fields: update.fields.clone(),
            history: update.history.clone(),
        }))
    }

    fn find(
        &self,
        filter: &EntryFilter,
        sort: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, StoreError> {
        let (where_sql, mut values) = filter.to_sql(&self.collection);
        let mut sql = format!(
            "SELECT {SELECT_COLUMNS} FROM entries WHERE {where_sql} ORDER BY {}",
            sort.as_sql()
        );
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<RawRow> = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    created: row.get(1)?,
                    created_local: row.get(2)?,
                    creator: row.get(3)?,
                    content: row.get(4)?,
                    structured: row.get(5)?,
                    deleted: row.get(6)?,
                    history: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(RawRow::into_entry).collect()
    }
}

/// Fixed-width UTC text, so lexical order is chronological order.
pub fn encode_instant(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Column values for the visible fields of an entry.
struct EncodedFields {
    created: String,
    content: Option<String>,
    structured: Option<String>,
    deleted: Option<i64>,
}

impl EncodedFields {
    fn new(fields: &EntryFields) -> Result<Self, StoreError> {
        let (content, structured) = match &fields.payload {
            Some(Payload::Text(text)) => (Some(text.clone()), None),
            Some(Payload::Structured(kvs)) => {
                let pairs: Vec<(&String, &String)> = kvs.iter().collect();
                (None, Some(serde_json::to_string(&pairs)?))
            }
            None => (None, None),
        };
        Ok(Self {
            created: encode_instant(&fields.created),
            content,
            structured,
            deleted: fields.deleted.then_some(1),
        })
    }
}

struct RawRow {
    id: String,
    created: String,
    created_local: String,
    creator: String,
    content: Option<String>,
    structured: Option<String>,
    deleted: Option<i64>,
    history: String,
}

impl RawRow {
    fn into_entry(self) -> Result<Entry, StoreError> {
        let malformed = |reason: String| StoreError::Malformed {
            id: self.id.clone(),
            reason,
        };

        let created = DateTime::parse_from_rfc3339(&self.created)
            .map_err(|e| malformed(format!("bad created timestamp: {e}")))?
            .with_timezone(&Utc);

        let payload = match (self.content, self.structured) {
            (Some(text), _) => Some(Payload::Text(text)),
            (None, Some(json)) => {
                let pairs: Vec<(String, String)> = serde_json::from_str(&json)
                    .map_err(|e| malformed(format!("bad structured input: {e}")))?;
                Some(Payload::Structured(pairs.into_iter().collect::<Kvs>()))
            }
            (None, None) => None,
        };

        let history: Vec<EntryFields> = serde_json::from_str(&self.history)
            .map_err(|e| malformed(format!("bad history: {e}")))?;

        Ok(Entry {
            id: self.id,
            fields: EntryFields {
                created,
                created_local: self.created_local,
                creator: self.creator,
                payload,
                deleted: self.deleted.is_some(),
            },
            history,
        })
    }
}
