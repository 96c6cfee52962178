//! SQL DDL for all diarybot tables.
//!
//! Defines the `entries` table (every bot's collection, keyed by `collection`)
//! and `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Diary entries, one logical collection per bot
CREATE TABLE IF NOT EXISTS entries (
    id TEXT PRIMARY KEY,
    collection TEXT NOT NULL,
    created TEXT NOT NULL,
    created_local TEXT NOT NULL,
    creator TEXT NOT NULL,
    content TEXT,
    structured TEXT,
    deleted INTEGER,
    history TEXT NOT NULL DEFAULT '[]',
    CHECK (content IS NULL OR structured IS NULL),
    CHECK (deleted IS NOT NULL OR content IS NOT NULL OR structured IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_entries_collection_created ON entries(collection, created);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"entries".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn live_entry_needs_exactly_one_payload() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let both = conn.execute(
            "INSERT INTO entries (id, collection, created, created_local, creator, content, structured) \
             VALUES ('x', 'ari', 't', 't', 'A', 'hi', '[]')",
            [],
        );
        assert!(both.is_err());

        let neither = conn.execute(
            "INSERT INTO entries (id, collection, created, created_local, creator) \
             VALUES ('y', 'ari', 't', 't', 'A')",
            [],
        );
        assert!(neither.is_err());

        // a tombstone may carry no payload
        conn.execute(
            "INSERT INTO entries (id, collection, created, created_local, creator, deleted) \
             VALUES ('z', 'ari', 't', 't', 'A', 1)",
            [],
        )
        .unwrap();
    }
}
