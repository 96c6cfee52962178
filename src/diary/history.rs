//! Canned history queries over one bot's entries.
//!
//! A query is identified by its route suffix (`None` for plain `/history`),
//! which also drives the relative links between query pages.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::error::StoreError;
use super::store::{EntryFilter, EntryStore, SortOrder};
use super::types::Entry;

/// Rows kept by an [`QueryKind::OffsetTime`] query.
const OFFSET_TIME_ROWS: usize = 10;
const RECENT_ROWS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryKind {
    /// The ten entries leading up to `days_ago` days before now, oldest first.
    OffsetTime { days_ago: i64 },
    Last150,
    Latest,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryQuery {
    #[serde(flatten)]
    pub kind: QueryKind,
    pub name: String,
    pub desc: String,
    pub suffix: Option<String>,
}

impl HistoryQuery {
    pub fn offset_time(days_ago: i64, label: impl Into<String>, suffix: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            kind: QueryKind::OffsetTime { days_ago },
            name: label.clone(),
            desc: label,
            suffix: Some(suffix.into()),
        }
    }

    pub fn last150() -> Self {
        Self {
            kind: QueryKind::Last150,
            name: "last 150 entries".into(),
            desc: "last 150 entries".into(),
            suffix: Some("/recent".into()),
        }
    }

    pub fn latest() -> Self {
        Self {
            kind: QueryKind::Latest,
            name: "latest entry".into(),
            desc: "latest entry".into(),
            suffix: Some("/latest".into()),
        }
    }

    pub fn all() -> Self {
        Self {
            kind: QueryKind::All,
            name: "all".into(),
            desc: "history".into(),
            suffix: None,
        }
    }

    /// Whether this query answers the route selection (`None` = bare `/history`).
    pub fn matches(&self, selection: Option<&str>) -> bool {
        self.suffix.as_deref() == selection
    }

    /// Run against `store`, relative to `now`.
    pub fn run(&self, store: &dyn EntryStore, now: DateTime<Utc>) -> Result<Vec<Entry>, StoreError> {
        match self.kind {
            QueryKind::OffsetTime { days_ago } => {
                let end = Duration::try_days(days_ago)
                    .and_then(|offset| now.checked_sub_signed(offset))
                    .ok_or(StoreError::OffsetOutOfRange { days_ago })?;
                let mut rows = store.find(
                    &EntryFilter::active().created_before(end),
                    SortOrder::CreatedDesc,
                    Some(OFFSET_TIME_ROWS),
                )?;
                rows.reverse();
                Ok(rows)
            }
            QueryKind::Last150 => {
                store.find(&EntryFilter::active(), SortOrder::CreatedDesc, Some(RECENT_ROWS))
            }
            QueryKind::Latest => store.find(&EntryFilter::active(), SortOrder::CreatedDesc, Some(1)),
            QueryKind::All => store.find(&EntryFilter::active(), SortOrder::CreatedDesc, None),
        }
    }

    /// Relative link to this query from the page of `current`.
    pub fn link_from(&self, current: &HistoryQuery) -> String {
        let levels = current.suffix.as_deref().unwrap_or("").matches('/').count();
        format!(
            "./{}history{}",
            "../".repeat(levels),
            self.suffix.as_deref().unwrap_or("")
        )
    }

    /// Relative link from this query's page back to the bot index.
    pub fn home_link(&self) -> String {
        let levels = self.suffix.as_deref().unwrap_or("").matches('/').count();
        "../".repeat(levels + 1)
    }
}

/// Queries every bot offers, before its own extras.
pub fn standard_queries() -> Vec<HistoryQuery> {
    vec![
        HistoryQuery::offset_time(365, "a year ago", "/yearAgo"),
        HistoryQuery::all(),
        HistoryQuery::last150(),
        HistoryQuery::latest(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_matches_suffix() {
        assert!(HistoryQuery::all().matches(None));
        assert!(HistoryQuery::last150().matches(Some("/recent")));
        assert!(!HistoryQuery::latest().matches(Some("/recent")));
        assert!(!HistoryQuery::all().matches(Some("/")));
    }

    #[test]
    fn links_climb_out_of_current_suffix() {
        let all = HistoryQuery::all();
        let recent = HistoryQuery::last150();

        assert_eq!(recent.link_from(&all), "./history/recent");
        assert_eq!(all.link_from(&recent), "./../history");
        assert_eq!(all.home_link(), "../");
        assert_eq!(recent.home_link(), "../../");
    }

    #[test]
    fn standard_set_has_unique_suffixes() {
        let queries = standard_queries();
        let mut suffixes: Vec<_> = queries.iter().map(|q| q.suffix.clone()).collect();
        suffixes.sort();
        suffixes.dedup();
        assert_eq!(suffixes.len(), queries.len());
    }

    #[test]
    fn unrepresentable_offset_is_an_error() {
        use crate::diary::store::SqliteEntryStore;
        use std::sync::{Arc, Mutex};

        let conn = crate::db::open_memory_database().unwrap();
        let store = SqliteEntryStore::new(Arc::new(Mutex::new(conn)), "ari");
        let query = HistoryQuery::offset_time(100_000_000_000, "long ago", "/longAgo");

        let err = query.run(&store, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::OffsetOutOfRange { days_ago: 100_000_000_000 }));
    }
}
