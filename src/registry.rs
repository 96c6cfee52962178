//! Building the configured bots and looking them up by name.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

use crate::config::{BotConfig, DiaryConfig};
use crate::diary::history::{standard_queries, HistoryQuery};
use crate::diary::nag::MAX_DELAY;
use crate::diary::store::SqliteEntryStore;
use crate::diary::structured::{SchemaError, StructuredInput};
use crate::diary::{Bot, BotIdentity};
use crate::notify::NotificationChannel;

/// Furthest back a configured history query may look.
pub const MAX_QUERY_DAYS: i64 = 365 * 200;

/// Longest nag interval, floor or bootstrap delay accepted from config.
pub const MAX_NAG_SECS: u64 = MAX_DELAY.as_secs();

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid bot name {0:?}")]
    BadName(String),

    #[error("bot {0} is configured twice")]
    DuplicateBot(String),

    #[error("bot {0} has no owners")]
    NoOwners(String),

    #[error("bot {bot}: cannot parse birthdate {value:?}")]
    BadBirthdate { bot: String, value: String },

    #[error("bot {bot}: bad history query suffix {suffix:?}")]
    BadQuerySuffix { bot: String, suffix: String },

    #[error("bot {bot}: history query {suffix:?} looks back {days_ago} days, which is out of range")]
    BadQueryOffset {
        bot: String,
        suffix: String,
        days_ago: i64,
    },

    #[error("nag {field} of {secs}s is longer than 30 days")]
    BadNagPolicy { field: &'static str, secs: u64 },

    #[error("bot {bot}: {source}")]
    Schema {
        bot: String,
        #[source]
        source: SchemaError,
    },
}

/// All bots of one deployment, in config order.
#[derive(Debug, Default)]
pub struct BotRegistry {
    bots: Vec<Arc<Bot>>,
    display_names: HashMap<String, String>,
}

impl BotRegistry {
    pub fn from_bots(bots: Vec<Arc<Bot>>) -> Self {
        Self {
            bots,
            display_names: HashMap::new(),
        }
    }

    pub fn with_display_names(mut self, names: HashMap<String, String>) -> Self {
        self.display_names = names;
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Bot>> {
        self.bots.iter().find(|b| b.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Bot>> {
        self.bots.iter()
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    /// Bots `user` owns, fewest owners first, then by name.
    pub fn visible_to(&self, user: &str) -> Vec<Arc<Bot>> {
        let mut visible: Vec<Arc<Bot>> = self
            .bots
            .iter()
            .filter(|b| b.is_owner(user))
            .cloned()
            .collect();
        visible.sort_by(|a, b| {
            (a.owners().len(), a.name()).cmp(&(b.owners().len(), b.name()))
        });
        visible
    }

    pub fn display_name<'a>(&'a self, user: &'a str) -> &'a str {
        self.display_names.get(user).map_or(user, String::as_str)
    }

    /// Schedule the first nag of every bot. Needs a tokio runtime.
    pub fn start_nags(&self) {
        for bot in &self.bots {
            bot.reschedule_nag();
        }
        info!(count = self.bots.len(), "nag timers started");
    }
}

/// Build one [`Bot`] per `[[bots]]` entry, each on its own collection of `db`.
pub fn make_bots(
    config: &DiaryConfig,
    db: Arc<Mutex<Connection>>,
    channel: Arc<dyn NotificationChannel>,
) -> Result<BotRegistry, RegistryError> {
    for (field, secs) in [
        ("interval", config.nag.interval_secs),
        ("floor", config.nag.floor_secs),
        ("bootstrap", config.nag.bootstrap_secs),
    ] {
        if secs > MAX_NAG_SECS {
            return Err(RegistryError::BadNagPolicy { field, secs });
        }
    }
    let policy = config.nag.policy();
    let mut seen = HashSet::new();
    let mut bots = Vec::with_capacity(config.bots.len());

    for bot_config in &config.bots {
        let identity = identity_from_config(bot_config, &config.entry_base())?;
        if !seen.insert(identity.name.clone()) {
            return Err(RegistryError::DuplicateBot(identity.name));
        }

        let store = Arc::new(SqliteEntryStore::new(db.clone(), identity.name.clone()));
        info!(bot = %identity.name, owners = identity.owners.len(), "bot configured");
        bots.push(Bot::new(identity, store, channel.clone(), policy));
    }

    let display_names = config
        .users
        .iter()
        .filter(|u| !u.name.is_empty())
        .map(|u| (u.id.clone(), u.name.clone()))
        .collect();

    Ok(BotRegistry::from_bots(bots).with_display_names(display_names))
}

fn identity_from_config(config: &BotConfig, entry_base: &str) -> Result<BotIdentity, RegistryError> {
    let name = config.name.trim();
    if name.is_empty() || name.contains('/') || name != config.name {
        return Err(RegistryError::BadName(config.name.clone()));
    }
    if config.owners.is_empty() {
        return Err(RegistryError::NoOwners(name.to_string()));
    }

    let birthdate = config
        .birthdate
        .as_deref()
        .map(|value| {
            parse_birthdate(value).ok_or_else(|| RegistryError::BadBirthdate {
                bot: name.to_string(),
                value: value.to_string(),
            })
        })
        .transpose()?;

    let structured =
        StructuredInput::from_config(&config.structured).map_err(|source| RegistryError::Schema {
            bot: name.to_string(),
            source,
        })?;

    let mut suffixes: HashSet<String> = standard_queries().into_iter().filter_map(|q| q.suffix).collect();
    let mut extra_queries = Vec::with_capacity(config.history_queries.len());
    for query in &config.history_queries {
        let suffix = &query.url_suffix;
        if !suffix.starts_with('/') || suffix.len() < 2 || !suffixes.insert(suffix.clone()) {
            return Err(RegistryError::BadQuerySuffix {
                bot: name.to_string(),
                suffix: suffix.clone(),
            });
        }
        if !(0..=MAX_QUERY_DAYS).contains(&query.days_ago) {
            return Err(RegistryError::BadQueryOffset {
                bot: name.to_string(),
                suffix: suffix.clone(),
                days_ago: query.days_ago,
            });
        }
        extra_queries.push(HistoryQuery::offset_time(query.days_ago, &query.label, suffix));
    }

    Ok(BotIdentity {
        birthdate,
        structured,
        extra_queries,
        chat_token: config.chat_token.clone(),
        entry_base: entry_base.to_string(),
        ..BotIdentity::new(name, config.owners.iter().cloned())
    })
}

/// RFC 3339, or a bare date taken as midnight UTC.
fn parse_birthdate(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}
