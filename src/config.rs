use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::diary::nag::NagPolicy;
use crate::diary::structured::StructuredConfig;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DiaryConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub nag: NagConfig,
    pub notify: NotifyConfig,
    pub users: Vec<UserConfig>,
    pub bots: Vec<BotConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Externally visible base URL; entry URIs are `{public_url}/diary/{bot}/{id}`.
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NagConfig {
    pub interval_secs: u64,
    pub floor_secs: u64,
    pub bootstrap_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotifyConfig {
    /// Endpoint that receives fallback (email) notifications as a form POST.
    pub mailer_url: Option<String>,
    /// Endpoint that delivers direct chat messages. Without it nobody is online.
    pub chat_webhook: Option<String>,
    /// Bearer token presented to the chat webhook.
    pub chat_token: Option<String>,
    /// Per-request timeout for the mailer and the chat webhook.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct UserConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BotConfig {
    pub name: String,
    pub owners: Vec<String>,
    /// RFC 3339 timestamp or plain `YYYY-MM-DD`.
    pub birthdate: Option<String>,
    /// Token the chat transport must present when delivering to this bot.
    pub chat_token: Option<String>,
    pub history_queries: Vec<QueryConfig>,
    pub structured: StructuredConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct QueryConfig {
    pub days_ago: i64,
    pub label: String,
    pub url_suffix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9048,
            log_level: "info".into(),
            public_url: "http://localhost:9048".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_diarybot_dir()
            .join("diary.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for NagConfig {
    fn default() -> Self {
        let policy = NagPolicy::default();
        Self {
            interval_secs: policy.interval.as_secs(),
            floor_secs: policy.floor.as_secs(),
            bootstrap_secs: policy.bootstrap.as_secs(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mailer_url: None,
            chat_webhook: None,
            chat_token: None,
            timeout_secs: 10,
        }
    }
}

impl NagConfig {
    pub fn policy(&self) -> NagPolicy {
        NagPolicy {
            interval: Duration::from_secs(self.interval_secs),
            floor: Duration::from_secs(self.floor_secs),
            bootstrap: Duration::from_secs(self.bootstrap_secs),
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Returns `~/.diarybot/`
pub fn default_diarybot_dir() -> PathBuf {
    home_dir().join(".diarybot")
}

/// Returns the default config file path: `~/.diarybot/config.toml`
pub fn default_config_path() -> PathBuf {
    default_diarybot_dir().join("config.toml")
}

impl DiaryConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            DiaryConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (DIARYBOT_DB, DIARYBOT_LOG_LEVEL, DIARYBOT_MAILER_URL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DIARYBOT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("DIARYBOT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("DIARYBOT_MAILER_URL") {
            self.notify.mailer_url = Some(val);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Prefix of every entry URI, without a trailing slash.
    pub fn entry_base(&self) -> String {
        format!("{}{}", self.server.public_url.trim_end_matches('/'), crate::server::MOUNT)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}
