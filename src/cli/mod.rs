pub mod doctor;
pub mod export;
pub mod status;

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

use diarybot::config::DiaryConfig;
use diarybot::db;
use diarybot::diary::Bot;
use diarybot::notify::NoChat;
use diarybot::registry::{make_bots, BotRegistry};

/// Build the configured bots over the on-disk database, with notifications off.
fn open_registry(config: &DiaryConfig) -> Result<BotRegistry> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    make_bots(config, Arc::new(Mutex::new(conn)), Arc::new(NoChat)).context("invalid bot configuration")
}

fn find_bot(registry: &BotRegistry, name: &str) -> Result<Arc<Bot>> {
    registry.get(name).cloned().with_context(|| {
        let known: Vec<&str> = registry.iter().map(|b| b.name()).collect();
        format!("no bot named {name} (configured: {})", known.join(", "))
    })
}
