//! CLI `doctor` command: run database diagnostics, validate bot config, print a report.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

use diarybot::config::DiaryConfig;
use diarybot::db;
use diarybot::notify::NoChat;
use diarybot::registry::make_bots;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &DiaryConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("Diarybot Health Report");
    println!("======================");
    println!();

    if !db_path.exists() {
        println!("Database:          not found at {}", db_path.display());
        println!("Run `diarybot serve` to initialize.");
    } else {
        let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

        let conn = db::open_database(&db_path)
            .context("failed to open database (may be corrupt)")?;
        let report = db::check_database_health(&conn).context("failed to run health check")?;

        println!("Database:          {}", db_path.display());
        println!("File size:         {}", format_bytes(file_size));
        println!("Schema version:    {}", report.schema_version);
        println!();
        println!("Row counts:");
        println!("  Entries:         {}", report.entry_count);
        println!("  Deleted:         {}", report.deleted_count);
        for (collection, count) in &report.collections {
            println!("  {collection:<16} {count}");
        }
        println!();
        if report.integrity_ok {
            println!("Integrity check:   PASSED");
        } else {
            println!("Integrity check:   FAILED ({})", report.integrity_details);
            println!();
            println!("Recovery steps:");
            println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
            println!("  2. Or dump what is readable: diarybot export <bot> > <bot>.json");
        }
        println!();
    }

    println!("Bots:              {}", config.bots.len());
    let conn = db::open_memory_database()?;
    match make_bots(config, Arc::new(Mutex::new(conn)), Arc::new(NoChat)) {
        Ok(registry) => {
            for bot in registry.iter() {
                println!("  {:<16} {} owner(s)", bot.name(), bot.owners().len());
            }
            println!("Bot config:        OK");
        }
        Err(e) => println!("Bot config:        INVALID ({e})"),
    }
    match config.notify.mailer_url.as_deref() {
        Some(url) if !url.is_empty() => println!("Mailer:            {url}"),
        _ => println!("Mailer:            (not set, notifications disabled)"),
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
