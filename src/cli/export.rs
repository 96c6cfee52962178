use anyhow::Result;
use serde::Serialize;

use diarybot::config::DiaryConfig;
use diarybot::diary::Entry;

/// Export format: one bot's entries, oldest first.
#[derive(Debug, Serialize)]
struct ExportData<'a> {
    bot: &'a str,
    entries: Vec<Entry>,
}

/// Export every entry of `bot` (deleted ones and their history included) as JSON to stdout.
pub fn export(config: &DiaryConfig, bot: &str) -> Result<()> {
    let registry = super::open_registry(config)?;
    let bot = super::find_bot(&registry, bot)?;

    let data = ExportData {
        bot: bot.name(),
        entries: bot.export()?,
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    let deleted = data.entries.iter().filter(|e| e.is_deleted()).count();
    eprintln!(
        "Exported {} entries ({} deleted) from {}.",
        data.entries.len(),
        deleted,
        data.bot
    );

    Ok(())
}
