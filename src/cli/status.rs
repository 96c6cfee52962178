//! CLI `status` command: print what `?` would answer in chat.

use anyhow::Result;

use diarybot::config::DiaryConfig;

pub fn status(config: &DiaryConfig, bot: &str) -> Result<()> {
    let registry = super::open_registry(config)?;
    let bot = super::find_bot(&registry, bot)?;
    println!("{}", bot.status()?);
    Ok(())
}
