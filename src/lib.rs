//! Diary bots: owners log short entries, co-owners get notified, quiet owners get nagged.
//!
//! Each configured bot keeps its own collection of entries. Saving an entry tells
//! the bot's other owners about it (chat if they are online, email otherwise)
//! and pushes that bot's nag timer out by the nag interval. Deletes and time
//! corrections never destroy data: the prior state is kept in the entry's
//! audit history.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`diary`]: Core engine: bots, entry store, audit trail, history queries, nags
//! - [`notify`]: Notification channels (HTTP chat webhook + mailer, or none)
//! - [`registry`]: Building bots from config and looking them up
//! - [`server`]: axum HTTP surface

pub mod config;
pub mod db;
pub mod diary;
pub mod notify;
pub mod registry;
pub mod server;
