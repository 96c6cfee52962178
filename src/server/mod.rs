//! HTTP server: router construction and the `serve` entry point.
//!
//! [`serve`] wires up the database, notification channel and bot registry,
//! starts every bot's nag timer, then serves [`router`] until ctrl-c.

pub mod handlers;
pub mod render;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::{Arc, Mutex};

use crate::config::DiaryConfig;
use crate::db;
use crate::notify;
use crate::registry::{make_bots, BotRegistry};

/// Path the diary routes are served under.
pub const MOUNT: &str = "/diary";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<BotRegistry>,
}

/// All diary routes over `registry`.
pub fn router(registry: Arc<BotRegistry>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/{bot}/message", post(handlers::post_message))
        .route("/{bot}/structuredInput", post(handlers::post_structured))
        .route("/{bot}/incoming", post(handlers::incoming))
        .route("/{bot}/history", get(handlers::history))
        .route("/{bot}/history/{*selection}", get(handlers::history_selection))
        .route("/{bot}/{entry}", get(handlers::get_entry).post(handlers::edit_entry))
        .with_state(AppState { registry })
}

/// Open the database, build the bots, start their nags and serve HTTP.
pub async fn serve(config: DiaryConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");
    let db = Arc::new(Mutex::new(conn));

    let channel = notify::create_channel(&config.notify)?;
    let registry = Arc::new(make_bots(&config, db, channel).context("invalid bot configuration")?);
    registry.start_nags();

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, mount = MOUNT, bots = registry.len(), "diarybot listening");

    let app = Router::new().nest(MOUNT, router(registry));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
