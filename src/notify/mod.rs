//! Outbound notifications: presence checks, direct chat messages, and the
//! fallback email path for owners who are not online.
//!
//! The diary engine only talks to the [`NotificationChannel`] trait. Two
//! implementations ship with the crate: [`http::HttpChannel`] for a real
//! deployment and [`NoChat`] for running without any chat transport.

pub mod http;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::NotifyConfig;

/// How a fallback notification should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Email,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} answered with HTTP {status}")]
    Rejected { endpoint: String, status: u16 },

    #[error("cannot reach {user}: {reason}")]
    Unreachable { user: String, reason: String },

    #[error("{0} is not supported by this channel")]
    Unsupported(&'static str),
}

/// Presence lookup and message delivery, as consumed by the diary engine.
///
/// The engine imposes no timeouts; implementations own their timeout policy.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Whether `user` can be reached by a direct chat message right now.
    async fn is_online(&self, user: &str) -> Result<bool, NotifyError>;

    /// Send a chat message from bot `bot` to `user`.
    async fn send(&self, bot: &str, user: &str, text: &str) -> Result<(), NotifyError>;

    /// Hand a message to the out-of-band notifier. The outcome is only logged.
    async fn send_fallback(
        &self,
        user: &str,
        text: &str,
        mode: DeliveryMode,
    ) -> Result<(), NotifyError>;
}

/// Channel for running without a chat transport: nobody is ever online and
/// every delivery is silently dropped.
#[derive(Debug, Default, Clone)]
pub struct NoChat;

#[async_trait]
impl NotificationChannel for NoChat {
    async fn is_online(&self, _user: &str) -> Result<bool, NotifyError> {
        Ok(false)
    }

    async fn send(&self, bot: &str, user: &str, _text: &str) -> Result<(), NotifyError> {
        tracing::debug!(bot, user, "no chat transport, dropping message");
        Ok(())
    }

    async fn send_fallback(
        &self,
        user: &str,
        _text: &str,
        mode: DeliveryMode,
    ) -> Result<(), NotifyError> {
        tracing::debug!(user, mode = %mode, "no chat transport, dropping fallback");
        Ok(())
    }
}

/// Build the channel described by the `[notify]` config section.
///
/// Without a mailer URL there is nowhere to deliver anything, so the result is [`NoChat`].
pub fn create_channel(config: &NotifyConfig) -> Result<Arc<dyn NotificationChannel>> {
    match config.mailer_url.as_deref() {
        Some(mailer_url) if !mailer_url.is_empty() => {
            let channel = http::HttpChannel::new(
                mailer_url,
                config.chat_webhook.clone(),
                config.chat_token.clone(),
                Duration::from_secs(config.timeout_secs),
            )
            .context("failed to build notification HTTP client")?;
            Ok(Arc::new(channel))
        }
        _ => {
            tracing::warn!("no notify.mailer_url configured, notifications are disabled");
            Ok(Arc::new(NoChat))
        }
    }
}
