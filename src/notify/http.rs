//! HTTP-backed notification channel.
//!
//! Fallback notifications are form-POSTed (`user`, `msg`, `mode`) to an external
//! mailer. Direct chat delivery goes to an optional webhook that fronts the chat
//! transport; without one, nobody counts as online.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{DeliveryMode, NotificationChannel, NotifyError};

#[derive(Debug, Serialize)]
struct ChatPost<'a> {
    bot: &'a str,
    user: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct FallbackForm<'a> {
    user: &'a str,
    msg: &'a str,
    mode: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpChannel {
    client: reqwest::Client,
    mailer_url: String,
    chat_webhook: Option<String>,
    chat_token: Option<String>,
}

impl HttpChannel {
    /// Every request, connect included, is abandoned after `timeout`.
    pub fn new(
        mailer_url: impl Into<String>,
        chat_webhook: Option<String>,
        chat_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            mailer_url: mailer_url.into(),
            chat_webhook,
            chat_token,
        })
    }
}

fn check_status(endpoint: &str, response: reqwest::Response) -> Result<(), NotifyError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(NotifyError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl NotificationChannel for HttpChannel {
    async fn is_online(&self, _user: &str) -> Result<bool, NotifyError> {
        // The chat webhook has no presence API; it queues for anyone it knows.
        Ok(self.chat_webhook.is_some())
    }

    async fn send(&self, bot: &str, user: &str, text: &str) -> Result<(), NotifyError> {
        let Some(webhook) = &self.chat_webhook else {
            return Err(NotifyError::Unsupported("direct chat delivery"));
        };

        let mut request = self.client.post(webhook).json(&ChatPost { bot, user, text });
        if let Some(token) = &self.chat_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        check_status(webhook, response)?;

        tracing::info!(bot, user, "chat message sent");
        Ok(())
    }

    async fn send_fallback(
        &self,
        user: &str,
        text: &str,
        mode: DeliveryMode,
    ) -> Result<(), NotifyError> {
        let form = FallbackForm {
            user,
            msg: text,
            mode: mode.as_str(),
        };
        let response = self.client.post(&self.mailer_url).form(&form).send().await?;
        check_status(&self.mailer_url, response)?;

        tracing::info!(user, mode = %mode, "fallback notification queued");
        Ok(())
    }
}
