//! Telegram notifications.
//!
//! The notifier is optional. Without both a bot token and a chat id every
//! send is a no-op, so callers never need to check whether it is configured.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, Request};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AppConfig;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Body of the Bot API `sendMessage` call.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
}

struct Target {
    token: String,
    chat_id: String,
}

/// Sends plain-text messages to one Telegram chat.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    target: Option<Target>,
}

impl TelegramNotifier {
    /// Enabled only when both values are present and non-empty.
    pub fn new(bot_token: Option<&str>, chat_id: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        let target = match (bot_token, chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                Some(Target {
                    token: token.to_string(),
                    chat_id: chat_id.to_string(),
                })
            }
            _ => None,
        };

        Ok(Self {
            client,
            api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            target,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let notifier = Self::new(
            config.telegram_bot_token.as_deref(),
            config.telegram_chat_id.as_deref(),
        )?;
        if !notifier.is_enabled() {
            debug!("Telegram notifier not configured; messages will be dropped");
        }
        Ok(notifier)
    }

    /// Point at a different Bot API host.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// The `sendMessage` request for `text`, or `None` when disabled.
    fn build_request(&self, text: &str) -> Result<Option<Request>> {
        let Some(target) = &self.target else {
            return Ok(None);
        };

        let url = format!("{}/bot{}/sendMessage", self.api_url, target.token);
        let payload = SendMessagePayload {
            chat_id: &target.chat_id,
            text,
        };

        let request = self
            .client
            .post(url)
            .json(&payload)
            .build()
            .context("Failed to build Telegram request")?;
        Ok(Some(request))
    }

    /// Send `text` to the configured chat. Does nothing when disabled.
    pub async fn send(&self, text: &str) -> Result<()> {
        let Some(request) = self.build_request(text)? else {
            return Ok(());
        };

        let response = self
            .client
            .execute(request)
            .await
            .context("Failed to send Telegram message")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Telegram rejected message");
            bail!("Telegram API error ({status}): {body}");
        }

        debug!(chars = text.len(), "Telegram message sent");
        Ok(())
    }
}
