use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Notifier;
use crate::config::NotifyConfig;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .context("Telegram bot token missing (set [notify] bot_token or TELEGRAM_BOT_TOKEN)")?;
        let chat_id = config
            .chat_id
            .clone()
            .filter(|c| !c.is_empty())
            .context("Telegram chat id missing (set [notify] chat_id or TELEGRAM_CHAT_ID)")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            bot_token,
            chat_id,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.base_url.trim_end_matches('/'),
            self.bot_token
        )
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };

        // The token is part of the URL, so keep it out of error messages.
        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to call Telegram API: {}", e.without_url()))?;

        let status = response.status();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse Telegram response ({status}): {}", e.without_url()))?;

        if !body.ok {
            anyhow::bail!(
                "Telegram API error ({status}): {}",
                body.description.as_deref().unwrap_or("no description")
            );
        }
        Ok(())
    }
}
