//! Telegram bot API driver.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::AlertConfig;

use super::ChannelDriver;

pub struct TelegramDriver {
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: String,
}

impl TelegramDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelDriver for TelegramDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.bot_token.is_empty() || config.telegram_chat_id.is_empty() {
            bail!("telegram bot token and chat ID are required");
        }

        let url = format!("https://api.telegram.org/bot{}/sendMessage", config.bot_token);
        let payload = SendMessage {
            chat_id: &config.telegram_chat_id,
            text: message,
        };

        let response = self.http.post(&url).json(&payload).send().await?;
        let body: ApiResponse = response.json().await?;
        if !body.ok {
            bail!("telegram API error: {}", body.description);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
