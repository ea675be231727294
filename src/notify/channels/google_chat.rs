//! Google Chat webhook driver. Plain text payload.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::store::AlertConfig;

use super::ChannelDriver;

pub struct GoogleChatDriver {
    http: reqwest::Client,
}

impl GoogleChatDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelDriver for GoogleChatDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.google_chat_webhook_url.is_empty() {
            bail!("google chat webhook URL is required");
        }

        let response = self
            .http
            .post(&config.google_chat_webhook_url)
            .json(&json!({ "text": message }))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("google chat webhook error, status: {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "google_chat"
    }
}
