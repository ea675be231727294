//! Pushover driver.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::AlertConfig;

use super::ChannelDriver;

const API_URL: &str = "https://api.pushover.net/1/messages.json";

pub struct PushoverDriver {
    http: reqwest::Client,
}

#[derive(Serialize)]
struct PushoverPayload<'a> {
    token: &'a str,
    user: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    title: &'a str,
}

#[derive(Deserialize)]
struct PushoverResponse {
    status: i32,
    #[serde(default)]
    errors: Vec<String>,
}

impl PushoverDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelDriver for PushoverDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.api_token.is_empty() || config.user_key.is_empty() {
            bail!("pushover API token and user key are required");
        }

        let payload = PushoverPayload {
            token: &config.api_token,
            user: &config.user_key,
            message,
            title: &config.notify_name,
        };

        let response = self.http.post(API_URL).json(&payload).send().await?;
        let body: PushoverResponse = response.json().await?;
        if body.status != 1 {
            let detail = if body.errors.is_empty() {
                "unknown error".to_string()
            } else {
                body.errors.join(", ")
            };
            bail!("pushover API error: {detail}");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pushover"
    }
}
