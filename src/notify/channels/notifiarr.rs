//! Notifiarr passthrough driver.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::store::AlertConfig;

use super::{classify_message, ChannelDriver, Severity};

pub struct NotifiarrDriver {
    http: reqwest::Client,
}

#[derive(Serialize)]
struct NotifiarrPayload {
    notification: Notification,
    discord: Discord,
}

#[derive(Serialize)]
struct Notification {
    update: bool,
    name: String,
}

#[derive(Serialize)]
struct Discord {
    color: String,
    text: Text,
    ids: Ids,
}

#[derive(Serialize)]
struct Text {
    title: String,
    description: String,
    footer: String,
}

#[derive(Serialize)]
struct Ids {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<i64>,
}

impl NotifiarrDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelDriver for NotifiarrDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.api_token.is_empty() {
            bail!("notifiarr API token is required");
        }

        let color = match classify_message(message) {
            Severity::Critical => "FF0000",
            Severity::Success => "00FF00",
            Severity::Warning | Severity::Maintenance => "FFA500",
            Severity::Info => "0099FF",
        };

        let payload = NotifiarrPayload {
            notification: Notification {
                update: false,
                name: "Automated monitoring notification".to_string(),
            },
            discord: Discord {
                color: color.to_string(),
                text: Text {
                    title: "Service Alert".to_string(),
                    description: message.to_string(),
                    footer: "Monitoring System".to_string(),
                },
                ids: Ids {
                    channel: config.channel_id.parse().ok(),
                },
            },
        };

        let url = format!(
            "https://notifiarr.com/api/v1/notification/passthrough/{}",
            config.api_token
        );
        let response = self.http.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            bail!("notifiarr API error: status code {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "notifiarr"
    }
}
