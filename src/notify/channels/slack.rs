//! Slack incoming-webhook driver with attachment enrichment.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::store::AlertConfig;

use super::{classify_message, ChannelDriver, Severity};

pub struct SlackDriver {
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SlackPayload {
    text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    icon_emoji: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
}

#[derive(Serialize)]
struct Attachment {
    color: String,
    title: String,
    ts: i64,
    fields: Vec<Field>,
}

#[derive(Serialize)]
struct Field {
    title: String,
    value: String,
    short: bool,
}

impl SlackDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn build_payload(config: &AlertConfig, message: &str) -> SlackPayload {
        let color = match classify_message(message) {
            Severity::Critical => "#FF0000",
            Severity::Warning => "#FFA500",
            Severity::Success => "#00FF00",
            Severity::Maintenance => "#0080FF",
            Severity::Info => "#808080",
        };
        let icon_emoji = Self::emoji_for(message);
        let (title, fields) = Self::parse_fields(message);

        if fields.is_empty() {
            SlackPayload {
                text: title,
                username: config.notify_name.clone(),
                icon_emoji,
                attachments: Vec::new(),
            }
        } else {
            SlackPayload {
                text: String::new(),
                username: config.notify_name.clone(),
                icon_emoji,
                attachments: vec![Attachment {
                    color: color.to_string(),
                    title,
                    ts: Utc::now().timestamp(),
                    fields,
                }],
            }
        }
    }

    fn emoji_for(message: &str) -> String {
        let lower = message.to_lowercase();
        let emoji = if lower.contains("certificate") || lower.contains("ssl") {
            if lower.contains("expired") {
                ":no_entry:"
            } else if lower.contains("expiring") {
                ":warning:"
            } else {
                ":lock:"
            }
        } else {
            match classify_message(message) {
                Severity::Critical => ":red_circle:",
                Severity::Warning => ":warning:",
                Severity::Success => ":white_check_mark:",
                Severity::Maintenance => ":construction:",
                Severity::Info => ":information_source:",
            }
        };
        emoji.to_string()
    }

    /// First line is the title; `• Key: Value` bullets and bare key/value
    /// lines become attachment fields.
    fn parse_fields(message: &str) -> (String, Vec<Field>) {
        let mut lines = message.lines();
        let title = lines.next().unwrap_or_default().trim().to_string();
        let mut fields = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let cleaned = line
                .trim_start_matches(['•', '-', '*'])
                .trim();
            if let Some((key, value)) = cleaned.split_once(':') {
                let key = key.trim();
                let value = value.trim();
                if !key.is_empty() && !value.is_empty() {
                    fields.push(Field {
                        title: key.to_string(),
                        value: value.to_string(),
                        short: value.len() < 30,
                    });
                    continue;
                }
            }
            if cleaned != line {
                fields.push(Field {
                    title: "Info".to_string(),
                    value: cleaned.to_string(),
                    short: false,
                });
            }
        }
        (title, fields)
    }
}

#[async_trait]
impl ChannelDriver for SlackDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.slack_webhook_url.is_empty() {
            bail!("slack webhook URL is required");
        }

        let payload = Self::build_payload(config, message);
        let response = self
            .http
            .post(&config.slack_webhook_url)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("slack webhook error, status: {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_message_becomes_attachment() {
        let config = AlertConfig {
            notify_name: "watchdog".into(),
            ..AlertConfig::default()
        };
        let payload = SlackDriver::build_payload(
            &config,
            "🔴 Service api is DOWN\n• Host: 10.0.0.1\n• Response time: N/A",
        );
        assert!(payload.text.is_empty());
        assert_eq!(payload.attachments.len(), 1);
        let attachment = &payload.attachments[0];
        assert_eq!(attachment.color, "#FF0000");
        assert_eq!(attachment.fields.len(), 2);
        assert!(attachment.fields[0].short);
    }

    #[test]
    fn flat_message_stays_text() {
        let payload = SlackDriver::build_payload(&AlertConfig::default(), "all systems nominal");
        assert_eq!(payload.text, "all systems nominal");
        assert!(payload.attachments.is_empty());
    }
}
