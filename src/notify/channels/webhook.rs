//! Generic webhook driver.
//!
//! Payload selection, in order: a user-supplied payload template (validated
//! to produce JSON), a Discord-shaped `{content}` body when the URL looks
//! like a Discord webhook, else the flat default payload.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::store::AlertConfig;

use super::ChannelDriver;

pub struct WebhookDriver {
    http: reqwest::Client,
}

impl WebhookDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn build_body(config: &AlertConfig, message: &str) -> Result<String> {
        let template = config.webhook_payload_template.trim();
        if !template.is_empty() {
            return render_payload_template(template, message, &config.notify_name);
        }

        if config.webhook_url.to_lowercase().contains("discord") {
            return Ok(json!({ "content": message }).to_string());
        }

        Ok(json!({
            "message": message,
            "notify_name": config.notify_name,
            "timestamp": Utc::now().to_rfc3339(),
        })
        .to_string())
    }
}

/// Substitute `{{.message}}`, `{{.notify_name}}` and `{{.timestamp}}` in
/// the user template and verify the result is valid JSON before it goes on
/// the wire. The substituted values are JSON-escaped so a message with
/// quotes cannot break the document.
fn render_payload_template(template: &str, message: &str, notify_name: &str) -> Result<String> {
    let escape = |value: &str| {
        let quoted = serde_json::Value::String(value.to_string()).to_string();
        quoted[1..quoted.len() - 1].to_string()
    };

    let rendered = template
        .replace("{{.message}}", &escape(message))
        .replace("{{.notify_name}}", &escape(notify_name))
        .replace("{{.timestamp}}", &Utc::now().to_rfc3339());

    serde_json::from_str::<serde_json::Value>(&rendered)
        .map_err(|e| anyhow!("webhook payload template did not generate valid JSON: {e}"))?;
    Ok(rendered)
}

#[async_trait]
impl ChannelDriver for WebhookDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.webhook_url.is_empty() {
            bail!("webhook URL is required");
        }

        let body = Self::build_body(config, message)?;
        let response = self
            .http
            .post(&config.webhook_url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("webhook error, status: {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_template_renders_and_validates() {
        let body = render_payload_template(
            r#"{"text": "{{.message}}", "from": "{{.notify_name}}"}"#,
            "api is \"down\"",
            "watchdog",
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["text"], "api is \"down\"");
        assert_eq!(value["from"], "watchdog");
    }

    #[test]
    fn invalid_template_output_is_rejected() {
        let result = render_payload_template("not json {{.message}}", "hi", "n");
        assert!(result.is_err());
    }

    #[test]
    fn discord_urls_get_content_payload() {
        let config = AlertConfig {
            webhook_url: "https://discord.com/api/webhooks/x/y".into(),
            ..AlertConfig::default()
        };
        let body = WebhookDriver::build_body(&config, "hello").unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["content"], "hello");
    }

    #[test]
    fn default_payload_carries_metadata() {
        let config = AlertConfig {
            webhook_url: "https://hooks.internal/alert".into(),
            notify_name: "ops".into(),
            ..AlertConfig::default()
        };
        let body = WebhookDriver::build_body(&config, "hello").unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["message"], "hello");
        assert_eq!(value["notify_name"], "ops");
        assert!(value["timestamp"].is_string());
    }
}
