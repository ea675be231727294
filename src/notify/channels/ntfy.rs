//! ntfy driver: raw text body with Title/Tags/Priority headers.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::store::AlertConfig;

use super::{classify_message, ChannelDriver, Severity};

pub struct NtfyDriver {
    http: reqwest::Client,
}

impl NtfyDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn headers_for(message: &str) -> (&'static str, &'static str) {
        match classify_message(message) {
            Severity::Critical => ("high", "rotating_light,warning"),
            Severity::Warning => ("default", "warning"),
            Severity::Success => ("default", "white_check_mark"),
            _ => ("default", "monitoring"),
        }
    }
}

#[async_trait]
impl ChannelDriver for NtfyDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.ntfy_endpoint.is_empty() {
            bail!("ntfy endpoint is required");
        }

        let (priority, tags) = Self::headers_for(message);
        let response = self
            .http
            .post(&config.ntfy_endpoint)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Title", "🔔 Service Alert")
            .header("Tags", tags)
            .header("Priority", priority)
            .body(message.to_string())
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("ntfy API error, status: {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ntfy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_tracks_message_content() {
        assert_eq!(NtfyDriver::headers_for("service is DOWN").0, "high");
        assert_eq!(NtfyDriver::headers_for("cert expiring soon").0, "default");
        assert_eq!(
            NtfyDriver::headers_for("service restored").1,
            "white_check_mark"
        );
    }
}
