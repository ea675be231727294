//! Signal REST API driver (signal-cli REST gateway).

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::store::AlertConfig;

use super::ChannelDriver;

pub struct SignalDriver {
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SignalPayload<'a> {
    number: &'a str,
    recipients: Vec<&'a str>,
    message: &'a str,
}

impl SignalDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelDriver for SignalDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.signal_number.is_empty() {
            bail!("signal phone number is required");
        }
        if config.signal_api_endpoint.is_empty() {
            bail!("signal API endpoint is required");
        }

        // The gateway delivers to the registered sender's own number; the
        // schema has no separate recipient list.
        let payload = SignalPayload {
            number: &config.signal_number,
            recipients: vec![&config.signal_number],
            message,
        };

        let response = self
            .http
            .post(&config.signal_api_endpoint)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("signal API returned status {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "signal"
    }
}
