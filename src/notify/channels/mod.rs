//! Channel drivers: one per notification channel, each a pure
//! `(config, rendered message) -> send`. Drivers are stateless and safe to
//! call concurrently; retry is the caller's concern.

mod discord;
mod email;
mod google_chat;
mod notifiarr;
mod ntfy;
mod pushover;
mod signal;
mod slack;
mod telegram;
mod webhook;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::store::AlertConfig;

pub use discord::DiscordDriver;
pub use email::EmailDriver;
pub use google_chat::GoogleChatDriver;
pub use notifiarr::NotifiarrDriver;
pub use ntfy::NtfyDriver;
pub use pushover::PushoverDriver;
pub use signal::SignalDriver;
pub use slack::SlackDriver;
pub use telegram::TelegramDriver;
pub use webhook::WebhookDriver;

#[async_trait]
pub trait ChannelDriver: Send + Sync {
    /// Deliver an already-rendered message using the credentials in the
    /// binding. 2xx (or the channel's own success marker) is success.
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

pub type ChannelRegistry = HashMap<&'static str, Arc<dyn ChannelDriver>>;

/// Build the driver registry keyed by the Store's `notification_type` tag.
pub fn build_registry() -> ChannelRegistry {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default();

    let mut registry: ChannelRegistry = HashMap::new();
    registry.insert("telegram", Arc::new(TelegramDriver::new(http.clone())));
    registry.insert("discord", Arc::new(DiscordDriver::new(http.clone())));
    registry.insert("slack", Arc::new(SlackDriver::new(http.clone())));
    registry.insert("google_chat", Arc::new(GoogleChatDriver::new(http.clone())));
    registry.insert("signal", Arc::new(SignalDriver::new(http.clone())));
    registry.insert("email", Arc::new(EmailDriver::new()));
    registry.insert("webhook", Arc::new(WebhookDriver::new(http.clone())));
    registry.insert("ntfy", Arc::new(NtfyDriver::new(http.clone())));
    registry.insert("pushover", Arc::new(PushoverDriver::new(http.clone())));
    registry.insert("notifiarr", Arc::new(NotifiarrDriver::new(http)));
    registry
}

/// Shared heuristic: classify a rendered message by keyword scan. Used by
/// drivers that enrich output with channel-native severity markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Warning,
    Success,
    Maintenance,
    Info,
}

pub fn classify_message(message: &str) -> Severity {
    let lower = message.to_lowercase();
    if ["expired", "down", "failed", "error", "critical", "🚨", "🔴"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return Severity::Critical;
    }
    if ["expiring_soon", "expiring soon", "expiring", "warning", "⚠", "🟡", "🟠"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return Severity::Warning;
    }
    if ["up", "resolved", "success", "restored", "valid", "🟢", "✅"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return Severity::Success;
    }
    if ["maintenance", "paused"].iter().any(|k| lower.contains(k)) {
        return Severity::Maintenance;
    }
    Severity::Info
}
