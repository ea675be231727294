//! Discord webhook driver with rich-embed enrichment.
//!
//! The rendered text stays the source of truth; the embed is a cosmetic
//! restructuring of it. The first line becomes the title, `• Key: Value`
//! bullet lines become inline fields, and a keyword scan picks the color.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::store::AlertConfig;

use super::{classify_message, ChannelDriver, Severity};

const COLOR_RED: u32 = 15158332;
const COLOR_ORANGE: u32 = 15105570;
const COLOR_GREEN: u32 = 3066993;
const COLOR_BLUE: u32 = 3447003;

pub struct DiscordDriver {
    http: reqwest::Client,
}

#[derive(Serialize)]
struct DiscordPayload {
    embeds: Vec<Embed>,
}

#[derive(Serialize)]
struct Embed {
    #[serde(skip_serializing_if = "String::is_empty")]
    title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    color: u32,
    timestamp: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    footer: Footer,
}

#[derive(Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize)]
struct Footer {
    text: String,
}

impl DiscordDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn build_embed(message: &str) -> Embed {
        let mut lines = message.lines();
        let title = lines.next().unwrap_or_default().trim().to_string();
        let color = match classify_message(&title) {
            Severity::Critical => COLOR_RED,
            Severity::Warning | Severity::Maintenance => COLOR_ORANGE,
            Severity::Success => COLOR_GREEN,
            Severity::Info => COLOR_BLUE,
        };

        let mut fields = Vec::new();
        let mut leftover = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let stripped = line
                .strip_prefix('•')
                .or_else(|| line.strip_prefix('-'))
                .map(str::trim);
            match stripped {
                Some(bullet) => match bullet.split_once(':') {
                    Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
                        fields.push(EmbedField {
                            name: name.trim().to_string(),
                            value: value.trim().to_string(),
                            inline: true,
                        });
                    }
                    _ => fields.push(EmbedField {
                        name: "Details".to_string(),
                        value: bullet.to_string(),
                        inline: false,
                    }),
                },
                None => leftover.push(line),
            }
        }

        let description = if fields.is_empty() {
            leftover.join("\n")
        } else {
            String::new()
        };

        Embed {
            title,
            description,
            color,
            timestamp: Utc::now().to_rfc3339(),
            fields,
            footer: Footer {
                text: "System Alert".to_string(),
            },
        }
    }
}

#[async_trait]
impl ChannelDriver for DiscordDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.discord_webhook_url.is_empty() {
            bail!("discord webhook URL is required");
        }

        let payload = DiscordPayload {
            embeds: vec![Self::build_embed(message)],
        };
        let response = self
            .http
            .post(&config.discord_webhook_url)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("discord webhook error, status: {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullet_lines_become_inline_fields() {
        let embed = DiscordDriver::build_embed(
            "🔴 Service api is DOWN\n• Host: 10.0.0.1\n• Type: HTTP\nnot a bullet",
        );
        assert_eq!(embed.title, "🔴 Service api is DOWN");
        assert_eq!(embed.color, COLOR_RED);
        assert_eq!(embed.fields.len(), 2);
        assert_eq!(embed.fields[0].name, "Host");
        assert_eq!(embed.fields[0].value, "10.0.0.1");
        assert!(embed.fields[0].inline);
        // fields win; description stays empty
        assert!(embed.description.is_empty());
    }

    #[test]
    fn plain_message_uses_description() {
        let embed = DiscordDriver::build_embed("certificate restored\nall good now");
        assert_eq!(embed.color, COLOR_GREEN);
        assert!(embed.fields.is_empty());
        assert_eq!(embed.description, "all good now");
    }
}
