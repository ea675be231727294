//! Email driver: MIME multipart/alternative over SMTP.
//!
//! Port selects the transport: 465 uses implicit TLS, 25/587 and anything
//! else negotiate STARTTLS. PLAIN credentials are attached whenever a
//! password is configured. The subject carries a severity tag parsed from
//! the rendered message.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::store::AlertConfig;

use super::{classify_message, ChannelDriver, Severity};

pub struct EmailDriver;

impl EmailDriver {
    pub fn new() -> Self {
        Self
    }
}

fn severity_tag(severity: Severity) -> (&'static str, &'static str) {
    match severity {
        Severity::Critical => ("CRITICAL", "🚨"),
        Severity::Warning => ("WARNING", "⚠️"),
        Severity::Success => ("RESOLVED", "✅"),
        Severity::Maintenance => ("MAINTENANCE", "🔧"),
        Severity::Info => ("INFO", "ℹ️"),
    }
}

fn build_subject(sender_name: &str, severity: Severity) -> String {
    let (tag, emoji) = severity_tag(severity);
    if sender_name.is_empty() {
        format!("{emoji} [{tag}] Service Alert")
    } else {
        format!("{emoji} [{tag}] {sender_name} - Service Alert")
    }
}

fn build_plain_body(message: &str, severity: Severity) -> String {
    let (tag, emoji) = severity_tag(severity);
    let separator = "=".repeat(50);
    format!(
        "{separator}\n{emoji} {tag} SERVICE ALERT NOTIFICATION\n{separator}\n\n{message}\n\n{separator}\nThis is an automated notification from your monitoring system.\nGenerated at: {}\n{separator}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

fn build_html_body(message: &str, severity: Severity) -> String {
    let (bg, border, text) = match severity {
        Severity::Critical => ("#fee2e2", "#dc2626", "#991b1b"),
        Severity::Warning => ("#fef3c7", "#d97706", "#92400e"),
        Severity::Success => ("#dcfce7", "#16a34a", "#15803d"),
        Severity::Maintenance => ("#fed7aa", "#ea580c", "#c2410c"),
        Severity::Info => ("#dbeafe", "#2563eb", "#1d4ed8"),
    };
    let (_, emoji) = severity_tag(severity);
    let html_message = message.replace('\n', "<br>");
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="margin: 0; padding: 20px; font-family: Arial, sans-serif; background-color: #f5f5f5;">
  <div style="max-width: 600px; margin: 0 auto; background-color: white; border-radius: 8px;">
    <div style="background-color: {bg}; color: {text}; padding: 20px; border-radius: 8px 8px 0 0; border-left: 4px solid {border};">
      <h2 style="margin: 0; font-size: 18px;">{emoji} Service Alert Notification</h2>
    </div>
    <div style="padding: 20px;">
      <div style="background-color: #f8f9fa; padding: 15px; border-radius: 6px; border-left: 3px solid {border};">
        <p style="margin: 0; font-size: 14px; line-height: 1.6; color: #333;">{html_message}</p>
      </div>
      <div style="margin-top: 20px; padding-top: 15px; border-top: 1px solid #e5e7eb;">
        <p style="margin: 0; font-size: 12px; color: #6b7280; text-align: center;">
          This is an automated notification from your monitoring system.<br>
          Generated at: {generated}
        </p>
      </div>
    </div>
  </div>
</body>
</html>"#,
        generated = Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[async_trait]
impl ChannelDriver for EmailDriver {
    async fn send(&self, config: &AlertConfig, message: &str) -> Result<()> {
        if config.email_address.is_empty()
            || config.smtp_server.is_empty()
            || config.smtp_port.is_empty()
        {
            bail!("email configuration is incomplete");
        }
        let port: u16 = config
            .smtp_port
            .parse()
            .with_context(|| format!("invalid SMTP port: {}", config.smtp_port))?;

        let severity = classify_message(message);
        let subject = build_subject(&config.email_sender_name, severity);
        let plain = build_plain_body(message, severity);
        let html = build_html_body(message, severity);

        let address: lettre::Address = config
            .email_address
            .parse()
            .with_context(|| format!("invalid email address: {}", config.email_address))?;
        let sender_name = if config.email_sender_name.is_empty() {
            None
        } else {
            Some(config.email_sender_name.clone())
        };

        let email = Message::builder()
            .from(Mailbox::new(sender_name, address.clone()))
            .to(Mailbox::new(None, address))
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(plain, html))
            .context("building MIME message")?;

        // 465 is implicit TLS; 25, 587 and everything else negotiate
        // STARTTLS after EHLO.
        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)?
        };
        builder = builder.port(port);
        if !config.smtp_password.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.email_address.clone(),
                config.smtp_password.clone(),
            ));
        }
        let mailer = builder.build();

        mailer
            .send(email)
            .await
            .context("failed to send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_carries_severity_and_sender() {
        assert_eq!(
            build_subject("Acme", Severity::Critical),
            "🚨 [CRITICAL] Acme - Service Alert"
        );
        assert_eq!(
            build_subject("", Severity::Success),
            "✅ [RESOLVED] Service Alert"
        );
    }

    #[test]
    fn plain_body_embeds_message() {
        let body = build_plain_body("api is DOWN", Severity::Critical);
        assert!(body.contains("api is DOWN"));
        assert!(body.contains("CRITICAL"));
    }

    #[test]
    fn html_body_replaces_newlines() {
        let body = build_html_body("line one\nline two", Severity::Info);
        assert!(body.contains("line one<br>line two"));
    }
}
