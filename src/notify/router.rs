//! Notification router: resolves alert bindings and fans a rendered
//! message out to the bound channels.
//!
//! Routing is inline with the calling monitor loop: no queue, no batching,
//! no retry. Partial success is success; failures are logged per target
//! and only an all-failure outcome surfaces as an error.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{error, info, warn};

use crate::store::StoreClient;

use super::channels::ChannelRegistry;
use super::template;
use super::NotificationPayload;

/// Which template collection renders the message.
enum RenderKind {
    Service,
    Server { resource: Option<String> },
    Ssl,
}

pub struct Notifier {
    store: Arc<StoreClient>,
    channels: ChannelRegistry,
}

impl Notifier {
    pub fn new(store: Arc<StoreClient>, channels: ChannelRegistry) -> Self {
        Self { store, channels }
    }

    /// Uptime service notification, rendered with the service templates.
    pub async fn notify_uptime_service(
        &self,
        payload: &NotificationPayload,
        notification_id: &str,
        template_id: &str,
    ) -> Result<()> {
        self.dispatch(payload, notification_id, template_id, RenderKind::Service)
            .await
    }

    /// Host status notification, rendered with the server templates.
    pub async fn notify_service(
        &self,
        payload: &NotificationPayload,
        notification_id: &str,
        template_id: &str,
    ) -> Result<()> {
        self.dispatch(
            payload,
            notification_id,
            template_id,
            RenderKind::Server { resource: None },
        )
        .await
    }

    /// Host resource (threshold) notification: cpu, ram, disk, network,
    /// cpu_temp, disk_io.
    pub async fn notify_resource(
        &self,
        payload: &NotificationPayload,
        notification_id: &str,
        template_id: &str,
        resource: &str,
    ) -> Result<()> {
        self.dispatch(
            payload,
            notification_id,
            template_id,
            RenderKind::Server {
                resource: Some(resource.to_string()),
            },
        )
        .await
    }

    /// Certificate notification, rendered with the ssl templates.
    pub async fn notify_ssl(
        &self,
        payload: &NotificationPayload,
        notification_id: &str,
        template_id: &str,
    ) -> Result<()> {
        self.dispatch(payload, notification_id, template_id, RenderKind::Ssl)
            .await
    }

    async fn dispatch(
        &self,
        payload: &NotificationPayload,
        notification_id: &str,
        template_id: &str,
        kind: RenderKind,
    ) -> Result<()> {
        let ids = parse_notification_ids(notification_id);
        if ids.is_empty() {
            bail!("notification ID required for {}", payload.service_name);
        }

        // One template fetch covers every target; a missing template is
        // non-fatal and the built-in defaults apply.
        let message = match &kind {
            RenderKind::Service => {
                let tpl = if template_id.is_empty() {
                    None
                } else {
                    self.store.get_service_template(template_id).await
                };
                template::render_service(tpl.as_ref(), payload)
            }
            RenderKind::Server { resource } => {
                let tpl = if template_id.is_empty() {
                    None
                } else {
                    self.store.get_server_template(template_id).await
                };
                template::render_server(tpl.as_ref(), payload, resource.as_deref())
            }
            RenderKind::Ssl => {
                let tpl = if template_id.is_empty() {
                    None
                } else {
                    self.store.get_ssl_template(template_id).await
                };
                template::render_ssl(tpl.as_ref(), payload)
            }
        };

        let mut failures = Vec::new();
        let mut sent = 0usize;

        for id in &ids {
            let config = match self.store.get_alert_config(id).await {
                Ok(config) => config,
                Err(e) => {
                    warn!(binding = %id, error = %e, "failed to fetch alert configuration");
                    failures.push(format!("config error {id}: {e}"));
                    continue;
                }
            };
            if !config.is_enabled() {
                info!(binding = %id, "notification binding disabled, skipping");
                continue;
            }

            let Some(driver) = self.channels.get(config.notification_type.as_str()) else {
                warn!(
                    binding = %id,
                    channel = %config.notification_type,
                    "unsupported notification type"
                );
                failures.push(format!("unsupported type {}", config.notification_type));
                continue;
            };

            match driver.send(&config, &message).await {
                Ok(()) => {
                    info!(
                        binding = %id,
                        channel = driver.name(),
                        entity = %payload.service_name,
                        "notification sent"
                    );
                    sent += 1;
                }
                Err(e) => {
                    error!(
                        binding = %id,
                        channel = driver.name(),
                        entity = %payload.service_name,
                        error = %e,
                        "notification send failed"
                    );
                    failures.push(format!("send failed {}: {e}", config.notification_type));
                }
            }
        }

        if sent == 0 && !failures.is_empty() {
            bail!(
                "all notifications failed for {}: {}",
                payload.service_name,
                failures.join("; ")
            );
        }
        Ok(())
    }
}

/// Split a comma-separated binding list into trimmed, non-empty ids.
pub fn parse_notification_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_trims_ids() {
        assert_eq!(
            parse_notification_ids("a, b ,c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn drops_empty_segments() {
        assert_eq!(parse_notification_ids(",,a,,"), vec!["a".to_string()]);
        assert!(parse_notification_ids("").is_empty());
        assert!(parse_notification_ids(" , ").is_empty());
    }
}
