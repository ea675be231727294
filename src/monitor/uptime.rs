//! Uptime monitor loop.
//!
//! Ticks every 30 seconds over the non-paused service fleet. The observed
//! status comes from the latest probe result record in the Store, not from
//! probing here; this loop owns transition detection and notification
//! timing. A 2-minute grace window after process start suppresses
//! first-sighting notifications for healthy services so a restart does not
//! spam every channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::notify::{NotificationPayload, Notifier};
use crate::store::{Service, StoreClient};

const TICK: Duration = Duration::from_secs(30);
/// Post-startup window in which first sightings stay silent.
const GRACE_WINDOW_SECS: i64 = 120;
/// Minimum spacing between still-down reminders.
const DOWN_REMINDER_SECS: i64 = 300;

#[derive(Debug, Clone, Default)]
pub struct TrackedService {
    pub last_status: String,
    pub last_notified: Option<DateTime<Utc>>,
}

/// What one observation means for notification and tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Send a notification and advance the tracker.
    Notify,
    /// Advance the tracker silently.
    Record,
    /// Leave everything as is.
    Ignore,
}

/// The transition policy, independent of I/O:
/// - first sighting inside the grace window records silently;
/// - first sighting down (outside grace) notifies;
/// - any status change notifies;
/// - still down notifies again once 5 minutes have passed;
/// - everything else is ignored.
pub fn transition_decision(
    previous: Option<&TrackedService>,
    current: &str,
    in_grace_window: bool,
    now: DateTime<Utc>,
) -> Transition {
    match previous {
        None => {
            if in_grace_window {
                Transition::Record
            } else if current == "down" {
                Transition::Notify
            } else {
                Transition::Record
            }
        }
        Some(tracked) if tracked.last_status != current => Transition::Notify,
        Some(tracked) if current == "down" => {
            let due = tracked
                .last_notified
                .map(|t| (now - t).num_seconds() >= DOWN_REMINDER_SECS)
                .unwrap_or(true);
            if due {
                Transition::Notify
            } else {
                Transition::Ignore
            }
        }
        Some(_) => Transition::Ignore,
    }
}

pub struct UptimeMonitor {
    store: Arc<StoreClient>,
    notifier: Arc<Notifier>,
    tracker: RwLock<HashMap<String, TrackedService>>,
    started_at: DateTime<Utc>,
}

impl UptimeMonitor {
    pub fn new(store: Arc<StoreClient>, notifier: Arc<Notifier>) -> Self {
        Self {
            store,
            notifier,
            tracker: RwLock::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("uptime monitor started (tick: {TICK:?}, grace window: {GRACE_WINDOW_SECS}s)");
        let mut interval = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    info!("uptime monitor stopped");
                    return;
                }
            }
        }
    }

    async fn tick(&self) {
        let services = match self.store.list_active_services().await {
            Ok(services) => services,
            Err(e) => {
                error!(error = %e, "failed to list services");
                return;
            }
        };

        for service in services {
            if service.status == "paused" {
                continue;
            }
            if let Err(e) = self.check_service(&service).await {
                warn!(service = %service.name, error = %e, "service check failed");
            }
        }
    }

    fn in_grace_window(&self) -> bool {
        (Utc::now() - self.started_at).num_seconds() < GRACE_WINDOW_SECS
    }

    async fn check_service(&self, service: &Service) -> anyhow::Result<()> {
        if !service.notifications_enabled() {
            debug!(service = %service.name, "notifications disabled, skipping");
            return Ok(());
        }

        let (status, response_time, error_message) = self.observed_status(service).await;

        let previous = {
            let tracker = self.tracker.read().await;
            tracker.get(&service.id).cloned()
        };

        match transition_decision(
            previous.as_ref(),
            &status,
            self.in_grace_window(),
            Utc::now(),
        ) {
            Transition::Notify => {
                info!(
                    service = %service.name,
                    from = previous.as_ref().map(|t| t.last_status.as_str()).unwrap_or(""),
                    to = %status,
                    "notifying"
                );
                self.send(service, &status, response_time, &error_message)
                    .await;
                self.record_status(&service.id, &status, true).await;
            }
            Transition::Record => {
                debug!(service = %service.name, %status, "recording without notification");
                self.record_status(&service.id, &status, false).await;
            }
            Transition::Ignore => {}
        }

        // Keep the Store's view of the service in sync with the latest
        // observation.
        if service.status != status {
            if let Err(e) = self
                .store
                .update_service_status(&service.id, &status, response_time, &error_message)
                .await
            {
                warn!(service = %service.name, error = %e, "failed to patch service status");
            }
        }

        Ok(())
    }

    /// Latest observed status from the protocol-specific result
    /// collection. A service with no result record is down.
    async fn observed_status(&self, service: &Service) -> (String, i64, String) {
        let collection = collection_for(&service.service_type);
        match self
            .store
            .latest_service_record(&service.id, collection)
            .await
        {
            Ok(Some(record)) => (record.status, record.response_time, record.error_message),
            Ok(None) => (
                "down".to_string(),
                0,
                "No metrics data available".to_string(),
            ),
            Err(e) => (
                "down".to_string(),
                0,
                format!("Failed to retrieve service metrics: {e}"),
            ),
        }
    }

    async fn record_status(&self, service_id: &str, status: &str, notified: bool) {
        let mut tracker = self.tracker.write().await;
        let entry = tracker.entry(service_id.to_string()).or_default();
        entry.last_status = status.to_string();
        if notified {
            entry.last_notified = Some(Utc::now());
        }
    }

    async fn send(&self, service: &Service, status: &str, response_time: i64, error_message: &str) {
        let payload = build_payload(service, status, response_time, error_message);
        if let Err(e) = self
            .notifier
            .notify_uptime_service(&payload, &service.notification_id, &service.template_id)
            .await
        {
            error!(service = %service.name, error = %e, "uptime notification failed");
        }
    }
}

fn build_payload(
    service: &Service,
    status: &str,
    response_time: i64,
    error_message: &str,
) -> NotificationPayload {
    let mut payload = NotificationPayload::new(&service.name, status);
    payload.host = service.host.clone();
    payload.port = service.port;
    payload.service_type = service.service_type.clone();
    payload.response_time = response_time;
    payload.error_message = error_message.to_string();
    payload.url = service.url.clone();
    payload.domain = service.domain.clone();
    payload.region_name = service.region_name.clone();
    payload.agent_id = service.agent_id.clone();
    payload.uptime = service.uptime as i64;
    payload.message = summary_line(service, status);
    payload
}

/// One-line summary carried in `${message}`.
fn summary_line(service: &Service, status: &str) -> String {
    let (emoji, action) = match status {
        "down" => ("❌", "is DOWN"),
        "warning" => ("⚠️", "has issues"),
        "up" => ("✅", "is operational"),
        _ => ("ℹ️", "status changed"),
    };
    let mut message = format!("{emoji} [UPTIME] {} {action}", service.name);
    if !service.host.is_empty() {
        message.push_str(&format!(" | Host: {}", service.host));
    }
    message
}

/// Map a service protocol tag to its probe-result collection.
pub fn collection_for(service_type: &str) -> &'static str {
    match service_type.to_ascii_lowercase().as_str() {
        "ping" | "icmp" => "ping_data",
        "dns" => "dns_data",
        "tcp" => "tcp_data",
        "http" | "https" => "uptime_data",
        _ => "uptime_data",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_collection_mapping() {
        assert_eq!(collection_for("ping"), "ping_data");
        assert_eq!(collection_for("ICMP"), "ping_data");
        assert_eq!(collection_for("dns"), "dns_data");
        assert_eq!(collection_for("tcp"), "tcp_data");
        assert_eq!(collection_for("http"), "uptime_data");
        assert_eq!(collection_for("https"), "uptime_data");
        assert_eq!(collection_for("ssl"), "uptime_data");
    }

    #[test]
    fn summary_line_reflects_status() {
        let service = Service {
            name: "api".into(),
            host: "10.1.1.1".into(),
            ..Service::default()
        };
        assert_eq!(
            summary_line(&service, "down"),
            "❌ [UPTIME] api is DOWN | Host: 10.1.1.1"
        );
        assert!(summary_line(&service, "up").contains("is operational"));
    }

    #[test]
    fn grace_window_suppresses_first_sighting() {
        let now = Utc::now();
        assert_eq!(
            transition_decision(None, "up", true, now),
            Transition::Record
        );
        // even a down service only records while inside the grace window
        assert_eq!(
            transition_decision(None, "down", true, now),
            Transition::Record
        );
        // outside the window, first-sighting down is critical
        assert_eq!(
            transition_decision(None, "down", false, now),
            Transition::Notify
        );
        assert_eq!(
            transition_decision(None, "up", false, now),
            Transition::Record
        );
    }

    #[test]
    fn status_change_notifies() {
        let tracked = TrackedService {
            last_status: "up".into(),
            last_notified: None,
        };
        assert_eq!(
            transition_decision(Some(&tracked), "down", false, Utc::now()),
            Transition::Notify
        );
    }

    #[test]
    fn still_down_reminds_after_five_minutes() {
        let now = Utc::now();
        let recent = TrackedService {
            last_status: "down".into(),
            last_notified: Some(now - chrono::Duration::seconds(200)),
        };
        assert_eq!(
            transition_decision(Some(&recent), "down", false, now),
            Transition::Ignore
        );

        let stale = TrackedService {
            last_status: "down".into(),
            last_notified: Some(now - chrono::Duration::seconds(301)),
        };
        assert_eq!(
            transition_decision(Some(&stale), "down", false, now),
            Transition::Notify
        );
    }

    #[test]
    fn steady_up_is_silent() {
        let tracked = TrackedService {
            last_status: "up".into(),
            last_notified: None,
        };
        assert_eq!(
            transition_decision(Some(&tracked), "up", false, Utc::now()),
            Transition::Ignore
        );
    }

    #[test]
    fn payload_carries_error_message() {
        let service = Service {
            name: "api".into(),
            ..Service::default()
        };
        let payload = build_payload(&service, "down", 0, "connection refused");
        assert_eq!(payload.error_message, "connection refused");
        assert_eq!(payload.status, "down");
    }
}
