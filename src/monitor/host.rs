//! Host monitor loop.
//!
//! Every 30 seconds, derives each host's up/down status from its agent
//! state and the freshness of its telemetry, then runs two independent
//! alert state machines: one for host status, one per (host, resource)
//! threshold. Both share the retry-ceiling + 5-minute-resend policy;
//! recovery notifications are gated on a previously active alert.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::notify::{NotificationPayload, Notifier};
use crate::store::{Host, HostMetric, StoreClient, ThresholdTemplate};

const TICK: Duration = Duration::from_secs(30);
/// Minimum spacing between repeated alert sends.
const RESEND_SPACING_SECS: i64 = 300;
/// Floor for the metric freshness window, to avoid false downs on short
/// check intervals.
const MIN_METRIC_WINDOW: Duration = Duration::from_secs(120);
const METRIC_GRACE: Duration = Duration::from_secs(30);

/// Alert state shared by the status machine and the threshold machines.
#[derive(Debug, Clone)]
pub struct ActiveAlert {
    pub last_alerted: DateTime<Utc>,
    pub send_count: i64,
}

/// Pure resend policy: first send always goes out; afterwards sends are
/// spaced by 5 minutes and capped at `max_retries` total.
pub fn should_send_alert(
    alert: Option<&ActiveAlert>,
    max_retries: i64,
    now: DateTime<Utc>,
) -> bool {
    match alert {
        None => true,
        Some(alert) => {
            alert.send_count < max_retries
                && (now - alert.last_alerted).num_seconds() > RESEND_SPACING_SECS
        }
    }
}

/// Extract the percentage from a metric string: either a bare "48.27%" or
/// the embedded "7.82 GB (48.9%)" form.
pub fn parse_percent(value: &str) -> Option<f64> {
    let value = value.trim();
    if let (Some(open), Some(close)) = (value.find('('), value.find("%)")) {
        if open < close {
            return value[open + 1..close].trim().parse().ok();
        }
    }
    value.trim_end_matches('%').trim().parse().ok()
}

pub struct HostMonitor {
    store: Arc<StoreClient>,
    notifier: Arc<Notifier>,
    last_statuses: RwLock<HashMap<String, String>>,
    status_alerts: RwLock<HashMap<String, ActiveAlert>>,
    threshold_alerts: RwLock<HashMap<String, ActiveAlert>>,
}

impl HostMonitor {
    pub fn new(store: Arc<StoreClient>, notifier: Arc<Notifier>) -> Self {
        Self {
            store,
            notifier,
            last_statuses: RwLock::new(HashMap::new()),
            status_alerts: RwLock::new(HashMap::new()),
            threshold_alerts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("host monitor started (tick: {TICK:?})");
        let mut interval = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    info!("host monitor stopped");
                    return;
                }
            }
        }
    }

    async fn tick(&self) {
        let hosts = match self.store.list_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                error!(error = %e, "failed to list hosts");
                return;
            }
        };

        for host in hosts {
            if host.status == "paused" {
                continue;
            }
            self.check_host(&host).await;
        }
    }

    async fn check_host(&self, host: &Host) {
        let (status, reason, metric) = self.derive_status(host).await;
        debug!(host = %host.name, %status, %reason, "host status derived");

        // Keep the Store in sync with the derived status.
        if host.status != status {
            if let Err(e) = self.store.update_host_status(&host.id, &status).await {
                error!(host = %host.name, error = %e, "failed to patch host status");
            }
        }
        {
            let mut statuses = self.last_statuses.write().await;
            statuses.insert(host.server_id.clone(), status.clone());
        }

        self.handle_status_alerts(host, &status, &reason).await;

        if status == "up" {
            if let Some(metric) = metric {
                self.evaluate_thresholds(host, &metric).await;
            }
        }
    }

    /// Host status from the agent state and metric freshness. Returns the
    /// fresh metric, when one exists, for threshold evaluation.
    async fn derive_status(&self, host: &Host) -> (String, String, Option<HostMetric>) {
        match host.agent_status.as_str() {
            "stopped" => (
                "down".to_string(),
                "agent has stopped running".to_string(),
                None,
            ),
            "running" => {
                let interval = Duration::from_secs(host.check_interval.max(0) as u64 * 60);
                let window = (interval + METRIC_GRACE).max(MIN_METRIC_WINDOW);
                match self.store.latest_host_metric(&host.server_id, window).await {
                    Ok(Some(metric)) => (
                        "up".to_string(),
                        "metrics received within window".to_string(),
                        Some(metric),
                    ),
                    Ok(None) => (
                        "down".to_string(),
                        format!("no metrics received in last {window:?}"),
                        None,
                    ),
                    Err(e) => {
                        warn!(host = %host.name, error = %e, "failed to fetch host metrics");
                        (
                            "down".to_string(),
                            format!("failed to retrieve metrics: {e}"),
                            None,
                        )
                    }
                }
            }
            other => (
                "up".to_string(),
                format!("unknown agent status: {other}"),
                None,
            ),
        }
    }

    /// Status alert machine: down alerts resend up to max_retries with
    /// 5-minute spacing; the first up after an active alert sends exactly
    /// one recovery.
    async fn handle_status_alerts(&self, host: &Host, status: &str, reason: &str) {
        if host.notification_id.is_empty() {
            return;
        }
        let now = Utc::now();

        if status == "down" {
            let due = {
                let alerts = self.status_alerts.read().await;
                should_send_alert(alerts.get(&host.server_id), host.max_retries, now)
            };
            if !due {
                return;
            }
            let message = format!("🔴 Server {} is DOWN - {reason}", host.name);
            if self.send_status(host, status, &message).await {
                let mut alerts = self.status_alerts.write().await;
                let entry = alerts.entry(host.server_id.clone()).or_insert(ActiveAlert {
                    last_alerted: now,
                    send_count: 0,
                });
                entry.last_alerted = now;
                entry.send_count += 1;
            }
        } else if status == "up" {
            let had_alert = {
                let alerts = self.status_alerts.read().await;
                alerts.contains_key(&host.server_id)
            };
            if !had_alert {
                return;
            }
            let message = format!("✅ Server {} is back up - {reason}", host.name);
            if self.send_status(host, status, &message).await {
                let mut alerts = self.status_alerts.write().await;
                alerts.remove(&host.server_id);
                info!(host = %host.name, "recovery notification sent, alert cleared");
            }
        }
    }

    async fn send_status(&self, host: &Host, status: &str, message: &str) -> bool {
        let payload = build_host_payload(host, status, message);
        match self
            .notifier
            .notify_service(&payload, &host.notification_id, &host.template_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(host = %host.name, error = %e, "host status notification failed");
                false
            }
        }
    }

    /// Threshold machines for cpu, ram and disk against the bound
    /// threshold template.
    async fn evaluate_thresholds(&self, host: &Host, metric: &HostMetric) {
        if host.threshold_id.is_empty() {
            return;
        }
        let thresholds = match self.store.get_threshold_template(&host.threshold_id).await {
            Ok(thresholds) => thresholds,
            Err(e) => {
                warn!(host = %host.name, error = %e, "failed to fetch threshold template");
                return;
            }
        };

        for (resource, usage_raw, threshold_raw) in resource_readings(metric, &thresholds) {
            let Some(threshold) = parse_threshold(&threshold_raw) else {
                continue;
            };
            let Some(usage) = parse_percent(&usage_raw) else {
                debug!(host = %host.name, resource, raw = %usage_raw, "unparseable usage value");
                continue;
            };
            self.evaluate_resource(host, resource, usage, threshold)
                .await;
        }
    }

    async fn evaluate_resource(&self, host: &Host, resource: &'static str, usage: f64, threshold: i64) {
        let key = format!("{}-{resource}", host.server_id);
        let now = Utc::now();

        if usage > threshold as f64 {
            let due = {
                let alerts = self.threshold_alerts.read().await;
                should_send_alert(alerts.get(&key), host.max_retries, now)
            };
            if !due {
                return;
            }
            let message = format!(
                "🚨 {} Alert: Server {} usage is {usage:.2}% (threshold: {threshold}%)",
                resource_label(resource),
                host.name
            );
            if self
                .send_resource(host, "warning", resource, usage, threshold, &message)
                .await
            {
                let mut alerts = self.threshold_alerts.write().await;
                let entry = alerts.entry(key).or_insert(ActiveAlert {
                    last_alerted: now,
                    send_count: 0,
                });
                entry.last_alerted = now;
                entry.send_count += 1;
            }
        } else {
            let had_alert = {
                let alerts = self.threshold_alerts.read().await;
                alerts.contains_key(&key)
            };
            if !had_alert {
                return;
            }
            let message = format!(
                "✅ {} Recovery: Server {} usage is back to normal: {usage:.2}% (threshold: {threshold}%)",
                resource_label(resource),
                host.name
            );
            if self
                .send_resource(host, "up", resource, usage, threshold, &message)
                .await
            {
                let mut alerts = self.threshold_alerts.write().await;
                alerts.remove(&key);
                info!(host = %host.name, resource, "resource recovery sent, alert cleared");
            }
        }
    }

    async fn send_resource(
        &self,
        host: &Host,
        status: &str,
        resource: &str,
        usage: f64,
        threshold: i64,
        message: &str,
    ) -> bool {
        let mut payload = build_host_payload(host, status, message);
        let usage_str = format!("{usage:.2}%");
        match resource {
            "cpu" => payload.cpu_usage = usage_str,
            "ram" => payload.ram_usage = usage_str,
            "disk" => payload.disk_usage = usage_str,
            "network" => payload.network_usage = usage_str,
            "cpu_temp" => payload.cpu_temp = usage_str,
            "disk_io" => payload.disk_io = usage_str,
            _ => {}
        }
        payload.threshold = format!("{threshold}%");

        match self
            .notifier
            .notify_resource(&payload, &host.notification_id, &host.template_id, resource)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(host = %host.name, resource, error = %e, "resource notification failed");
                false
            }
        }
    }
}

fn build_host_payload(host: &Host, status: &str, message: &str) -> NotificationPayload {
    let mut payload = NotificationPayload::new(&host.name, status);
    payload.host = host.ip_address.clone();
    payload.hostname = host.hostname.clone();
    payload.service_type = "server".to_string();
    payload.message = message.to_string();
    payload
}

/// Per-resource (name, usage string, threshold string) triples from the
/// latest metric and the threshold template.
fn resource_readings(
    metric: &HostMetric,
    thresholds: &ThresholdTemplate,
) -> Vec<(&'static str, String, String)> {
    vec![
        ("cpu", metric.cpu_usage.clone(), thresholds.cpu_threshold.clone()),
        ("ram", metric.ram_used.clone(), thresholds.ram_threshold.clone()),
        ("disk", metric.disk_used.clone(), thresholds.disk_threshold.clone()),
    ]
}

fn parse_threshold(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.trim_end_matches('%').parse().ok()
}

fn resource_label(resource: &str) -> &'static str {
    match resource {
        "cpu" => "CPU",
        "ram" => "RAM",
        "disk" => "Disk",
        "network" => "Network",
        "cpu_temp" => "CPU Temperature",
        "disk_io" => "Disk I/O",
        _ => "Resource",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_parsing_handles_both_forms() {
        assert_eq!(parse_percent("48.27%"), Some(48.27));
        assert_eq!(parse_percent("7.82 GB (48.9%)"), Some(48.9));
        assert_eq!(parse_percent("120.5 GB (91.0%)"), Some(91.0));
        assert_eq!(parse_percent(" 12.5 "), Some(12.5));
        assert_eq!(parse_percent("garbage"), None);
        assert_eq!(parse_percent(""), None);
    }

    #[test]
    fn threshold_parsing() {
        assert_eq!(parse_threshold("80"), Some(80));
        assert_eq!(parse_threshold("80%"), Some(80));
        assert_eq!(parse_threshold(""), None);
        assert_eq!(parse_threshold("high"), None);
    }

    #[test]
    fn first_alert_always_sends() {
        assert!(should_send_alert(None, 3, Utc::now()));
    }

    #[test]
    fn resend_requires_spacing_and_budget() {
        let now = Utc::now();
        let fresh = ActiveAlert {
            last_alerted: now - chrono::Duration::minutes(1),
            send_count: 1,
        };
        assert!(!should_send_alert(Some(&fresh), 3, now));

        let stale = ActiveAlert {
            last_alerted: now - chrono::Duration::minutes(6),
            send_count: 1,
        };
        assert!(should_send_alert(Some(&stale), 3, now));

        let exhausted = ActiveAlert {
            last_alerted: now - chrono::Duration::minutes(60),
            send_count: 3,
        };
        assert!(!should_send_alert(Some(&exhausted), 3, now));
    }

    #[test]
    fn resource_readings_cover_cpu_ram_disk() {
        let metric = HostMetric {
            cpu_usage: "85.00%".into(),
            ram_used: "7.8 GB (62.1%)".into(),
            disk_used: "120 GB (44.0%)".into(),
            ..HostMetric::default()
        };
        let thresholds = ThresholdTemplate {
            cpu_threshold: "80".into(),
            ram_threshold: "90".into(),
            disk_threshold: "85".into(),
            ..ThresholdTemplate::default()
        };
        let readings = resource_readings(&metric, &thresholds);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].0, "cpu");
        assert_eq!(parse_percent(&readings[1].1), Some(62.1));
    }
}
