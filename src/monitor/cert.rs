//! Certificate monitoring: a scheduler loop that performs TLS checks and
//! persists results, and a notifier loop that derives alert status from
//! the record thresholds.
//!
//! The two loops intentionally use different status derivations. The
//! scheduler writes a probe-urgency status from fixed day bands; the
//! notifier alerts from the per-record warning/expiry thresholds. The cert
//! tracker is persistent: status and last-notified live in the Store so a
//! restart cannot re-announce a known state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::notify::{NotificationPayload, Notifier};
use crate::probe::{run_tls_probe, ProbeResult};
use crate::store::{time as store_time, Certificate, StoreClient};

const SCHEDULER_TICK: Duration = Duration::from_secs(60);
const NOTIFIER_TICK: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
/// Upper bound on concurrent TLS dials across the fleet.
const MAX_CONCURRENT_CHECKS: usize = 64;

/// Stored status bands, from the probe's day count.
pub fn stored_status_for(success: bool, days_left: i64) -> &'static str {
    if !success {
        "error"
    } else if days_left <= 0 {
        "expired"
    } else if days_left <= 7 {
        "critical"
    } else if days_left <= 30 {
        "expiring_soon"
    } else {
        "valid"
    }
}

/// Notification status from the record's own thresholds.
pub fn notify_status_for(days_left: i64, warning_threshold: i64, expiry_threshold: i64) -> &'static str {
    if days_left <= 0 {
        "expired"
    } else if days_left <= expiry_threshold {
        "expiring_soon"
    } else if days_left <= warning_threshold {
        "warning"
    } else {
        "valid"
    }
}

/// Authoritative recompute: stored `days_left` is advisory only.
pub fn days_left_from(valid_till: &str, now: DateTime<Utc>) -> i64 {
    match store_time::parse_optional(valid_till) {
        Some(expiry) => ((expiry - now).num_hours() / 24).max(0),
        None => 0,
    }
}

/// Effective check interval in days, tightened for certificates close to
/// expiry or in an error state.
pub fn adjusted_interval_days(cert: &Certificate, stored_days: i64) -> i64 {
    let stored_days = stored_days.max(1);
    if cert.days_left <= 7 {
        1
    } else if cert.days_left <= 30 {
        stored_days.min(2)
    } else if cert.status == "error" {
        1
    } else {
        stored_days
    }
}

/// Whether a notification is due given the persisted tracker state.
pub fn should_notify(
    current_status: &str,
    last_status: &str,
    last_notified: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if last_status.is_empty() || last_status != current_status {
        return true;
    }
    match (current_status, last_notified) {
        ("expired" | "expiring_soon", Some(t)) => now - t > chrono::Duration::hours(24),
        ("warning", Some(t)) => now - t > chrono::Duration::days(7),
        _ => false,
    }
}

pub struct CertScheduler {
    store: Arc<StoreClient>,
    dial_permits: Arc<Semaphore>,
    /// Ids with a check already in flight; prevents a slow retry cycle
    /// from being double-scheduled by the next tick.
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl CertScheduler {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self {
            store,
            dial_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_CHECKS)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("certificate scheduler started (tick: {SCHEDULER_TICK:?})");
        let mut interval = tokio::time::interval(SCHEDULER_TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    info!("certificate scheduler stopped");
                    return;
                }
            }
        }
    }

    async fn tick(&self) {
        let certificates = match self.store.list_certificates().await {
            Ok(certificates) => certificates,
            Err(e) => {
                error!(error = %e, "failed to list certificates");
                return;
            }
        };

        let now = Utc::now();
        for cert in certificates {
            if !should_check(&cert, now) {
                continue;
            }
            {
                let mut in_flight = self.in_flight.lock().await;
                if !in_flight.insert(cert.id.clone()) {
                    continue;
                }
            }
            let task = Arc::new(SchedulerTask {
                store: self.store.clone(),
                permits: self.dial_permits.clone(),
            });
            let in_flight = self.in_flight.clone();
            let cert_id = cert.id.clone();
            tokio::spawn(async move {
                task.check_certificate(cert).await;
                in_flight.lock().await.remove(&cert_id);
            });
        }
    }
}

struct SchedulerTask {
    store: Arc<StoreClient>,
    permits: Arc<Semaphore>,
}

impl SchedulerTask {
    /// One certificate check with a bounded retry loop. Linear backoff:
    /// 30s, 60s, 90s between attempts.
    async fn check_certificate(self: Arc<Self>, cert: Certificate) {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let mut last_error = String::new();
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_secs(u64::from(attempt) * 30);
                debug!(domain = %cert.domain, attempt, "retrying TLS check after {backoff:?}");
                tokio::time::sleep(backoff).await;
            }

            let result = run_tls_probe(&cert.domain, PROBE_TIMEOUT).await;
            if result.success {
                info!(
                    domain = %cert.domain,
                    days_left = result.ssl_days_left.unwrap_or_default(),
                    "certificate check succeeded"
                );
                self.persist_success(&cert, &result).await;
                return;
            }
            last_error = result
                .error
                .unwrap_or_else(|| "TLS check failed".to_string());
            warn!(
                domain = %cert.domain,
                attempt = attempt + 1,
                max = MAX_RETRIES + 1,
                error = %last_error,
                "TLS check failed"
            );
        }

        error!(domain = %cert.domain, error = %last_error, "certificate check exhausted retries");
        self.persist_error(&cert, &last_error).await;
    }

    async fn persist_success(&self, cert: &Certificate, result: &ProbeResult) {
        let days_left = result.ssl_days_left.unwrap_or_default();
        let status = stored_status_for(true, days_left);
        let interval = adjusted_interval_days(cert, cert.check_interval.max(1));
        let next_check = Utc::now() + chrono::Duration::days(interval);

        let body = json!({
            "status": status,
            "valid_from": result.ssl_valid_from.map(|t| t.to_rfc3339()),
            "valid_till": result.ssl_valid_till.map(|t| t.to_rfc3339()),
            "days_left": days_left,
            "valid_days_to_expire": days_left,
            "resolved_ip": result.ssl_resolved_ip.clone().unwrap_or_default(),
            "issuer_cn": result.ssl_issuer.clone().unwrap_or_default(),
            "issued_to": result.ssl_subject.clone().unwrap_or_default(),
            "serial_number": result.ssl_serial_number.clone().unwrap_or_default(),
            "cert_alg": result.ssl_algorithm.clone().unwrap_or_default(),
            "cert_sans": result.ssl_sans.clone().unwrap_or_default(),
            "updated": Utc::now().to_rfc3339(),
            "check_at": next_check.to_rfc3339(),
            "error_message": "",
        });
        if let Err(e) = self.store.update_certificate(&cert.id, &body).await {
            // A failed write means `updated` never advances and the cert is
            // re-checked next tick.
            error!(domain = %cert.domain, error = %e, "failed to persist certificate result");
        }
    }

    async fn persist_error(&self, cert: &Certificate, message: &str) {
        let interval = (cert.check_interval.max(1) / 2).max(1);
        let next_check = Utc::now() + chrono::Duration::days(interval);
        let body = json!({
            "status": "error",
            "error_message": message,
            "updated": Utc::now().to_rfc3339(),
            "check_at": next_check.to_rfc3339(),
        });
        if let Err(e) = self.store.update_certificate(&cert.id, &body).await {
            error!(domain = %cert.domain, error = %e, "failed to persist certificate error");
        }
    }
}

/// Scheduling decision for one certificate.
pub fn should_check(cert: &Certificate, now: DateTime<Utc>) -> bool {
    // Priority 1: an explicit check_at that has come due.
    if !cert.check_at.is_empty() {
        if let Some(check_at) = store_time::parse_optional(&cert.check_at) {
            if now >= check_at {
                return true;
            }
        }
    }

    // Priority 2: never checked.
    if cert.updated.is_empty() {
        return true;
    }
    let Some(last_check) = store_time::parse_optional(&cert.updated) else {
        return true;
    };

    // Priority 3: interval elapsed since the last check.
    let interval = adjusted_interval_days(cert, cert.check_interval.max(1));
    now >= last_check + chrono::Duration::days(interval)
}

pub struct CertNotifier {
    store: Arc<StoreClient>,
    notifier: Arc<Notifier>,
}

impl CertNotifier {
    pub fn new(store: Arc<StoreClient>, notifier: Arc<Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("certificate notifier started (tick: {NOTIFIER_TICK:?})");
        let mut interval = tokio::time::interval(NOTIFIER_TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    info!("certificate notifier stopped");
                    return;
                }
            }
        }
    }

    async fn tick(&self) {
        let certificates = match self.store.list_certificates().await {
            Ok(certificates) => certificates,
            Err(e) => {
                error!(error = %e, "failed to list certificates");
                return;
            }
        };

        for cert in certificates {
            if cert.notification_id.is_empty() {
                continue;
            }
            if let Err(e) = self.check_and_notify(&cert).await {
                warn!(domain = %cert.domain, error = %e, "certificate notification failed");
            }
        }
    }

    async fn check_and_notify(&self, cert: &Certificate) -> anyhow::Result<()> {
        let now = Utc::now();
        let days_left = days_left_from(&cert.valid_till, now);
        let status = notify_status_for(days_left, cert.warning_threshold, cert.expiry_threshold);

        let last_notified = store_time::parse_optional(&cert.last_notified);
        if !should_notify(status, &cert.status, last_notified, now) {
            return Ok(());
        }

        let payload = build_ssl_payload(cert, status, days_left);
        self.notifier
            .notify_ssl(&payload, &cert.notification_id, &cert.template_id)
            .await?;

        // Persist the tracker state so a restart cannot re-announce.
        let body = json!({
            "status": status,
            "last_notified": now.to_rfc3339(),
        });
        if let Err(e) = self.store.update_certificate(&cert.id, &body).await {
            warn!(domain = %cert.domain, error = %e, "failed to persist notification state");
        }
        Ok(())
    }
}

fn build_ssl_payload(cert: &Certificate, status: &str, days_left: i64) -> NotificationPayload {
    let issuer = if !cert.issuer_cn.is_empty() {
        cert.issuer_cn.clone()
    } else if !cert.issuer_o.is_empty() {
        cert.issuer_o.clone()
    } else {
        "Unknown".to_string()
    };

    let mut payload =
        NotificationPayload::new(&format!("SSL Certificate - {}", cert.domain), status);
    payload.host = cert.domain.clone();
    payload.domain = cert.domain.clone();
    payload.service_type = "ssl".to_string();
    payload.certificate_name = cert.domain.clone();
    payload.expiry_date = cert.valid_till.clone();
    payload.days_left = days_left.to_string();
    payload.issuer_cn = issuer;
    payload.serial_number = cert.serial_number.clone();
    payload.message = status_message(cert, status, days_left);
    payload
}

fn status_message(cert: &Certificate, status: &str, days_left: i64) -> String {
    match status {
        "expired" => format!(
            "SSL certificate for {} expired on {}",
            cert.domain, cert.valid_till
        ),
        "expiring_soon" => format!(
            "SSL certificate for {} expires in {} days on {}",
            cert.domain, days_left, cert.valid_till
        ),
        "warning" => format!(
            "SSL certificate for {} expires in {} days",
            cert.domain, days_left
        ),
        _ => format!(
            "SSL certificate for {} is valid ({} days remaining)",
            cert.domain, days_left
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert() -> Certificate {
        Certificate {
            id: "c1".into(),
            domain: "example.com".into(),
            check_interval: 7,
            days_left: 90,
            ..Certificate::default()
        }
    }

    #[test]
    fn stored_status_bands() {
        assert_eq!(stored_status_for(false, 100), "error");
        assert_eq!(stored_status_for(true, 0), "expired");
        assert_eq!(stored_status_for(true, -3), "expired");
        assert_eq!(stored_status_for(true, 5), "critical");
        assert_eq!(stored_status_for(true, 7), "critical");
        assert_eq!(stored_status_for(true, 20), "expiring_soon");
        assert_eq!(stored_status_for(true, 31), "valid");
    }

    #[test]
    fn notify_status_uses_record_thresholds() {
        // scenario: valid_till = now + 5 days, warning 30, expiry 15
        assert_eq!(notify_status_for(5, 30, 15), "expiring_soon");
        assert_eq!(notify_status_for(0, 30, 15), "expired");
        assert_eq!(notify_status_for(20, 30, 15), "warning");
        assert_eq!(notify_status_for(45, 30, 15), "valid");
    }

    #[test]
    fn days_left_recompute_clamps_at_zero() {
        let now = Utc::now();
        let future = (now + chrono::Duration::days(5) + chrono::Duration::hours(1)).to_rfc3339();
        assert_eq!(days_left_from(&future, now), 5);

        let past = (now - chrono::Duration::days(3)).to_rfc3339();
        assert_eq!(days_left_from(&past, now), 0);

        assert_eq!(days_left_from("garbage", now), 0);
    }

    #[test]
    fn interval_tightens_near_expiry() {
        let mut c = cert();
        c.days_left = 5;
        assert_eq!(adjusted_interval_days(&c, 7), 1);

        c.days_left = 20;
        assert_eq!(adjusted_interval_days(&c, 7), 2);
        assert_eq!(adjusted_interval_days(&c, 1), 1);

        c.days_left = 90;
        c.status = "error".into();
        assert_eq!(adjusted_interval_days(&c, 7), 1);

        c.status = "valid".into();
        assert_eq!(adjusted_interval_days(&c, 7), 7);
    }

    #[test]
    fn check_scheduling_priorities() {
        let now = Utc::now();
        let mut c = cert();

        // check_at due
        c.check_at = (now - chrono::Duration::minutes(1)).to_rfc3339();
        assert!(should_check(&c, now));

        // check_at in the future, never updated
        c.check_at = (now + chrono::Duration::days(1)).to_rfc3339();
        c.updated = String::new();
        assert!(should_check(&c, now));

        // recently updated, long interval
        c.updated = (now - chrono::Duration::days(1)).to_rfc3339();
        c.check_interval = 7;
        c.days_left = 90;
        assert!(!should_check(&c, now));

        // interval elapsed
        c.updated = (now - chrono::Duration::days(8)).to_rfc3339();
        assert!(should_check(&c, now));
    }

    #[test]
    fn notify_gating_rules() {
        let now = Utc::now();

        // status change always notifies
        assert!(should_notify("expiring_soon", "valid", None, now));
        assert!(should_notify("valid", "", None, now));

        // unchanged valid never re-notifies
        assert!(!should_notify("valid", "valid", Some(now - chrono::Duration::days(30)), now));

        // critical statuses re-notify after 24h
        let recent = Some(now - chrono::Duration::hours(2));
        let stale = Some(now - chrono::Duration::hours(25));
        assert!(!should_notify("expired", "expired", recent, now));
        assert!(should_notify("expired", "expired", stale, now));
        assert!(should_notify("expiring_soon", "expiring_soon", stale, now));

        // warning re-notifies after 7 days
        let week_old = Some(now - chrono::Duration::days(8));
        assert!(!should_notify("warning", "warning", stale, now));
        assert!(should_notify("warning", "warning", week_old, now));
    }

    #[test]
    fn ssl_payload_prefers_issuer_cn() {
        let mut c = cert();
        c.issuer_cn = "Google Trust Services".into();
        c.issuer_o = "ignored".into();
        let payload = build_ssl_payload(&c, "warning", 12);
        assert_eq!(payload.issuer_cn, "Google Trust Services");
        assert_eq!(payload.days_left, "12");

        c.issuer_cn.clear();
        let payload = build_ssl_payload(&c, "warning", 12);
        assert_eq!(payload.issuer_cn, "ignored");

        c.issuer_o.clear();
        let payload = build_ssl_payload(&c, "warning", 12);
        assert_eq!(payload.issuer_cn, "Unknown");
    }
}
