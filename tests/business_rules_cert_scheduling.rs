//! Business Rule Tests: certificate scheduling and notification gating
//!
//! The scheduler and the notifier deliberately derive status differently:
//! the scheduler persists probe urgency from fixed day bands, while the
//! notifier alerts from the record's own warning/expiry thresholds. These
//! tests pin both derivations and the scheduling/resend rules connecting
//! them.

use chrono::{Duration, Utc};
use opswatch::monitor::cert::{
    adjusted_interval_days, days_left_from, notify_status_for, should_check, should_notify,
    stored_status_for,
};
use opswatch::store::Certificate;

fn cert_with(days_left: i64, interval: i64) -> Certificate {
    Certificate {
        id: "cert".into(),
        domain: "example.com".into(),
        days_left,
        check_interval: interval,
        ..Certificate::default()
    }
}

#[test]
fn certificate_expiring_in_five_days_scenario() {
    // valid_till = now + 5 days, warning_threshold = 30, expiry_threshold = 15.
    let now = Utc::now();
    let valid_till = (now + Duration::days(5) + Duration::hours(2)).to_rfc3339();

    let days_left = days_left_from(&valid_till, now);
    assert_eq!(days_left, 5);

    // Notification status comes from the record thresholds.
    assert_eq!(notify_status_for(days_left, 30, 15), "expiring_soon");

    // Stored status comes from the fixed bands: five days is critical.
    assert_eq!(stored_status_for(true, days_left), "critical");
}

#[test]
fn healthy_certificate_never_notifies() {
    // days_left above both thresholds with status already valid: silent
    // regardless of how many ticks elapse.
    let now = Utc::now();
    let status = notify_status_for(90, 30, 15);
    assert_eq!(status, "valid");
    for hours in [1, 24, 24 * 7, 24 * 30] {
        assert!(!should_notify(
            status,
            "valid",
            Some(now - Duration::hours(hours)),
            now
        ));
    }
}

#[test]
fn status_change_always_notifies() {
    let now = Utc::now();
    assert!(should_notify("expiring_soon", "valid", None, now));
    assert!(should_notify("expired", "expiring_soon", Some(now), now));
    // first sighting counts as a change
    assert!(should_notify("warning", "", None, now));
}

#[test]
fn critical_statuses_remind_daily_warnings_weekly() {
    let now = Utc::now();
    let h23 = Some(now - Duration::hours(23));
    let h25 = Some(now - Duration::hours(25));
    let d6 = Some(now - Duration::days(6));
    let d8 = Some(now - Duration::days(8));

    assert!(!should_notify("expired", "expired", h23, now));
    assert!(should_notify("expired", "expired", h25, now));
    assert!(!should_notify("expiring_soon", "expiring_soon", h23, now));
    assert!(should_notify("expiring_soon", "expiring_soon", h25, now));

    assert!(!should_notify("warning", "warning", d6, now));
    assert!(should_notify("warning", "warning", d8, now));
}

#[test]
fn adjusted_interval_table() {
    // days_left <= 7 checks daily
    assert_eq!(adjusted_interval_days(&cert_with(3, 14), 14), 1);
    // days_left <= 30 caps at two days
    assert_eq!(adjusted_interval_days(&cert_with(14, 14), 14), 2);
    assert_eq!(adjusted_interval_days(&cert_with(14, 1), 1), 1);
    // error status checks daily
    let mut errored = cert_with(200, 14);
    errored.status = "error".into();
    assert_eq!(adjusted_interval_days(&errored, 14), 1);
    // otherwise the stored interval applies
    assert_eq!(adjusted_interval_days(&cert_with(200, 14), 14), 14);
    // zero/negative stored intervals fall back to one day
    assert_eq!(adjusted_interval_days(&cert_with(200, 0), 0), 1);
}

#[test]
fn check_at_takes_priority_over_interval() {
    let now = Utc::now();
    let mut cert = cert_with(200, 30);
    cert.updated = (now - Duration::hours(1)).to_rfc3339();

    // Interval says wait, but an elapsed check_at forces the check.
    cert.check_at = (now - Duration::minutes(5)).to_rfc3339();
    assert!(should_check(&cert, now));

    // A future check_at alone does not suppress the interval rule.
    cert.check_at = (now + Duration::days(2)).to_rfc3339();
    assert!(!should_check(&cert, now));
    cert.updated = (now - Duration::days(31)).to_rfc3339();
    assert!(should_check(&cert, now));
}

#[test]
fn never_checked_certificates_are_due() {
    let now = Utc::now();
    let mut cert = cert_with(200, 30);
    cert.updated = String::new();
    assert!(should_check(&cert, now));

    // Unparseable update timestamps are treated as never checked.
    cert.updated = "not a timestamp".into();
    assert!(should_check(&cert, now));
}

#[test]
fn expired_certificates_report_zero_days() {
    let now = Utc::now();
    let past = (now - Duration::days(10)).to_rfc3339();
    assert_eq!(days_left_from(&past, now), 0);
    assert_eq!(notify_status_for(0, 30, 15), "expired");
    assert_eq!(stored_status_for(true, 0), "expired");
}

#[test]
fn stored_status_error_band() {
    assert_eq!(stored_status_for(false, 90), "error");
    assert_eq!(stored_status_for(true, 8), "expiring_soon");
    assert_eq!(stored_status_for(true, 30), "expiring_soon");
    assert_eq!(stored_status_for(true, 365), "valid");
}
