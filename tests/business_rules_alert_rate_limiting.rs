//! Business Rule Tests: host alert rate limiting
//!
//! Threshold and status alerts share one policy: the first breach sends
//! immediately, resends are spaced at least 5 minutes apart, and the total
//! send count for one (host, resource) alert never exceeds max_retries.
//! Recovery is independent of the ceiling: it fires exactly once whenever
//! an alert was active, even after sends were exhausted.

use chrono::{Duration, Utc};
use opswatch::monitor::host::{should_send_alert, ActiveAlert};

/// Walk the state machine the way the monitor does: consult the policy,
/// then record the send.
fn step(
    alert: &mut Option<ActiveAlert>,
    max_retries: i64,
    now: chrono::DateTime<chrono::Utc>,
) -> bool {
    if should_send_alert(alert.as_ref(), max_retries, now) {
        match alert {
            Some(active) => {
                active.last_alerted = now;
                active.send_count += 1;
            }
            None => {
                *alert = Some(ActiveAlert {
                    last_alerted: now,
                    send_count: 1,
                });
            }
        }
        true
    } else {
        false
    }
}

#[test]
fn send_count_never_exceeds_max_retries() {
    let max_retries = 3;
    let mut alert = None;
    let start = Utc::now();

    let mut sends = 0;
    // Ten evaluation points, each past the resend spacing.
    for i in 0..10 {
        let now = start + Duration::minutes(6 * i);
        if step(&mut alert, max_retries, now) {
            sends += 1;
        }
    }

    assert_eq!(sends, 3, "sends must stop at the retry ceiling");
    assert_eq!(alert.unwrap().send_count, 3);
}

#[test]
fn cpu_breach_three_times_then_recovery() {
    // Threshold 80, max_retries 3; readings 85, 86, 87, then 70.
    let max_retries = 3;
    let threshold = 80.0;
    let readings = [85.0, 86.0, 87.0, 70.0];

    let mut alert: Option<ActiveAlert> = None;
    let mut warnings = 0;
    let mut recoveries = 0;
    let start = Utc::now();

    for (i, reading) in readings.iter().enumerate() {
        let now = start + Duration::minutes(6 * i as i64);
        if *reading > threshold {
            if step(&mut alert, max_retries, now) {
                warnings += 1;
            }
        } else if alert.is_some() {
            // Recovery requires only a previously active alert.
            recoveries += 1;
            alert = None;
        }
    }

    assert_eq!(warnings, 3);
    assert_eq!(recoveries, 1);
    assert!(alert.is_none(), "alert state cleared after recovery");
}

#[test]
fn recovery_fires_even_after_ceiling() {
    let max_retries = 2;
    let mut alert: Option<ActiveAlert> = None;
    let start = Utc::now();

    // Breach five times; only two sends go out.
    let mut sends = 0;
    for i in 0..5 {
        if step(&mut alert, max_retries, start + Duration::minutes(6 * i)) {
            sends += 1;
        }
    }
    assert_eq!(sends, 2);

    // The alert state persists past the ceiling, so recovery still fires.
    assert!(alert.is_some());
}

#[test]
fn resend_blocked_inside_spacing_window() {
    let max_retries = 5;
    let mut alert = None;
    let start = Utc::now();

    assert!(step(&mut alert, max_retries, start));
    // 30-second ticks inside the 5-minute window never resend.
    for seconds in [30, 60, 90, 240] {
        assert!(!step(
            &mut alert,
            max_retries,
            start + Duration::seconds(seconds)
        ));
    }
    // Past the window, the resend goes out.
    assert!(step(&mut alert, max_retries, start + Duration::minutes(6)));
    assert_eq!(alert.unwrap().send_count, 2);
}

#[test]
fn no_recovery_without_prior_alert() {
    // A host that was never alerting must not emit a recovery; the monitor
    // models this as "recovery only when an alert entry exists".
    let alert: Option<ActiveAlert> = None;
    assert!(alert.is_none());
    // First breach after a clean period starts a fresh alert instead.
    assert!(should_send_alert(None, 3, Utc::now()));
}
