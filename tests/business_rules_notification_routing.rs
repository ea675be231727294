//! Business Rule Tests: notification gating and template rendering
//!
//! Covers the entity-side gates (muted, disabled, missing binding), the
//! comma-separated binding parsing behind partial-success fan-out, and the
//! renderer's selection/substitution contract.

use chrono::TimeZone;
use opswatch::notify::router::parse_notification_ids;
use opswatch::notify::template::{
    render_server, render_service, render_ssl, select_server_message, substitute,
};
use opswatch::notify::NotificationPayload;
use opswatch::store::{ServerTemplate, Service, ServiceTemplate, SslTemplate};

fn service_payload() -> NotificationPayload {
    let mut payload = NotificationPayload::new("web-frontend", "down");
    payload.host = "203.0.113.7".into();
    payload.service_type = "http".into();
    payload.error_message = "connection refused".into();
    payload.timestamp = chrono::Utc.with_ymd_and_hms(2025, 8, 11, 13, 9, 13).unwrap();
    payload
}

#[test]
fn muted_disabled_or_unbound_services_never_notify() {
    let mut service = Service::default();
    service.notification_status = true;
    service.notification_id = "binding-1".into();
    assert!(service.notifications_enabled());

    let mut muted = service.clone();
    muted.alerts = "muted".into();
    assert!(!muted.notifications_enabled());

    let mut disabled = service.clone();
    disabled.notification_status = false;
    assert!(!disabled.notifications_enabled());

    let mut unbound = service;
    unbound.notification_id = String::new();
    assert!(!unbound.notifications_enabled());
}

#[test]
fn comma_separated_bindings_are_independent() {
    let ids = parse_notification_ids("telegram-binding , slack-binding");
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], "telegram-binding");
    assert_eq!(ids[1], "slack-binding");

    // Empty list means the router has nothing to do and must error.
    assert!(parse_notification_ids("").is_empty());
    assert!(parse_notification_ids(" ,, ").is_empty());
}

#[test]
fn down_notification_renders_status_and_error() {
    let template = ServiceTemplate {
        down_message: "${service_name} is ${status}: ${error_message}".into(),
        ..ServiceTemplate::default()
    };
    let rendered = render_service(Some(&template), &service_payload());
    assert_eq!(rendered, "web-frontend is DOWN: connection refused");
}

#[test]
fn empty_template_variant_falls_back_to_default() {
    // Server template with an empty paused_message: the built-in default
    // applies, fully substituted.
    let mut payload = NotificationPayload::new("db-01", "paused");
    payload.hostname = "db-01.internal".into();
    let rendered = render_server(Some(&ServerTemplate::default()), &payload, None);
    assert_eq!(rendered, "🔵🖥️ Server db-01 (db-01.internal) status: PAUSED");
}

#[test]
fn restore_variant_selected_for_recoveries() {
    let template = ServerTemplate {
        cpu_message: "cpu high on ${server_name}".into(),
        restore_cpu_message: "cpu normal again on ${server_name}".into(),
        ..ServerTemplate::default()
    };
    assert_eq!(
        select_server_message(&template, "warning", Some("cpu")),
        "cpu high on ${server_name}"
    );
    assert_eq!(
        select_server_message(&template, "up", Some("cpu")),
        "cpu normal again on ${server_name}"
    );

    let mut payload = NotificationPayload::new("db-01", "up");
    payload.cpu_usage = "42.00%".into();
    let rendered = render_server(Some(&template), &payload, Some("cpu"));
    assert_eq!(rendered, "cpu normal again on db-01");
}

#[test]
fn ssl_template_substitutes_certificate_fields() {
    let template = SslTemplate {
        expiring_soon: "${domain} expires in ${days_left} days (issuer ${issuer_cn})".into(),
        ..SslTemplate::default()
    };
    let mut payload = NotificationPayload::new("SSL Certificate - example.com", "expiring_soon");
    payload.domain = "example.com".into();
    payload.days_left = "5".into();
    payload.issuer_cn = "Google Trust Services".into();
    let rendered = render_ssl(Some(&template), &payload);
    assert_eq!(
        rendered,
        "example.com expires in 5 days (issuer Google Trust Services)"
    );
}

#[test]
fn substitution_is_idempotent_on_rendered_output() {
    let template = "${service_name} ${status} ${response_time} ${port} ${unknown_token}";
    let payload = service_payload();
    let once = substitute(template, &payload);
    let twice = substitute(&once, &payload);
    assert_eq!(once, twice);
    // unknown tokens survive untouched
    assert!(once.contains("${unknown_token}"));
}

#[test]
fn renderer_upper_cases_status_everywhere() {
    let payload = service_payload();
    assert!(substitute("${status}", &payload).contains("DOWN"));
    let rendered = render_service(None, &payload);
    assert!(rendered.contains("DOWN"));
}
