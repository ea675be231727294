//! Template selection and `${placeholder}` substitution.
//!
//! Three template kinds exist (service, server, ssl); a variant is picked
//! by (status, optional resource) and the selected text is rendered against
//! the payload. Empty template fields fall back to built-in defaults so a
//! half-filled template never produces an empty notification.

use crate::store::{ServerTemplate, ServiceTemplate, SslTemplate};

use super::NotificationPayload;

/// Pick the service-template variant for a status. Unknown statuses fall
/// back to the warning variant.
pub fn select_service_message<'a>(
    template: &'a ServiceTemplate,
    status: &str,
) -> &'a str {
    match status.to_ascii_lowercase().as_str() {
        "up" => &template.up_message,
        "down" => &template.down_message,
        "maintenance" => &template.maintenance_message,
        "incident" => &template.incident_message,
        "resolved" => &template.resolved_message,
        "warning" => &template.warning_message,
        _ => &template.warning_message,
    }
}

/// Pick the server-template variant: status first for the four plain
/// statuses, otherwise by resource. A recovery (status "up" in the resource
/// path, or any status containing "restore") selects the restore variant.
pub fn select_server_message<'a>(
    template: &'a ServerTemplate,
    status: &str,
    resource: Option<&str>,
) -> &'a str {
    let status_lower = status.to_ascii_lowercase();

    if let Some(resource) = resource {
        let restore = status_lower == "up" || status_lower.contains("restore");
        return match (resource.to_ascii_lowercase().as_str(), restore) {
            ("cpu", false) => &template.cpu_message,
            ("cpu", true) => &template.restore_cpu_message,
            ("ram" | "memory", false) => &template.ram_message,
            ("ram" | "memory", true) => &template.restore_ram_message,
            ("disk", false) => &template.disk_message,
            ("disk", true) => &template.restore_disk_message,
            ("network", false) => &template.network_message,
            ("network", true) => &template.restore_network_message,
            ("cpu_temp" | "cpu_temperature", false) => &template.cpu_temp_message,
            ("cpu_temp" | "cpu_temperature", true) => &template.restore_cpu_temp_message,
            ("disk_io", false) => &template.disk_io_message,
            ("disk_io", true) => &template.restore_disk_io_message,
            (_, true) => &template.up_message,
            (_, false) => &template.warning_message,
        };
    }

    match status_lower.as_str() {
        "up" => &template.up_message,
        "down" => &template.down_message,
        "warning" => &template.warning_message,
        "paused" => &template.paused_message,
        _ => &template.warning_message,
    }
}

/// Pick the ssl-template variant for a status.
pub fn select_ssl_message<'a>(template: &'a SslTemplate, status: &str) -> &'a str {
    match status.to_ascii_lowercase().as_str() {
        "expired" => &template.expired,
        "expiring_soon" => &template.expiring_soon,
        "warning" => &template.warning,
        _ => &template.warning,
    }
}

/// Render a service notification: template variant if present and
/// non-empty, else the built-in default, then substitution.
pub fn render_service(
    template: Option<&ServiceTemplate>,
    payload: &NotificationPayload,
) -> String {
    let base = template
        .map(|t| select_service_message(t, &payload.status))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_service_message(payload));
    substitute(&base, payload)
}

/// Render a server (host) notification, optionally resource-scoped.
pub fn render_server(
    template: Option<&ServerTemplate>,
    payload: &NotificationPayload,
    resource: Option<&str>,
) -> String {
    let base = template
        .map(|t| select_server_message(t, &payload.status, resource))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match resource {
            Some(resource) => default_resource_message(payload, resource),
            None => default_server_message(payload),
        });
    substitute(&base, payload)
}

/// Render an ssl notification.
pub fn render_ssl(template: Option<&SslTemplate>, payload: &NotificationPayload) -> String {
    let base = template
        .map(|t| select_ssl_message(t, &payload.status))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_ssl_message(payload));
    substitute(&base, payload)
}

fn safe(value: &str) -> String {
    if value.is_empty() {
        "N/A".to_string()
    } else {
        value.to_string()
    }
}

/// Replace every recognized `${name}` token. Unknown tokens are left
/// intact; the recognized universe is fixed, so substitution is idempotent.
pub fn substitute(message: &str, p: &NotificationPayload) -> String {
    let mut m = message.to_string();

    m = m.replace("${service_name}", &p.service_name);
    m = m.replace("${server_name}", &p.service_name);
    m = m.replace("${status}", &p.status.to_uppercase());
    m = m.replace("${host}", &safe(&p.host));
    m = m.replace("${ip}", &safe(&p.host));
    m = m.replace("${ip_address}", &safe(&p.host));
    m = m.replace("${hostname}", &safe(&p.hostname));

    // ${url} falls back to the host when unset.
    let url = if p.url.is_empty() && !p.host.is_empty() {
        p.host.clone()
    } else {
        safe(&p.url)
    };
    m = m.replace("${url}", &url);
    m = m.replace("${domain}", &safe(&p.domain));

    let service_type = if p.service_type.is_empty() {
        "N/A".to_string()
    } else {
        p.service_type.to_uppercase()
    };
    m = m.replace("${service_type}", &service_type);
    m = m.replace("${region_name}", &safe(&p.region_name));
    m = m.replace("${agent_id}", &safe(&p.agent_id));

    let port = if p.port > 0 {
        p.port.to_string()
    } else {
        "N/A".to_string()
    };
    m = m.replace("${port}", &port);

    let response_time = if p.response_time > 0 {
        format!("{}ms", p.response_time)
    } else {
        "N/A".to_string()
    };
    m = m.replace("${response_time}", &response_time);

    let uptime = if p.uptime > 0 {
        format!("{}%", p.uptime)
    } else {
        "N/A".to_string()
    };
    m = m.replace("${uptime}", &uptime);

    m = m.replace("${cpu_usage}", &safe(&p.cpu_usage));
    m = m.replace("${ram_usage}", &safe(&p.ram_usage));
    m = m.replace("${disk_usage}", &safe(&p.disk_usage));
    m = m.replace("${network_usage}", &safe(&p.network_usage));
    m = m.replace("${cpu_temp}", &safe(&p.cpu_temp));
    m = m.replace("${disk_io}", &safe(&p.disk_io));
    m = m.replace("${threshold}", &safe(&p.threshold));

    m = m.replace("${certificate_name}", &safe(&p.certificate_name));
    m = m.replace("${expiry_date}", &safe(&p.expiry_date));
    m = m.replace("${days_left}", &safe(&p.days_left));
    m = m.replace("${issuer_cn}", &safe(&p.issuer_cn));
    m = m.replace("${issuer}", &safe(&p.issuer_cn));
    m = m.replace("${serial_number}", &safe(&p.serial_number));

    m = m.replace("${error}", &safe(&p.error_message));
    m = m.replace("${error_message}", &safe(&p.error_message));
    m = m.replace("${message}", &safe(&p.message));

    m = m.replace(
        "${timestamp}",
        &p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    m = m.replace("${time}", &p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string());
    m = m.replace("${date}", &p.timestamp.format("%Y-%m-%d").to_string());

    m
}

pub fn status_emoji(status: &str) -> &'static str {
    match status.to_ascii_lowercase().as_str() {
        "up" => "🟢",
        "down" => "🔴",
        "warning" => "🟡",
        "maintenance" | "paused" => "🟠",
        _ => "🔵",
    }
}

fn default_service_message(p: &NotificationPayload) -> String {
    let emoji = status_emoji(&p.status);
    let mut message = format!(
        "{emoji} Service {} is {}.",
        p.service_name,
        p.status.to_uppercase()
    );

    let mut details = Vec::new();
    if !p.url.is_empty() {
        details.push(format!(" - Host URL: {}", p.url));
    } else if !p.host.is_empty() {
        details.push(format!(" - Host: {}", p.host));
    }
    if !p.service_type.is_empty() {
        details.push(format!(" - Type: {}", p.service_type.to_uppercase()));
    }
    if p.port > 0 {
        details.push(format!(" - Port: {}", p.port));
    }
    if !p.domain.is_empty() {
        details.push(format!(" - Domain: {}", p.domain));
    }
    if p.response_time > 0 {
        details.push(format!(" - Response time: {}ms", p.response_time));
    } else {
        details.push(" - Response time: N/A".to_string());
    }
    if !p.region_name.is_empty() {
        details.push(format!(" - Region: {}", p.region_name));
    }
    if !p.agent_id.is_empty() {
        details.push(format!(" - Agent: {}", p.agent_id));
    }
    if p.uptime > 0 {
        details.push(format!(" - Uptime: {}%", p.uptime));
    }
    details.push(format!(
        " - Time: {}",
        p.timestamp.format("%Y-%m-%d %H:%M:%S")
    ));

    message.push('\n');
    message.push_str(&details.join("\n"));
    message
}

fn default_server_message(p: &NotificationPayload) -> String {
    // Hosts only use the three live statuses; everything else is neutral.
    let emoji = match p.status.to_ascii_lowercase().as_str() {
        "up" => "🟢",
        "down" => "🔴",
        "warning" => "🟡",
        _ => "🔵",
    };
    format!(
        "{emoji}🖥️ Server {} ({}) status: {}",
        p.service_name,
        p.hostname,
        p.status.to_uppercase()
    )
}

fn default_resource_message(p: &NotificationPayload, resource: &str) -> String {
    let recovered = p.status.eq_ignore_ascii_case("up");
    let (emoji, label) = if recovered {
        ("✅", "Recovery")
    } else {
        ("⚠️", "Alert")
    };
    let (resource_name, value) = match resource.to_ascii_lowercase().as_str() {
        "cpu" => ("CPU", &p.cpu_usage),
        "ram" | "memory" => ("RAM", &p.ram_usage),
        "disk" => ("Disk", &p.disk_usage),
        "network" => ("Network", &p.network_usage),
        "cpu_temp" | "cpu_temperature" => ("CPU Temperature", &p.cpu_temp),
        "disk_io" => ("Disk I/O", &p.disk_io),
        _ => ("Resource", &p.message),
    };
    if recovered {
        format!(
            "{emoji} {resource_name} {label}: Server {} {resource_name} usage has returned to normal: {value}",
            p.service_name
        )
    } else {
        format!(
            "{emoji} {resource_name} {label}: Server {} {resource_name} usage is {value}",
            p.service_name
        )
    }
}

fn default_ssl_message(p: &NotificationPayload) -> String {
    let emoji = match p.status.to_ascii_lowercase().as_str() {
        "expired" => "🚨",
        "expiring_soon" => "⚠️",
        "warning" => "🔔",
        _ => "🔒",
    };
    let mut message = format!(
        "{emoji} SSL certificate for {} has {}",
        p.domain,
        p.status.to_uppercase()
    );
    if !p.certificate_name.is_empty() && p.certificate_name != p.domain {
        message.push_str(&format!("\n • Certs Name: {}", p.certificate_name));
    }
    if !p.expiry_date.is_empty() {
        message.push_str(&format!("\n • Expiry Date: {}", p.expiry_date));
    }
    if !p.days_left.is_empty() {
        message.push_str(&format!("\n • Days Left: {}", p.days_left));
    }
    if !p.issuer_cn.is_empty() {
        message.push_str(&format!("\n • Issuer: {}", p.issuer_cn));
    }
    message.push_str(&format!(
        "\n • Time: {}",
        p.timestamp.format("%Y-%m-%d %H:%M:%S")
    ));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload() -> NotificationPayload {
        let mut p = NotificationPayload::new("web-frontend", "down");
        p.host = "10.0.0.5".into();
        p.service_type = "http".into();
        p.response_time = 132;
        p.error_message = "connection refused".into();
        p.timestamp = chrono::Utc.with_ymd_and_hms(2025, 8, 11, 13, 9, 13).unwrap();
        p
    }

    #[test]
    fn substitutes_known_placeholders() {
        let rendered = substitute(
            "${service_name} is ${status} (${error_message}) at ${time}",
            &payload(),
        );
        assert_eq!(
            rendered,
            "web-frontend is DOWN (connection refused) at 2025-08-11 13:09:13"
        );
    }

    #[test]
    fn leaves_unknown_placeholders_intact() {
        let rendered = substitute("${service_name} ${mystery_token}", &payload());
        assert_eq!(rendered, "web-frontend ${mystery_token}");
    }

    #[test]
    fn substitution_is_idempotent() {
        let first = substitute("${service_name}: ${status} ${response_time}", &payload());
        let second = substitute(&first, &payload());
        assert_eq!(first, second);
    }

    #[test]
    fn empty_and_sentinel_fields_render_na() {
        let mut p = payload();
        p.response_time = 0;
        p.port = 0;
        let rendered = substitute("rt=${response_time} port=${port} dom=${domain}", &p);
        assert_eq!(rendered, "rt=N/A port=N/A dom=N/A");
    }

    #[test]
    fn url_falls_back_to_host() {
        let p = payload();
        assert_eq!(substitute("${url}", &p), "10.0.0.5");
    }

    #[test]
    fn status_and_type_render_uppercase() {
        let rendered = substitute("${status}/${service_type}", &payload());
        assert_eq!(rendered, "DOWN/HTTP");
    }

    #[test]
    fn service_selection_matrix() {
        let template = ServiceTemplate {
            up_message: "u".into(),
            down_message: "d".into(),
            maintenance_message: "m".into(),
            incident_message: "i".into(),
            resolved_message: "r".into(),
            warning_message: "w".into(),
            ..ServiceTemplate::default()
        };
        assert_eq!(select_service_message(&template, "up"), "u");
        assert_eq!(select_service_message(&template, "DOWN"), "d");
        assert_eq!(select_service_message(&template, "incident"), "i");
        assert_eq!(select_service_message(&template, "unknown"), "w");
    }

    #[test]
    fn server_selection_prefers_status_then_resource() {
        let template = ServerTemplate {
            down_message: "down".into(),
            cpu_message: "cpu alert".into(),
            restore_cpu_message: "cpu restore".into(),
            warning_message: "warn".into(),
            ..ServerTemplate::default()
        };
        assert_eq!(select_server_message(&template, "down", None), "down");
        assert_eq!(
            select_server_message(&template, "warning", Some("cpu")),
            "cpu alert"
        );
        assert_eq!(
            select_server_message(&template, "up", Some("cpu")),
            "cpu restore"
        );
        assert_eq!(
            select_server_message(&template, "restored", Some("cpu")),
            "cpu restore"
        );
        assert_eq!(select_server_message(&template, "odd", None), "warn");
    }

    #[test]
    fn paused_server_default_matches_expected_shape() {
        let mut p = NotificationPayload::new("db-01", "paused");
        p.hostname = "db-01.internal".into();
        let rendered = render_server(Some(&ServerTemplate::default()), &p, None);
        assert_eq!(rendered, "🔵🖥️ Server db-01 (db-01.internal) status: PAUSED");
    }

    #[test]
    fn ssl_render_uses_template_then_default() {
        let template = SslTemplate {
            expired: "cert ${domain} dead".into(),
            ..SslTemplate::default()
        };
        let mut p = NotificationPayload::new("SSL Certificate - example.com", "expired");
        p.domain = "example.com".into();
        assert_eq!(render_ssl(Some(&template), &p), "cert example.com dead");

        // empty variant falls through to the built-in default
        p.status = "warning".into();
        p.days_left = "12".into();
        let rendered = render_ssl(Some(&template), &p);
        assert!(rendered.starts_with("🔔 SSL certificate for example.com has WARNING"));
        assert!(rendered.contains("Days Left: 12"));
    }
}
