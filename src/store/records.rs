//! Record types for the external store.
//!
//! The Store is schemaless about numeric fields: depending on how a record
//! was created, `serial_number` may arrive as a string, an integer or a
//! float in scientific notation, `check_interval` as a string or an
//! integer, and boolean flags as real booleans or the strings
//! `"true"`/`"false"`. The deserializers in this module normalize all of
//! that at the edge so the rest of the crate works with plain types.

use serde::{Deserialize, Deserializer};

/// A paged list response from the Store.
#[derive(Debug, Clone, Deserialize)]
pub struct Paged<T> {
    #[serde(default)]
    pub page: u32,
    #[serde(default, rename = "perPage")]
    pub per_page: u32,
    #[serde(default, rename = "totalItems")]
    pub total_items: u32,
    #[serde(default, rename = "totalPages")]
    pub total_pages: u32,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Uptime target registered by a user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub service_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub response_time: i64,
    #[serde(default)]
    pub last_checked: String,
    #[serde(default)]
    pub heartbeat_interval: i64,
    #[serde(default = "default_max_retries", deserialize_with = "lenient_retries")]
    pub max_retries: i64,
    #[serde(default)]
    pub notification_id: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub notification_status: bool,
    #[serde(default)]
    pub alerts: String,
    #[serde(default)]
    pub status_codes: String,
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub region_name: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub uptime: f64,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

impl Service {
    /// Whether the uptime loop may notify for this service at all.
    pub fn notifications_enabled(&self) -> bool {
        self.notification_status && self.alerts != "muted" && !self.notification_id.is_empty()
    }
}

/// A historical probe outcome row from `ping_data` / `dns_data` /
/// `tcp_data` / `uptime_data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_i64_zero")]
    pub response_time: i64,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub created: String,
}

/// TLS certificate record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Certificate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub issuer_o: String,
    #[serde(default)]
    pub issuer_cn: String,
    #[serde(default)]
    pub issued_to: String,
    #[serde(default, deserialize_with = "lenient_serial")]
    pub serial_number: String,
    #[serde(default)]
    pub cert_alg: String,
    #[serde(default)]
    pub cert_sans: String,
    #[serde(default)]
    pub valid_from: String,
    #[serde(default)]
    pub valid_till: String,
    #[serde(default, deserialize_with = "lenient_i64_zero")]
    pub days_left: i64,
    #[serde(default, deserialize_with = "lenient_i64_zero")]
    pub valid_days_to_expire: i64,
    #[serde(default, deserialize_with = "lenient_i64_zero")]
    pub warning_threshold: i64,
    #[serde(default, deserialize_with = "lenient_i64_zero")]
    pub expiry_threshold: i64,
    #[serde(default = "default_check_interval", deserialize_with = "lenient_check_interval")]
    pub check_interval: i64,
    #[serde(default)]
    pub check_at: String,
    #[serde(default)]
    pub last_notified: String,
    #[serde(default)]
    pub resolved_ip: String,
    #[serde(default)]
    pub notification_id: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

/// Monitored host fed by the on-host telemetry agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub os_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub agent_status: String,
    #[serde(default, deserialize_with = "lenient_i64_zero")]
    pub check_interval: i64,
    #[serde(default = "default_max_retries", deserialize_with = "lenient_retries")]
    pub max_retries: i64,
    #[serde(default)]
    pub threshold_id: String,
    #[serde(default)]
    pub notification_id: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub notification_status: bool,
    #[serde(default)]
    pub last_checked: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

/// One agent-produced telemetry sample. Usage fields keep the Store's
/// embedded-percent string form ("7.82 GB (48.9%)").
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostMetric {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub ram_total: String,
    #[serde(default)]
    pub ram_used: String,
    #[serde(default)]
    pub ram_free: String,
    #[serde(default)]
    pub cpu_cores: String,
    #[serde(default)]
    pub cpu_usage: String,
    #[serde(default)]
    pub cpu_free: String,
    #[serde(default)]
    pub disk_total: String,
    #[serde(default)]
    pub disk_used: String,
    #[serde(default)]
    pub disk_free: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub network_rx_bytes: i64,
    #[serde(default)]
    pub network_tx_bytes: i64,
    #[serde(default)]
    pub network_rx_speed: i64,
    #[serde(default)]
    pub network_tx_speed: i64,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

/// Per-host integer percentage thresholds. Stored as strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThresholdTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cpu_threshold: String,
    #[serde(default)]
    pub ram_threshold: String,
    #[serde(default)]
    pub disk_threshold: String,
    #[serde(default)]
    pub network_threshold: String,
    #[serde(default)]
    pub disk_io_threshold: String,
    #[serde(default)]
    pub cpu_temp_threshold: String,
}

/// Channel binding: which channel to notify and the credentials to do it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub notification_type: String,
    #[serde(default)]
    pub notify_name: String,
    #[serde(default)]
    pub enabled: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
    #[serde(default)]
    pub discord_webhook_url: String,
    #[serde(default)]
    pub slack_webhook_url: String,
    #[serde(default)]
    pub google_chat_webhook_url: String,
    #[serde(default)]
    pub signal_number: String,
    #[serde(default)]
    pub signal_api_endpoint: String,
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub email_sender_name: String,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default)]
    pub smtp_port: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_payload_template: String,
    #[serde(default)]
    pub ntfy_endpoint: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub user_key: String,
    #[serde(default)]
    pub channel_id: String,
}

impl AlertConfig {
    /// Lenient reading of the stored `enabled` flag.
    pub fn is_enabled(&self) -> bool {
        parse_lenient_bool_str(&self.enabled)
    }
}

/// Message template for uptime services.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub up_message: String,
    #[serde(default)]
    pub down_message: String,
    #[serde(default)]
    pub maintenance_message: String,
    #[serde(default)]
    pub incident_message: String,
    #[serde(default)]
    pub resolved_message: String,
    #[serde(default)]
    pub warning_message: String,
}

/// Message template for hosts: status variants plus per-resource alert and
/// restore variants.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub up_message: String,
    #[serde(default)]
    pub down_message: String,
    #[serde(default)]
    pub warning_message: String,
    #[serde(default)]
    pub paused_message: String,
    #[serde(default)]
    pub cpu_message: String,
    #[serde(default)]
    pub ram_message: String,
    #[serde(default)]
    pub disk_message: String,
    #[serde(default)]
    pub network_message: String,
    #[serde(default)]
    pub cpu_temp_message: String,
    #[serde(default)]
    pub disk_io_message: String,
    #[serde(default)]
    pub restore_cpu_message: String,
    #[serde(default)]
    pub restore_ram_message: String,
    #[serde(default)]
    pub restore_disk_message: String,
    #[serde(default)]
    pub restore_network_message: String,
    #[serde(default)]
    pub restore_cpu_temp_message: String,
    #[serde(default)]
    pub restore_disk_io_message: String,
}

/// Message template for certificates. The Store spells the expiring-soon
/// field `exiring_soon`; the rename preserves the wire contract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub expired: String,
    #[serde(default, rename = "exiring_soon")]
    pub expiring_soon: String,
    #[serde(default)]
    pub warning: String,
}

fn default_max_retries() -> i64 {
    3
}

fn default_check_interval() -> i64 {
    1440
}

pub(crate) fn parse_lenient_bool_str(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Accepts a JSON bool or a string form.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
        Num(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Str(s) => parse_lenient_bool_str(&s),
        Raw::Num(n) => n != 0,
    })
}

/// `max_retries` arrives as string or integer; anything unusable means the
/// default of 3.
fn lenient_retries<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Str(String),
        Other(serde_json::Value),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Float(f) => f as i64,
        Raw::Str(s) => s.trim().parse().unwrap_or(default_max_retries()),
        Raw::Other(_) => default_max_retries(),
    })
}

/// Like [`lenient_i64`] but invalid values collapse to zero.
fn lenient_i64_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Str(String),
        Other(serde_json::Value),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Float(f) => f as i64,
        Raw::Str(s) => s.trim().parse().unwrap_or(0),
        Raw::Other(_) => 0,
    })
}

/// `check_interval` arrives as string or integer; anything unusable means
/// the default of 1440 minutes.
fn lenient_check_interval<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Str(String),
        Other(serde_json::Value),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Float(f) => f as i64,
        Raw::Str(s) if s.trim().is_empty() => default_check_interval(),
        Raw::Str(s) => s.trim().parse().unwrap_or(default_check_interval()),
        Raw::Other(_) => default_check_interval(),
    })
}

/// `serial_number` arrives as string, integer, or float (scientific
/// notation); everything normalizes to a decimal string.
fn lenient_serial<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
        Other(serde_json::Value),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => format!("{f:.0}"),
        Raw::Other(_) => String::new(),
    })
}
