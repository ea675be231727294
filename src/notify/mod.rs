//! Notification stack: channel-agnostic payload, template rendering,
//! channel drivers, and the fan-out router.

pub mod channels;
pub mod router;
pub mod template;

pub use router::Notifier;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The channel-agnostic payload every notification is rendered from.
/// Fields are a union across the three entity kinds; empty strings and
/// zero numerics render as "N/A".
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub service_name: String,
    pub status: String,
    pub host: String,
    pub hostname: String,
    pub port: i64,
    pub service_type: String,
    pub response_time: i64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub error_message: String,

    // service fields
    pub url: String,
    pub domain: String,
    pub region_name: String,
    pub agent_id: String,
    pub uptime: i64,

    // host fields
    pub cpu_usage: String,
    pub ram_usage: String,
    pub disk_usage: String,
    pub network_usage: String,
    pub cpu_temp: String,
    pub disk_io: String,
    pub threshold: String,

    // certificate fields
    pub certificate_name: String,
    pub expiry_date: String,
    pub days_left: String,
    pub issuer_cn: String,
    pub serial_number: String,
}

impl NotificationPayload {
    pub fn new(service_name: &str, status: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            status: status.to_string(),
            host: String::new(),
            hostname: String::new(),
            port: 0,
            service_type: String::new(),
            response_time: 0,
            timestamp: Utc::now(),
            message: String::new(),
            error_message: String::new(),
            url: String::new(),
            domain: String::new(),
            region_name: String::new(),
            agent_id: String::new(),
            uptime: 0,
            cpu_usage: String::new(),
            ram_usage: String::new(),
            disk_usage: String::new(),
            network_usage: String::new(),
            cpu_temp: String::new(),
            disk_io: String::new(),
            threshold: String::new(),
            certificate_name: String::new(),
            expiry_date: String::new(),
            days_left: String::new(),
            issuer_cn: String::new(),
            serial_number: String::new(),
        }
    }
}
