//! Probe primitives: one-shot health observations over heterogeneous
//! protocols, all returning the uniform [`ProbeResult`].

mod dns;
mod http;
mod ping;
mod tcp;
mod tls;

pub use dns::run_dns_probe;
pub use http::run_http_probe;
pub use ping::run_ping_probe;
pub use tcp::run_tcp_probe;
pub use tls::{normalize_domain, run_tls_probe};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Probe failure kinds. Timeouts are distinguished because the certificate
/// retry policy treats them as retryable.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Supported probe protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Ping,
    Tcp,
    Dns,
    Http,
    Ssl,
}

impl ProbeKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ping" | "icmp" => Some(Self::Ping),
            "tcp" => Some(Self::Tcp),
            "dns" => Some(Self::Dns),
            "http" | "https" => Some(Self::Http),
            "ssl" | "tls" => Some(Self::Ssl),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ping => "ping",
            Self::Tcp => "tcp",
            Self::Dns => "dns",
            Self::Http => "http",
            Self::Ssl => "ssl",
        };
        f.write_str(name)
    }
}

/// Uniform probe outcome. Protocol-specific fields are optional and only
/// serialized when present.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    #[serde(rename = "type")]
    pub kind: ProbeKind,
    pub host: String,
    pub success: bool,
    /// Wall-clock time of the whole observation, in milliseconds.
    pub response_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,

    // ping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_sent: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_received: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rtt_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rtt_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rtt_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtts_ms: Option<Vec<f64>>,

    // dns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_count: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_ips: Option<Vec<String>>,

    // http
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    // tls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_sans: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_valid_till: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_days_left: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_resolved_ip: Option<String>,
}

impl ProbeResult {
    pub fn new(kind: ProbeKind, host: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            host: host.to_string(),
            success: false,
            response_time_ms: 0,
            error: None,
            started_at,
            ended_at: started_at,
            packets_sent: None,
            packets_received: None,
            packet_loss_percent: None,
            min_rtt_ms: None,
            avg_rtt_ms: None,
            max_rtt_ms: None,
            rtts_ms: None,
            query_type: None,
            answers: None,
            authority_count: None,
            message_size: None,
            resolved_ips: None,
            status_code: None,
            ssl_issuer: None,
            ssl_subject: None,
            ssl_serial_number: None,
            ssl_algorithm: None,
            ssl_sans: None,
            ssl_valid_from: None,
            ssl_valid_till: None,
            ssl_days_left: None,
            ssl_resolved_ip: None,
        }
    }

    pub fn finish(mut self, success: bool, error: Option<String>) -> Self {
        self.ended_at = Utc::now();
        self.response_time_ms = (self.ended_at - self.started_at).num_milliseconds();
        self.success = success;
        self.error = error;
        self
    }
}

/// Parameters for an ad-hoc probe request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default, alias = "timeout")]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub query_type: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub status_codes: Option<String>,
}

/// Run one probe described by a [`ProbeRequest`]. `count` and `timeout`
/// arrive pre-clamped by the caller.
pub async fn run_probe(request: &ProbeRequest, count: u32, timeout: Duration) -> ProbeResult {
    let Some(kind) = ProbeKind::parse(&request.kind) else {
        let started = Utc::now();
        return ProbeResult::new(ProbeKind::Http, &request.host, started)
            .finish(false, Some(format!("unknown probe type: {}", request.kind)));
    };

    match kind {
        ProbeKind::Ping => run_ping_probe(&request.host, count, timeout).await,
        ProbeKind::Tcp => run_tcp_probe(&request.host, request.port.unwrap_or(80), timeout).await,
        ProbeKind::Dns => {
            run_dns_probe(
                &request.host,
                request.query_type.as_deref().unwrap_or("A"),
                timeout,
            )
            .await
        }
        ProbeKind::Http => {
            run_http_probe(
                &request.host,
                request.keyword.as_deref(),
                request.status_codes.as_deref(),
                timeout,
            )
            .await
        }
        ProbeKind::Ssl => run_tls_probe(&request.host, timeout).await,
    }
}
