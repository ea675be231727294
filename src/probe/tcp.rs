//! TCP connect probe: success is a completed dial within the deadline.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::net::TcpStream;

use super::{ProbeKind, ProbeResult};

pub async fn run_tcp_probe(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    let started = Utc::now();
    let result = ProbeResult::new(ProbeKind::Tcp, host, started);
    let target = format!("{host}:{port}");

    let begin = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(&target)).await {
        Ok(Ok(_stream)) => {
            let mut result = result.finish(true, None);
            result.response_time_ms = begin.elapsed().as_millis() as i64;
            result
        }
        Ok(Err(e)) => result.finish(false, Some(format!("connection to {target} failed: {e}"))),
        Err(_) => result.finish(
            false,
            Some(format!("connection to {target} timed out after {timeout:?}")),
        ),
    }
}
