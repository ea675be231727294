//! ICMP ping probe: N echo requests with per-packet RTT statistics.
//!
//! Uses blocking sockets inside `spawn_blocking` for timing precision.
//! A RAW socket is tried first (privileged), then DGRAM (unprivileged on
//! Linux with `ping_group_range` set, and on macOS).

use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use socket2::{Domain, Protocol, Socket, Type};

use super::{ProbeError, ProbeKind, ProbeResult};

/// Sequence counter so concurrent pings to the same destination stay
/// distinguishable.
static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

pub async fn run_ping_probe(host: &str, count: u32, timeout: Duration) -> ProbeResult {
    let started = Utc::now();
    let result = ProbeResult::new(ProbeKind::Ping, host, started);
    let count = count.max(1);

    let ip = match resolve_address(host).await {
        Ok(ip) => ip,
        Err(e) => return result.finish(false, Some(e.to_string())),
    };

    let echoes = match tokio::task::spawn_blocking(move || run_echoes(ip, count, timeout)).await {
        Ok(echoes) => echoes,
        Err(e) => return result.finish(false, Some(format!("ping task failed: {e}"))),
    };

    let echoes = match echoes {
        Ok(echoes) => echoes,
        Err(e) => return result.finish(false, Some(e.to_string())),
    };

    let received: Vec<f64> = echoes.iter().filter_map(|rtt| *rtt).collect();
    let sent = count;
    let recv = received.len() as u32;
    let loss = 100.0 * f64::from(sent - recv) / f64::from(sent);

    let mut result = result;
    result.packets_sent = Some(sent);
    result.packets_received = Some(recv);
    result.packet_loss_percent = Some(loss);
    if !received.is_empty() {
        let min = received.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = received.iter().cloned().fold(0.0f64, f64::max);
        let avg = received.iter().sum::<f64>() / received.len() as f64;
        result.min_rtt_ms = Some(min);
        result.avg_rtt_ms = Some(avg);
        result.max_rtt_ms = Some(max);
    }
    result.rtts_ms = Some(received);

    let success = recv > 0;
    let error = if success {
        None
    } else {
        Some(format!("all {sent} echo requests lost"))
    };
    result.finish(success, error)
}

async fn resolve_address(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let addrs: Vec<_> = tokio::net::lookup_host(format!("{host}:0"))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {e}")))?
        .collect();
    addrs
        .into_iter()
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("no addresses found for {host}")))
}

/// Send `count` echo requests sequentially; each slot is the RTT in ms or
/// `None` for a lost packet.
fn run_echoes(ip: IpAddr, count: u32, timeout: Duration) -> Result<Vec<Option<f64>>, ProbeError> {
    let socket = open_socket(ip)?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::Network(format!("failed to set timeout: {e}")))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| ProbeError::Network(format!("failed to set timeout: {e}")))?;
    let dest = SocketAddr::new(ip, 0);
    socket
        .connect(&dest.into())
        .map_err(|e| ProbeError::Network(format!("failed to connect: {e}")))?;

    let identifier: u16 = rand::random();
    let mut rtts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        rtts.push(echo_once(&socket, ip, identifier, sequence, timeout)?);
    }
    Ok(rtts)
}

fn open_socket(ip: IpAddr) -> Result<Socket, ProbeError> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };
    Socket::new(domain, Type::RAW, Some(protocol))
        .or_else(|_| Socket::new(domain, Type::DGRAM, Some(protocol)))
        .map_err(|e| ProbeError::Network(format!("failed to create ICMP socket: {e}")))
}

fn echo_once(
    socket: &Socket,
    ip: IpAddr,
    identifier: u16,
    sequence: u16,
    timeout: Duration,
) -> Result<Option<f64>, ProbeError> {
    let packet = match ip {
        IpAddr::V4(_) => build_echo_request(8, identifier, sequence, true),
        IpAddr::V6(_) => build_echo_request(128, identifier, sequence, false),
    };

    let start = Instant::now();
    socket.send(&packet).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ProbeError::Network(format!("permission denied: {e}"))
        } else {
            ProbeError::Network(format!("failed to send: {e}"))
        }
    })?;

    // Keep reading until our reply arrives or the deadline passes.
    loop {
        let mut buf: [MaybeUninit<u8>; 1500] = unsafe { MaybeUninit::uninit().assume_init() };
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(None);
            }
            Err(e) => return Err(ProbeError::Network(format!("failed to receive: {e}"))),
        };
        // SAFETY: recv initialized `len` bytes
        let buf: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(None);
        }

        if let Some((reply_type, reply_id, reply_seq)) = parse_reply(ip, buf) {
            let expected_type = match ip {
                IpAddr::V4(_) => 0u8,
                IpAddr::V6(_) => 129u8,
            };
            if reply_type == expected_type && reply_id == identifier && reply_seq == sequence {
                return Ok(Some(elapsed.as_secs_f64() * 1000.0));
            }
        }
        // Not ours; keep waiting.
    }
}

fn parse_reply(ip: IpAddr, buf: &[u8]) -> Option<(u8, u16, u16)> {
    // RAW IPv4 sockets deliver the IP header; DGRAM and IPv6 do not.
    let offset = match ip {
        IpAddr::V4(_) if !buf.is_empty() && buf[0] >> 4 == 4 => 20,
        _ => 0,
    };
    if buf.len() < offset + 8 {
        return None;
    }
    let reply_type = buf[offset];
    let reply_id = u16::from_be_bytes([buf[offset + 4], buf[offset + 5]]);
    let reply_seq = u16::from_be_bytes([buf[offset + 6], buf[offset + 7]]);
    Some((reply_type, reply_id, reply_seq))
}

/// Build an echo request: 8 byte header + 56 byte payload carrying a
/// timestamp. The ICMPv6 checksum is left to the kernel.
fn build_echo_request(icmp_type: u8, identifier: u16, sequence: u16, checksum: bool) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = icmp_type;
    packet[1] = 0;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    if checksum {
        let sum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    packet
}

/// RFC 1071 internet checksum.
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        sum += u32::from(u16::from_be_bytes([data[i], data[i + 1]]));
        i += 2;
    }
    if i < data.len() {
        sum += u32::from(data[i]) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_nonzero_for_real_packet() {
        let mut packet = vec![0u8; 8];
        packet[0] = 8;
        packet[4] = 0x12;
        packet[5] = 0x34;
        packet[7] = 0x01;
        assert_ne!(icmp_checksum(&packet), 0);
    }

    #[test]
    fn echo_request_layout() {
        let packet = build_echo_request(8, 0x1234, 0x0001, true);
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_eq!(&packet[4..6], &[0x12, 0x34]);
        assert_eq!(&packet[6..8], &[0x00, 0x01]);
        // checksum filled in
        assert!(packet[2] != 0 || packet[3] != 0);
    }

    #[test]
    fn reply_parse_skips_ipv4_header() {
        let mut raw = vec![0u8; 28];
        raw[0] = 0x45; // IPv4, IHL 5
        raw[20] = 0; // echo reply
        raw[24] = 0xAB;
        raw[25] = 0xCD;
        raw[26] = 0x00;
        raw[27] = 0x07;
        let (ty, id, seq) = parse_reply("127.0.0.1".parse().unwrap(), &raw).unwrap();
        assert_eq!(ty, 0);
        assert_eq!(id, 0xABCD);
        assert_eq!(seq, 7);
    }
}
