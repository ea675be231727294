//! DNS probe: a raw UDP query for a configurable record type.
//!
//! Builds the query packet by hand and walks the answer section directly,
//! which keeps the observation honest about message size and authority
//! counts. Runs on a blocking socket inside `spawn_blocking`.

use std::net::UdpSocket;
use std::time::Duration;

use chrono::Utc;

use super::{ProbeError, ProbeKind, ProbeResult};

const RESOLVER: &str = "8.8.8.8:53";

pub async fn run_dns_probe(domain: &str, query_type: &str, timeout: Duration) -> ProbeResult {
    let started = Utc::now();
    let mut result = ProbeResult::new(ProbeKind::Dns, domain, started);
    let qtype_name = query_type.to_ascii_uppercase();
    result.query_type = Some(qtype_name.clone());

    let Some(qtype) = record_type_code(&qtype_name) else {
        return result.finish(false, Some(format!("unsupported record type: {query_type}")));
    };

    let domain_owned = domain.to_string();
    let outcome = tokio::task::spawn_blocking(move || query(&domain_owned, qtype, timeout)).await;

    let answer = match outcome {
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => return result.finish(false, Some(e.to_string())),
        Err(e) => return result.finish(false, Some(format!("dns task failed: {e}"))),
    };

    result.message_size = Some(answer.message_size);
    result.authority_count = Some(answer.authority_count);
    result.resolved_ips = Some(answer.resolved_ips.clone());
    result.answers = Some(answer.answers);

    let success = result
        .answers
        .as_ref()
        .map(|a| !a.is_empty())
        .unwrap_or(false);
    let error = if success {
        None
    } else {
        Some("no answer records returned".to_string())
    };
    result.finish(success, error)
}

struct DnsAnswer {
    answers: Vec<String>,
    resolved_ips: Vec<String>,
    authority_count: u16,
    message_size: usize,
}

fn query(domain: &str, qtype: u16, timeout: Duration) -> Result<DnsAnswer, ProbeError> {
    let packet = build_query(domain, qtype);
    let tx_id = u16::from_be_bytes([packet[0], packet[1]]);

    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| ProbeError::Network(format!("failed to bind socket: {e}")))?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::Network(format!("failed to set timeout: {e}")))?;
    socket
        .connect(RESOLVER)
        .map_err(|e| ProbeError::Network(format!("failed to connect: {e}")))?;
    socket
        .send(&packet)
        .map_err(|e| ProbeError::Network(format!("failed to send: {e}")))?;

    let mut response = [0u8; 1500];
    let n = socket.recv(&mut response).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::WouldBlock {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(format!("failed to recv: {e}"))
        }
    })?;
    let response = &response[..n];

    if n < 12 {
        return Err(ProbeError::Network(format!("response too short: {n} bytes")));
    }
    let resp_tx_id = u16::from_be_bytes([response[0], response[1]]);
    if resp_tx_id != tx_id {
        return Err(ProbeError::Network("transaction id mismatch".to_string()));
    }
    let rcode = response[3] & 0x0F;
    if rcode != 0 {
        return Err(ProbeError::Network(format!("server returned rcode {rcode}")));
    }

    parse_answers(response)
}

/// Standard query: one question, recursion desired.
fn build_query(domain: &str, qtype: u16) -> Vec<u8> {
    let tx_id: u16 = rand::random();
    let mut packet = Vec::with_capacity(32 + domain.len());
    packet.extend_from_slice(&tx_id.to_be_bytes());
    packet.extend_from_slice(&[0x01, 0x00]); // RD set
    packet.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
    packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    for label in domain.trim_end_matches('.').split('.') {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);
    packet.extend_from_slice(&qtype.to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x01]); // IN
    packet
}

fn record_type_code(name: &str) -> Option<u16> {
    match name {
        "A" => Some(1),
        "NS" => Some(2),
        "CNAME" => Some(5),
        "MX" => Some(15),
        "TXT" => Some(16),
        "AAAA" => Some(28),
        _ => None,
    }
}

fn parse_answers(message: &[u8]) -> Result<DnsAnswer, ProbeError> {
    let qdcount = u16::from_be_bytes([message[4], message[5]]);
    let ancount = u16::from_be_bytes([message[6], message[7]]);
    let nscount = u16::from_be_bytes([message[8], message[9]]);

    let mut pos = 12usize;
    for _ in 0..qdcount {
        pos = skip_name(message, pos)?;
        pos += 4; // QTYPE + QCLASS
    }

    let mut answers = Vec::new();
    let mut resolved_ips = Vec::new();
    for _ in 0..ancount {
        pos = skip_name(message, pos)?;
        if pos + 10 > message.len() {
            return Err(ProbeError::Network("truncated answer record".to_string()));
        }
        let rtype = u16::from_be_bytes([message[pos], message[pos + 1]]);
        let rdlength = u16::from_be_bytes([message[pos + 8], message[pos + 9]]) as usize;
        pos += 10;
        if pos + rdlength > message.len() {
            return Err(ProbeError::Network("truncated rdata".to_string()));
        }
        let rdata = &message[pos..pos + rdlength];
        match rtype {
            1 if rdlength == 4 => {
                let ip = format!("{}.{}.{}.{}", rdata[0], rdata[1], rdata[2], rdata[3]);
                answers.push(format!("A {ip}"));
                resolved_ips.push(ip);
            }
            28 if rdlength == 16 => {
                let mut segments = [0u16; 8];
                for (i, segment) in segments.iter_mut().enumerate() {
                    *segment = u16::from_be_bytes([rdata[2 * i], rdata[2 * i + 1]]);
                }
                let ip = std::net::Ipv6Addr::from(segments).to_string();
                answers.push(format!("AAAA {ip}"));
                resolved_ips.push(ip);
            }
            5 => {
                let (name, _) = read_name(message, pos)?;
                answers.push(format!("CNAME {name}"));
            }
            2 => {
                let (name, _) = read_name(message, pos)?;
                answers.push(format!("NS {name}"));
            }
            15 if rdlength > 2 => {
                let pref = u16::from_be_bytes([rdata[0], rdata[1]]);
                let (name, _) = read_name(message, pos + 2)?;
                answers.push(format!("MX {pref} {name}"));
            }
            16 => {
                let text: String = String::from_utf8_lossy(&rdata[1.min(rdata.len())..]).into();
                answers.push(format!("TXT {text}"));
            }
            other => answers.push(format!("TYPE{other} ({rdlength} bytes)")),
        }
        pos += rdlength;
    }

    Ok(DnsAnswer {
        answers,
        resolved_ips,
        authority_count: nscount,
        message_size: message.len(),
    })
}

/// Advance past a possibly-compressed name.
fn skip_name(message: &[u8], mut pos: usize) -> Result<usize, ProbeError> {
    loop {
        let len = *message
            .get(pos)
            .ok_or_else(|| ProbeError::Network("truncated name".to_string()))?;
        if len & 0xC0 == 0xC0 {
            return Ok(pos + 2);
        }
        if len == 0 {
            return Ok(pos + 1);
        }
        pos += 1 + len as usize;
    }
}

/// Decode a possibly-compressed name, bounded against pointer loops.
fn read_name(message: &[u8], mut pos: usize) -> Result<(String, usize), ProbeError> {
    let mut labels = Vec::new();
    let mut jumps = 0;
    let mut end = None;
    loop {
        let len = *message
            .get(pos)
            .ok_or_else(|| ProbeError::Network("truncated name".to_string()))?;
        if len & 0xC0 == 0xC0 {
            let next = *message
                .get(pos + 1)
                .ok_or_else(|| ProbeError::Network("truncated pointer".to_string()))?;
            if end.is_none() {
                end = Some(pos + 2);
            }
            pos = (usize::from(len & 0x3F) << 8) | usize::from(next);
            jumps += 1;
            if jumps > 16 {
                return Err(ProbeError::Network("name pointer loop".to_string()));
            }
            continue;
        }
        if len == 0 {
            let end = end.unwrap_or(pos + 1);
            return Ok((labels.join("."), end));
        }
        let start = pos + 1;
        let stop = start + len as usize;
        let label = message
            .get(start..stop)
            .ok_or_else(|| ProbeError::Network("truncated label".to_string()))?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos = stop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_packet_layout() {
        let packet = build_query("example.com", 1);
        // header + 7"example" + 3"com" + root + qtype/qclass
        assert_eq!(packet.len(), 12 + 1 + 7 + 1 + 3 + 1 + 4);
        assert_eq!(packet[2], 0x01); // RD
        assert_eq!(&packet[4..6], &[0x00, 0x01]); // one question
        assert_eq!(packet[12], 7);
        assert_eq!(&packet[13..20], b"example");
    }

    #[test]
    fn record_types_map_to_codes() {
        assert_eq!(record_type_code("A"), Some(1));
        assert_eq!(record_type_code("AAAA"), Some(28));
        assert_eq!(record_type_code("MX"), Some(15));
        assert_eq!(record_type_code("SPF"), None);
    }

    #[test]
    fn parses_single_a_answer() {
        // Hand-built response: header, question "a.io", one A answer via
        // compression pointer to offset 12.
        let mut msg = vec![
            0xAB, 0xCD, 0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        msg.extend_from_slice(&[1, b'a', 2, b'i', b'o', 0]); // QNAME
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // QTYPE/QCLASS
        msg.extend_from_slice(&[0xC0, 0x0C]); // name pointer
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // A, IN
        msg.extend_from_slice(&[0x00, 0x00, 0x00, 0x3C]); // TTL
        msg.extend_from_slice(&[0x00, 0x04, 93, 184, 216, 34]); // RDATA

        let answer = parse_answers(&msg).unwrap();
        assert_eq!(answer.answers, vec!["A 93.184.216.34"]);
        assert_eq!(answer.resolved_ips, vec!["93.184.216.34"]);
        assert_eq!(answer.authority_count, 0);
        assert_eq!(answer.message_size, msg.len());
    }
}
