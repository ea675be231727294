//! TLS certificate probe: handshake, leaf validation, and field extraction.
//!
//! The handshake runs over rustls with webpki trust anchors and TLS 1.2 as
//! the floor; a chain the verifier rejects (expired, untrusted, wrong host)
//! surfaces as a transport-level failure, exactly like a refused dial. When
//! the handshake succeeds, the leaf is re-examined field by field so the
//! result can carry a precise validation message instead of a bare failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

use super::{ProbeKind, ProbeResult};

/// Strip scheme and path, trim whitespace. The port is handled separately.
pub fn normalize_domain(domain: &str) -> String {
    let mut domain = domain.trim();
    domain = domain.strip_prefix("https://").unwrap_or(domain);
    domain = domain.strip_prefix("http://").unwrap_or(domain);
    let domain = match domain.find('/') {
        Some(idx) => &domain[..idx],
        None => domain,
    };
    domain.trim().to_string()
}

pub async fn run_tls_probe(domain: &str, timeout: Duration) -> ProbeResult {
    let started = Utc::now();
    let domain = normalize_domain(domain);
    let mut result = ProbeResult::new(ProbeKind::Ssl, &domain, started);

    if domain.is_empty() {
        return result.finish(false, Some("domain cannot be empty".to_string()));
    }

    let (hostname, port) = match domain.rsplit_once(':') {
        Some((host, port_str)) if port_str.chars().all(|c| c.is_ascii_digit()) => {
            (host.to_string(), port_str.parse().unwrap_or(443))
        }
        _ => (domain.clone(), 443u16),
    };
    result.host = hostname.clone();

    let connect = connect_tls(&hostname, port, timeout);
    let leaf_der = match connect.await {
        Ok(der) => der,
        Err(e) => return result.finish(false, Some(format!("TLS connection failed: {e}"))),
    };

    let (_, cert) = match X509Certificate::from_der(&leaf_der) {
        Ok(parsed) => parsed,
        Err(e) => {
            return result.finish(false, Some(format!("failed to parse certificate: {e}")))
        }
    };

    let not_before = asn1_to_utc(cert.validity().not_before.timestamp());
    let not_after = asn1_to_utc(cert.validity().not_after.timestamp());
    let now = Utc::now();
    let days_left = (not_after - now).num_hours() / 24;

    result.ssl_valid_from = Some(not_before);
    result.ssl_valid_till = Some(not_after);
    result.ssl_days_left = Some(days_left);
    result.ssl_issuer = Some(organization_of(cert.issuer()));
    result.ssl_subject = Some(organization_of(cert.subject()));
    result.ssl_serial_number = Some(cert.tbs_certificate.serial.to_str_radix(10));
    result.ssl_algorithm = Some(algorithm_of(&cert));
    result.ssl_sans = Some(extract_sans(&cert).join(","));
    result.ssl_resolved_ip = resolve_first_ip(&hostname).await;

    let validation_error = validate_certificate(&cert, &hostname, now, not_before, not_after);
    let is_valid = validation_error.is_none() && now < not_after && now > not_before;

    let error = validation_error.or_else(|| {
        if now > not_after {
            Some("certificate has expired".to_string())
        } else if now < not_before {
            Some("certificate is not yet valid".to_string())
        } else {
            None
        }
    });

    result.finish(is_valid, error)
}

/// Dial TCP, handshake, and return the DER-encoded leaf certificate.
async fn connect_tls(hostname: &str, port: u16, timeout: Duration) -> anyhow::Result<Vec<u8>> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS13,
        &rustls::version::TLS12,
    ])
    .with_root_certificates(roots)
    .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|e| anyhow::anyhow!("invalid server name {hostname}: {e}"))?;

    let dial = async {
        let tcp = TcpStream::connect((hostname, port)).await?;
        let tls = connector.connect(server_name, tcp).await?;
        let (_, session) = tls.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or_else(|| anyhow::anyhow!("no certificates found in chain"))?;
        Ok::<Vec<u8>, anyhow::Error>(leaf.as_ref().to_vec())
    };

    tokio::time::timeout(timeout, dial)
        .await
        .map_err(|_| anyhow::anyhow!("handshake timed out after {timeout:?}"))?
}

fn asn1_to_utc(timestamp: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(timestamp, 0).single().unwrap_or_default()
}

/// Mirror of the leaf validation chain: validity window, hostname match,
/// DigitalSignature key usage, self-signed heuristic, ServerAuth EKU, and
/// certificate version.
fn validate_certificate(
    cert: &X509Certificate<'_>,
    hostname: &str,
    now: DateTime<Utc>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Option<String> {
    if now < not_before {
        return Some(format!(
            "certificate is not yet valid (valid from: {})",
            not_before.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    if now > not_after {
        return Some(format!(
            "certificate has expired (expired on: {})",
            not_after.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    if !hostname_matches(cert, hostname) {
        return Some(format!("hostname verification failed for {hostname}"));
    }

    let digital_signature = cert
        .key_usage()
        .ok()
        .flatten()
        .map(|ku| ku.value.digital_signature())
        .unwrap_or(false);
    if !digital_signature {
        return Some("certificate missing required digital signature key usage".to_string());
    }

    let issuer_cn = common_name_of(cert.issuer());
    let subject_cn = common_name_of(cert.subject());
    let subject_has_org = cert.subject().iter_organization().next().is_some();
    if !issuer_cn.is_empty() && issuer_cn == subject_cn && !subject_has_org {
        return Some("certificate appears to be self-signed".to_string());
    }

    let server_auth = cert
        .extended_key_usage()
        .ok()
        .flatten()
        .map(|eku| eku.value.server_auth)
        .unwrap_or(false);
    if !server_auth {
        return Some("certificate does not have server authentication extension".to_string());
    }

    // X509Version encodes v3 as 2.
    if cert.version().0 < 2 {
        return Some(format!(
            "certificate version {} is outdated (should be v3)",
            cert.version().0 + 1
        ));
    }

    None
}

fn hostname_matches(cert: &X509Certificate<'_>, hostname: &str) -> bool {
    let mut names: Vec<String> = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                names.push(dns.to_string());
            }
        }
    }
    if names.is_empty() {
        let cn = common_name_of(cert.subject());
        if !cn.is_empty() {
            names.push(cn);
        }
    }
    names.iter().any(|name| dns_name_matches(name, hostname))
}

/// Exact match, or a single leftmost wildcard label.
fn dns_name_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let hostname = hostname.to_ascii_lowercase();
    if pattern == hostname {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        if let Some((first, rest)) = hostname.split_once('.') {
            return !first.is_empty() && rest == suffix;
        }
    }
    false
}

/// First organization, falling back to common name, falling back to
/// "Unknown".
fn organization_of(name: &X509Name<'_>) -> String {
    if let Some(org) = name
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
    {
        return org.to_string();
    }
    let cn = common_name_of(name);
    if cn.is_empty() {
        "Unknown".to_string()
    } else {
        cn
    }
}

fn common_name_of(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Signature algorithm name plus public key size.
fn algorithm_of(cert: &X509Certificate<'_>) -> String {
    let oid = cert.signature_algorithm.algorithm.to_id_string();
    let name = match oid.as_str() {
        "1.2.840.113549.1.1.5" => "SHA1-RSA",
        "1.2.840.113549.1.1.11" => "SHA256-RSA",
        "1.2.840.113549.1.1.12" => "SHA384-RSA",
        "1.2.840.113549.1.1.13" => "SHA512-RSA",
        "1.2.840.10045.4.3.2" => "ECDSA-SHA256",
        "1.2.840.10045.4.3.3" => "ECDSA-SHA384",
        "1.2.840.10045.4.3.4" => "ECDSA-SHA512",
        "1.3.101.112" => "Ed25519",
        _ => return oid,
    };

    match cert.public_key().parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(rsa)) => {
            let bits = rsa.modulus.iter().skip_while(|b| **b == 0).count() * 8;
            format!("{name} (RSA {bits}-bit)")
        }
        Ok(x509_parser::public_key::PublicKey::EC(point)) => {
            // Uncompressed point: 0x04 || X || Y.
            let bits = point.data().len().saturating_sub(1) / 2 * 8;
            format!("{name} (ECDSA {bits}-bit)")
        }
        _ => name.to_string(),
    }
}

/// All SAN forms: DNS, IP, email, URI.
fn extract_sans(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut sans = Vec::new();
    if let Ok(Some(extension)) = cert.subject_alternative_name() {
        for name in &extension.value.general_names {
            match name {
                GeneralName::DNSName(dns) => sans.push(dns.to_string()),
                GeneralName::IPAddress(bytes) => match bytes.len() {
                    4 => sans.push(format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])),
                    16 => {
                        let mut segments = [0u16; 8];
                        for (i, segment) in segments.iter_mut().enumerate() {
                            *segment = u16::from_be_bytes([bytes[2 * i], bytes[2 * i + 1]]);
                        }
                        sans.push(std::net::Ipv6Addr::from(segments).to_string());
                    }
                    _ => {}
                },
                GeneralName::RFC822Name(email) => sans.push(email.to_string()),
                GeneralName::URI(uri) => sans.push(uri.to_string()),
                _ => {}
            }
        }
    }
    sans
}

/// First A record for the host, IPv4 preferred.
async fn resolve_first_ip(hostname: &str) -> Option<String> {
    let addrs: Vec<_> = tokio::net::lookup_host(format!("{hostname}:443"))
        .await
        .ok()?
        .collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(|a| a.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_schemes_paths_and_whitespace() {
        assert_eq!(normalize_domain("https://example.com/path/x"), "example.com");
        assert_eq!(normalize_domain("http://example.com"), "example.com");
        assert_eq!(normalize_domain("  example.com  "), "example.com");
        assert_eq!(normalize_domain("example.com:8443"), "example.com:8443");
        assert_eq!(normalize_domain(""), "");
    }

    #[test]
    fn wildcard_matching_covers_one_label_only() {
        assert!(dns_name_matches("example.com", "example.com"));
        assert!(dns_name_matches("*.example.com", "www.example.com"));
        assert!(!dns_name_matches("*.example.com", "example.com"));
        assert!(!dns_name_matches("*.example.com", "a.b.example.com"));
        assert!(dns_name_matches("EXAMPLE.com", "example.COM"));
    }
}
