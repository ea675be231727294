//! HTTP(S) probe: GET with redirect follow, optional keyword and
//! status-code verification.

use std::time::{Duration, Instant};

use chrono::Utc;

use super::{ProbeKind, ProbeResult};

pub async fn run_http_probe(
    target: &str,
    keyword: Option<&str>,
    allowed_status_codes: Option<&str>,
    timeout: Duration,
) -> ProbeResult {
    let started = Utc::now();
    let mut result = ProbeResult::new(ProbeKind::Http, target, started);

    let url = if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{target}")
    };

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => return result.finish(false, Some(format!("failed to build client: {e}"))),
    };

    let begin = Instant::now();
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            return result.finish(false, Some(format!("request timed out after {timeout:?}")))
        }
        Err(e) => return result.finish(false, Some(format!("request failed: {e}"))),
    };

    let status = response.status().as_u16();
    result.status_code = Some(status);

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return result.finish(false, Some(format!("failed to read response body: {e}")))
        }
    };
    result.response_time_ms = begin.elapsed().as_millis() as i64;

    if let Some(err) = check_status(status, allowed_status_codes) {
        return result.finish(false, Some(err));
    }
    if let Some(word) = keyword.filter(|w| !w.trim().is_empty()) {
        if !body.contains(word.trim()) {
            return result.finish(false, Some(format!("keyword \"{}\" not found in response", word.trim())));
        }
    }

    let mut result = result.finish(true, None);
    result.response_time_ms = begin.elapsed().as_millis() as i64;
    result
}

/// Without an explicit allow-list, any 2xx or 3xx passes. With one, the
/// observed code must be a member.
fn check_status(status: u16, allowed: Option<&str>) -> Option<String> {
    match allowed.map(parse_status_codes).filter(|set| !set.is_empty()) {
        Some(set) => {
            if set.contains(&status) {
                None
            } else {
                Some(format!("status code {status} not in expected set"))
            }
        }
        None => {
            if (200..400).contains(&status) {
                None
            } else {
                Some(format!("unexpected status code {status}"))
            }
        }
    }
}

fn parse_status_codes(csv: &str) -> Vec<u16> {
    csv.split(',')
        .filter_map(|part| part.trim().parse::<u16>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_accepts_success_and_redirects() {
        assert!(check_status(200, None).is_none());
        assert!(check_status(302, None).is_none());
        assert!(check_status(404, None).is_some());
        assert!(check_status(500, None).is_some());
    }

    #[test]
    fn explicit_codes_override_default_policy() {
        assert!(check_status(404, Some("200,404")).is_none());
        assert!(check_status(200, Some("404")).is_some());
        // malformed list falls back to default policy
        assert!(check_status(200, Some("abc")).is_none());
    }

    #[test]
    fn status_code_csv_parsing() {
        assert_eq!(parse_status_codes("200, 301,404"), vec![200, 301, 404]);
        assert_eq!(parse_status_codes(""), Vec::<u16>::new());
    }
}
