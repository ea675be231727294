//! Environment-driven configuration. Invalid values fall back to defaults.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub default_count: u32,
    pub default_timeout: Duration,
    pub max_count: u32,
    pub max_timeout: Duration,
    pub enable_logging: bool,
    pub store_enabled: bool,
    pub store_url: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: env_parse("PORT", 8092),
            default_count: env_parse("DEFAULT_COUNT", 4),
            default_timeout: env_duration("DEFAULT_TIMEOUT", Duration::from_secs(3)),
            max_count: env_parse("MAX_COUNT", 20),
            max_timeout: env_duration("MAX_TIMEOUT", Duration::from_secs(30)),
            enable_logging: env_bool("ENABLE_LOGGING", true),
            store_enabled: env_bool("POCKETBASE_ENABLED", true),
            store_url: env::var("POCKETBASE_URL").unwrap_or_default(),
        }
    }

    /// Clamp an ad-hoc probe's echo count to the configured ceiling.
    pub fn clamp_count(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_count)
            .clamp(1, self.max_count)
    }

    /// Clamp an ad-hoc probe's timeout to the configured ceiling.
    pub fn clamp_timeout(&self, requested_seconds: Option<u64>) -> Duration {
        match requested_seconds {
            Some(seconds) => Duration::from_secs(seconds).min(self.max_timeout),
            None => self.default_timeout,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Durations accept either a plain number of seconds or Go-style suffixed
/// forms like "3s" / "500ms".
fn env_duration(key: &str, default: Duration) -> Duration {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Duration::from_secs(seconds);
    }
    if let Some(ms) = raw.strip_suffix("ms") {
        if let Ok(ms) = ms.trim().parse::<u64>() {
            return Duration::from_millis(ms);
        }
    }
    if let Some(seconds) = raw.strip_suffix('s') {
        if let Ok(seconds) = seconds.trim().parse::<u64>() {
            return Duration::from_secs(seconds);
        }
    }
    if let Some(minutes) = raw.strip_suffix('m') {
        if let Ok(minutes) = minutes.trim().parse::<u64>() {
            return Duration::from_secs(minutes * 60);
        }
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping_respects_bounds() {
        let config = Config {
            port: 8092,
            default_count: 4,
            default_timeout: Duration::from_secs(3),
            max_count: 20,
            max_timeout: Duration::from_secs(30),
            enable_logging: true,
            store_enabled: true,
            store_url: String::new(),
        };
        assert_eq!(config.clamp_count(None), 4);
        assert_eq!(config.clamp_count(Some(50)), 20);
        assert_eq!(config.clamp_count(Some(0)), 1);
        assert_eq!(config.clamp_timeout(None), Duration::from_secs(3));
        assert_eq!(config.clamp_timeout(Some(120)), Duration::from_secs(30));
        assert_eq!(config.clamp_timeout(Some(5)), Duration::from_secs(5));
    }
}
