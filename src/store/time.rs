//! Flexible timestamp handling for the record store.
//!
//! The Store emits timestamps in several shapes depending on the field and
//! collection: RFC3339 (`2025-08-11T13:09:13Z`), RFC3339 with fractional
//! seconds, and its own space-separated form (`2025-08-11 13:09:13.243Z`).
//! Parsing is driven by a static format list; the first match wins.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Space- and T-separated ISO variants, with and without fractional seconds
/// and the trailing `Z`. `%.f` accepts ms, us and ns width fractions.
const FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a Store timestamp, trying RFC3339 first and then each known
/// space-separated variant. All results are interpreted as UTC.
pub fn parse_flexible(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return Err(anyhow!("empty timestamp"));
    }

    // RFC3339 / RFC3339Nano, including offset forms.
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }

    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    // Date-only values appear on manually edited records.
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid date: {value}"))?;
        return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
    }

    Err(anyhow!("unable to parse timestamp: {value}"))
}

/// Like [`parse_flexible`] but treats empty/unparseable values as `None`
/// ("never checked") instead of an error.
pub fn parse_optional(value: &str) -> Option<DateTime<Utc>> {
    parse_flexible(value).ok()
}

/// Format a timestamp the way the Store writes them:
/// `YYYY-MM-DD HH:MM:SS.sssZ`.
pub fn format_store(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_store_space_format() {
        let t = parse_flexible("2025-08-11 13:09:13.243Z").unwrap();
        assert_eq!(t.hour(), 13);
        assert_eq!(t.timestamp_subsec_millis(), 243);
    }

    #[test]
    fn parses_rfc3339_variants() {
        assert!(parse_flexible("2025-08-11T13:09:13Z").is_ok());
        assert!(parse_flexible("2025-08-11T13:09:13.243Z").is_ok());
        assert!(parse_flexible("2025-08-11T13:09:13.243123Z").is_ok());
        assert!(parse_flexible("2025-08-11T13:09:13+02:00").is_ok());
    }

    #[test]
    fn parses_microseconds_and_bare_forms() {
        assert!(parse_flexible("2025-08-11 13:09:13.000000Z").is_ok());
        assert!(parse_flexible("2025-08-11 13:09:13").is_ok());
        assert!(parse_flexible("2025-08-11").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_flexible("").is_err());
        assert!(parse_flexible("not a time").is_err());
        assert!(parse_optional("not a time").is_none());
    }

    #[test]
    fn round_trips_through_rfc3339() {
        // Every supported format must survive parse -> rfc3339 -> parse.
        for raw in [
            "2025-08-11 13:09:13.243Z",
            "2025-08-11T13:09:13.243Z",
            "2025-08-11 13:09:13Z",
            "2025-08-11 13:09:13",
        ] {
            let first = parse_flexible(raw).unwrap();
            let second = parse_flexible(&first.to_rfc3339()).unwrap();
            assert_eq!(first, second, "round trip changed instant for {raw}");
        }
    }

    #[test]
    fn store_format_is_reparseable() {
        let now = Utc::now();
        let formatted = format_store(now);
        let parsed = parse_flexible(&formatted).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }
}
