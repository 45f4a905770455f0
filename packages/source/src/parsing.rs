//! Shared parsing utilities for provider adapters.
//!
//! Timestamp, number, and sentinel handling used across multiple adapters.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde_json::Value;

/// Epoch values at or above this are treated as milliseconds.
///
/// 10^11 seconds is the year 5138, while 10^11 milliseconds is 1973.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parses a JSON payload, returning `None` on any syntax error.
#[must_use]
pub fn parse_json(raw: &str) -> Option<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("payload is not valid JSON: {e}");
            None
        }
    }
}

/// Reads a finite number from a JSON value, accepting numeric strings.
#[must_use]
pub fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Reads `key` from a JSON object as a finite number.
#[must_use]
pub fn number_at(object: &Value, key: &str) -> Option<f64> {
    object.get(key).and_then(number)
}

/// Normalizes an epoch value to Unix seconds, detecting milliseconds.
#[must_use]
pub const fn epoch_seconds(raw: i64) -> i64 {
    if raw.abs() >= MILLIS_THRESHOLD {
        raw / 1000
    } else {
        raw
    }
}

/// Parses an ISO-8601 timestamp into Unix seconds.
///
/// Accepts RFC 3339 (with offset or `Z`) and offset-less forms, which are
/// taken as UTC.
#[must_use]
pub fn parse_iso_time(s: &str) -> Option<i64> {
    parse_local_time(s, &FixedOffset::east_opt(0)?)
}

/// Like [`parse_iso_time`], but offset-less forms are wall-clock time at
/// `offset`.
#[must_use]
pub fn parse_local_time(s: &str, offset: &FixedOffset) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%MZ") {
        return Some(naive.and_utc().timestamp());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.timestamp());
        }
    }
    None
}

/// Reads an observation time from whatever the provider supplied: Unix
/// seconds, Unix milliseconds (as number or string), or an ISO-8601 string.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .map(epoch_seconds),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .map(epoch_seconds)
            .or_else(|| parse_iso_time(s)),
        _ => None,
    }
}

/// Rounds a direction in degrees, rejecting non-finite input.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn round_degrees(degrees: f64) -> Option<i32> {
    degrees.is_finite().then(|| degrees.round() as i32)
}

/// Whether a text cell is an explicit "no data" marker: a run of two or
/// more slashes (`///`) or dashes (`---`).
#[must_use]
pub fn is_sentinel(s: &str) -> bool {
    let s = s.trim();
    s.len() >= 2 && (s.chars().all(|c| c == '/') || s.chars().all(|c| c == '-'))
}

/// Parses a visibility string such as `"10+"`, `"1/2"`, `"1 1/2"`, or
/// `"P6SM"` into statute miles.
#[must_use]
pub fn parse_visibility(s: &str) -> Option<f64> {
    let cleaned = s
        .trim()
        .trim_start_matches(['P', 'M'])
        .trim_end_matches("SM")
        .trim_end_matches('+')
        .trim();

    if cleaned.is_empty() {
        return None;
    }

    let mut total = 0.0;
    for part in cleaned.split_whitespace() {
        total += match part.split_once('/') {
            Some((num, den)) => {
                let num = num.parse::<f64>().ok()?;
                let den = den.parse::<f64>().ok()?;
                if den == 0.0 {
                    return None;
                }
                num / den
            }
            None => part.parse::<f64>().ok()?,
        };
    }
    total.is_finite().then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_in_seconds_millis_and_iso() {
        assert_eq!(parse_timestamp(&json!(1_714_564_800)), Some(1_714_564_800));
        assert_eq!(
            parse_timestamp(&json!(1_714_564_800_000_i64)),
            Some(1_714_564_800)
        );
        assert_eq!(
            parse_timestamp(&json!("1714564800000")),
            Some(1_714_564_800)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-05-01T12:00:00Z")),
            Some(1_714_564_800)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-05-01T07:00:00-05:00")),
            Some(1_714_564_800)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-05-01 12:00:00")),
            Some(1_714_564_800)
        );
    }

    #[test]
    fn rejects_unparseable_timestamps() {
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
        assert_eq!(parse_timestamp(&json!({"t": 1})), None);
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        assert_eq!(number(&json!(12.5)), Some(12.5));
        assert_eq!(number(&json!(" 7 ")), Some(7.0));
        assert_eq!(number(&json!("calm")), None);
        assert_eq!(number(&json!(null)), None);
    }

    #[test]
    fn sentinels() {
        assert!(is_sentinel("///"));
        assert!(is_sentinel(" ---- "));
        assert!(!is_sentinel("/"));
        assert!(!is_sentinel("-5"));
        assert!(!is_sentinel("12.0"));
    }

    #[test]
    fn visibility_strings() {
        assert_eq!(parse_visibility("10+"), Some(10.0));
        assert_eq!(parse_visibility("1/2"), Some(0.5));
        assert_eq!(parse_visibility("1 1/2"), Some(1.5));
        assert_eq!(parse_visibility("P6SM"), Some(6.0));
        assert_eq!(parse_visibility("M1/4SM"), Some(0.25));
        assert_eq!(parse_visibility("1/0"), None);
        assert_eq!(parse_visibility(""), None);
    }
}
