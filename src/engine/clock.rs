//! Time Base
//!
//! Nanosecond timestamps shared by quotes, bars and orders, plus the parsing
//! helpers for the two timestamp shapes found in the input data:
//! ISO-8601 quote times with fractional seconds and session bucket labels
//! such as `2024-01-02 09:30:00-05:00`.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};

/// Nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC).
pub type Nanos = i64;

/// Conversion constants
pub const NANOS_PER_MICRO: i64 = 1_000;
pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Bucket label layout used by session-keyed bar files.
pub const BUCKET_LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Helper to convert chrono DateTime to Nanos.
#[inline]
pub fn datetime_to_nanos(dt: &DateTime<Utc>) -> Nanos {
    dt.timestamp_nanos_opt().unwrap_or(0)
}

/// Helper to convert Nanos to chrono DateTime.
#[inline]
pub fn nanos_to_datetime(nanos: Nanos) -> DateTime<Utc> {
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let nsecs = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    Utc.timestamp_opt(secs, nsecs)
        .single()
        .unwrap_or_default()
}

/// Helper to parse ISO8601/RFC3339 string to Nanos.
///
/// Fractional seconds up to nanosecond precision are kept, so
/// `2024-01-02T14:30:02.402838204Z` round-trips exactly.
pub fn parse_timestamp(s: &str) -> Option<Nanos> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .and_then(|dt| dt.with_timezone(&Utc).timestamp_nanos_opt())
}

/// Parse a bar bucket label into Nanos.
///
/// Accepts the session label layout (`2024-01-02 09:30:00-05:00`) and falls
/// back to RFC3339 for feeds that already carry full timestamps.
pub fn parse_bucket_label(label: &str) -> Option<Nanos> {
    let label = label.trim();
    DateTime::parse_from_str(label, BUCKET_LABEL_FORMAT)
        .ok()
        .and_then(|dt| dt.with_timezone(&Utc).timestamp_nanos_opt())
        .or_else(|| parse_timestamp(label))
}

/// Render Nanos as RFC3339 with nanosecond precision.
pub fn format_timestamp(nanos: Nanos) -> String {
    nanos_to_datetime(nanos).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// UTC calendar date of a timestamp.
#[inline]
pub fn utc_date(nanos: Nanos) -> NaiveDate {
    nanos_to_datetime(nanos).date_naive()
}

/// Year fraction between the event date and an expiry date using an
/// actual/`basis` day count. Negative when the expiry is in the past.
pub fn year_fraction(event: Nanos, expiry: NaiveDate, basis: f64) -> f64 {
    let days = (expiry - utc_date(event)).num_days();
    days as f64 / basis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quote_timestamp_keeps_nanos() {
        let ts = parse_timestamp("2024-01-02T14:30:02.402838204Z").unwrap();
        assert_eq!(ts % NANOS_PER_SEC, 402_838_204);
        assert_eq!(format_timestamp(ts), "2024-01-02T14:30:02.402838204Z");
    }

    #[test]
    fn test_parse_bucket_label_session_format() {
        let ts = parse_bucket_label("2024-01-02 09:30:00-05:00").unwrap();
        assert_eq!(ts, parse_timestamp("2024-01-02T14:30:00Z").unwrap());
    }

    #[test]
    fn test_parse_bucket_label_rfc3339_fallback() {
        let ts = parse_bucket_label("2024-01-02T14:30:00Z").unwrap();
        assert_eq!(ts, parse_timestamp("2024-01-02T09:30:00-05:00").unwrap());
        assert!(parse_bucket_label("not a label").is_none());
    }

    #[test]
    fn test_year_fraction_actual_365_25() {
        let event = parse_timestamp("2024-01-02T15:00:00Z").unwrap();
        let expiry = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let t = year_fraction(event, expiry, 365.25);
        assert!((t - 365.0 / 365.25).abs() < 1e-12);

        let past = NaiveDate::from_ymd_opt(2023, 12, 29).unwrap();
        assert!(year_fraction(event, past, 365.25) < 0.0);
    }

    #[test]
    fn test_datetime_roundtrip() {
        let nanos = 1_704_205_802_402_838_204;
        let dt = nanos_to_datetime(nanos);
        assert_eq!(datetime_to_nanos(&dt), nanos);
    }
}
