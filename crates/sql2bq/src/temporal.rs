//! DATETIME normalization.
//!
//! The text protocol hands DATETIME and TIMESTAMP cells over as strings. They
//! are loaded into BigQuery as seconds since the Unix epoch. Anything that does
//! not parse (NULL, zero dates, garbage) becomes epoch zero instead of NULL so
//! that row assembly never fails on this column family.

use chrono::{NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses a MySQL-style date-time string, interpreted as UTC.
#[must_use]
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Converts a raw DATETIME cell to epoch seconds, fractional part preserved.
///
/// `None` and unparseable input yield `0.0`.
#[must_use]
pub fn to_epoch_seconds(raw: Option<&str>) -> f64 {
    let Some(dt) = raw.and_then(parse_datetime) else {
        return 0.0;
    };
    let utc = dt.and_utc();
    utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) / 1_000_000_000.0
}
