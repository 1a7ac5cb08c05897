//! UTC to city-local wall-clock conversion.
//!
//! Timestamps coming from the forecast API are UTC strings without a zone
//! suffix. They are always parsed as UTC explicitly, then shifted by the
//! city's fixed offset; the machine's own timezone never takes part.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Format of `dt_txt` in forecast responses.
pub const FORECAST_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall-clock format used for detail views.
pub const LOCAL_TIME_FORMAT: &str = "%H:%M:%S";

/// Short wall-clock format used in city lists.
pub const SHORT_LOCAL_TIME_FORMAT: &str = "%H:%M";

pub fn parse_utc(timestamp: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(timestamp.trim(), FORECAST_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Shift a UTC instant into the wall-clock time of a fixed offset.
///
/// Returns `None` if the offset is out of range (more than a day either way).
pub fn to_local(utc: DateTime<Utc>, utc_offset_secs: i32) -> Option<NaiveDateTime> {
    let offset = FixedOffset::east_opt(utc_offset_secs)?;
    Some(utc.with_timezone(&offset).naive_local())
}

/// Parse a forecast timestamp and convert it to local wall-clock time.
pub fn utc_to_local(timestamp: &str, utc_offset_secs: i32) -> Option<NaiveDateTime> {
    parse_utc(timestamp).and_then(|utc| to_local(utc, utc_offset_secs))
}

/// Local wall-clock string (`HH:MM:SS`) for a forecast timestamp.
pub fn convert_utc_to_local(timestamp: &str, utc_offset_secs: i32) -> Option<String> {
    utc_to_local(timestamp, utc_offset_secs).map(|t| t.format(LOCAL_TIME_FORMAT).to_string())
}

/// "Now" in a city, derived from an explicit UTC instant.
pub fn local_now(now_utc: DateTime<Utc>, utc_offset_secs: i32) -> NaiveDateTime {
    to_local(now_utc, utc_offset_secs).unwrap_or_else(|| {
        tracing::warn!(utc_offset_secs, "invalid UTC offset, falling back to UTC");
        now_utc.naive_utc()
    })
}

/// Short local time string stored on a city after each fetch.
pub fn format_local_now(now_utc: DateTime<Utc>, utc_offset_secs: i32) -> String {
    local_now(now_utc, utc_offset_secs)
        .format(SHORT_LOCAL_TIME_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn converts_with_positive_offset() {
        let local = convert_utc_to_local("2022-08-30 16:00:00", 7200);
        assert_eq!(local.as_deref(), Some("18:00:00"));
    }

    #[test]
    fn negative_offset_crosses_midnight() {
        let local = utc_to_local("2022-08-30 02:00:00", -5 * 3600).unwrap();
        let expected = NaiveDate::from_ymd_opt(2022, 8, 29)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap();
        assert_eq!(local, expected);
    }

    #[test]
    fn half_hour_offsets_are_respected() {
        // India, UTC+05:30
        let local = convert_utc_to_local("2024-01-01 00:00:00", 19800);
        assert_eq!(local.as_deref(), Some("05:30:00"));
    }

    #[test]
    fn unparsable_timestamp_yields_none() {
        assert!(convert_utc_to_local("yesterday", 0).is_none());
        assert!(convert_utc_to_local("2022-08-30T16:00:00Z", 0).is_none());
    }

    #[test]
    fn out_of_range_offset_yields_none() {
        assert!(utc_to_local("2022-08-30 16:00:00", 90_000).is_none());
    }

    #[test]
    fn local_now_is_independent_of_machine_zone() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(format_local_now(now, 3600), "13:00");
        assert_eq!(format_local_now(now, -36000), "02:00");
    }
}
