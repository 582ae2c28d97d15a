//! Text encoding for `expiration_time`.
//!
//! Values are always written in UTC with microsecond precision and a `Z`
//! suffix, so every stored value has the same width and SQL text comparison
//! orders them chronologically. That only holds for four-digit years, so
//! instants outside `0000..=9999` are not storable.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};

/// Whether `time` formats to the fixed-width text form.
pub fn is_storable(time: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&time.year())
}

pub fn format_utc(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored expiration. Accepts any RFC 3339 offset and normalizes to UTC.
pub fn parse_utc(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn fixed_width_utc_text() {
        let time = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_utc(&time), "2026-01-02T03:04:05.000000Z");
    }

    #[test]
    fn text_order_matches_time_order() {
        let base = Utc.with_ymd_and_hms(2026, 10, 16, 9, 59, 59).unwrap();
        let later = base + Duration::microseconds(1);
        assert!(format_utc(&base) < format_utc(&later));
    }

    #[test]
    fn five_digit_years_are_not_storable() {
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert!(is_storable(&last));
        assert_eq!(format_utc(&last), "9999-12-31T23:59:59.000000Z");

        let first = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap();
        assert!(is_storable(&first));
        assert!(format_utc(&first) < format_utc(&last));

        assert!(!is_storable(&Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap()));
        assert!(!is_storable(&DateTime::<Utc>::MAX_UTC));
        assert!(!is_storable(&DateTime::<Utc>::MIN_UTC));
    }

    #[test]
    fn parses_foreign_offsets_into_utc() {
        let parsed = parse_utc("2026-01-02T05:04:05+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
    }
}
