//! Wire datetime parsing (§4.1 "Datetime formats accepted"). Every
//! protocol eventually normalizes through here to RFC-3339 UTC — the one
//! representation the canonical envelope is allowed to carry.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Tries, in order: RFC-3339 (unambiguous, so tried first), `YYMMDDhhmmss`,
/// `YYYYMMDDhhmmss`, `YYYY-MM-DD hh:mm:ss`. Returns `None` rather than
/// guessing when nothing matches — callers fall back to a later field
/// position or leave `Datetime` null (§4.2.1 edge policy).
pub fn parse(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    const FORMATS: [&str; 3] = ["%y%m%d%H%M%S", "%Y%m%d%H%M%S", "%Y-%m-%d %H:%M:%S"];
    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    None
}

/// Seconds-since-2000-01-01T00:00:00Z, the Meitrack CCE/CFF TLV datetime
/// encoding (§4.2.1 ID 0x04).
pub fn from_seconds_since_2000(seconds: i64) -> Option<DateTime<Utc>> {
    const EPOCH_2000_UNIX: i64 = 946_684_800;
    DateTime::from_timestamp(EPOCH_2000_UNIX + seconds, 0)
}

/// Unix-epoch seconds, the Ruptela extended-records timestamp encoding.
pub fn from_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_documented_format() {
        assert!(parse("241205120405").is_some());
        assert!(parse("20241205120405").is_some());
        assert!(parse("2024-12-05 12:04:05").is_some());
        assert!(parse("2024-12-05T12:04:05Z").is_some());
    }

    #[test]
    fn rejects_garbage_without_panicking() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("not a date"), None);
    }

    #[test]
    fn seconds_since_2000_matches_known_epoch() {
        let dt = from_seconds_since_2000(0).unwrap();
        assert_eq!(dt.to_rfc3339(), "2000-01-01T00:00:00+00:00");
    }
}
