//! Date helpers for the loosely formatted dates stored by the panel

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Parse an expiration value into a UTC instant.
///
/// Accepts RFC 3339, ISO date-times without offset (read as UTC), plain ISO
/// dates (midnight UTC) and the French `DD/MM/YYYY` form. Anything else is
/// `None`, which callers treat as "no expiration".
pub fn parse_expiration(value: &str) -> Option<DateTime<Utc>> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00")) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN).and_utc());
    }

    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    NaiveDate::parse_from_str(&compact, "%d/%m/%Y")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Calendar date of an expiration value, if it parses.
pub fn parse_expiration_date(value: &str) -> Option<NaiveDate> {
    parse_expiration(value).map(|dt| dt.date_naive())
}

/// Current instant formatted the way every timestamp column stores it.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
