//! Shared parsing utilities for violation records.
//!
//! Issue timestamps, violation times of day and coordinates arrive as text
//! in several shapes; these helpers turn them into typed values or `None`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone as _, Utc};

/// Naive date-time layouts accepted for `issue_date`.
const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Date-only layouts accepted for `issue_date`.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parses an issue timestamp into a UTC instant.
///
/// When `issue_date` carries an explicit UTC offset (or `Z`), that offset
/// is used and `violation_time` is ignored. Otherwise the value is a
/// local wall-clock time: when it has no time of day (date only, or
/// exactly midnight) the time comes from `violation_time` if that parses,
/// and the result is interpreted at `source_offset`.
///
/// Returns `None` if `issue_date` is unparsable.
#[must_use]
pub fn parse_issue_timestamp(
    issue_date: &str,
    violation_time: Option<&str>,
    source_offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let issue_date = issue_date.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(issue_date) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = parse_naive(issue_date)?;
    let naive = if naive.time() == NaiveTime::MIN {
        violation_time
            .and_then(parse_violation_time)
            .map_or(naive, |time| naive.date().and_time(time))
    } else {
        naive
    };

    source_offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Parses the calendar date of an issue date as written, in any layout
/// [`parse_issue_timestamp`] accepts. An explicit offset does not shift
/// the date.
#[must_use]
pub fn parse_issue_date(issue_date: &str) -> Option<NaiveDate> {
    let issue_date = issue_date.trim();
    DateTime::parse_from_rfc3339(issue_date)
        .ok()
        .map(|dt| dt.date_naive())
        .or_else(|| parse_naive(issue_date).map(|naive| naive.date()))
}

/// Parses a violation time of day.
///
/// Accepts `HHMM` (24-hour), `HHMM` followed by `A`/`P` (12-hour clock,
/// `12` meaning midnight or noon), and `HH:MM`.
#[must_use]
pub fn parse_violation_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim().to_ascii_uppercase();
    let (digits, meridiem) = match s.strip_suffix('A') {
        Some(rest) => (rest, Some(false)),
        None => match s.strip_suffix('P') {
            Some(rest) => (rest, Some(true)),
            None => (s.as_str(), None),
        },
    };
    let digits = digits.replace(':', "");
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hour: u32 = digits[..2].parse().ok()?;
    let minute: u32 = digits[2..].parse().ok()?;

    let hour = match meridiem {
        None => hour,
        Some(_) if hour > 12 => return None,
        Some(false) => hour % 12,
        Some(true) => hour % 12 + 12,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parses a `+HH:MM` / `-HH:MM` UTC offset.
#[must_use]
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    s.trim().parse::<FixedOffset>().ok()
}

/// Parses lat/lng from optional string fields. Returns `None` if missing,
/// unparseable, zero, or outside WGS84 ranges.
#[must_use]
pub fn parse_lat_lng_str(lat: Option<&str>, lng: Option<&str>) -> Option<(f64, f64)> {
    let latitude = lat?.trim().parse::<f64>().ok()?;
    let longitude = lng?.trim().parse::<f64>().ok()?;
    if latitude == 0.0
        || longitude == 0.0
        || !(-90.0..=90.0).contains(&latitude)
        || !(-180.0..=180.0).contains(&longitude)
    {
        return None;
    }
    Some((latitude, longitude))
}
