use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value;

use crate::payload::{self, START_TIME};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parses an ISO-8601 style timestamp. Offsets are kept as given; timestamps
/// without an offset are read as UTC and a bare date as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    let utc = FixedOffset::east_opt(0)?;
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return utc.from_local_datetime(&naive).single();
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| utc.from_local_datetime(&naive).single())
}

/// Calendar date of a fixture, taken from its start or kickoff timestamp in
/// the timestamp's own offset.
pub fn parse_match_date(fixture: &Value) -> Option<NaiveDate> {
    let raw = payload::first_string(fixture, START_TIME)?;
    parse_timestamp(&raw).map(|ts| ts.date_naive())
}

/// Keeps fixtures whose date falls in `[start, end]`, in their original order.
/// Fixtures without a usable timestamp are dropped.
pub fn filter_matches_by_date_range(fixtures: &[Value], start: NaiveDate, end: NaiveDate) -> Vec<&Value> {
    fixtures
        .iter()
        .filter(|fixture| {
            parse_match_date(fixture)
                .map(|date| start <= date && date <= end)
                .unwrap_or(false)
        })
        .collect()
}

/// `[today, today + window_days]`, or `None` when the end falls outside the
/// representable calendar.
pub fn week_range(today: NaiveDate, window_days: i64) -> Option<(NaiveDate, NaiveDate)> {
    let days = u64::try_from(window_days).ok()?;
    let end = today.checked_add_days(Days::new(days))?;
    Some((today, end))
}

/// The season flagged `current`, or the last one in provider order.
pub fn resolve_current_season(seasons: &[Value]) -> Option<&Value> {
    seasons
        .iter()
        .find(|season| payload::is_flagged(season, "current"))
        .or_else(|| seasons.last())
}
