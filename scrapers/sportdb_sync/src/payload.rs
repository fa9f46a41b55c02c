use chrono::Utc;
use serde_json::Value;

use crate::types::{MatchUpsert, RawPayloadPolicy};
use crate::utils::parse_timestamp;

/// A path into a JSON object, one key per level. Each logical field below is
/// an ordered list of paths; the first that yields a non-null, non-empty value
/// wins.
pub type FieldPath = &'static [&'static str];

pub const COUNTRY_SLUG: &[FieldPath] = &[&["slug"], &["code"], &["id"]];
pub const COMPETITION_SLUG: &[FieldPath] = &[&["slug"], &["competition_slug"]];
pub const COMPETITION_NAME: &[FieldPath] = &[&["name"], &["slug"], &["competition_slug"]];
pub const SEASON_LABEL: &[FieldPath] = &[&["name"], &["season"], &["id"]];
pub const MATCH_ID: &[FieldPath] = &[&["id"]];
pub const START_TIME: &[FieldPath] = &[&["start_time"], &["kickoff_time"]];
pub const HOME_TEAM: &[FieldPath] = &[&["home_team"], &["home", "name"]];
pub const AWAY_TEAM: &[FieldPath] = &[&["away_team"], &["away", "name"]];
pub const HOME_SCORE: &[FieldPath] = &[&["home_score"], &["home", "score"]];
pub const AWAY_SCORE: &[FieldPath] = &[&["away_score"], &["away", "score"]];
pub const STATUS: &[FieldPath] = &[&["status"]];
pub const COMPETITION_REF: &[FieldPath] = &[&["competition_id"]];

fn at_path<'a>(payload: &'a Value, path: FieldPath) -> Option<&'a Value> {
    path.iter().try_fold(payload, |value, key| value.get(*key))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// First present value following the rule order.
pub fn first_value<'a>(payload: &'a Value, rules: &[FieldPath]) -> Option<&'a Value> {
    rules
        .iter()
        .filter_map(|path| at_path(payload, path))
        .find(|value| is_present(value))
}

/// First value that can be read as text. Numbers are rendered as text.
pub fn first_string(payload: &Value, rules: &[FieldPath]) -> Option<String> {
    rules
        .iter()
        .filter_map(|path| at_path(payload, path))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// First value that can be read as an integer. Numeric strings are accepted.
pub fn first_i64(payload: &Value, rules: &[FieldPath]) -> Option<i64> {
    rules
        .iter()
        .filter_map(|path| at_path(payload, path))
        .find_map(|value| match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
}

pub fn first_i32(payload: &Value, rules: &[FieldPath]) -> Option<i32> {
    first_i64(payload, rules).and_then(|n| i32::try_from(n).ok())
}

pub fn is_flagged(payload: &Value, key: &str) -> bool {
    match payload.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map_or(false, |n| n != 0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

/// List carried by a provider response: either a bare array or an array under `key`.
pub fn list_from_payload(payload: &Value, key: &str) -> Vec<Value> {
    match payload {
        Value::Array(items) => items.clone(),
        Value::Object(_) => nested_list(payload, key),
        _ => Vec::new(),
    }
}

/// Array under `key`, or empty when absent or of another type.
pub fn nested_list(payload: &Value, key: &str) -> Vec<Value> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Builds a match observation from a provider record. Returns `None` when the
/// record carries no identifier.
pub fn match_from_payload(
    sport: &str,
    competition_id: Option<i64>,
    payload: &Value,
    is_live: bool,
    raw_policy: &RawPayloadPolicy,
) -> Option<MatchUpsert> {
    let id = first_string(payload, MATCH_ID)?;
    let start_time = first_string(payload, START_TIME)
        .and_then(|ts| parse_timestamp(&ts))
        .map(|ts| ts.with_timezone(&Utc));

    Some(MatchUpsert {
        id,
        competition_id,
        sport: sport.to_string(),
        status: first_string(payload, STATUS),
        start_time,
        home_team: first_string(payload, HOME_TEAM),
        away_team: first_string(payload, AWAY_TEAM),
        home_score: first_i32(payload, HOME_SCORE),
        away_score: first_i32(payload, AWAY_SCORE),
        is_live,
        raw: raw_policy.retain(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_fallback_chain_prefers_first_present_path() {
        let flat = json!({"home_team": "Porto", "home": {"name": "FC Porto"}});
        let nested = json!({"home_team": null, "home": {"name": "FC Porto"}});
        let blank = json!({"home_team": "  ", "home": {"name": "FC Porto"}});

        assert_eq!(first_string(&flat, HOME_TEAM).as_deref(), Some("Porto"));
        assert_eq!(first_string(&nested, HOME_TEAM).as_deref(), Some("FC Porto"));
        assert_eq!(first_string(&blank, HOME_TEAM).as_deref(), Some("FC Porto"));
        assert_eq!(first_string(&json!({}), HOME_TEAM), None);
    }

    #[test]
    fn test_numeric_identifiers_render_as_text() {
        let country = json!({"id": 17});
        assert_eq!(first_string(&country, COUNTRY_SLUG).as_deref(), Some("17"));

        let season = json!({"id": 2024, "current": true});
        assert_eq!(first_string(&season, SEASON_LABEL).as_deref(), Some("2024"));
    }

    #[test]
    fn test_zero_score_does_not_fall_through() {
        let payload = json!({"home_score": 0, "home": {"score": 3}, "away_score": "2"});
        assert_eq!(first_i32(&payload, HOME_SCORE), Some(0));
        assert_eq!(first_i32(&payload, AWAY_SCORE), Some(2));
    }

    #[test]
    fn test_list_from_payload_shapes() {
        let wrapped = json!({"countries": [{"slug": "portugal"}]});
        let bare = json!([{"slug": "spain"}, {"slug": "italy"}]);
        let other = json!({"error": "rate limited"});

        assert_eq!(list_from_payload(&wrapped, "countries").len(), 1);
        assert_eq!(list_from_payload(&bare, "countries").len(), 2);
        assert!(list_from_payload(&other, "countries").is_empty());
        assert!(list_from_payload(&json!("oops"), "countries").is_empty());
        assert!(nested_list(&json!({"competitions": null}), "competitions").is_empty());
    }

    #[test]
    fn test_is_flagged() {
        assert!(is_flagged(&json!({"current": true}), "current"));
        assert!(is_flagged(&json!({"current": 1}), "current"));
        assert!(is_flagged(&json!({"current": "true"}), "current"));
        assert!(!is_flagged(&json!({"current": false}), "current"));
        assert!(!is_flagged(&json!({}), "current"));
    }

    #[test]
    fn test_match_from_payload() {
        let payload = json!({
            "id": 991,
            "kickoff_time": "2024-05-07T19:45:00Z",
            "home": {"name": "Sporting CP", "score": 2},
            "away": {"name": "SL Benfica", "score": 1},
            "status": "finished"
        });

        let upsert = match_from_payload("football", Some(4), &payload, false, &RawPayloadPolicy::default())
            .expect("payload has an id");

        assert_eq!(upsert.id, "991");
        assert_eq!(upsert.competition_id, Some(4));
        assert_eq!(upsert.start_time, Some(Utc.with_ymd_and_hms(2024, 5, 7, 19, 45, 0).unwrap()));
        assert_eq!(upsert.home_team.as_deref(), Some("Sporting CP"));
        assert_eq!(upsert.away_team.as_deref(), Some("SL Benfica"));
        assert_eq!((upsert.home_score, upsert.away_score), (Some(2), Some(1)));
        assert_eq!(upsert.status.as_deref(), Some("finished"));
        assert_eq!(upsert.raw, Some(payload));
    }

    #[test]
    fn test_match_without_id_is_skipped() {
        let payload = json!({"home_team": "A", "away_team": "B"});
        assert!(match_from_payload("tennis", None, &payload, true, &RawPayloadPolicy::default()).is_none());
    }
}
