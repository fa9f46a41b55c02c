use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::payload::{self, FieldPath};
use crate::types::{StatRecord, StatValue};

pub const ROW_SELECTORS: &[&str] = &[".stat__row", "div.statRow, tr"];
pub const CATEGORY_SELECTORS: &[&str] = &[".stat__category", ".statCategory"];
pub const HOME_VALUE_SELECTORS: &[&str] = &[".stat__homeValue", ".statHome"];
pub const AWAY_VALUE_SELECTORS: &[&str] = &[".stat__awayValue", ".statAway"];

const PAYLOAD_LIST_KEYS: &[&str] = &["statistics", "stats"];
const PAYLOAD_CATEGORY: &[FieldPath] = &[&["category"], &["name"], &["type"]];
const PAYLOAD_HOME: &[FieldPath] = &[&["home"], &["home_value"]];
const PAYLOAD_AWAY: &[FieldPath] = &[&["away"], &["away_value"]];

/// Strips a percent sign, normalizes decimal commas, then tries integer and
/// float. Anything else is kept as the trimmed text.
pub fn coerce_stat_value(raw: &str) -> StatValue {
    let trimmed = raw.trim();
    let normalized = trimmed.replace('%', "").replace(',', ".");
    let normalized = normalized.trim();

    if let Ok(n) = normalized.parse::<i64>() {
        return StatValue::Int(n);
    }
    match normalized.parse::<f64>() {
        Ok(f) if f.is_finite() => StatValue::Float(f),
        _ => StatValue::Text(trimmed.to_string()),
    }
}

fn compile(rules: &[&str]) -> Vec<Selector> {
    rules.iter().filter_map(|rule| Selector::parse(rule).ok()).collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(row: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        row.select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// Statistics rows from a match page. Each selector list is tried in order and
/// later entries are fallbacks for older page layouts.
pub fn parse_stats_html(html: &str) -> Vec<StatRecord> {
    let document = Html::parse_document(html);
    let categories = compile(CATEGORY_SELECTORS);
    let homes = compile(HOME_VALUE_SELECTORS);
    let aways = compile(AWAY_VALUE_SELECTORS);

    let rows: Vec<ElementRef<'_>> = compile(ROW_SELECTORS)
        .iter()
        .map(|selector| document.select(selector).collect::<Vec<_>>())
        .find(|rows| !rows.is_empty())
        .unwrap_or_default();

    rows.into_iter()
        .filter_map(|row| {
            let category = first_text(row, &categories)?;
            let home = first_text(row, &homes)?;
            let away = first_text(row, &aways)?;
            Some(StatRecord {
                category,
                home: coerce_stat_value(&home),
                away: coerce_stat_value(&away),
            })
        })
        .collect()
}

fn payload_value(value: &Value) -> StatValue {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(StatValue::Int)
            .or_else(|| n.as_f64().map(StatValue::Float))
            .unwrap_or_else(|| StatValue::Text(n.to_string())),
        Value::String(s) => coerce_stat_value(s),
        other => StatValue::Text(other.to_string()),
    }
}

/// Statistic rows carried by a provider payload. Items without a category or
/// either side's value are skipped.
pub fn parse_stats_payload(payload: &Value) -> Vec<StatRecord> {
    let items = match payload {
        Value::Array(items) => items.clone(),
        _ => PAYLOAD_LIST_KEYS
            .iter()
            .map(|key| payload::nested_list(payload, key))
            .find(|items| !items.is_empty())
            .unwrap_or_default(),
    };

    items
        .iter()
        .filter_map(|item| {
            Some(StatRecord {
                category: payload::first_string(item, PAYLOAD_CATEGORY)?,
                home: payload_value(payload::first_value(item, PAYLOAD_HOME)?),
                away: payload_value(payload::first_value(item, PAYLOAD_AWAY)?),
            })
        })
        .collect()
}

/// Whether a statistics payload carries anything worth storing.
pub fn is_empty_stats(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
