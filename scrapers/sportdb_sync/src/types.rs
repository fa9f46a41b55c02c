use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

/// Natural key of a competition row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CompetitionKey {
    pub sport: String,
    pub country_slug: String,
    pub competition_slug: String,
    pub season: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompetitionUpsert {
    pub key: CompetitionKey,
    pub name: String,
}

/// One observation of a match, from either the fixtures walk, the live list
/// or a listings page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchUpsert {
    pub id: String,
    pub competition_id: Option<i64>,
    pub sport: String,
    pub status: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub is_live: bool,
    pub raw: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StatsPeriod {
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "1st_half")]
    FirstHalf,
    #[serde(rename = "2nd_half")]
    SecondHalf,
}

impl StatsPeriod {
    pub const ALL: [StatsPeriod; 3] = [StatsPeriod::Full, StatsPeriod::FirstHalf, StatsPeriod::SecondHalf];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Full => "full",
            StatsPeriod::FirstHalf => "1st_half",
            StatsPeriod::SecondHalf => "2nd_half",
        }
    }

    /// Index used by the listings site in its statistics page path.
    pub fn page_index(&self) -> u8 {
        match self {
            StatsPeriod::Full => 0,
            StatsPeriod::FirstHalf => 1,
            StatsPeriod::SecondHalf => 2,
        }
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsUpsert {
    pub match_id: String,
    pub period: StatsPeriod,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatRecord {
    pub category: String,
    pub home: StatValue,
    pub away: StatValue,
}

/// What happens to earlier statistics snapshots when a new one is written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep only the current snapshot per (match, period).
    #[default]
    Latest,
    /// Replace the current snapshot and append every write to the history table.
    History,
}

impl FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(RetentionPolicy::Latest),
            "history" => Ok(RetentionPolicy::History),
            other => Err(format!("unknown stats retention policy: {}", other)),
        }
    }
}

/// Size cap for the upstream payload kept on a match row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawPayloadPolicy {
    pub max_bytes: usize,
}

impl Default for RawPayloadPolicy {
    fn default() -> Self {
        Self { max_bytes: 64 * 1024 }
    }
}

impl RawPayloadPolicy {
    pub fn retain(&self, payload: &Value) -> Option<Value> {
        if self.max_bytes == 0 {
            return None;
        }
        let size = serde_json::to_vec(payload).map(|bytes| bytes.len()).ok()?;
        (size <= self.max_bytes).then(|| payload.clone())
    }
}

/// Counts produced by one run of a sync routine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub competitions: u64,
    pub matches: u64,
    pub stats_snapshots: u64,
    pub skipped: u64,
    pub stats_failures: u64,
}

impl SyncSummary {
    pub fn absorb(&mut self, other: SyncSummary) {
        self.competitions += other.competitions;
        self.matches += other.matches;
        self.stats_snapshots += other.stats_snapshots;
        self.skipped += other.skipped;
        self.stats_failures += other.stats_failures;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_payload_policy() {
        let payload = json!({"id": 1, "home_team": "Benfica"});
        let size = serde_json::to_vec(&payload).unwrap().len();

        assert_eq!(RawPayloadPolicy { max_bytes: size }.retain(&payload), Some(payload.clone()));
        assert_eq!(RawPayloadPolicy { max_bytes: size - 1 }.retain(&payload), None);
        assert_eq!(RawPayloadPolicy { max_bytes: 0 }.retain(&payload), None);
    }

    #[test]
    fn test_stat_value_serializes_untagged() {
        let record = StatRecord {
            category: "Ball Possession".to_string(),
            home: StatValue::Int(55),
            away: StatValue::Text("N/A".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"category": "Ball Possession", "home": 55, "away": "N/A"})
        );
    }

    #[test]
    fn test_summary_absorb() {
        let mut total = SyncSummary { matches: 2, ..SyncSummary::default() };
        total.absorb(SyncSummary { matches: 3, stats_failures: 1, ..SyncSummary::default() });
        assert_eq!(total, SyncSummary { matches: 5, stats_failures: 1, ..SyncSummary::default() });
    }

    #[test]
    fn test_retention_policy_from_str() {
        assert_eq!("History".parse::<RetentionPolicy>(), Ok(RetentionPolicy::History));
        assert_eq!(" latest ".parse::<RetentionPolicy>(), Ok(RetentionPolicy::Latest));
        assert!("forever".parse::<RetentionPolicy>().is_err());
    }
}
