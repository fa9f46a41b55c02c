use serde::{Deserialize, Serialize};
use std::{env, str::FromStr, time::Duration};
use tracing::warn;

use crate::types::{RawPayloadPolicy, RetentionPolicy};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sportdb.dev".to_string(),
            api_key: None,
            user_agent: "Mozilla/5.0 (compatible; sportdb-sync/0.1)".to_string(),
            request_timeout_secs: 10,
            requests_per_second: 5,
        }
    }
}

/// Upper bound on the forward window of the weekly fixtures routine.
pub const MAX_FIXTURES_WINDOW_DAYS: i64 = 366;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    pub live_poll_secs: u64,
    pub fixtures_poll_secs: u64,
    pub day_poll_secs: u64,
    pub fixtures_window_days: i64,
    pub stats_request_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            live_poll_secs: 30,
            fixtures_poll_secs: 60 * 10,
            day_poll_secs: 60 * 10,
            fixtures_window_days: 7,
            stats_request_delay_ms: 1000,
        }
    }
}

impl PollingConfig {
    pub fn live_interval(&self) -> Duration {
        Duration::from_secs(self.live_poll_secs)
    }

    pub fn fixtures_interval(&self) -> Duration {
        Duration::from_secs(self.fixtures_poll_secs)
    }

    pub fn day_interval(&self) -> Duration {
        Duration::from_secs(self.day_poll_secs)
    }

    pub fn stats_request_delay(&self) -> Duration {
        Duration::from_millis(self.stats_request_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingsConfig {
    pub url: Option<String>,
    pub poll_secs: u64,
    pub sport: String,
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self {
            url: None,
            poll_secs: 120,
            sport: "football".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StorageConfig {
    pub stats_retention: RetentionPolicy,
    pub raw_payload: RawPayloadPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub sports: Vec<String>,
    pub polling: PollingConfig,
    pub listings: ListingsConfig,
    pub storage: StorageConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            provider: ProviderConfig::default(),
            sports: vec![
                "football".to_string(),
                "basketball".to_string(),
                "tennis".to_string(),
            ],
            polling: PollingConfig::default(),
            listings: ListingsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, starting from defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| get(key).and_then(|raw| parse_or_warn::<u64>(key, &raw));

        if let Some(url) = get("DATABASE_URL") {
            config.database.url = Some(url);
        }
        if let Some(n) = get("DB_MAX_CONNECTIONS").and_then(|raw| parse_or_warn::<u32>("DB_MAX_CONNECTIONS", &raw)) {
            config.database.max_connections = n;
        }

        if let Some(base_url) = get("SPORTDB_BASE_URL") {
            config.provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        config.provider.api_key = get("SPORTDB_API_KEY");
        if let Some(user_agent) = get("SCRAPER_USER_AGENT") {
            config.provider.user_agent = user_agent;
        }
        if let Some(timeout) = number("SCRAPER_TIMEOUT_SECS") {
            config.provider.request_timeout_secs = timeout;
        }
        if let Some(rps) = get("RATE_LIMIT_RPS").and_then(|raw| parse_or_warn::<u32>("RATE_LIMIT_RPS", &raw)) {
            config.provider.requests_per_second = rps;
        }

        if let Some(sports) = get("SPORTS") {
            let sports: Vec<String> = sports
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !sports.is_empty() {
                config.sports = sports;
            }
        }

        if let Some(secs) = number("LIVE_POLL_INTERVAL_SECS") {
            config.polling.live_poll_secs = secs;
        }
        if let Some(secs) = number("FIXTURES_POLL_INTERVAL_SECS") {
            config.polling.fixtures_poll_secs = secs;
            config.polling.day_poll_secs = secs;
        }
        if let Some(secs) = number("DAY_POLL_INTERVAL_SECS") {
            config.polling.day_poll_secs = secs;
        }
        if let Some(days) = get("FIXTURES_WINDOW_DAYS").and_then(|raw| parse_or_warn::<i64>("FIXTURES_WINDOW_DAYS", &raw)) {
            if days > MAX_FIXTURES_WINDOW_DAYS {
                warn!(
                    "FIXTURES_WINDOW_DAYS={} exceeds {}, capping",
                    days, MAX_FIXTURES_WINDOW_DAYS
                );
            }
            config.polling.fixtures_window_days = days.clamp(0, MAX_FIXTURES_WINDOW_DAYS);
        }
        if let Some(ms) = number("STATS_REQUEST_DELAY_MS") {
            config.polling.stats_request_delay_ms = ms;
        }

        config.listings.url = get("LISTINGS_URL");
        if let Some(secs) = number("LISTINGS_POLL_INTERVAL_SECS") {
            config.listings.poll_secs = secs;
        }
        if let Some(sport) = get("LISTINGS_SPORT") {
            config.listings.sport = sport.trim().to_lowercase();
        }

        if let Some(policy) = get("STATS_RETENTION").and_then(|raw| parse_or_warn::<RetentionPolicy>("STATS_RETENTION", &raw)) {
            config.storage.stats_retention = policy;
        }
        if let Some(max_bytes) = get("RAW_PAYLOAD_MAX_BYTES").and_then(|raw| parse_or_warn::<usize>("RAW_PAYLOAD_MAX_BYTES", &raw)) {
            config.storage.raw_payload.max_bytes = max_bytes;
        }

        config
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database
            .url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = SyncConfig::from_lookup(lookup(&[]));
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.database_url(), Err(ConfigError::MissingDatabaseUrl));
        assert_eq!(config.polling.live_interval(), Duration::from_secs(30));
        assert_eq!(config.polling.fixtures_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/sportdb"),
            ("SPORTDB_BASE_URL", "http://127.0.0.1:8080/"),
            ("SPORTDB_API_KEY", "secret"),
            ("SPORTS", "Football, handball,,"),
            ("FIXTURES_POLL_INTERVAL_SECS", "300"),
            ("STATS_RETENTION", "history"),
            ("RAW_PAYLOAD_MAX_BYTES", "0"),
            ("LISTINGS_URL", "https://www.flashscore.pt/futebol/"),
        ]));

        assert_eq!(config.database_url(), Ok("postgres://localhost/sportdb"));
        assert_eq!(config.provider.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.provider.api_key.as_deref(), Some("secret"));
        assert_eq!(config.sports, vec!["football".to_string(), "handball".to_string()]);
        assert_eq!(config.polling.fixtures_poll_secs, 300);
        assert_eq!(config.polling.day_poll_secs, 300);
        assert_eq!(config.storage.stats_retention, RetentionPolicy::History);
        assert_eq!(config.storage.raw_payload.max_bytes, 0);
        assert_eq!(config.listings.url.as_deref(), Some("https://www.flashscore.pt/futebol/"));
    }

    #[test]
    fn test_day_interval_tracked_separately() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("FIXTURES_POLL_INTERVAL_SECS", "900"),
            ("DAY_POLL_INTERVAL_SECS", "120"),
        ]));
        assert_eq!(config.polling.fixtures_poll_secs, 900);
        assert_eq!(config.polling.day_poll_secs, 120);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("LIVE_POLL_INTERVAL_SECS", "soon"),
            ("STATS_RETENTION", "forever"),
            ("SPORTDB_API_KEY", "  "),
        ]));
        assert_eq!(config.polling.live_poll_secs, 30);
        assert_eq!(config.storage.stats_retention, RetentionPolicy::Latest);
        assert_eq!(config.provider.api_key, None);
    }

    #[test]
    fn test_fixture_window_is_bounded() {
        let huge = SyncConfig::from_lookup(lookup(&[("FIXTURES_WINDOW_DAYS", "100000000")]));
        assert_eq!(huge.polling.fixtures_window_days, MAX_FIXTURES_WINDOW_DAYS);

        let negative = SyncConfig::from_lookup(lookup(&[("FIXTURES_WINDOW_DAYS", "-3")]));
        assert_eq!(negative.polling.fixtures_window_days, 0);

        let custom = SyncConfig::from_lookup(lookup(&[("FIXTURES_WINDOW_DAYS", "14")]));
        assert_eq!(custom.polling.fixtures_window_days, 14);
    }
}
