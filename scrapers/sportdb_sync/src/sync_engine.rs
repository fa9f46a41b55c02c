use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    config::SyncConfig,
    payload::{
        first_i64, first_string, match_from_payload, nested_list, COMPETITION_NAME, COMPETITION_REF,
        COMPETITION_SLUG, COUNTRY_SLUG, SEASON_LABEL,
    },
    provider::{Provider, SportDbApi},
    stats_parser::{is_empty_stats, parse_stats_payload},
    store::{MatchStore, StoreError},
    types::{CompetitionKey, CompetitionUpsert, RawPayloadPolicy, StatsPeriod, StatsUpsert},
    utils::{filter_matches_by_date_range, resolve_current_season, week_range},
};

pub use crate::types::SyncSummary;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub sports: Vec<String>,
    pub window_days: i64,
    pub stats_delay: Duration,
    pub raw_policy: RawPayloadPolicy,
}

impl EngineSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            sports: config.sports.clone(),
            window_days: config.polling.fixtures_window_days,
            stats_delay: config.polling.stats_request_delay(),
            raw_policy: config.storage.raw_payload,
        }
    }
}

/// Walks the provider hierarchy and the live list, merging what it finds
/// into the store.
pub struct SyncEngine<P, S> {
    api: SportDbApi<P>,
    store: S,
    settings: EngineSettings,
}

impl<P: Provider, S: MatchStore> SyncEngine<P, S> {
    pub fn new(provider: P, store: S, settings: EngineSettings) -> Self {
        Self {
            api: SportDbApi::new(provider),
            store,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> &P {
        self.api.provider()
    }

    pub async fn sync_fixtures_for_week(&self, today: NaiveDate) -> Result<SyncSummary, SyncError> {
        let Some((start, end)) = week_range(today, self.settings.window_days) else {
            warn!(
                "Fixture window of {} days from {} is out of range, skipping",
                self.settings.window_days, today
            );
            return Ok(SyncSummary::default());
        };
        info!("Syncing fixtures for {} to {}", start, end);
        self.sync_fixtures(start, end).await
    }

    pub async fn sync_matches_for_day(&self, day: NaiveDate) -> Result<SyncSummary, SyncError> {
        info!("Syncing matches for {}", day);
        self.sync_fixtures(day, day).await
    }

    /// Upserts every fixture dated within `[start, end]` for the current season
    /// of each competition the provider lists.
    pub async fn sync_fixtures(&self, start: NaiveDate, end: NaiveDate) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();

        for sport in &self.settings.sports {
            let countries = self.api.countries(sport).await;
            if countries.is_empty() {
                debug!("No countries listed for {}", sport);
                continue;
            }

            for country in &countries {
                let Some(country_slug) = first_string(country, COUNTRY_SLUG) else {
                    summary.skipped += 1;
                    continue;
                };

                for competition in self.api.competitions(sport, &country_slug).await {
                    self.sync_competition(sport, &country_slug, &competition, start, end, &mut summary)
                        .await?;
                }
            }
        }

        info!(
            "Fixtures sync done: {} competitions, {} matches, {} skipped",
            summary.competitions, summary.matches, summary.skipped
        );
        Ok(summary)
    }

    async fn sync_competition(
        &self,
        sport: &str,
        country_slug: &str,
        competition: &Value,
        start: NaiveDate,
        end: NaiveDate,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        let seasons = nested_list(competition, "seasons");
        let Some(season) = resolve_current_season(&seasons) else {
            debug!("Competition without seasons in {}/{}", sport, country_slug);
            summary.skipped += 1;
            return Ok(());
        };

        let (Some(competition_slug), Some(season_label)) = (
            first_string(competition, COMPETITION_SLUG),
            first_string(season, SEASON_LABEL),
        ) else {
            summary.skipped += 1;
            return Ok(());
        };
        let name = first_string(competition, COMPETITION_NAME).unwrap_or_else(|| competition_slug.clone());

        let competition_id = self
            .store
            .upsert_competition(&CompetitionUpsert {
                key: CompetitionKey {
                    sport: sport.to_string(),
                    country_slug: country_slug.to_string(),
                    competition_slug: competition_slug.clone(),
                    season: season_label.clone(),
                },
                name,
            })
            .await?;
        summary.competitions += 1;

        let fixtures = self
            .api
            .fixtures(sport, country_slug, &competition_slug, &season_label)
            .await;

        for fixture in filter_matches_by_date_range(&fixtures, start, end) {
            match match_from_payload(sport, Some(competition_id), fixture, false, &self.settings.raw_policy) {
                Some(observation) => {
                    self.store.upsert_match(&observation).await?;
                    summary.matches += 1;
                }
                None => summary.skipped += 1,
            }
        }

        Ok(())
    }

    /// Upserts every live match as live and refreshes its statistics snapshot.
    pub async fn sync_live(&self) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();

        for sport in &self.settings.sports {
            let live = self.api.live_matches(sport).await;
            if live.is_empty() {
                continue;
            }
            info!("{} live {} matches", live.len(), sport);

            for payload in &live {
                let competition_id = first_i64(payload, COMPETITION_REF);
                let Some(observation) =
                    match_from_payload(sport, competition_id, payload, true, &self.settings.raw_policy)
                else {
                    summary.skipped += 1;
                    continue;
                };

                self.store.upsert_match(&observation).await?;
                summary.matches += 1;

                self.sync_match_stats(&observation.id, &mut summary).await?;
            }
        }

        Ok(summary)
    }

    async fn sync_match_stats(&self, match_id: &str, summary: &mut SyncSummary) -> Result<(), SyncError> {
        if !self.settings.stats_delay.is_zero() {
            tokio::time::sleep(self.settings.stats_delay).await;
        }

        let payload = match self.api.match_stats(match_id).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Statistics fetch failed for match {}: {}", match_id, e);
                summary.stats_failures += 1;
                return Ok(());
            }
        };

        if is_empty_stats(&payload) {
            debug!("Empty statistics for match {}", match_id);
            return Ok(());
        }

        let categories = parse_stats_payload(&payload).len();
        self.store
            .upsert_match_stats(&StatsUpsert {
                match_id: match_id.to_string(),
                period: StatsPeriod::Full,
                payload,
            })
            .await?;
        summary.stats_snapshots += 1;
        debug!("Stored statistics for match {} ({} categories)", match_id, categories);

        Ok(())
    }
}
