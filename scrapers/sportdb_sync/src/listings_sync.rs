use chrono::NaiveDate;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    listings::{parse_listing, stats_page_url, ListedMatch},
    provider::HtmlFetcher,
    stats_parser::parse_stats_html,
    store::{MatchStore, StoreError},
    sync_engine::SyncError,
    types::{MatchUpsert, RawPayloadPolicy, StatsPeriod, StatsUpsert, SyncSummary},
};

#[derive(Debug, Clone)]
pub struct ListingsSettings {
    pub url: String,
    pub sport: String,
    pub stats_delay: Duration,
    pub raw_policy: RawPayloadPolicy,
}

/// Scrapes a match listing page, upserting every listed match and the
/// per-period statistics of those in play.
pub struct ListingsSync<H, S> {
    fetcher: H,
    store: S,
    settings: ListingsSettings,
}

impl<H: HtmlFetcher, S: MatchStore> ListingsSync<H, S> {
    pub fn new(fetcher: H, store: S, settings: ListingsSettings) -> Self {
        Self {
            fetcher,
            store,
            settings,
        }
    }

    pub fn fetcher(&self) -> &H {
        &self.fetcher
    }

    fn observation(&self, listed: &ListedMatch, today: NaiveDate) -> MatchUpsert {
        let raw = json!({
            "league": listed.league,
            "match_url": listed.match_url,
            "observed_on": today.to_string(),
            "status": listed.status,
        });

        MatchUpsert {
            id: listed.id.clone(),
            competition_id: None,
            sport: self.settings.sport.clone(),
            status: (!listed.status.is_empty()).then(|| listed.status.clone()),
            start_time: None,
            home_team: Some(listed.home_team.clone()),
            away_team: Some(listed.away_team.clone()),
            home_score: listed.home_score,
            away_score: listed.away_score,
            is_live: listed.is_live,
            raw: self.settings.raw_policy.retain(&raw),
        }
    }

    pub async fn sync(&self, today: NaiveDate) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();

        let html = match self.fetcher.fetch_html(&self.settings.url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Could not fetch listing {}: {}", self.settings.url, e);
                return Ok(summary);
            }
        };

        let listed = parse_listing(&html, &self.settings.url);
        info!("Found {} matches on {}", listed.len(), self.settings.url);

        for entry in &listed {
            self.store.upsert_match(&self.observation(entry, today)).await?;
            summary.matches += 1;

            if let (true, Some(match_url)) = (entry.is_live, entry.match_url.as_deref()) {
                debug!("Collecting live statistics: {} vs {}", entry.home_team, entry.away_team);
                self.sync_period_stats(&entry.id, match_url, &mut summary).await?;
            }
        }

        Ok(summary)
    }

    async fn sync_period_stats(
        &self,
        match_id: &str,
        match_url: &str,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        for period in StatsPeriod::ALL {
            let Some(url) = stats_page_url(match_url, period.page_index()) else {
                continue;
            };

            if !self.settings.stats_delay.is_zero() {
                tokio::time::sleep(self.settings.stats_delay).await;
            }

            let html = match self.fetcher.fetch_html(&url).await {
                Ok(html) => html,
                Err(e) => {
                    debug!("Skipping {} statistics for {}: {}", period, match_id, e);
                    summary.stats_failures += 1;
                    continue;
                }
            };

            let records = parse_stats_html(&html);
            if records.is_empty() {
                continue;
            }

            let payload = serde_json::to_value(&records).map_err(|source| {
                SyncError::Store(StoreError::Serialize {
                    what: "statistics",
                    source,
                })
            })?;
            self.store
                .upsert_match_stats(&StatsUpsert {
                    match_id: match_id.to_string(),
                    period,
                    payload,
                })
                .await?;
            summary.stats_snapshots += 1;
        }

        Ok(())
    }
}
