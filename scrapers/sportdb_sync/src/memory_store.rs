use serde_json::Value;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    store::{MatchStore, RetentionPolicy, StoreError, SyncRun},
    types::{CompetitionKey, CompetitionUpsert, MatchUpsert, StatsPeriod, StatsUpsert},
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCompetition {
    pub id: i64,
    pub name: String,
}

/// Run records kept in memory; older ones are dropped first.
pub const MAX_RUN_RECORDS: usize = 500;

/// Statistics history entries kept in memory; older ones are dropped first.
pub const MAX_STATS_HISTORY: usize = 5_000;

#[derive(Default)]
struct Inner {
    next_competition_id: i64,
    competitions: HashMap<CompetitionKey, StoredCompetition>,
    matches: HashMap<String, MatchUpsert>,
    stats: HashMap<(String, StatsPeriod), Value>,
    stats_history: VecDeque<StatsUpsert>,
    runs: VecDeque<SyncRun>,
    unavailable: bool,
}

/// In-process store with the same merge rules as the Postgres store. Clones
/// share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    retention: RetentionPolicy,
}

fn push_bounded<T>(entries: &mut VecDeque<T>, entry: T, limit: usize) {
    if entries.len() >= limit {
        entries.pop_front();
    }
    entries.push_back(entry);
}

fn merge_match(existing: &mut MatchUpsert, observation: &MatchUpsert) {
    existing.competition_id = observation.competition_id.or(existing.competition_id);
    existing.start_time = observation.start_time.or(existing.start_time);
    existing.home_team = observation.home_team.clone().or_else(|| existing.home_team.take());
    existing.away_team = observation.away_team.clone().or_else(|| existing.away_team.take());

    existing.sport = observation.sport.clone();
    existing.status = observation.status.clone();
    existing.home_score = observation.home_score;
    existing.away_score = observation.away_score;
    existing.is_live = observation.is_live;
    existing.raw = observation.raw.clone();
}

impl MemoryStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writable(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(inner)
    }

    /// Makes every subsequent write fail, as if the database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn competition(&self, key: &CompetitionKey) -> Option<StoredCompetition> {
        self.lock().competitions.get(key).cloned()
    }

    pub fn competition_count(&self) -> usize {
        self.lock().competitions.len()
    }

    pub fn get_match(&self, id: &str) -> Option<MatchUpsert> {
        self.lock().matches.get(id).cloned()
    }

    pub fn match_count(&self) -> usize {
        self.lock().matches.len()
    }

    pub fn stats(&self, match_id: &str, period: StatsPeriod) -> Option<Value> {
        self.lock().stats.get(&(match_id.to_string(), period)).cloned()
    }

    pub fn stats_count(&self) -> usize {
        self.lock().stats.len()
    }

    pub fn stats_history(&self, match_id: &str) -> Vec<StatsUpsert> {
        self.lock()
            .stats_history
            .iter()
            .filter(|entry| entry.match_id == match_id)
            .cloned()
            .collect()
    }

    pub fn runs(&self) -> Vec<SyncRun> {
        self.lock().runs.iter().cloned().collect()
    }
}

impl MatchStore for MemoryStore {
    async fn upsert_competition(&self, competition: &CompetitionUpsert) -> Result<i64, StoreError> {
        let mut inner = self.writable()?;
        if let Some(existing) = inner.competitions.get_mut(&competition.key) {
            existing.name = competition.name.clone();
            return Ok(existing.id);
        }

        inner.next_competition_id += 1;
        let id = inner.next_competition_id;
        inner.competitions.insert(
            competition.key.clone(),
            StoredCompetition {
                id,
                name: competition.name.clone(),
            },
        );
        Ok(id)
    }

    async fn upsert_match(&self, observation: &MatchUpsert) -> Result<(), StoreError> {
        let mut inner = self.writable()?;
        inner
            .matches
            .entry(observation.id.clone())
            .and_modify(|stored| merge_match(stored, observation))
            .or_insert_with(|| observation.clone());
        Ok(())
    }

    async fn upsert_match_stats(&self, stats: &StatsUpsert) -> Result<(), StoreError> {
        let mut inner = self.writable()?;
        inner
            .stats
            .insert((stats.match_id.clone(), stats.period), stats.payload.clone());
        if self.retention == RetentionPolicy::History {
            push_bounded(&mut inner.stats_history, stats.clone(), MAX_STATS_HISTORY);
        }
        Ok(())
    }

    async fn record_run(&self, run: &SyncRun) -> Result<(), StoreError> {
        push_bounded(&mut self.writable()?.runs, run.clone(), MAX_RUN_RECORDS);
        Ok(())
    }
}
