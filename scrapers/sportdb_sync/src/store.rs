use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CompetitionUpsert, MatchUpsert, StatsUpsert, SyncSummary};

pub use crate::types::RetentionPolicy;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("could not serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one routine invocation, persisted for operators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRun {
    pub routine: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: String,
    pub summary: SyncSummary,
    pub error_message: Option<String>,
}

impl SyncRun {
    pub fn new(routine: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            routine: routine.to_string(),
            started_at,
            finished_at: started_at,
            status: "running".to_string(),
            summary: SyncSummary::default(),
            error_message: None,
        }
    }

    pub fn complete(&mut self, summary: SyncSummary, finished_at: DateTime<Utc>) {
        self.finished_at = finished_at;
        self.status = "success".to_string();
        self.summary = summary;
    }

    pub fn fail(&mut self, error: &str, finished_at: DateTime<Utc>) {
        self.finished_at = finished_at;
        self.status = "error".to_string();
        self.error_message = Some(error.to_string());
    }
}

/// Idempotent writes keyed by natural identifiers. Every call is its own unit
/// of work, so repeating a call after a crash is safe.
#[allow(async_fn_in_trait)]
pub trait MatchStore {
    /// Inserts or renames the competition and returns its surrogate id.
    async fn upsert_competition(&self, competition: &CompetitionUpsert) -> Result<i64, StoreError>;

    /// Merges a match observation. The competition reference and schedule
    /// fields are only strengthened; status, scores, liveness and the raw
    /// payload follow the latest observation.
    async fn upsert_match(&self, observation: &MatchUpsert) -> Result<(), StoreError>;

    /// Replaces the snapshot for `(match_id, period)`.
    async fn upsert_match_stats(&self, stats: &StatsUpsert) -> Result<(), StoreError>;

    async fn record_run(&self, run: &SyncRun) -> Result<(), StoreError>;
}
