use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    types::Json,
};
use tracing::info;

use crate::{
    store::{MatchStore, RetentionPolicy, StoreError, SyncRun},
    types::{CompetitionUpsert, MatchUpsert, StatsUpsert},
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS competitions (
        id BIGSERIAL PRIMARY KEY,
        sport TEXT NOT NULL,
        country_slug TEXT NOT NULL,
        competition_slug TEXT NOT NULL,
        season TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (sport, country_slug, competition_slug, season)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        id TEXT PRIMARY KEY,
        competition_id BIGINT,
        sport TEXT NOT NULL,
        status TEXT,
        start_time TIMESTAMPTZ,
        home_team TEXT,
        away_team TEXT,
        home_score INTEGER,
        away_score INTEGER,
        is_live BOOLEAN NOT NULL DEFAULT FALSE,
        raw JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS matches_live_idx ON matches (is_live) WHERE is_live",
    r#"
    CREATE TABLE IF NOT EXISTS match_stats (
        match_id TEXT NOT NULL,
        period TEXT NOT NULL,
        stats JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (match_id, period)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS match_stats_history (
        id BIGSERIAL PRIMARY KEY,
        match_id TEXT NOT NULL,
        period TEXT NOT NULL,
        stats JSONB NOT NULL,
        captured_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS match_stats_history_match_idx ON match_stats_history (match_id, period, captured_at)",
    r#"
    CREATE TABLE IF NOT EXISTS sync_runs (
        id BIGSERIAL PRIMARY KEY,
        routine TEXT NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL,
        competitions BIGINT NOT NULL DEFAULT 0,
        matches BIGINT NOT NULL DEFAULT 0,
        stats_snapshots BIGINT NOT NULL DEFAULT 0,
        skipped BIGINT NOT NULL DEFAULT 0,
        stats_failures BIGINT NOT NULL DEFAULT 0,
        error_message TEXT
    )
    "#,
];

fn count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    retention: RetentionPolicy,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32, retention: RetentionPolicy) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::from_pool(pool, retention))
    }

    pub fn from_pool(pool: PgPool, retention: RetentionPolicy) -> Self {
        Self { pool, retention }
    }

    /// Creates any missing tables. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema is up to date");
        Ok(())
    }
}

impl MatchStore for PgStore {
    async fn upsert_competition(&self, competition: &CompetitionUpsert) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO competitions (sport, country_slug, competition_slug, season, name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (sport, country_slug, competition_slug, season)
            DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&competition.key.sport)
        .bind(&competition.key.country_slug)
        .bind(&competition.key.competition_slug)
        .bind(&competition.key.season)
        .bind(&competition.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn upsert_match(&self, observation: &MatchUpsert) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO matches (
                id, competition_id, sport, status, start_time,
                home_team, away_team, home_score, away_score,
                is_live, raw, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            ON CONFLICT (id) DO UPDATE SET
                competition_id = COALESCE(EXCLUDED.competition_id, matches.competition_id),
                start_time = COALESCE(EXCLUDED.start_time, matches.start_time),
                home_team = COALESCE(EXCLUDED.home_team, matches.home_team),
                away_team = COALESCE(EXCLUDED.away_team, matches.away_team),
                sport = EXCLUDED.sport,
                status = EXCLUDED.status,
                home_score = EXCLUDED.home_score,
                away_score = EXCLUDED.away_score,
                is_live = EXCLUDED.is_live,
                raw = EXCLUDED.raw,
                updated_at = NOW()
            "#,
        )
        .bind(&observation.id)
        .bind(observation.competition_id)
        .bind(&observation.sport)
        .bind(&observation.status)
        .bind(observation.start_time)
        .bind(&observation.home_team)
        .bind(&observation.away_team)
        .bind(observation.home_score)
        .bind(observation.away_score)
        .bind(observation.is_live)
        .bind(observation.raw.clone().map(Json))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_match_stats(&self, stats: &StatsUpsert) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO match_stats (match_id, period, stats, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (match_id, period) DO UPDATE SET
                stats = EXCLUDED.stats,
                updated_at = NOW()
            "#,
        )
        .bind(&stats.match_id)
        .bind(stats.period.as_str())
        .bind(Json(&stats.payload))
        .execute(&mut *tx)
        .await?;

        if self.retention == RetentionPolicy::History {
            sqlx::query(
                r#"
                INSERT INTO match_stats_history (match_id, period, stats)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&stats.match_id)
            .bind(stats.period.as_str())
            .bind(Json(&stats.payload))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_run(&self, run: &SyncRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                routine, started_at, finished_at, status,
                competitions, matches, stats_snapshots, skipped, stats_failures,
                error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&run.routine)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(&run.status)
        .bind(count(run.summary.competitions))
        .bind(count(run.summary.matches))
        .bind(count(run.summary.stats_snapshots))
        .bind(count(run.summary.skipped))
        .bind(count(run.summary.stats_failures))
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
