use chrono::{DateTime, Local, NaiveDate, Utc};
use std::{fmt, future::Future, time::Duration};
use tracing::{error, info, warn};

use crate::{
    config::SyncConfig,
    listings_sync::ListingsSync,
    metrics::{MetricsCollector, ProviderMetrics},
    provider::{HtmlFetcher, Provider},
    store::{MatchStore, StoreError, SyncRun},
    sync_engine::{SyncEngine, SyncError},
    types::SyncSummary,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Routine {
    WeeklyFixtures,
    DailyFixtures,
    Listings,
    Live,
}

impl Routine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Routine::WeeklyFixtures => "weekly_fixtures",
            Routine::DailyFixtures => "daily_fixtures",
            Routine::Listings => "listings",
            Routine::Live => "live",
        }
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interval timer for one routine.
#[derive(Debug, Clone, PartialEq)]
pub struct Cadence {
    pub interval: Duration,
    pub last_run: Option<DateTime<Utc>>,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.interval)
                .unwrap_or(false),
        }
    }

    pub fn mark(&mut self, at: DateTime<Utc>) {
        self.last_run = Some(at);
    }
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// The routines a scheduler can drive.
#[allow(async_fn_in_trait)]
pub trait SyncJobs {
    async fn run(&self, routine: Routine, today: NaiveDate) -> Result<SyncSummary, SyncError>;

    async fn record_run(&self, run: &SyncRun) -> Result<(), StoreError>;

    fn metrics(&self) -> Option<ProviderMetrics> {
        None
    }
}

pub struct Jobs<P, H, S> {
    engine: SyncEngine<P, S>,
    listings: Option<ListingsSync<H, S>>,
    metrics: Option<MetricsCollector>,
}

impl<P, H, S> Jobs<P, H, S> {
    pub fn new(engine: SyncEngine<P, S>, listings: Option<ListingsSync<H, S>>) -> Self {
        Self {
            engine,
            listings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn has_listings(&self) -> bool {
        self.listings.is_some()
    }
}

impl<P: Provider, H: HtmlFetcher, S: MatchStore> SyncJobs for Jobs<P, H, S> {
    async fn run(&self, routine: Routine, today: NaiveDate) -> Result<SyncSummary, SyncError> {
        match routine {
            Routine::WeeklyFixtures => self.engine.sync_fixtures_for_week(today).await,
            Routine::DailyFixtures => self.engine.sync_matches_for_day(today).await,
            Routine::Live => self.engine.sync_live().await,
            Routine::Listings => match &self.listings {
                Some(listings) => listings.sync(today).await,
                None => Ok(SyncSummary::default()),
            },
        }
    }

    async fn record_run(&self, run: &SyncRun) -> Result<(), StoreError> {
        self.engine.store().record_run(run).await
    }

    fn metrics(&self) -> Option<ProviderMetrics> {
        self.metrics.as_ref().map(MetricsCollector::snapshot)
    }
}

/// Runs the sync routines on their own cadences, one routine at a time.
/// The live routine runs on every pass.
pub struct Scheduler<J, C> {
    jobs: J,
    clock: C,
    base_interval: Duration,
    cadences: Vec<(Routine, Cadence)>,
}

impl<J: SyncJobs, C: Clock> Scheduler<J, C> {
    pub fn new(jobs: J, clock: C, base_interval: Duration) -> Self {
        Self {
            jobs,
            clock,
            base_interval,
            cadences: Vec::new(),
        }
    }

    /// Registers the fixture routines and, when a listing URL is set, the
    /// listings routine. The base interval is the live poll interval.
    pub fn from_config(jobs: J, clock: C, config: &SyncConfig) -> Self {
        let mut scheduler = Self::new(jobs, clock, config.polling.live_interval())
            .with_cadence(Routine::WeeklyFixtures, config.polling.fixtures_interval())
            .with_cadence(Routine::DailyFixtures, config.polling.day_interval());
        if config.listings.url.is_some() {
            scheduler = scheduler.with_cadence(Routine::Listings, Duration::from_secs(config.listings.poll_secs));
        }
        scheduler
    }

    pub fn with_cadence(mut self, routine: Routine, interval: Duration) -> Self {
        self.cadences.push((routine, Cadence::new(interval)));
        self
    }

    pub fn cadence(&self, routine: Routine) -> Option<&Cadence> {
        self.cadences
            .iter()
            .find(|(r, _)| *r == routine)
            .map(|(_, cadence)| cadence)
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    async fn execute(&self, routine: Routine, today: NaiveDate) -> SyncRun {
        let mut run = SyncRun::new(routine.as_str(), self.clock.now());

        match self.jobs.run(routine, today).await {
            Ok(summary) => run.complete(summary, self.clock.now()),
            Err(e) => {
                error!("Routine {} failed: {}", routine, e);
                run.fail(&e.to_string(), self.clock.now());
            }
        }

        if let Err(e) = self.jobs.record_run(&run).await {
            warn!("Could not record {} run: {}", routine, e);
        }
        run
    }

    /// Runs every due routine, then the live routine. Each clock that fired
    /// is reset to the pass start whatever the outcome.
    pub async fn run_pass(&mut self) -> Vec<SyncRun> {
        let pass_start = self.clock.now();
        let today = self.clock.today();
        let mut runs = Vec::new();

        for index in 0..self.cadences.len() {
            let (routine, due) = {
                let (routine, cadence) = &self.cadences[index];
                (*routine, cadence.is_due(pass_start))
            };
            if !due {
                continue;
            }

            runs.push(self.execute(routine, today).await);
            self.cadences[index].1.mark(pass_start);
        }

        runs.push(self.execute(Routine::Live, today).await);
        runs
    }

    /// Loops until Ctrl-C. A running pass is always allowed to finish.
    pub async fn run_forever(&mut self) {
        // Listen from the start so a Ctrl-C during a pass is not lost.
        let ctrl_c = tokio::spawn(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        });
        self.run_until(ctrl_c).await;
    }

    /// Runs passes separated by the base interval until `shutdown` resolves.
    /// Shutdown is only observed between passes.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        info!("Scheduler started, polling every {:?}", self.base_interval);

        loop {
            let runs = self.run_pass().await;
            let failed = runs.iter().filter(|run| run.status == "error").count();
            info!("Pass complete: {} routines run, {} failed", runs.len(), failed);

            if let Some(metrics) = self.jobs.metrics() {
                info!(
                    total = metrics.total_requests,
                    failed = metrics.failed_requests,
                    avg_ms = metrics.avg_response_time_ms,
                    rps = metrics.requests_per_second,
                    "Provider request metrics"
                );
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = tokio::time::sleep(self.base_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tokio::{sync::oneshot, time::Instant};

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn at(now: DateTime<Utc>) -> Self {
            Self { now: Mutex::new(now) }
        }

        fn advance(&self, secs: i64) {
            *self.now.lock().unwrap() += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for &ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    #[derive(Default)]
    struct FakeJobs {
        calls: Mutex<Vec<Routine>>,
        live_at: Mutex<Vec<Instant>>,
        recorded: Mutex<Vec<SyncRun>>,
        failing: Option<Routine>,
        reject_records: bool,
        // fires the sender during the n-th live run
        stop_on_live: Mutex<Option<(usize, oneshot::Sender<()>)>>,
    }

    impl FakeJobs {
        fn take_calls(&self) -> Vec<Routine> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }

        fn stopping_on_live(n: usize) -> (Self, oneshot::Receiver<()>) {
            let (tx, rx) = oneshot::channel();
            let jobs = FakeJobs {
                stop_on_live: Mutex::new(Some((n, tx))),
                ..FakeJobs::default()
            };
            (jobs, rx)
        }
    }

    impl SyncJobs for &FakeJobs {
        async fn run(&self, routine: Routine, _today: NaiveDate) -> Result<SyncSummary, SyncError> {
            self.calls.lock().unwrap().push(routine);
            if routine == Routine::Live {
                let mut live_at = self.live_at.lock().unwrap();
                live_at.push(Instant::now());
                let mut stop = self.stop_on_live.lock().unwrap();
                if stop.as_ref().is_some_and(|(n, _)| *n == live_at.len()) {
                    if let Some((_, tx)) = stop.take() {
                        let _ = tx.send(());
                    }
                }
            }
            if self.failing == Some(routine) {
                return Err(SyncError::Store(StoreError::Unavailable("connection reset".to_string())));
            }
            Ok(SyncSummary { matches: 1, ..SyncSummary::default() })
        }

        async fn record_run(&self, run: &SyncRun) -> Result<(), StoreError> {
            if self.reject_records {
                return Err(StoreError::Unavailable("sync_runs is read-only".to_string()));
            }
            self.recorded.lock().unwrap().push(run.clone());
            Ok(())
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn scheduler<'a>(jobs: &'a FakeJobs, clock: &'a ManualClock) -> Scheduler<&'a FakeJobs, &'a ManualClock> {
        Scheduler::new(jobs, clock, Duration::from_secs(30))
            .with_cadence(Routine::WeeklyFixtures, Duration::from_secs(600))
            .with_cadence(Routine::DailyFixtures, Duration::from_secs(300))
            .with_cadence(Routine::Listings, Duration::from_secs(120))
    }

    #[test]
    fn test_cadence_is_due() {
        let mut cadence = Cadence::new(Duration::from_secs(600));
        assert!(cadence.is_due(start()));

        cadence.mark(start());
        assert!(!cadence.is_due(start() + chrono::Duration::seconds(599)));
        assert!(cadence.is_due(start() + chrono::Duration::seconds(600)));
        assert!(!cadence.is_due(start() - chrono::Duration::seconds(5)));
    }

    #[tokio::test]
    async fn test_first_pass_runs_everything_in_order() {
        let jobs = FakeJobs::default();
        let clock = ManualClock::at(start());
        let mut scheduler = scheduler(&jobs, &clock);

        let runs = scheduler.run_pass().await;

        assert_eq!(
            jobs.take_calls(),
            vec![Routine::WeeklyFixtures, Routine::DailyFixtures, Routine::Listings, Routine::Live]
        );
        assert_eq!(runs.len(), 4);
        assert!(runs.iter().all(|run| run.status == "success"));
        assert_eq!(jobs.recorded.lock().unwrap().len(), 4);
    }

    #[test_log::test(tokio::test)]
    async fn test_cadences_fire_independently() {
        let jobs = FakeJobs::default();
        let clock = ManualClock::at(start());
        let mut scheduler = scheduler(&jobs, &clock);

        scheduler.run_pass().await;
        jobs.take_calls();

        clock.advance(30);
        scheduler.run_pass().await;
        assert_eq!(jobs.take_calls(), vec![Routine::Live]);

        clock.advance(90);
        scheduler.run_pass().await;
        assert_eq!(jobs.take_calls(), vec![Routine::Listings, Routine::Live]);

        clock.advance(180);
        scheduler.run_pass().await;
        assert_eq!(
            jobs.take_calls(),
            vec![Routine::DailyFixtures, Routine::Listings, Routine::Live]
        );

        clock.advance(300);
        scheduler.run_pass().await;
        assert_eq!(
            jobs.take_calls(),
            vec![Routine::WeeklyFixtures, Routine::DailyFixtures, Routine::Listings, Routine::Live]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_routine_resets_clock_and_pass_continues() {
        let jobs = FakeJobs {
            failing: Some(Routine::WeeklyFixtures),
            ..FakeJobs::default()
        };
        let clock = ManualClock::at(start());
        let mut scheduler = scheduler(&jobs, &clock);

        let runs = scheduler.run_pass().await;

        assert_eq!(runs[0].routine, "weekly_fixtures");
        assert_eq!(runs[0].status, "error");
        assert!(runs[0].error_message.as_deref().unwrap().contains("connection reset"));
        assert!(runs[1..].iter().all(|run| run.status == "success"));
        assert_eq!(
            scheduler.cadence(Routine::WeeklyFixtures).unwrap().last_run,
            Some(start())
        );

        jobs.take_calls();
        clock.advance(30);
        scheduler.run_pass().await;
        assert_eq!(jobs.take_calls(), vec![Routine::Live]);
    }

    #[tokio::test]
    async fn test_run_record_failure_is_not_fatal() {
        let jobs = FakeJobs {
            reject_records: true,
            ..FakeJobs::default()
        };
        let clock = ManualClock::at(start());
        let mut scheduler = Scheduler::new(&jobs, &clock, Duration::from_secs(30));

        let runs = scheduler.run_pass().await;

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "success");
        assert_eq!(runs[0].summary.matches, 1);
        assert!(jobs.recorded.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_are_separated_by_base_interval() {
        let (jobs, shutdown) = FakeJobs::stopping_on_live(3);
        let clock = ManualClock::at(start());
        let mut scheduler = scheduler(&jobs, &clock);

        let started = Instant::now();
        scheduler.run_until(shutdown).await;

        let offsets: Vec<Duration> = jobs.live_at.lock().unwrap().iter().map(|at| *at - started).collect();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::from_secs(30), Duration::from_secs(60)]
        );
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_shutdown_during_pass_stops_after_it() {
        let (jobs, shutdown) = FakeJobs::stopping_on_live(2);
        let clock = ManualClock::at(start());
        let mut scheduler = scheduler(&jobs, &clock);

        let stopped = tokio::time::timeout(Duration::from_secs(600), scheduler.run_until(shutdown)).await;

        assert!(stopped.is_ok());
        assert_eq!(jobs.live_at.lock().unwrap().len(), 2);
        assert_eq!(jobs.recorded.lock().unwrap().last().map(|run| run.routine.clone()), Some("live".to_string()));
    }

    #[test]
    fn test_from_config_registers_listings_only_when_configured() {
        let jobs = FakeJobs::default();
        let clock = ManualClock::at(start());

        let mut config = SyncConfig::default();
        let without = Scheduler::from_config(&jobs, &clock, &config);
        assert!(without.cadence(Routine::Listings).is_none());
        assert_eq!(
            without.cadence(Routine::WeeklyFixtures).map(|c| c.interval),
            Some(Duration::from_secs(600))
        );

        config.listings.url = Some("https://www.flashscore.pt/futebol/".to_string());
        let with = Scheduler::from_config(&jobs, &clock, &config);
        assert_eq!(
            with.cadence(Routine::Listings).map(|c| c.interval),
            Some(Duration::from_secs(120))
        );
    }
}
