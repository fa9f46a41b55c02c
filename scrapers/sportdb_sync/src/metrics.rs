use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderMetrics {
    pub requests_per_second: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
    pub rate_limiter_wait_time_ms: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// Shared request counters for the upstream clients. Cloning shares the state.
#[derive(Clone)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<ProviderMetrics>>,
    window_start: Arc<Mutex<(Instant, u64)>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Mutex::new(ProviderMetrics::default())),
            window_start: Arc::new(Mutex::new((Instant::now(), 0))),
        }
    }

    pub fn record_request_start(&self) -> RequestTracker {
        RequestTracker {
            start_time: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_rate_limit_wait(&self, duration: Duration) {
        locked(&self.metrics).rate_limiter_wait_time_ms = duration.as_secs_f64() * 1000.0;
    }

    /// Remembers the most recent error. Counting is left to the request tracker.
    pub fn record_error(&self, error: impl Into<String>) {
        let mut metrics = locked(&self.metrics);
        metrics.last_error = Some(error.into());
        metrics.last_error_time = Some(Utc::now());
    }

    pub fn snapshot(&self) -> ProviderMetrics {
        locked(&self.metrics).clone()
    }
}

pub struct RequestTracker {
    start_time: Instant,
    collector: MetricsCollector,
}

impl RequestTracker {
    pub fn finish(self, success: bool) {
        let duration = self.start_time.elapsed();
        let mut metrics = locked(&self.collector.metrics);

        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        // exponential moving average, alpha = 0.1
        let alpha = 0.1;
        let sample_ms = duration.as_secs_f64() * 1000.0;
        metrics.avg_response_time_ms = if metrics.total_requests == 1 {
            sample_ms
        } else {
            metrics.avg_response_time_ms * (1.0 - alpha) + sample_ms * alpha
        };

        let mut window = locked(&self.collector.window_start);
        let elapsed = window.0.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let requests = metrics.total_requests - window.1;
            metrics.requests_per_second = requests as f64 / elapsed.as_secs_f64();
            *window = (Instant::now(), metrics.total_requests);
        }
    }
}
