use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde_json::Value;
use std::{num::NonZeroU32, sync::Arc, time::Duration, time::Instant};
use tracing::{debug, warn};

use crate::{
    config::ProviderConfig,
    metrics::{MetricsCollector, RequestTracker},
    payload::{list_from_payload, nested_list},
};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

/// JSON data source addressed by path relative to the provider base URL.
#[allow(async_fn_in_trait)]
pub trait Provider {
    async fn fetch(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ProviderError>;
}

/// Source of raw HTML documents addressed by absolute URL.
#[allow(async_fn_in_trait)]
pub trait HtmlFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, ProviderError>;
}

/// HTTP client for the provider API and listing pages. Clones share the
/// connection pool, rate limiter and metrics.
#[derive(Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    metrics: MetricsCollector,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig, metrics: MetricsCollector) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second)
                .ok_or_else(|| ProviderError::Config("requests_per_second must be positive".to_string()))?,
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            metrics,
        })
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    async fn begin(&self) -> RequestTracker {
        let wait_start = Instant::now();
        self.rate_limiter.until_ready().await;
        self.metrics.record_rate_limit_wait(wait_start.elapsed());
        self.metrics.record_request_start()
    }

    fn finish<T>(&self, tracker: RequestTracker, result: &Result<T, ProviderError>) {
        tracker.finish(result.is_ok());
        if let Err(e) = result {
            self.metrics.record_error(e.to_string());
        }
    }

    async fn send(&self, url: &str, params: &[(&str, &str)]) -> Result<reqwest::Response, ProviderError> {
        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Provider for HttpProvider {
    async fn fetch(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let tracker = self.begin().await;
        let result = match self.send(&url, params).await {
            Ok(response) => response.json::<Value>().await.map_err(|e| ProviderError::Decode {
                url: url.clone(),
                message: e.to_string(),
            }),
            Err(e) => Err(e),
        };
        self.finish(tracker, &result);
        result
    }
}

impl HtmlFetcher for HttpProvider {
    async fn fetch_html(&self, url: &str) -> Result<String, ProviderError> {
        debug!("GET {}", url);

        let tracker = self.begin().await;
        let result = match self.send(url, &[]).await {
            Ok(response) => response.text().await.map_err(ProviderError::from),
            Err(e) => Err(e),
        };
        self.finish(tracker, &result);
        result
    }
}

fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Typed endpoints of the sports data API. List endpoints treat any failure
/// as "no data"; only statistics surface their error to the caller.
pub struct SportDbApi<P> {
    provider: P,
}

impl<P: Provider> SportDbApi<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn fetch_or_empty(&self, path: &str) -> Option<Value> {
        match self.provider.fetch(path, &[]).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Request for {} failed, treating as no data: {}", path, e);
                None
            }
        }
    }

    async fn list(&self, path: &str, key: &str) -> Vec<Value> {
        self.fetch_or_empty(path)
            .await
            .map(|payload| list_from_payload(&payload, key))
            .unwrap_or_default()
    }

    pub async fn countries(&self, sport: &str) -> Vec<Value> {
        self.list(&format!("/api/{}/countries", segment(sport)), "countries").await
    }

    pub async fn country_detail(&self, sport: &str, country: &str) -> Option<Value> {
        self.fetch_or_empty(&format!("/api/{}/{}", segment(sport), segment(country))).await
    }

    /// Competitions listed in a country detail payload.
    pub async fn competitions(&self, sport: &str, country: &str) -> Vec<Value> {
        self.country_detail(sport, country)
            .await
            .map(|detail| nested_list(&detail, "competitions"))
            .unwrap_or_default()
    }

    pub async fn fixtures(&self, sport: &str, country: &str, competition: &str, season: &str) -> Vec<Value> {
        let path = format!(
            "/api/{}/{}/{}/{}/fixtures",
            segment(sport),
            segment(country),
            segment(competition),
            segment(season)
        );
        self.list(&path, "matches").await
    }

    pub async fn live_matches(&self, sport: &str) -> Vec<Value> {
        self.list(&format!("/api/{}/live", segment(sport)), "matches").await
    }

    pub async fn match_stats(&self, match_id: &str) -> Result<Value, ProviderError> {
        self.provider
            .fetch(&format!("/api/match/{}/stats", segment(match_id)), &[])
            .await
    }
}
