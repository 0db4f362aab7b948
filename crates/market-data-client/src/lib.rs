//! HTTP client for the daily-bars provider.
//!
//! The provider lags behind the close of the latest session, so the newest
//! observation can come back missing. That is a transient data-quality
//! condition: [`fetch_series_with_retry`] refetches on a bounded policy and
//! returns the last (possibly still incomplete) result after exhaustion so
//! downstream stages can degrade instead of failing the run.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use snapshot_core::{sleep_within, PricePoint, PriceSeries, RetryPolicy};
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("fetch cancelled by invocation deadline")]
    Cancelled,
}

/// Seam between the pipeline and the provider, so the runner can be
/// exercised against scripted series.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    async fn fetch_with_retry(
        &self,
        symbols: &[&str],
        period_days: u32,
        end_date: NaiveDate,
        policy: &RetryPolicy,
        deadline: Option<Instant>,
    ) -> Result<HashMap<String, PriceSeries>, MarketDataError>;
}

pub struct MarketDataClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl MarketDataClient {
    pub fn new(base_url: String, api_token: String) -> Result<Self, MarketDataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MarketDataError::Provider(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// One request for the whole symbol set, grouped per symbol by the
    /// provider. Missing and non-positive closes map to missing points.
    pub async fn fetch_daily(
        &self,
        symbols: &[&str],
        period_days: u32,
        end_date: NaiveDate,
    ) -> Result<HashMap<String, PriceSeries>, MarketDataError> {
        let url = format!("{}/v1/daily", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbols", symbols.join(",")),
                ("days", period_days.to_string()),
                ("end", end_date.format("%Y-%m-%d").to_string()),
                ("token", self.api_token.clone()),
            ])
            .send()
            .await
            .map_err(|e| MarketDataError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MarketDataError::Provider(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body: DailyBarsResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::Provider(e.to_string()))?;

        Ok(body
            .results
            .into_iter()
            .map(|(symbol, bars)| {
                let series = to_series(&symbol, bars);
                (symbol, series)
            })
            .collect())
    }
}

#[async_trait]
impl SeriesSource for MarketDataClient {
    async fn fetch_with_retry(
        &self,
        symbols: &[&str],
        period_days: u32,
        end_date: NaiveDate,
        policy: &RetryPolicy,
        deadline: Option<Instant>,
    ) -> Result<HashMap<String, PriceSeries>, MarketDataError> {
        fetch_series_with_retry(
            || self.fetch_daily(symbols, period_days, end_date),
            symbols,
            policy,
            deadline,
        )
        .await
    }
}

/// Drive `fetch` until every requested symbol has a usable latest close or
/// the attempt budget runs out. The last result is returned either way;
/// provider failures propagate, and a retry wait that would cross the
/// deadline fails fast as cancelled.
pub async fn fetch_series_with_retry<F, Fut>(
    mut fetch: F,
    symbols: &[&str],
    policy: &RetryPolicy,
    deadline: Option<Instant>,
) -> Result<HashMap<String, PriceSeries>, MarketDataError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<HashMap<String, PriceSeries>, MarketDataError>>,
{
    let mut result = fetch().await?;

    let mut attempt = 1;
    while attempt < policy.max_attempts && has_missing_latest(&result, symbols) {
        tracing::warn!(
            attempt,
            max_attempts = policy.max_attempts,
            "latest close missing for a requested symbol, refetching"
        );
        if !sleep_within(policy.delay, deadline).await {
            return Err(MarketDataError::Cancelled);
        }
        result = fetch().await?;
        attempt += 1;
    }

    if has_missing_latest(&result, symbols) {
        tracing::warn!(
            attempts = policy.max_attempts,
            "price data still incomplete after all attempts, continuing with degraded series"
        );
    }

    Ok(result)
}

/// True when any requested symbol is absent or its newest close is unusable.
fn has_missing_latest(series_by_symbol: &HashMap<String, PriceSeries>, symbols: &[&str]) -> bool {
    symbols.iter().any(|symbol| {
        series_by_symbol
            .get(*symbol)
            .map_or(true, |series| series.latest_close_missing())
    })
}

fn to_series(symbol: &str, bars: Vec<DailyBar>) -> PriceSeries {
    let points = bars
        .into_iter()
        .map(|bar| {
            let close = bar.close.filter(|c| c.is_finite() && *c > 0.0);
            PricePoint::new(bar.date, close)
        })
        .collect();
    PriceSeries::new(symbol, points)
}

#[derive(Debug, Deserialize)]
struct DailyBarsResponse {
    #[serde(default)]
    results: HashMap<String, Vec<DailyBar>>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    date: NaiveDate,
    #[serde(default)]
    close: Option<f64>,
}
