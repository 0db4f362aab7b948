//! The snapshot pipeline: acquire series, decide market state, compute
//! metrics, deliver the text notification, then run the independent chart
//! branch. Acquisition failures abort the run; every later stage failure
//! is logged where it is absorbed and never touches the text path or the
//! run report's success.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::time::Instant;

use chart_publisher::{ChartArtifact, ChartPublisher, TrendChartRenderer};
use market_data_client::{MarketDataError, SeriesSource};
use push_notifier::{PushDispatcher, PushMessage};
use snapshot_core::{
    format_snapshot_message, metrics, NotifyPolicy, RetryPolicy, RunContext, RunReport,
    TickerSnapshot,
};

use crate::config::{Config, ConfigError};

/// The fixed ticker set: three equity tickers plus the FX pair for the
/// trailing exchange-rate line.
pub const DEFAULT_TICKERS: &[&str] = &["VT", "VOO", "QQQ"];
pub const FX_SYMBOL: &str = "JPY=X";
pub const CHART_SYMBOL: &str = "VT";

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("market data acquisition failed: {0}")]
    Acquisition(#[from] MarketDataError),
}

/// Collaborator seams, injectable so the pipeline can run against fakes.
pub struct RunDeps<'a> {
    pub series_source: &'a dyn SeriesSource,
    pub dispatcher: &'a PushDispatcher,
    pub renderer: &'a dyn TrendChartRenderer,
    pub publisher: &'a ChartPublisher,
    pub policy: &'a dyn NotifyPolicy,
}

pub struct RunSettings {
    pub tickers: Vec<String>,
    pub fx_symbol: String,
    pub chart_symbol: String,
    pub period_days: u32,
    pub chart_period_days: u32,
    pub fetch_retry: RetryPolicy,
    pub signed_url_ttl: Duration,
    pub artifact_dir: PathBuf,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tickers: DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect(),
            fx_symbol: FX_SYMBOL.to_string(),
            chart_symbol: CHART_SYMBOL.to_string(),
            period_days: 30,
            chart_period_days: 90,
            fetch_retry: config.fetch_retry,
            signed_url_ttl: config.signed_url_ttl,
            artifact_dir: std::env::temp_dir(),
        }
    }
}

pub async fn run(
    deps: &RunDeps<'_>,
    settings: &RunSettings,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
) -> Result<RunReport, RunError> {
    let today = now.date_naive();

    let mut symbols: Vec<&str> = settings.tickers.iter().map(String::as_str).collect();
    symbols.push(settings.fx_symbol.as_str());

    let series_by_symbol = deps
        .series_source
        .fetch_with_retry(
            &symbols,
            settings.period_days,
            today,
            &settings.fetch_retry,
            deadline,
        )
        .await?;

    // The lead ticker's calendar decides whether the market traded
    // yesterday; a missing lead series is the conservative no-op.
    let lead_series = settings
        .tickers
        .first()
        .and_then(|t| series_by_symbol.get(t.as_str()));
    let Some(lead_series) = lead_series else {
        tracing::info!("no series for lead ticker, treating as market closed");
        return Ok(RunReport::market_closed());
    };
    if metrics::is_market_closed(lead_series, today) {
        tracing::info!(
            latest = ?lead_series.latest_date(),
            "market is closed today, skipping notification"
        );
        return Ok(RunReport::market_closed());
    }

    let context = build_context(&series_by_symbol, settings, today);
    let ticker_count = context.snapshots.len();

    if !deps.policy.should_notify(&context.snapshots) {
        tracing::info!("notify policy declined this run");
        return Ok(RunReport::skipped(ticker_count));
    }

    let message = format_snapshot_message(context.run_date, &context.snapshots, context.fx_rate);
    let notification_sent = match deps
        .dispatcher
        .send(&[PushMessage::text(message)], None, deadline)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "text notification failed");
            false
        }
    };

    // Independent branch: nothing below may prevent, duplicate, or fail
    // the text result above.
    if let Err(e) = image_branch(deps, settings, today, now, deadline).await {
        tracing::error!(error = %e, "chart branch failed, text path unaffected");
    }

    Ok(RunReport::completed(notification_sent, ticker_count))
}

fn build_context(
    series_by_symbol: &std::collections::HashMap<String, snapshot_core::PriceSeries>,
    settings: &RunSettings,
    today: NaiveDate,
) -> RunContext {
    let snapshots: Vec<TickerSnapshot> = settings
        .tickers
        .iter()
        .filter_map(|ticker| {
            series_by_symbol
                .get(ticker.as_str())
                .map(|series| metrics::build_snapshot(ticker, series))
        })
        .collect();

    let run_date = settings
        .tickers
        .first()
        .and_then(|t| series_by_symbol.get(t.as_str()))
        .and_then(|s| s.latest_date())
        .unwrap_or(today);

    let fx_rate = series_by_symbol
        .get(settings.fx_symbol.as_str())
        .and_then(|s| s.latest_valid_close())
        .unwrap_or(0.0);

    RunContext {
        run_date,
        is_market_closed: false,
        snapshots,
        fx_rate,
    }
}

async fn image_branch(
    deps: &RunDeps<'_>,
    settings: &RunSettings,
    today: NaiveDate,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
) -> anyhow::Result<()> {
    let chart_symbol = settings.chart_symbol.as_str();
    let series_by_symbol = deps
        .series_source
        .fetch_with_retry(
            &[chart_symbol],
            settings.chart_period_days,
            today,
            &settings.fetch_retry,
            deadline,
        )
        .await?;
    let series = series_by_symbol
        .get(chart_symbol)
        .ok_or_else(|| anyhow::anyhow!("no chart series for {chart_symbol}"))?;

    let artifact = deps.renderer.render(series, &settings.artifact_dir)?;
    let result = publish_and_send(deps, settings, &artifact, now, deadline).await;

    // The artifact never outlives the run, whatever happened above.
    if let Err(e) = std::fs::remove_file(&artifact.local_path) {
        tracing::warn!(
            path = %artifact.local_path.display(),
            error = %e,
            "failed to remove chart artifact"
        );
    }

    result
}

async fn publish_and_send(
    deps: &RunDeps<'_>,
    settings: &RunSettings,
    artifact: &ChartArtifact,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
) -> anyhow::Result<()> {
    let key_hint = artifact
        .local_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("chart.png");

    let image = deps
        .publisher
        .publish(&artifact.local_path, key_hint, now, settings.signed_url_ttl)
        .await?;
    tracing::info!(
        url = %image.retrieval_url,
        expires_at = %image.expires_at,
        size_bytes = artifact.size_bytes,
        "chart published"
    );

    deps.dispatcher
        .send(&[PushMessage::image(image.retrieval_url)], None, deadline)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chart_publisher::{ChartError, ObjectStore, StorageError};
    use push_notifier::{NotifyError, PushResponse, PushTransport};
    use snapshot_core::{AlwaysNotify, PricePoint, PriceSeries};

    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    /// Daily closes ending at `end`, one point per day.
    fn series(symbol: &str, end: &str, closes: &[f64]) -> PriceSeries {
        let end = date(end);
        let points = closes
            .iter()
            .rev()
            .enumerate()
            .map(|(back, close)| {
                PricePoint::new(end - chrono::Days::new(back as u64), Some(*close))
            })
            .collect();
        PriceSeries::new(symbol, points)
    }

    struct FakeSeriesSource {
        series: HashMap<String, PriceSeries>,
    }

    #[async_trait]
    impl SeriesSource for FakeSeriesSource {
        async fn fetch_with_retry(
            &self,
            symbols: &[&str],
            _period_days: u32,
            _end_date: NaiveDate,
            _policy: &RetryPolicy,
            _deadline: Option<Instant>,
        ) -> Result<HashMap<String, PriceSeries>, MarketDataError> {
            Ok(self
                .series
                .iter()
                .filter(|(symbol, _)| symbols.contains(&symbol.as_str()))
                .map(|(symbol, series)| (symbol.clone(), series.clone()))
                .collect())
        }
    }

    #[derive(Clone)]
    struct RecordingTransport {
        deliveries: Arc<Mutex<Vec<Vec<PushMessage>>>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                deliveries: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn deliver(
            &self,
            _recipient: &str,
            messages: &[PushMessage],
            _retry_key: &str,
        ) -> Result<PushResponse, NotifyError> {
            self.deliveries.lock().unwrap().push(messages.to_vec());
            Ok(PushResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    /// Writes a placeholder file instead of exercising the bitmap backend.
    struct FakeRenderer;

    impl TrendChartRenderer for FakeRenderer {
        fn render(
            &self,
            series: &PriceSeries,
            out_dir: &Path,
        ) -> Result<ChartArtifact, ChartError> {
            let path = out_dir.join(format!("{}_trend.png", series.symbol().to_lowercase()));
            std::fs::write(&path, b"png bytes")?;
            Ok(ChartArtifact {
                local_path: path,
                size_bytes: 9,
            })
        }
    }

    struct FakeStore {
        fail_put: bool,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn put_object(
            &self,
            _key: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<(), StorageError> {
            if self.fail_put {
                return Err(StorageError::new("AccessDenied", "Access Denied"));
            }
            Ok(())
        }

        fn presign_get(
            &self,
            key: &str,
            ttl: Duration,
            _now: DateTime<Utc>,
        ) -> Result<String, StorageError> {
            Ok(format!(
                "https://store.example/{key}?X-Amz-Expires={}",
                ttl.as_secs()
            ))
        }
    }

    fn fresh_series_map() -> HashMap<String, PriceSeries> {
        // Latest date 2026-01-08 == now - 1 day: the market traded.
        let mut map = HashMap::new();
        for symbol in ["VT", "VOO", "QQQ"] {
            map.insert(
                symbol.to_string(),
                series(symbol, "2026-01-08", &[100.0, 98.0, 99.0, 97.0, 95.0, 93.0]),
            );
        }
        map.insert(
            "JPY=X".to_string(),
            series("JPY=X", "2026-01-08", &[150.0, 151.234]),
        );
        map
    }

    fn settings(artifact_dir: &Path) -> RunSettings {
        RunSettings {
            tickers: DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect(),
            fx_symbol: FX_SYMBOL.to_string(),
            chart_symbol: CHART_SYMBOL.to_string(),
            period_days: 30,
            chart_period_days: 90,
            fetch_retry: RetryPolicy::new(3, Duration::from_millis(1)),
            signed_url_ttl: Duration::from_secs(3600),
            artifact_dir: artifact_dir.to_path_buf(),
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-01-09T09:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_sends_text_then_image() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSeriesSource {
            series: fresh_series_map(),
        };
        let transport = RecordingTransport::new();
        let dispatcher = PushDispatcher::new(
            Box::new(transport.clone()),
            "user-1".to_string(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let publisher = ChartPublisher::new(Box::new(FakeStore { fail_put: false }));
        let deps = RunDeps {
            series_source: &source,
            dispatcher: &dispatcher,
            renderer: &FakeRenderer,
            publisher: &publisher,
            policy: &AlwaysNotify,
        };

        let report = run(&deps, &settings(dir.path()), now(), None).await.unwrap();

        assert_eq!(report, RunReport::completed(true, 3));

        let deliveries = transport.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 2);

        // Text leads, carrying the computed changes.
        match &deliveries[0][..] {
            [PushMessage::Text { text }] => {
                assert!(text.starts_with("ETF Price Tracker 2026-01-08"));
                assert!(text.contains("[VT]\nPrice: $93.00\nDaily: -2.11%\nWeekly: -5.1%"));
                assert!(text.ends_with("USD/JPY: 151.23"));
            }
            other => panic!("expected one text message, got {other:?}"),
        }

        // The image rides on the signed URL.
        match &deliveries[1][..] {
            [PushMessage::Image {
                original_content_url,
                ..
            }] => {
                assert!(original_content_url
                    .starts_with("https://store.example/charts/2026/01/09/vt_trend.png"));
            }
            other => panic!("expected one image message, got {other:?}"),
        }

        // The artifact never outlives the run.
        assert!(!dir.path().join("vt_trend.png").exists());
    }

    #[tokio::test]
    async fn test_stale_series_is_market_closed_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = fresh_series_map();
        for series_entry in map.values_mut() {
            let symbol = series_entry.symbol().to_string();
            *series_entry = series(&symbol, "2026-01-06", &[100.0, 99.0]);
        }
        let source = FakeSeriesSource { series: map };
        let transport = RecordingTransport::new();
        let dispatcher = PushDispatcher::new(
            Box::new(transport.clone()),
            "user-1".to_string(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let publisher = ChartPublisher::new(Box::new(FakeStore { fail_put: false }));
        let deps = RunDeps {
            series_source: &source,
            dispatcher: &dispatcher,
            renderer: &FakeRenderer,
            publisher: &publisher,
            policy: &AlwaysNotify,
        };

        let report = run(&deps, &settings(dir.path()), now(), None).await.unwrap();

        assert_eq!(report, RunReport::market_closed());
        assert!(!report.notification_sent);
        assert_eq!(report.ticker_count, 0);
        assert!(transport.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_set_is_market_closed_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSeriesSource {
            series: HashMap::new(),
        };
        let transport = RecordingTransport::new();
        let dispatcher = PushDispatcher::new(
            Box::new(transport.clone()),
            "user-1".to_string(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let publisher = ChartPublisher::new(Box::new(FakeStore { fail_put: false }));
        let deps = RunDeps {
            series_source: &source,
            dispatcher: &dispatcher,
            renderer: &FakeRenderer,
            publisher: &publisher,
            policy: &AlwaysNotify,
        };

        let report = run(&deps, &settings(dir.path()), now(), None).await.unwrap();

        assert_eq!(report, RunReport::market_closed());
        assert!(transport.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_never_touches_the_text_notification() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSeriesSource {
            series: fresh_series_map(),
        };
        let transport = RecordingTransport::new();
        let dispatcher = PushDispatcher::new(
            Box::new(transport.clone()),
            "user-1".to_string(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let publisher = ChartPublisher::new(Box::new(FakeStore { fail_put: true }));
        let deps = RunDeps {
            series_source: &source,
            dispatcher: &dispatcher,
            renderer: &FakeRenderer,
            publisher: &publisher,
            policy: &AlwaysNotify,
        };

        let report = run(&deps, &settings(dir.path()), now(), None).await.unwrap();

        // The run still reports success: the text path is unaffected.
        assert_eq!(report, RunReport::completed(true, 3));

        let deliveries = transport.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert!(matches!(&deliveries[0][..], [PushMessage::Text { .. }]));

        // Cleanup still happened on the failure path.
        assert!(!dir.path().join("vt_trend.png").exists());
    }

    #[tokio::test]
    async fn test_declining_policy_skips_delivery() {
        struct NeverNotify;
        impl NotifyPolicy for NeverNotify {
            fn should_notify(&self, _snapshots: &[TickerSnapshot]) -> bool {
                false
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let source = FakeSeriesSource {
            series: fresh_series_map(),
        };
        let transport = RecordingTransport::new();
        let dispatcher = PushDispatcher::new(
            Box::new(transport.clone()),
            "user-1".to_string(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let publisher = ChartPublisher::new(Box::new(FakeStore { fail_put: false }));
        let deps = RunDeps {
            series_source: &source,
            dispatcher: &dispatcher,
            renderer: &FakeRenderer,
            publisher: &publisher,
            policy: &NeverNotify,
        };

        let report = run(&deps, &settings(dir.path()), now(), None).await.unwrap();

        assert_eq!(report, RunReport::skipped(3));
        assert!(transport.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acquisition_failure_aborts_the_run() {
        struct FailingSource;

        #[async_trait]
        impl SeriesSource for FailingSource {
            async fn fetch_with_retry(
                &self,
                _symbols: &[&str],
                _period_days: u32,
                _end_date: NaiveDate,
                _policy: &RetryPolicy,
                _deadline: Option<Instant>,
            ) -> Result<HashMap<String, PriceSeries>, MarketDataError> {
                Err(MarketDataError::Provider("HTTP 502: bad gateway".to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::new();
        let dispatcher = PushDispatcher::new(
            Box::new(transport.clone()),
            "user-1".to_string(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let publisher = ChartPublisher::new(Box::new(FakeStore { fail_put: false }));
        let deps = RunDeps {
            series_source: &FailingSource,
            dispatcher: &dispatcher,
            renderer: &FakeRenderer,
            publisher: &publisher,
            policy: &AlwaysNotify,
        };

        let err = run(&deps, &settings(dir.path()), now(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Acquisition(_)));
        assert!(transport.deliveries.lock().unwrap().is_empty());
    }
}
