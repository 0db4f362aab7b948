//! snapshot-runner: scheduled market-snapshot notifier.
//!
//! One invocation fetches recent closes for the fixed ticker set, computes
//! day-over-day and week-over-week changes, pushes the text snapshot, and
//! best-effort delivers a trend chart image through object storage.
//!
//! Usage:
//!   cargo run -p snapshot-runner

mod config;
mod run;

use chart_publisher::{ChartPublisher, PlottersTrendRenderer, S3CompatibleStore, S3Config};
use chrono::Utc;
use market_data_client::MarketDataClient;
use push_notifier::{HttpPushTransport, PushDispatcher};
use snapshot_core::AlwaysNotify;
use tokio::time::Instant;

use crate::config::Config;
use crate::run::{RunDeps, RunSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "snapshot_runner=info,market_data_client=info,push_notifier=info,chart_publisher=info"
                    .into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let market_data = MarketDataClient::new(
        config.provider_base_url.clone(),
        config.provider_token.clone(),
    )?;
    let transport = HttpPushTransport::new(&config.push_base_url, config.push_channel_token.clone())?;
    let dispatcher = PushDispatcher::new(
        Box::new(transport),
        config.push_recipient_id.clone(),
        config.push_retry,
    );
    let store = S3CompatibleStore::new(S3Config {
        bucket: config.chart_bucket.clone(),
        region: config.chart_bucket_region.clone(),
        access_key: config.storage_access_key.clone(),
        secret_key: config.storage_secret_key.clone(),
        endpoint: config.storage_endpoint.clone(),
    })?;
    let publisher = ChartPublisher::new(Box::new(store));
    let renderer = PlottersTrendRenderer;
    let policy = AlwaysNotify;

    let deps = RunDeps {
        series_source: &market_data,
        dispatcher: &dispatcher,
        renderer: &renderer,
        publisher: &publisher,
        policy: &policy,
    };
    let settings = RunSettings::from_config(&config);
    let deadline = config.run_deadline.map(|budget| Instant::now() + budget);

    let report = run::run(&deps, &settings, Utc::now(), deadline).await?;

    tracing::info!(
        notification_sent = report.notification_sent,
        ticker_count = report.ticker_count,
        "{}",
        report.message
    );
    println!("{}", serde_json::to_string(&report)?);

    Ok(())
}
