//! Chart artifact pipeline: render a trend chart, stage it in object
//! storage under a date-partitioned key, and hand back a time-limited
//! signed URL for the image notification.
//!
//! Failures here are non-fatal to the overall run; the caller logs and
//! continues because the text notification path is independent.

mod chart;
mod publisher;
mod sigv4;
mod store;

pub use chart::{ChartArtifact, ChartError, PlottersTrendRenderer, TrendChartRenderer};
pub use publisher::{ChartPublisher, PublishedImage, DEFAULT_SIGNED_URL_TTL};
pub use store::{ObjectStore, S3CompatibleStore, S3Config, StorageError};
