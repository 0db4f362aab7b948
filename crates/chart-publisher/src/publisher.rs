use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::store::{ObjectStore, StorageError};

pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// The uploaded chart as the push API will see it. Lifetime is bounded by
/// the signed URL's expiry, independent of this process.
#[derive(Debug, Clone)]
pub struct PublishedImage {
    pub retrieval_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Uploads a rendered chart under a date-partitioned key and returns the
/// time-limited retrieval URL.
pub struct ChartPublisher {
    store: Box<dyn ObjectStore>,
}

impl ChartPublisher {
    pub fn new(store: Box<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Date-partitioned storage key: charts/YYYY/MM/DD/<hint>, zero-padded.
    pub fn build_chart_key(key_hint: &str, now: DateTime<Utc>) -> String {
        format!("charts/{}/{key_hint}", now.format("%Y/%m/%d"))
    }

    pub async fn publish(
        &self,
        local_path: &Path,
        key_hint: &str,
        now: DateTime<Utc>,
        expires_in: Duration,
    ) -> Result<PublishedImage, StorageError> {
        let bytes = tokio::fs::read(local_path).await.map_err(|e| {
            StorageError::new("NoSuchFile", format!("{}: {e}", local_path.display()))
        })?;

        let key = Self::build_chart_key(key_hint, now);
        self.store.put_object(&key, bytes, "image/png").await?;

        let retrieval_url = self.store.presign_get(&key, expires_in, now)?;
        let expires_at = now
            + chrono::Duration::from_std(expires_in).unwrap_or_else(|_| chrono::Duration::hours(1));

        Ok(PublishedImage {
            retrieval_url,
            expires_at,
        })
    }
}
