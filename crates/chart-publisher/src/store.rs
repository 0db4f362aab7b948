use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::sigv4;

/// Upload or URL-signing failure, carrying the provider's error code and
/// message for diagnosis at the absorption point.
#[derive(Debug, thiserror::Error)]
#[error("storage error: {code}: {message}")]
pub struct StorageError {
    pub code: String,
    pub message: String,
}

impl StorageError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Content-storage seam: upload bytes under a key and mint read-scoped,
/// time-limited retrieval URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Signing is pure: the URL depends only on the inputs and the store
    /// configuration, never on wall-clock reads.
    fn presign_get(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, StorageError>;
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Endpoint override for S3-compatible stores; defaults to AWS.
    pub endpoint: Option<String>,
}

/// S3-compatible store speaking the REST API directly: SigV4 header
/// signing for uploads, query-string presigning for retrieval URLs.
pub struct S3CompatibleStore {
    client: Client,
    config: S3Config,
}

const SERVICE: &str = "s3";

impl S3CompatibleStore {
    pub fn new(config: S3Config) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::new("ClientError", e.to_string()))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        self.config
            .endpoint
            .clone()
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.config.region))
    }

    fn host(&self) -> String {
        let endpoint = self.endpoint();
        endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string()
    }

    /// Path-style object URI: /{bucket}/{key}, SigV4-encoded.
    fn object_uri(&self, key: &str) -> String {
        format!(
            "/{}/{}",
            sigv4::uri_encode(&self.config.bucket, true),
            sigv4::uri_encode(key, true)
        )
    }
}

#[async_trait]
impl ObjectStore for S3CompatibleStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let uri = self.object_uri(key);
        let host = self.host();
        let payload_hash = sigv4::sha256_hex(&bytes);

        let canonical_headers = format!(
            "host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n"
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";
        let canonical_request =
            format!("PUT\n{uri}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

        let signature = sigv4::sign(
            &self.config.secret_key,
            &date,
            &amz_date,
            &self.config.region,
            SERVICE,
            &canonical_request,
        );
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{date}/{}/{SERVICE}/aws4_request, \
             SignedHeaders={signed_headers}, Signature={signature}",
            self.config.access_key, self.config.region
        );

        let url = format!("{}{uri}", self.endpoint());
        let response = self
            .client
            .put(&url)
            .header("authorization", authorization)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::new("RequestError", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = extract_tag(&body, "Code").unwrap_or_else(|| status.to_string());
            let message = extract_tag(&body, "Message").unwrap_or(body);
            return Err(StorageError::new(code, message));
        }

        Ok(())
    }

    fn presign_get(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let uri = self.object_uri(key);
        let host = self.host();
        let credential = format!(
            "{}/{date}/{}/{SERVICE}/aws4_request",
            self.config.access_key, self.config.region
        );

        // Already in canonical (sorted) order.
        let canonical_query = format!(
            "X-Amz-Algorithm=AWS4-HMAC-SHA256\
             &X-Amz-Credential={}\
             &X-Amz-Date={amz_date}\
             &X-Amz-Expires={}\
             &X-Amz-SignedHeaders=host",
            sigv4::uri_encode(&credential, false),
            ttl.as_secs()
        );

        let canonical_request =
            format!("GET\n{uri}\n{canonical_query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD");

        let signature = sigv4::sign(
            &self.config.secret_key,
            &date,
            &amz_date,
            &self.config.region,
            SERVICE,
            &canonical_request,
        );

        Ok(format!(
            "{}{uri}?{canonical_query}&X-Amz-Signature={signature}",
            self.endpoint()
        ))
    }
}

/// Pull a value out of the provider's XML error body, e.g. <Code>...</Code>.
fn extract_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}
