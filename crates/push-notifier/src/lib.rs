//! Push-messaging delivery with idempotent retries.
//!
//! Payloads are a tagged union serialized exactly as the push API expects.
//! Every delivery attempt carries a retry key (caller-supplied or derived
//! from the payload content) so the receiving API deduplicates retried
//! sends; error classification is a pure function over the response status.

mod dispatcher;
mod transport;

pub use dispatcher::PushDispatcher;
pub use transport::{HttpPushTransport, PushResponse, PushTransport};

use serde::Serialize;
use sha2::{Digest, Sha256};

/// One message in a delivery. Ordering in the payload list matters: the
/// text message leads and the image rides along.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushMessage {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "originalContentUrl")]
        original_content_url: String,
        #[serde(rename = "previewImageUrl")]
        preview_image_url: String,
    },
}

impl PushMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { text: body.into() }
    }

    /// Image by URL; the preview falls back to the original.
    pub fn image(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::Image {
            original_content_url: url.clone(),
            preview_image_url: url,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid payload: {0}")]
    Validation(String),

    #[error("push API error: HTTP {status}: {body}")]
    Delivery { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("delivery cancelled by invocation deadline")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryClass {
    Success,
    Retryable,
    Fatal,
}

/// Classify a push API response status. Success is strictly HTTP 200;
/// client errors other than 429 are permanent; everything else (429, 5xx,
/// unexpected 2xx/3xx) is retried under the idempotency key.
pub fn classify_status(status: u16) -> DeliveryClass {
    match status {
        200 => DeliveryClass::Success,
        429 => DeliveryClass::Retryable,
        400..=499 => DeliveryClass::Fatal,
        _ => DeliveryClass::Retryable,
    }
}

/// Deterministic retry key: SHA-256 over the recipient and the serialized
/// payload list.
pub fn idempotency_key(recipient: &str, messages: &[PushMessage]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(recipient.as_bytes());
    hasher.update(serde_json::to_vec(messages).unwrap_or_default());
    hex::encode(hasher.finalize())
}
