use snapshot_core::{sleep_within, RetryPolicy};
use tokio::time::Instant;

use crate::transport::PushTransport;
use crate::{classify_status, idempotency_key, DeliveryClass, NotifyError, PushMessage};

/// Delivers payload lists to one recipient with bounded, idempotent
/// retries.
///
/// Per delivery call: Validating -> Sending -> {Success | RetryWait ->
/// Sending | Failed}. Validation failures never reach the transport, and
/// a retry wait that would cross the deadline fails the call as cancelled.
pub struct PushDispatcher {
    transport: Box<dyn PushTransport>,
    recipient: String,
    policy: RetryPolicy,
}

impl PushDispatcher {
    pub fn new(transport: Box<dyn PushTransport>, recipient: String, policy: RetryPolicy) -> Self {
        Self {
            transport,
            recipient,
            policy,
        }
    }

    /// Send the full payload list as one delivery request. `retry_key`
    /// overrides the content-derived idempotency key.
    pub async fn send(
        &self,
        messages: &[PushMessage],
        retry_key: Option<&str>,
        deadline: Option<Instant>,
    ) -> Result<(), NotifyError> {
        validate_payloads(messages)?;

        let retry_key = retry_key
            .map(str::to_string)
            .unwrap_or_else(|| idempotency_key(&self.recipient, messages));

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self
                .transport
                .deliver(&self.recipient, messages, &retry_key)
                .await
            {
                Ok(response) => match classify_status(response.status) {
                    DeliveryClass::Success => return Ok(()),
                    DeliveryClass::Fatal => {
                        return Err(NotifyError::Delivery {
                            status: response.status,
                            body: response.body,
                        });
                    }
                    DeliveryClass::Retryable => {
                        tracing::warn!(
                            status = response.status,
                            attempt,
                            max_attempts,
                            "push delivery rejected, will retry"
                        );
                        last_error = Some(NotifyError::Delivery {
                            status: response.status,
                            body: response.body,
                        });
                    }
                },
                Err(NotifyError::Transport(message)) => {
                    tracing::warn!(
                        error = %message,
                        attempt,
                        max_attempts,
                        "push transport failed, will retry"
                    );
                    last_error = Some(NotifyError::Transport(message));
                }
                Err(other) => return Err(other),
            }

            if attempt < max_attempts && !sleep_within(self.policy.delay, deadline).await {
                return Err(NotifyError::Cancelled);
            }
        }

        Err(last_error
            .unwrap_or_else(|| NotifyError::Transport("no delivery attempt made".to_string())))
    }

    pub async fn send_text(
        &self,
        body: impl Into<String>,
        deadline: Option<Instant>,
    ) -> Result<(), NotifyError> {
        self.send(&[PushMessage::text(body)], None, deadline).await
    }

    pub async fn send_image(
        &self,
        url: impl Into<String>,
        deadline: Option<Instant>,
    ) -> Result<(), NotifyError> {
        self.send(&[PushMessage::image(url)], None, deadline).await
    }
}

fn validate_payloads(messages: &[PushMessage]) -> Result<(), NotifyError> {
    for message in messages {
        if let PushMessage::Image {
            original_content_url,
            ..
        } = message
        {
            if !original_content_url.starts_with("https://") {
                return Err(NotifyError::Validation(format!(
                    "image URL must use https: {original_content_url}"
                )));
            }
        }
    }
    Ok(())
}
