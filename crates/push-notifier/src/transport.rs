use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::{NotifyError, PushMessage};

/// Status and body of one delivery attempt, handed back to the dispatcher
/// for classification.
#[derive(Debug, Clone)]
pub struct PushResponse {
    pub status: u16,
    pub body: String,
}

/// One outbound POST of the full message list per call. The dispatcher
/// owns validation, retry, and classification; a transport only moves
/// bytes.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        recipient: &str,
        messages: &[PushMessage],
        retry_key: &str,
    ) -> Result<PushResponse, NotifyError>;
}

pub struct HttpPushTransport {
    client: Client,
    endpoint: String,
    channel_token: String,
}

impl HttpPushTransport {
    pub fn new(base_url: &str, channel_token: String) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("market-pulse/0.1")
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v2/bot/message/push", base_url.trim_end_matches('/')),
            channel_token,
        })
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: &'a [PushMessage],
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn deliver(
        &self,
        recipient: &str,
        messages: &[PushMessage],
        retry_key: &str,
    ) -> Result<PushResponse, NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.channel_token)
            .header("X-Retry-Key", retry_key)
            .json(&PushRequest {
                to: recipient,
                messages,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(PushResponse { status, body })
    }
}
