use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::message::WebhookMessage;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("webhook client could not be built: {0}")]
    Build(String),
    #[error("webhook request failed: {0}")]
    Request(String),
    #[error("webhook endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// One outbound POST of a webhook message. Success means a 2xx response.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, endpoint_url: &str, message: &WebhookMessage)
        -> Result<(), TransportError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestWebhookTransport {
    client: Client,
}

impl ReqwestWebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Build(error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestWebhookTransport {
    async fn post(
        &self,
        endpoint_url: &str,
        message: &WebhookMessage,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(endpoint_url)
            .json(message)
            .send()
            .await
            // reqwest errors embed the URL, which carries the webhook secret
            .map_err(|error| TransportError::Request(error.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body });
        }

        Ok(())
    }
}
