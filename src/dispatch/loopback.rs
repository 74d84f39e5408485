use crate::error::TransportError;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopbackRequest<'a> {
    pub uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<&'a str>,
}

/// Best-effort direct call to a local agent. Never retried.
#[derive(Debug, Clone)]
pub struct LoopbackClient {
    client: Client,
    endpoint: String,
}

impl LoopbackClient {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let parsed = Url::parse(&endpoint).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::InvalidEndpoint {
                message: format!("unsupported scheme {}", parsed.scheme()),
                endpoint,
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| TransportError::Request {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn deliver(&self, uri: &str, phone_number: Option<&str>) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&LoopbackRequest { uri, phone_number })
            .send()
            .await
            .map_err(|e| TransportError::Request {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            endpoint: self.endpoint.clone(),
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}
