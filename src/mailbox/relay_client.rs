use super::{MailboxFuture, MailboxWriter, RecipientKey, ScreenPopRecord};
use crate::error::MailboxError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const RELAY_PATH: &str = "api/data";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    username: &'a str,
    uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    message_id: String,
}

/// Producer that hands jobs to the relay service instead of holding store
/// credentials itself.
pub struct RelayWriter {
    client: Client,
    endpoint: Url,
}

impl RelayWriter {
    pub fn new(relay_url: &str, timeout_secs: u64) -> Result<Self, MailboxError> {
        let mut base = Url::parse(relay_url)
            .map_err(|e| MailboxError::Request(format!("invalid relay url {relay_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = if base.path().ends_with(&format!("{RELAY_PATH}/")) {
            let trimmed = base.path().trim_end_matches('/').to_string();
            base.set_path(&trimmed);
            base
        } else {
            base.join(RELAY_PATH)
                .map_err(|e| MailboxError::Request(format!("invalid relay url {relay_url}: {e}")))?
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl MailboxWriter for RelayWriter {
    fn name(&self) -> &str {
        "relay"
    }

    fn append<'a>(
        &'a self,
        recipient: &'a RecipientKey,
        record: &'a ScreenPopRecord,
    ) -> MailboxFuture<'a, String> {
        Box::pin(async move {
            let body = RelayRequest {
                username: recipient.as_str(),
                uri: &record.uri,
                phone_number: record.phone_number.as_deref(),
            };
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(MailboxError::Status {
                    status: status.as_u16(),
                    body: body.trim().to_string(),
                });
            }

            let decoded: RelayResponse = response
                .json()
                .await
                .map_err(|e| MailboxError::Decode(e.to_string()))?;
            Ok(decoded.message_id)
        })
    }
}
