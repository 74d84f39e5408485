//! REST dialect of the cloud key/value store (`{path}.json`, `auth=` query
//! parameter, server-sent events for subscriptions).

use super::sse::{ChildTracker, SseBuffer, parse_event_data_pairs};
use super::{
    ChildStream, Mailbox, MailboxFuture, MailboxWriter, RecipientKey, ScreenPopRecord,
    generate_push_id,
};
use crate::config::MailboxConfig;
use crate::error::MailboxError;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use std::time::Duration;
use url::Url;

pub struct RestMailbox {
    client: Client,
    base_url: Url,
    root: String,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl RestMailbox {
    pub fn new(
        database_url: &str,
        root: &str,
        auth_token: Option<String>,
        request_timeout_secs: u64,
    ) -> Result<Self, MailboxError> {
        let base_url = Url::parse(database_url)
            .map_err(|e| MailboxError::Request(format!("invalid database url {database_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(MailboxError::Request(format!(
                "database url {database_url} cannot carry a path"
            )));
        }

        // No overall timeout: subscriptions are long-lived responses.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url,
            root: root.trim_matches('/').to_string(),
            auth_token: auth_token.filter(|token| !token.is_empty()),
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
        })
    }

    pub fn from_config(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or(MailboxError::NotConfigured("[mailbox] database_url"))?;
        Self::new(
            database_url,
            &config.root,
            config.auth_token.clone(),
            config.request_timeout_secs,
        )
    }

    /// `{base}/{root}/{key}[/{id}].json?auth=...`
    fn resource_url(&self, recipient: &RecipientKey, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        let mut segments: Vec<&str> = self.root.split('/').filter(|s| !s.is_empty()).collect();
        let leaf = match id {
            Some(id) => {
                segments.push(recipient.as_str());
                format!("{id}.json")
            }
            None => format!("{}.json", recipient.as_str()),
        };

        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push(&leaf);
        }
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        url
    }
}

async fn check_status(response: Response) -> Result<Response, MailboxError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MailboxError::Status {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

impl MailboxWriter for RestMailbox {
    fn name(&self) -> &str {
        "rest"
    }

    fn append<'a>(
        &'a self,
        recipient: &'a RecipientKey,
        record: &'a ScreenPopRecord,
    ) -> MailboxFuture<'a, String> {
        Box::pin(async move {
            let id = generate_push_id();
            let url = self.resource_url(recipient, Some(&id));
            let response = self
                .client
                .put(url)
                .timeout(self.request_timeout)
                .json(record)
                .send()
                .await?;
            check_status(response).await?;
            tracing::debug!(recipient = %recipient, id = %id, "mailbox job appended");
            Ok(id)
        })
    }
}

impl Mailbox for RestMailbox {
    fn subscribe<'a>(&'a self, recipient: &'a RecipientKey) -> MailboxFuture<'a, ChildStream> {
        Box::pin(async move {
            let url = self.resource_url(recipient, None);
            let response = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send()
                .await?;
            let response = check_status(response).await?;
            let mut byte_stream = response.bytes_stream();

            let stream = async_stream::try_stream! {
                let mut sse_buffer = SseBuffer::new();
                let mut tracker = ChildTracker::new();

                while let Some(chunk_result) = byte_stream.next().await {
                    let chunk = chunk_result?;
                    sse_buffer.push_chunk(&chunk);

                    while let Some(event_block) = sse_buffer.next_event_block() {
                        for (event_type, data) in parse_event_data_pairs(&event_block) {
                            for child in tracker.apply(event_type, data)? {
                                yield child;
                            }
                        }
                    }
                }

                Err::<(), _>(MailboxError::Stream("connection closed by server".to_string()))?;
            };

            let stream: ChildStream = Box::pin(stream);
            Ok(stream)
        })
    }

    fn mark_processed<'a>(
        &'a self,
        recipient: &'a RecipientKey,
        id: &'a str,
    ) -> MailboxFuture<'a, ()> {
        Box::pin(async move {
            let url = self.resource_url(recipient, Some(id));
            let response = self
                .client
                .patch(url)
                .timeout(self.request_timeout)
                .json(&serde_json::json!({ "processed": true }))
                .send()
                .await?;
            check_status(response).await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, recipient: &'a RecipientKey, id: &'a str) -> MailboxFuture<'a, ()> {
        Box::pin(async move {
            let url = self.resource_url(recipient, Some(id));
            let response = self
                .client
                .delete(url)
                .timeout(self.request_timeout)
                .send()
                .await?;
            check_status(response).await?;
            Ok(())
        })
    }
}
