//! Durable mailbox: a keyed, append-only job queue partitioned by recipient.
//!
//! Producers only ever hold a [`MailboxWriter`]. The single consumer per
//! partition (the local agent) holds a [`Mailbox`], which adds the
//! subscription and the two terminal mutations.

pub mod memory;
pub mod push_id;
pub mod record;
pub mod relay_client;
pub mod rest;
pub mod sse;

pub use memory::MemoryMailbox;
pub use push_id::{PushIdGenerator, generate_push_id};
pub use record::{ScreenPopJob, ScreenPopRecord};
pub use relay_client::RelayWriter;
pub use rest::RestMailbox;

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use futures_util::Stream;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type MailboxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, MailboxError>> + Send + 'a>>;

/// Ordered "child added" notifications for one partition. The stream ends
/// with an error when the underlying connection is lost.
pub type ChildStream = Pin<Box<dyn Stream<Item = Result<ChildAdded, MailboxError>> + Send + 'static>>;

/// A raw child as seen by the subscription, before schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildAdded {
    pub id: String,
    pub value: Value,
}

/// Replace the characters the store forbids in path segments.
pub fn sanitize_key(identity: &str) -> String {
    identity
        .chars()
        .map(|c| match c {
            '.' => ',',
            '#' | '$' | '[' | ']' => '_',
            other => other,
        })
        .collect()
}

/// Mailbox partition key; only constructible through [`sanitize_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientKey(String);

impl RecipientKey {
    /// `None` for a blank identity.
    pub fn from_identity(identity: &str) -> Option<Self> {
        let trimmed = identity.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(sanitize_key(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Producer side: append-only.
pub trait MailboxWriter: Send + Sync {
    fn name(&self) -> &str;

    /// Append a job under `recipient`, returning the generated job id.
    fn append<'a>(
        &'a self,
        recipient: &'a RecipientKey,
        record: &'a ScreenPopRecord,
    ) -> MailboxFuture<'a, String>;
}

/// Consumer side. Removal and processed-marking belong to the subscriber only.
pub trait Mailbox: MailboxWriter {
    fn subscribe<'a>(&'a self, recipient: &'a RecipientKey) -> MailboxFuture<'a, ChildStream>;

    fn mark_processed<'a>(&'a self, recipient: &'a RecipientKey, id: &'a str)
    -> MailboxFuture<'a, ()>;

    fn remove<'a>(&'a self, recipient: &'a RecipientKey, id: &'a str) -> MailboxFuture<'a, ()>;
}

/// Producer for the dispatcher: the relay when configured, else the store.
pub fn writer_from_config(config: &MailboxConfig) -> Result<Arc<dyn MailboxWriter>, MailboxError> {
    if let Some(relay_url) = config.relay_url.as_deref() {
        return Ok(Arc::new(RelayWriter::new(
            relay_url,
            config.request_timeout_secs,
        )?));
    }
    Ok(Arc::new(RestMailbox::from_config(config)?))
}

/// Consumer for the agent; requires direct store access.
pub fn from_config(config: &MailboxConfig) -> Result<Arc<dyn Mailbox>, MailboxError> {
    Ok(Arc::new(RestMailbox::from_config(config)?))
}
