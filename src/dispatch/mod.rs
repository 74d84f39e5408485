//! Delivery dispatch: the policy gate in front of the two independent
//! delivery attempts (direct loopback call and durable mailbox write).

pub mod loopback;

pub use loopback::LoopbackClient;

use crate::config::DispatchConfig;
use crate::link;
use crate::mailbox::{MailboxWriter, RecipientKey, ScreenPopRecord};
use crate::observer::DeliveryRequest;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub enabled: bool,
    pub min_length: usize,
    pub routing_id: String,
    pub instance: String,
    pub recipient: Option<String>,
}

impl DispatchPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_length: config.min_length,
            routing_id: config.routing_id.clone(),
            instance: config.instance.clone(),
            recipient: config.recipient_identity.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    TooShort { length: usize, min_length: usize },
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Skipped(SkipReason),
    Fired(FiredDelivery),
}

impl DispatchOutcome {
    pub fn is_fired(&self) -> bool {
        matches!(self, Self::Fired(_))
    }
}

/// Both attempts are already running; dropping this detaches them.
#[derive(Debug)]
pub struct FiredDelivery {
    pub uri: String,
    pub phone_number: String,
    pub recipient: Option<RecipientKey>,
    direct: JoinHandle<bool>,
    durable: Option<JoinHandle<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledDelivery {
    pub direct_delivered: bool,
    pub mailbox_job_id: Option<String>,
}

impl FiredDelivery {
    /// Wait for both attempts. Failures were already logged by the attempts.
    pub async fn settled(self) -> SettledDelivery {
        let direct_delivered = self.direct.await.unwrap_or(false);
        let mailbox_job_id = match self.durable {
            Some(handle) => handle.await.ok().flatten(),
            None => None,
        };
        SettledDelivery {
            direct_delivered,
            mailbox_job_id,
        }
    }
}

pub struct Dispatcher {
    policy: DispatchPolicy,
    loopback: LoopbackClient,
    writer: Option<Arc<dyn MailboxWriter>>,
}

impl Dispatcher {
    pub fn new(
        policy: DispatchPolicy,
        loopback: LoopbackClient,
        writer: Option<Arc<dyn MailboxWriter>>,
    ) -> Self {
        Self {
            policy,
            loopback,
            writer,
        }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Apply the gate and fire both attempts without waiting on either.
    /// Must be called inside a Tokio runtime.
    pub fn dispatch(&self, request: &DeliveryRequest) -> DispatchOutcome {
        if !self.policy.enabled {
            tracing::info!(phone = %request.phone_number, "screen pop disabled; not dispatching");
            return DispatchOutcome::Skipped(SkipReason::Disabled);
        }

        let normalized = link::normalize(&request.phone_number);
        if normalized.len() < self.policy.min_length {
            tracing::info!(
                phone = %normalized,
                length = normalized.len(),
                min_length = self.policy.min_length,
                "number shorter than minimum; not dispatching"
            );
            return DispatchOutcome::Skipped(SkipReason::TooShort {
                length: normalized.len(),
                min_length: self.policy.min_length,
            });
        }

        let uri = link::build(&self.policy.routing_id, &self.policy.instance, &normalized);
        tracing::info!(phone = %normalized, uri = %uri, "dispatching screen pop");

        let direct = {
            let loopback = self.loopback.clone();
            let uri = uri.clone();
            let phone = normalized.clone();
            tokio::spawn(async move {
                match loopback.deliver(&uri, Some(&phone)).await {
                    Ok(()) => {
                        tracing::info!(endpoint = loopback.endpoint(), "direct delivery accepted");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "direct delivery failed; relying on mailbox");
                        false
                    }
                }
            })
        };

        let recipient = request
            .recipient
            .as_deref()
            .or(self.policy.recipient.as_deref())
            .and_then(RecipientKey::from_identity);

        let durable = match (&self.writer, &recipient) {
            (Some(writer), Some(key)) => {
                let writer = Arc::clone(writer);
                let key = key.clone();
                let record = ScreenPopRecord::new(uri.clone(), Some(normalized.clone()));
                Some(tokio::spawn(async move {
                    match writer.append(&key, &record).await {
                        Ok(id) => {
                            tracing::info!(recipient = %key, id = %id, via = writer.name(), "mailbox job written");
                            Some(id)
                        }
                        Err(e) => {
                            tracing::error!(recipient = %key, error = %e, "mailbox write failed");
                            None
                        }
                    }
                }))
            }
            (None, _) => {
                tracing::warn!("no mailbox configured; durable delivery skipped");
                None
            }
            (Some(_), None) => {
                tracing::warn!("no recipient identity; durable delivery skipped");
                None
            }
        };

        DispatchOutcome::Fired(FiredDelivery {
            uri,
            phone_number: normalized,
            recipient,
            direct,
            durable,
        })
    }
}

/// Dispatcher task. Drains every fired delivery before returning.
pub async fn run_dispatcher(mut requests: mpsc::Receiver<DeliveryRequest>, dispatcher: Dispatcher) {
    let mut in_flight = JoinSet::new();

    while let Some(request) = requests.recv().await {
        if let DispatchOutcome::Fired(delivery) = dispatcher.dispatch(&request) {
            in_flight.spawn(delivery.settled());
        }
        // Reap what has already finished.
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
}
