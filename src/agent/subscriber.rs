//! Mailbox consumption: one subscription per recipient partition, each job
//! acted on at most once.

use super::activity_log::ActivityLog;
use super::launcher::UriLauncher;
use super::preferences::AgentPreferences;
use crate::error::SubscriptionError;
use crate::mailbox::{ChildAdded, Mailbox, RecipientKey, ScreenPopRecord};
use futures_util::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    /// Handler failed; the job was still removed.
    HandlerFailed(String),
    /// Could not claim the job; left in place for a later attempt.
    Unclaimed(String),
    Malformed,
    AlreadyProcessed,
    Duplicate,
}

/// Ids handled this session, so stale snapshot replays after a reconnect
/// never reach the handler twice. Only the most recent `capacity` ids are
/// remembered; older jobs are long gone from the store.
#[derive(Debug)]
struct HandledIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl HandledIds {
    const DEFAULT_CAPACITY: usize = 1024;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn remove(&mut self, id: &str) {
        if self.ids.remove(id) {
            self.order.retain(|known| known != id);
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Per-job state machine. Claiming (marking processed) happens before the
/// handler runs, so a crash mid-delivery never replays the job.
pub struct JobProcessor {
    mailbox: Arc<dyn Mailbox>,
    launcher: Arc<dyn UriLauncher>,
    log: Arc<ActivityLog>,
    handled: Mutex<HandledIds>,
}

impl JobProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        launcher: Arc<dyn UriLauncher>,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            mailbox,
            launcher,
            log,
            handled: Mutex::new(HandledIds::with_capacity(HandledIds::DEFAULT_CAPACITY)),
        }
    }

    /// Number of job ids currently remembered for duplicate suppression.
    pub fn remembered(&self) -> usize {
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn claim_in_session(&self, id: &str) -> bool {
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    fn release_in_session(&self, id: &str) {
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    async fn remove(&self, recipient: &RecipientKey, id: &str) {
        if let Err(e) = self.mailbox.remove(recipient, id).await {
            self.log
                .record(format!("Error: failed to remove job {id}: {e}"));
        }
    }

    pub async fn process(&self, recipient: &RecipientKey, child: ChildAdded) -> JobOutcome {
        let id = child.id;
        if !self.claim_in_session(&id) {
            return JobOutcome::Duplicate;
        }

        let record = match ScreenPopRecord::from_value(&child.value) {
            Ok(record) => record,
            Err(e) => {
                self.log
                    .record(format!("Discarding malformed job {id}: {e}"));
                self.remove(recipient, &id).await;
                return JobOutcome::Malformed;
            }
        };

        if record.processed {
            self.log
                .record(format!("Removing already processed job {id}"));
            self.remove(recipient, &id).await;
            return JobOutcome::AlreadyProcessed;
        }

        self.log.record(format!(
            "Mailbox job {id} received for {recipient}: {}",
            record.uri
        ));
        if let Err(e) = self.mailbox.mark_processed(recipient, &id).await {
            self.log
                .record(format!("Error: failed to claim job {id}: {e}"));
            self.release_in_session(&id);
            return JobOutcome::Unclaimed(e.to_string());
        }

        self.log.record(format!("Opening URI: {}", record.uri));
        let outcome = match self.launcher.open(&record.uri).await {
            Ok(()) => {
                self.log.record("Screen pop triggered successfully");
                JobOutcome::Delivered
            }
            Err(e) => {
                self.log.record(format!("Error: {e}"));
                JobOutcome::HandlerFailed(e.to_string())
            }
        };

        self.remove(recipient, &id).await;
        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn from_secs(initial_secs: u64, max_secs: u64) -> Self {
        let initial = Duration::from_secs(initial_secs.max(1));
        Self {
            initial,
            max: Duration::from_secs(max_secs).max(initial),
        }
    }
}

/// Subscription loop for one partition. Reconnects with exponential backoff
/// until cancelled, then waits for in-flight jobs.
async fn run_subscription(
    mailbox: Arc<dyn Mailbox>,
    processor: Arc<JobProcessor>,
    recipient: RecipientKey,
    backoff: Backoff,
    log: Arc<ActivityLog>,
    cancel: CancellationToken,
) {
    let mut delay = backoff.initial;
    let mut jobs = JoinSet::new();

    'connect: while !cancel.is_cancelled() {
        let subscribed = tokio::select! {
            () = cancel.cancelled() => break 'connect,
            result = mailbox.subscribe(&recipient) => result,
        };

        match subscribed {
            Ok(mut stream) => {
                log.record(format!("Subscribed to mailbox for {recipient}"));
                delay = backoff.initial;

                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break 'connect,
                        Some(_) = jobs.join_next(), if !jobs.is_empty() => {}
                        item = stream.next() => match item {
                            Some(Ok(child)) => {
                                let processor = Arc::clone(&processor);
                                let recipient = recipient.clone();
                                jobs.spawn(async move { processor.process(&recipient, child).await });
                            }
                            Some(Err(e)) => {
                                log.record(format!("Mailbox subscription interrupted: {e}"));
                                break;
                            }
                            None => {
                                log.record("Mailbox subscription closed");
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) => log.record(format!("Error: mailbox subscription failed: {e}")),
        }

        tracing::debug!(recipient = %recipient, delay_secs = delay.as_secs(), "resubscribing after backoff");
        tokio::select! {
            () = cancel.cancelled() => break 'connect,
            () = tokio::time::sleep(delay) => {}
        }
        delay = delay.saturating_mul(2).min(backoff.max);
    }

    while jobs.join_next().await.is_some() {}
    log.record(format!("Unsubscribed from mailbox for {recipient}"));
}

struct ActiveSubscription {
    recipient: RecipientKey,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single active subscription. A new recipient is only subscribed
/// after the previous subscription (and its in-flight jobs) fully stopped.
pub struct SubscriptionManager {
    mailbox: Option<Arc<dyn Mailbox>>,
    processor: Option<Arc<JobProcessor>>,
    log: Arc<ActivityLog>,
    backoff: Backoff,
    parent: CancellationToken,
    active: Option<ActiveSubscription>,
}

impl SubscriptionManager {
    pub fn new(
        mailbox: Option<Arc<dyn Mailbox>>,
        launcher: Arc<dyn UriLauncher>,
        log: Arc<ActivityLog>,
        backoff: Backoff,
        parent: CancellationToken,
    ) -> Self {
        let processor = mailbox.as_ref().map(|mailbox| {
            Arc::new(JobProcessor::new(
                Arc::clone(mailbox),
                launcher,
                Arc::clone(&log),
            ))
        });
        Self {
            mailbox,
            processor,
            log,
            backoff,
            parent,
            active: None,
        }
    }

    pub fn active_recipient(&self) -> Option<&RecipientKey> {
        self.active.as_ref().map(|active| &active.recipient)
    }

    /// Subscribe to the partition named by `preferences`. Unchanged keys are
    /// a no-op.
    pub async fn apply(
        &mut self,
        preferences: &AgentPreferences,
    ) -> Result<RecipientKey, SubscriptionError> {
        let next = preferences.recipient_key();
        if let (Some(active), Some(next)) = (&self.active, &next)
            && active.recipient == *next
        {
            return Ok(next.clone());
        }

        self.stop().await;

        let Some(recipient) = next else {
            self.log
                .record(format!("Error: {}", SubscriptionError::NoRecipient));
            return Err(SubscriptionError::NoRecipient);
        };
        let (Some(mailbox), Some(processor)) = (&self.mailbox, &self.processor) else {
            self.log
                .record(format!("Error: {}", SubscriptionError::NoMailbox));
            return Err(SubscriptionError::NoMailbox);
        };

        let cancel = self.parent.child_token();
        let handle = tokio::spawn(run_subscription(
            Arc::clone(mailbox),
            Arc::clone(processor),
            recipient.clone(),
            self.backoff,
            Arc::clone(&self.log),
            cancel.clone(),
        ));
        self.active = Some(ActiveSubscription {
            recipient: recipient.clone(),
            cancel,
            handle,
        });
        Ok(recipient)
    }

    /// Cancel the active subscription and wait for it to drain.
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(e) = active.handle.await {
                tracing::error!(error = %e, "subscription task failed");
            }
        }
    }
}
