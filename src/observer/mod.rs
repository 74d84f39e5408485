//! Call-state observation: turns the raw, possibly repetitive call event
//! stream into at most one delivery request per inbound connected call.

pub mod event;

pub use event::{CallDirection, CallEvent, CallState, DeliveryRequest};

use anyhow::Result;
use std::collections::HashSet;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

type DedupKey = (String, CallState, CallDirection);

/// Session-scoped filter. The seen set lives only as long as the process.
#[derive(Debug, Default)]
pub struct CallEventObserver {
    recipient: Option<String>,
    seen: HashSet<DedupKey>,
}

impl CallEventObserver {
    pub fn new(recipient: Option<String>) -> Self {
        Self {
            recipient,
            seen: HashSet::new(),
        }
    }

    pub fn observe(&mut self, event: &CallEvent) -> Option<DeliveryRequest> {
        if !event.is_actionable() {
            tracing::trace!(state = ?event.state, direction = ?event.direction, "call event ignored");
            return None;
        }

        let caller = event
            .remote_caller_id
            .as_deref()
            .map(str::trim)
            .filter(|caller| !caller.is_empty());
        let Some(caller) = caller else {
            tracing::warn!(call_id = ?event.call_id, "inbound call without a remote caller id");
            return None;
        };

        let key = (caller.to_string(), event.state, event.direction);
        if !self.seen.insert(key) {
            tracing::debug!(caller, "duplicate call event suppressed");
            return None;
        }

        tracing::info!(caller, call_id = ?event.call_id, "inbound call connected");
        Some(DeliveryRequest {
            phone_number: caller.to_string(),
            recipient: self.recipient.clone(),
        })
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }
}

/// Observer task: returns when the event channel closes or the request
/// channel's receiver is gone.
pub async fn run_observer(
    mut events: mpsc::Receiver<CallEvent>,
    requests: mpsc::Sender<DeliveryRequest>,
    recipient: Option<String>,
) {
    let mut observer = CallEventObserver::new(recipient);
    while let Some(event) = events.recv().await {
        if let Some(request) = observer.observe(&event)
            && requests.send(request).await.is_err()
        {
            tracing::warn!("dispatcher stopped; observer exiting");
            return;
        }
    }
    tracing::debug!(seen = observer.seen_len(), "call event stream closed");
}

/// Feed JSON-lines call events into the observer channel. Returns the number
/// of events forwarded.
pub async fn read_call_events<R>(reader: R, events: mpsc::Sender<CallEvent>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CallEvent>(line) {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            Err(e) => tracing::warn!(error = %e, "skipping malformed call event"),
        }
    }

    Ok(forwarded)
}
