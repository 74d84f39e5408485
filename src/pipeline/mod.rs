//! Producer-side task wiring: call events → observer → dispatcher.

use crate::dispatch::{Dispatcher, run_dispatcher};
use crate::observer::{CallEvent, DeliveryRequest, run_observer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 64;

pub struct PipelineHandle {
    events: mpsc::Sender<CallEvent>,
    observer: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn sender(&self) -> mpsc::Sender<CallEvent> {
        self.events.clone()
    }

    /// Close the event input and wait until every fired delivery settled.
    /// Other clones of [`Self::sender`] must be dropped first.
    pub async fn finish(self) {
        drop(self.events);
        if let Err(e) = self.observer.await {
            tracing::error!(error = %e, "observer task failed");
        }
        if let Err(e) = self.dispatcher.await {
            tracing::error!(error = %e, "dispatcher task failed");
        }
    }
}

pub fn spawn_pipeline(dispatcher: Dispatcher) -> PipelineHandle {
    let (events_tx, events_rx) = mpsc::channel::<CallEvent>(CHANNEL_CAPACITY);
    let (requests_tx, requests_rx) = mpsc::channel::<DeliveryRequest>(CHANNEL_CAPACITY);

    let recipient = dispatcher.policy().recipient.clone();
    let observer = tokio::spawn(run_observer(events_rx, requests_tx, recipient));
    let dispatcher = tokio::spawn(run_dispatcher(requests_rx, dispatcher));

    PipelineHandle {
        events: events_tx,
        observer,
        dispatcher,
    }
}
