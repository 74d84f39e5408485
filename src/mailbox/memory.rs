use super::{
    ChildAdded, ChildStream, Mailbox, MailboxFuture, MailboxWriter, RecipientKey,
    ScreenPopRecord, generate_push_id,
};
use crate::error::MailboxError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

type Partitions = HashMap<RecipientKey, BTreeMap<String, Value>>;

/// In-process mailbox with the same ordering and subscription semantics as
/// the cloud store. Backs tests and single-machine runs.
pub struct MemoryMailbox {
    partitions: Mutex<Partitions>,
    events: broadcast::Sender<(RecipientKey, ChildAdded)>,
}

impl Default for MemoryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMailbox {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            partitions: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Store an arbitrary child, bypassing record serialization.
    pub fn insert_raw(&self, recipient: &RecipientKey, id: &str, value: Value) {
        let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        let children = partitions.entry(recipient.clone()).or_default();
        let is_new = children.insert(id.to_string(), value.clone()).is_none();
        if is_new {
            // No receivers is fine.
            let _ = self.events.send((
                recipient.clone(),
                ChildAdded {
                    id: id.to_string(),
                    value,
                },
            ));
        }
    }

    pub fn get(&self, recipient: &RecipientKey, id: &str) -> Option<Value> {
        let partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        partitions.get(recipient)?.get(id).cloned()
    }

    pub fn ids(&self, recipient: &RecipientKey) -> Vec<String> {
        let partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        partitions
            .get(recipient)
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, recipient: &RecipientKey) -> usize {
        let partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        partitions.get(recipient).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, recipient: &RecipientKey) -> bool {
        self.len(recipient) == 0
    }
}

impl MailboxWriter for MemoryMailbox {
    fn name(&self) -> &str {
        "memory"
    }

    fn append<'a>(
        &'a self,
        recipient: &'a RecipientKey,
        record: &'a ScreenPopRecord,
    ) -> MailboxFuture<'a, String> {
        Box::pin(async move {
            let value =
                serde_json::to_value(record).map_err(|e| MailboxError::Decode(e.to_string()))?;
            let id = generate_push_id();
            self.insert_raw(recipient, &id, value);
            Ok(id)
        })
    }
}

impl Mailbox for MemoryMailbox {
    fn subscribe<'a>(&'a self, recipient: &'a RecipientKey) -> MailboxFuture<'a, ChildStream> {
        Box::pin(async move {
            // Snapshot and receiver are taken under one lock so no append
            // falls between them.
            let (snapshot, mut receiver) = {
                let partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
                let snapshot: Vec<ChildAdded> = partitions
                    .get(recipient)
                    .map(|children| {
                        children
                            .iter()
                            .map(|(id, value)| ChildAdded {
                                id: id.clone(),
                                value: value.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                (snapshot, self.events.subscribe())
            };
            let recipient = recipient.clone();

            let stream = async_stream::try_stream! {
                for child in snapshot {
                    yield child;
                }
                loop {
                    match receiver.recv().await {
                        Ok((key, child)) if key == recipient => yield child,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            Err::<(), _>(MailboxError::Stream(format!(
                                "subscriber lagged by {skipped} events"
                            )))?;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
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
            let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(Value::Object(fields)) = partitions
                .get_mut(recipient)
                .and_then(|children| children.get_mut(id))
            {
                fields.insert("processed".into(), Value::Bool(true));
            }
            Ok(())
        })
    }

    fn remove<'a>(&'a self, recipient: &'a RecipientKey, id: &'a str) -> MailboxFuture<'a, ()> {
        Box::pin(async move {
            let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(children) = partitions.get_mut(recipient) {
                children.remove(id);
            }
            Ok(())
        })
    }
}
