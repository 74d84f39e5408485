use super::agent_harness::{self, RecordingLauncher};
use futures_util::{StreamExt, stream};
use screenpop::agent::AgentPreferences;
use screenpop::error::MailboxError;
use screenpop::mailbox::{
    ChildAdded, ChildStream, Mailbox, MailboxFuture, MailboxWriter, RecipientKey,
    ScreenPopRecord,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn job(uri: &str) -> Value {
    json!({ "uri": uri, "timestamp": 1, "processed": false })
}

/// Store whose first subscription drops right after the snapshot. Every
/// later subscription replays that same (now stale) snapshot, then one new
/// job, then stays open.
struct FlakyMailbox {
    store: Mutex<BTreeMap<String, Value>>,
    first_snapshot: BTreeMap<String, Value>,
    subscribed_at: Mutex<Vec<Instant>>,
}

impl FlakyMailbox {
    fn new() -> Arc<Self> {
        let snapshot: BTreeMap<String, Value> = [
            ("-a".to_string(), job("jhaXp:a")),
            ("-b".to_string(), job("jhaXp:b")),
        ]
        .into_iter()
        .collect();
        Arc::new(Self {
            store: Mutex::new(snapshot.clone()),
            first_snapshot: snapshot,
            subscribed_at: Mutex::new(Vec::new()),
        })
    }

    fn subscriptions(&self) -> Vec<Instant> {
        self.subscribed_at.lock().unwrap().clone()
    }

    fn stored(&self) -> Vec<String> {
        self.store.lock().unwrap().keys().cloned().collect()
    }

    fn replay(&self) -> Vec<Result<ChildAdded, MailboxError>> {
        self.first_snapshot
            .iter()
            .map(|(id, value)| {
                Ok(ChildAdded {
                    id: id.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }
}

impl MailboxWriter for FlakyMailbox {
    fn name(&self) -> &str {
        "flaky"
    }

    fn append<'a>(
        &'a self,
        _recipient: &'a RecipientKey,
        _record: &'a ScreenPopRecord,
    ) -> MailboxFuture<'a, String> {
        Box::pin(async { Err(MailboxError::NotConfigured("read-only test store")) })
    }
}

impl Mailbox for FlakyMailbox {
    fn subscribe<'a>(&'a self, _recipient: &'a RecipientKey) -> MailboxFuture<'a, ChildStream> {
        Box::pin(async move {
            let attempt = {
                let mut subscribed_at = self.subscribed_at.lock().unwrap();
                subscribed_at.push(Instant::now());
                subscribed_at.len()
            };

            let mut items = self.replay();
            if attempt == 1 {
                items.push(Err(MailboxError::Stream("connection reset".into())));
                return Ok(Box::pin(stream::iter(items)) as ChildStream);
            }

            let fresh = job("jhaXp:c");
            self.store
                .lock()
                .unwrap()
                .insert("-c".to_string(), fresh.clone());
            items.push(Ok(ChildAdded {
                id: "-c".to_string(),
                value: fresh,
            }));
            Ok(Box::pin(stream::iter(items).chain(stream::pending())) as ChildStream)
        })
    }

    fn mark_processed<'a>(
        &'a self,
        _recipient: &'a RecipientKey,
        id: &'a str,
    ) -> MailboxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(Value::Object(fields)) = self.store.lock().unwrap().get_mut(id) {
                fields.insert("processed".into(), Value::Bool(true));
            }
            Ok(())
        })
    }

    fn remove<'a>(&'a self, _recipient: &'a RecipientKey, id: &'a str) -> MailboxFuture<'a, ()> {
        Box::pin(async move {
            self.store.lock().unwrap().remove(id);
            Ok(())
        })
    }
}

#[tokio::test]
async fn dropped_subscription_reconnects_after_backoff_without_redelivery() {
    let temp = TempDir::new().unwrap();
    AgentPreferences::with_recipient("alice")
        .save(&temp.path().join("preferences.json"))
        .unwrap();
    let mailbox = FlakyMailbox::new();
    let launcher = RecordingLauncher::new();

    let agent = agent_harness::start_agent(
        temp.path(),
        launcher.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;

    let mut opened = launcher.wait_for(3, WAIT).await;
    // Give a duplicate delivery from the replayed snapshot time to show up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    agent.shutdown().await;

    opened.sort();
    assert_eq!(opened, vec!["jhaXp:a", "jhaXp:b", "jhaXp:c"]);
    assert_eq!(launcher.opened().len(), 3);
    assert!(mailbox.stored().is_empty());

    let subscriptions = mailbox.subscriptions();
    assert_eq!(subscriptions.len(), 2);
    // The harness backoff starts at one second.
    assert!(subscriptions[1] - subscriptions[0] >= Duration::from_secs(1));

    let log = agent_harness::activity_log(temp.path());
    assert!(log.contains("Mailbox subscription interrupted"));
    assert_eq!(log.matches("Subscribed to mailbox for alice").count(), 2);
}
