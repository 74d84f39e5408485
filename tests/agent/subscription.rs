use super::agent_harness::{self, RecordingLauncher};
use screenpop::agent::AgentPreferences;
use screenpop::error::SubscriptionError;
use screenpop::mailbox::{
    Mailbox, MailboxWriter, MemoryMailbox, RecipientKey, ScreenPopRecord,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn key(identity: &str) -> RecipientKey {
    RecipientKey::from_identity(identity).unwrap()
}

fn save_identity(dir: &Path, identity: &str) {
    AgentPreferences::with_recipient(identity)
        .save(&dir.join("preferences.json"))
        .unwrap();
}

async fn wait_until_empty(mailbox: &MemoryMailbox, recipient: &RecipientKey) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !mailbox.is_empty(recipient) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn backlog_is_delivered_once_and_removed() {
    let temp = TempDir::new().unwrap();
    save_identity(temp.path(), "alice@example.com");
    let mailbox = Arc::new(MemoryMailbox::new());
    let alice = key("alice@example.com");
    mailbox
        .append(&alice, &ScreenPopRecord::new("jhaXp:first", None))
        .await
        .unwrap();
    mailbox
        .append(
            &alice,
            &ScreenPopRecord::new("jhaXp:second", Some("3365551234".into())),
        )
        .await
        .unwrap();

    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(
        temp.path(),
        launcher.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;

    let mut opened = launcher.wait_for(2, WAIT).await;
    wait_until_empty(&mailbox, &alice).await;
    // Jobs run concurrently; delivery order is not part of the contract.
    opened.sort();

    assert_eq!(opened, vec!["jhaXp:first", "jhaXp:second"]);
    assert!(mailbox.is_empty(&alice));

    agent.shutdown().await;
    assert_eq!(launcher.opened().len(), 2);
}

#[tokio::test]
async fn live_job_is_delivered_while_subscribed() {
    let temp = TempDir::new().unwrap();
    save_identity(temp.path(), "alice@example.com");
    let mailbox = Arc::new(MemoryMailbox::new());
    let alice = key("alice@example.com");
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(
        temp.path(),
        launcher.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;

    // Let the initial subscription attach before writing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    mailbox
        .append(&alice, &ScreenPopRecord::new("jhaXp:live", None))
        .await
        .unwrap();

    assert_eq!(launcher.wait_for(1, WAIT).await, vec!["jhaXp:live"]);
    wait_until_empty(&mailbox, &alice).await;
    assert!(mailbox.is_empty(&alice));

    agent.shutdown().await;
}

#[tokio::test]
async fn reconfigure_moves_subscription_to_new_recipient() {
    let temp = TempDir::new().unwrap();
    save_identity(temp.path(), "alice@example.com");
    let mailbox = Arc::new(MemoryMailbox::new());
    let alice = key("alice@example.com");
    let bob = key("bob@example.com");
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(
        temp.path(),
        launcher.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;

    let subscribed = agent
        .reconfigure(AgentPreferences::with_recipient("bob@example.com"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscribed, bob);
    assert_eq!(
        AgentPreferences::load(&temp.path().join("preferences.json"))
            .unwrap()
            .recipient_identity
            .as_deref(),
        Some("bob@example.com")
    );

    mailbox
        .append(&bob, &ScreenPopRecord::new("jhaXp:for-bob", None))
        .await
        .unwrap();
    mailbox
        .append(&alice, &ScreenPopRecord::new("jhaXp:for-alice", None))
        .await
        .unwrap();

    assert_eq!(launcher.wait_for(1, WAIT).await, vec!["jhaXp:for-bob"]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(launcher.opened(), vec!["jhaXp:for-bob"]);
    assert_eq!(mailbox.len(&alice), 1);

    agent.shutdown().await;
}

#[tokio::test]
async fn clearing_identity_unsubscribes() {
    let temp = TempDir::new().unwrap();
    save_identity(temp.path(), "alice@example.com");
    let mailbox = Arc::new(MemoryMailbox::new());
    let alice = key("alice@example.com");
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(
        temp.path(),
        launcher.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;

    let result = agent
        .reconfigure(AgentPreferences::default())
        .await
        .unwrap();
    assert_eq!(result, Err(SubscriptionError::NoRecipient));

    mailbox
        .append(&alice, &ScreenPopRecord::new("jhaXp:ignored", None))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(launcher.opened().is_empty());
    assert_eq!(mailbox.len(&alice), 1);

    agent.shutdown().await;
}

#[tokio::test]
async fn malformed_and_processed_entries_are_cleaned_up_without_invoking() {
    let temp = TempDir::new().unwrap();
    save_identity(temp.path(), "alice@example.com");
    let mailbox = Arc::new(MemoryMailbox::new());
    let alice = key("alice@example.com");
    mailbox.insert_raw(&alice, "-a-malformed", json!({ "phoneNumber": 12 }));
    mailbox.insert_raw(
        &alice,
        "-b-processed",
        json!({ "uri": "jhaXp:stale", "timestamp": 1, "processed": true }),
    );
    mailbox.insert_raw(
        &alice,
        "-c-valid",
        json!({ "uri": "jhaXp:fresh", "timestamp": 2, "processed": false }),
    );

    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(
        temp.path(),
        launcher.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;

    assert_eq!(launcher.wait_for(1, WAIT).await, vec!["jhaXp:fresh"]);
    wait_until_empty(&mailbox, &alice).await;
    assert!(mailbox.is_empty(&alice));

    agent.shutdown().await;
    assert_eq!(launcher.opened(), vec!["jhaXp:fresh"]);
}

#[tokio::test]
async fn restarted_agent_does_not_replay_delivered_jobs() {
    let temp = TempDir::new().unwrap();
    save_identity(temp.path(), "alice@example.com");
    let mailbox = Arc::new(MemoryMailbox::new());
    let alice = key("alice@example.com");
    mailbox
        .append(&alice, &ScreenPopRecord::new("jhaXp:once", None))
        .await
        .unwrap();

    let first = RecordingLauncher::new();
    let agent = agent_harness::start_agent(
        temp.path(),
        first.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;
    assert_eq!(first.wait_for(1, WAIT).await.len(), 1);
    wait_until_empty(&mailbox, &alice).await;
    agent.shutdown().await;

    let second = RecordingLauncher::new();
    let agent = agent_harness::start_agent(
        temp.path(),
        second.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    agent.shutdown().await;

    assert!(second.opened().is_empty());
}

#[tokio::test]
async fn identity_edited_on_disk_moves_the_subscription() {
    let temp = TempDir::new().unwrap();
    save_identity(temp.path(), "alice@example.com");
    let mailbox = Arc::new(MemoryMailbox::new());
    let bob = key("bob@example.com");
    let carol = key("carol@example.com");
    mailbox
        .append(&carol, &ScreenPopRecord::new("jhaXp:for-carol", None))
        .await
        .unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(
        temp.path(),
        launcher.clone(),
        Some(mailbox.clone() as Arc<dyn Mailbox>),
        false,
    )
    .await;

    // Two saves back to back, as `identity set` run twice would produce.
    save_identity(temp.path(), "bob@example.com");
    save_identity(temp.path(), "carol@example.com");

    assert_eq!(launcher.wait_for(1, WAIT).await, vec!["jhaXp:for-carol"]);
    wait_until_empty(&mailbox, &carol).await;
    assert!(mailbox.is_empty(&carol));
    assert!(mailbox.is_empty(&bob));

    agent.shutdown().await;
}
