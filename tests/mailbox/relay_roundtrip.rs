use screenpop::mailbox::{MailboxWriter, MemoryMailbox, RecipientKey, RelayWriter, ScreenPopRecord};
use screenpop::relay::run_relay_with_listener;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn relay_writer_lands_jobs_in_the_store() {
    let store = Arc::new(MemoryMailbox::new());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    let relay = tokio::spawn(run_relay_with_listener(
        listener,
        store.clone(),
        shutdown.clone(),
    ));

    let writer = RelayWriter::new(&base, 5).unwrap();
    assert_eq!(writer.endpoint().path(), "/api/data");

    let recipient = RecipientKey::from_identity("carol.jones@example.com").unwrap();
    let record = ScreenPopRecord::new("jhaXp:Instance=X", Some("3365551234".into()));
    let id = writer.append(&recipient, &record).await.unwrap();

    let stored = store.get(&recipient, &id).unwrap();
    assert_eq!(stored["uri"], "jhaXp:Instance=X");
    assert_eq!(stored["phoneNumber"], "3365551234");
    assert_eq!(stored["processed"], false);

    shutdown.cancel();
    relay.await.unwrap().unwrap();
}
