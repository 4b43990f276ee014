//! Send-path durability (spec §8 quantified invariant): if the process
//! crashes while a message is persisted at `Sending` but never ACKed, the
//! next `Client::new` against the same database finds it, re-enqueues it,
//! and sends it once a connection comes up.

mod common;

use im_protocol::{ConversationType, MessageType};
use im_sdk::Client;
use im_store::config::StoreConfig;
use im_store::model::{Direction, Message, MessageStatus};
use im_store::Store;
use im_test_utils::MockWsServer;
use std::time::Duration;

fn unacked(message_id: &str) -> Message {
    Message {
        message_id: message_id.to_owned(),
        server_msg_id: None,
        seq: 0,
        conversation_id: "c1".to_owned(),
        sender_id: "u1".to_owned(),
        receiver_id: "peer".to_owned(),
        conversation_type: ConversationType::Single,
        message_type: MessageType::Text,
        content: "surviving a crash".to_owned(),
        create_time: 1,
        server_time: 0,
        status: MessageStatus::Sending,
        direction: Direction::Send,
        is_read: false,
        is_deleted: false,
        is_revoked: false,
        revoked_by: None,
        revoked_time: None,
        at_user_ids: vec![],
        at_all: false,
        read_by: vec![],
        quote: None,
        extra: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn unacked_message_survives_restart_and_gets_resent() {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let db_path = db_file.path().to_str().unwrap().to_owned();
    // Drop the handle but keep the path around; `Store::open` creates the
    // file fresh via its own connection.
    drop(db_file);

    // Simulate the pre-crash process: open the store directly and persist a
    // message that was handed to the send queue but never got an ack before
    // the process died.
    {
        let mut store = Store::open(&StoreConfig { enable_wal: true, encryption_key: None, file_name: db_path.clone() }).unwrap();
        store.save_message(&unacked("crash1")).unwrap();
    }

    let server = MockWsServer::start().await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    let mut config = common::test_config(url);
    config.database.file_name = db_path.clone();

    // `Client::new` restores pending sends from the store before the
    // transport connects; the drain loop should retry once the connection
    // comes up rather than leaving the restored item stuck.
    let client = Client::new(config, "u1".to_owned()).await.unwrap();

    let history = client.get_history("c1", i64::MAX, 10).await.unwrap();
    assert!(
        history.iter().any(|m| m.message_id == "crash1" && m.status == MessageStatus::Sending),
        "the unacked message should still be in the store right after restart"
    );

    client.login("u1".to_owned(), "tok".to_owned()).await;
    assert!(common::wait_for_state(&client, im_sdk::supervisor::ConnectionState::Connected, Duration::from_secs(5)).await);

    let sent = common::wait_until_async(
        || {
            let client = client.clone();
            async move {
                client
                    .get_history("c1", i64::MAX, 10)
                    .await
                    .unwrap()
                    .into_iter()
                    .any(|m| m.message_id == "crash1" && m.status == MessageStatus::Sent)
            }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(sent, "the restored message should be dispatched and acked once the transport connects");
}
