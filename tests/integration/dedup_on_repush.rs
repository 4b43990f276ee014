//! Scenario 3 (spec §8): a `push_msg` re-delivering an already-`sent` local
//! message with the same `message_id` and `seq` but an advanced `status`
//! dedup-merges into an update, not a duplicate row, and fires exactly one
//! listener notification for it.

mod common;

use im_protocol::*;
use im_sdk::{Client, SdkEvent};
use im_store::model::{Direction, Message, MessageStatus, MessageType};
use im_test_utils::{MockWsServer, ServerCommand};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn outbound(message_id: &str) -> Message {
    Message {
        message_id: message_id.to_owned(),
        server_msg_id: None,
        seq: 0,
        conversation_id: "c1".to_owned(),
        sender_id: String::new(),
        receiver_id: "peer".to_owned(),
        conversation_type: ConversationType::Single,
        message_type: MessageType::Text,
        content: "hello".to_owned(),
        create_time: 0,
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
async fn repush_of_known_message_id_updates_in_place() {
    let server = MockWsServer::start().await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    let client = Client::new(common::test_config(url), "u1".to_owned()).await.unwrap();

    let received_count = Arc::new(Mutex::new(0usize));
    let received_count_clone = received_count.clone();
    client
        .subscribe(Arc::new(move |event: &SdkEvent| {
            if let SdkEvent::MessageReceived(m) = event {
                if m.message_id == "abc" {
                    *received_count_clone.lock().unwrap() += 1;
                }
            }
        }))
        .await;

    client.login("u1".to_owned(), "tok".to_owned()).await;
    assert!(common::wait_for_state(&client, im_sdk::supervisor::ConnectionState::Connected, Duration::from_secs(5)).await);

    let mut outgoing = outbound("abc");
    outgoing.message_id = "abc".to_owned();
    client.send_message(outgoing).await.unwrap();

    // Wait for the mock server's automatic ack to land the row at `sent`.
    let acked = common::wait_until_async(
        || {
            let client = client.clone();
            async move {
                client
                    .get_history("c1", i64::MAX, 10)
                    .await
                    .unwrap()
                    .into_iter()
                    .any(|m| m.message_id == "abc" && m.status == MessageStatus::Sent)
            }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(acked, "mock server should have acked the send");

    let sent_row = client
        .get_history("c1", i64::MAX, 10)
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.message_id == "abc")
        .unwrap();
    assert_eq!(sent_row.status, MessageStatus::Sent);

    let repush = WireMessage {
        message_id: "abc".to_owned(),
        server_msg_id: sent_row.server_msg_id.clone(),
        seq: sent_row.seq,
        conversation_id: "c1".to_owned(),
        sender_id: "peer".to_owned(),
        receiver_id: "u1".to_owned(),
        conversation_type: ConversationType::Single,
        message_type: MessageType::Text,
        content: "hello".to_owned(),
        create_time: sent_row.create_time,
        server_time: sent_row.server_time,
        status: MessageStatus::Delivered,
        direction: Direction::Receive,
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
    };
    server.send_command(ServerCommand::Push(repush));

    let updated = common::wait_until_async(
        || {
            let client = client.clone();
            async move {
                client
                    .get_history("c1", i64::MAX, 10)
                    .await
                    .unwrap()
                    .into_iter()
                    .any(|m| m.message_id == "abc" && m.status == MessageStatus::Delivered)
            }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(updated, "repush should have advanced the row to Delivered");

    let history = client.get_history("c1", i64::MAX, 10).await.unwrap();
    let rows_with_id: Vec<_> = history.iter().filter(|m| m.message_id == "abc").collect();
    assert_eq!(rows_with_id.len(), 1, "dedup-merge must not create a second row");
    assert_eq!(rows_with_id[0].status, MessageStatus::Delivered);

    assert_eq!(*received_count.lock().unwrap(), 1, "exactly one MessageReceived notification for the repush");
}
