//! Scenario 5 (spec §8): unread totals exclude muted conversations, and
//! muting/unmuting/marking-read move the total exactly as much as the
//! per-conversation count they touch.

mod common;

use im_protocol::*;
use im_sdk::Client;
use im_store::model::{Direction, Message, MessageStatus, MessageType};
use im_test_utils::MockWsServer;

fn inbound(conversation_id: &str, message_id: &str, seq: u64) -> WireMessage {
    WireMessage {
        message_id: message_id.to_owned(),
        server_msg_id: Some(format!("s{seq}")),
        seq,
        conversation_id: conversation_id.to_owned(),
        sender_id: "peer".to_owned(),
        receiver_id: "u1".to_owned(),
        conversation_type: ConversationType::Single,
        message_type: MessageType::Text,
        content: "hi".to_owned(),
        create_time: seq as i64,
        server_time: seq as i64,
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
    }
}

#[tokio::test]
async fn mute_and_mark_read_move_the_total_but_not_the_per_conversation_count() {
    // No network traffic needed for this scenario — deliver the inbound
    // messages directly through the same `on_push_msg`-shaped path a real
    // `push_msg` would take, via the mock server so the full wire path is
    // exercised end to end.
    let server = MockWsServer::start().await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    let client = Client::new(common::test_config(url), "u1".to_owned()).await.unwrap();
    client.login("u1".to_owned(), "tok".to_owned()).await;
    assert!(common::wait_for_state(&client, im_sdk::supervisor::ConnectionState::Connected, std::time::Duration::from_secs(5)).await);

    for i in 0..5u64 {
        server.send_command(im_test_utils::ServerCommand::Push(inbound("A", &format!("a{i}"), i + 1)));
    }
    for i in 0..3u64 {
        server.send_command(im_test_utils::ServerCommand::Push(inbound("B", &format!("b{i}"), i + 1)));
    }

    let reached_five_and_three = common::wait_until_async(
        || {
            let client = client.clone();
            async move {
                let conversations = client.list_conversations().await.unwrap();
                let a = conversations.iter().find(|c| c.conversation_id == "A").map(|c| c.unread_count);
                let b = conversations.iter().find(|c| c.conversation_id == "B").map(|c| c.unread_count);
                a == Some(5) && b == Some(3)
            }
        },
        std::time::Duration::from_secs(5),
    )
    .await;
    assert!(reached_five_and_three, "expected unread counts 5 and 3 to settle");

    client.set_conversation_muted("B", true).await.unwrap();
    assert_eq!(client.total_unread().await.unwrap(), 5);

    client.set_conversation_muted("A", true).await.unwrap();
    assert_eq!(client.total_unread().await.unwrap(), 0);

    client.set_conversation_muted("A", false).await.unwrap();
    assert_eq!(client.total_unread().await.unwrap(), 5);

    client.mark_conversation_read("A").await.unwrap();
    assert_eq!(client.total_unread().await.unwrap(), 0);

    client.set_conversation_muted("B", false).await.unwrap();
    assert_eq!(client.total_unread().await.unwrap(), 3);
}
