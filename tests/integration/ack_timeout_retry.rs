//! Scenario 2 (spec §8): a submitted message whose `send_msg_rsp` never
//! arrives gets retried up to the configured cap, then transitions to
//! `failed` with a status-change notification.

mod common;

use im_protocol::*;
use im_sdk::{Client, SdkEvent};
use im_store::model::{Direction, Message, MessageStatus, MessageType};
use im_test_utils::{MockWsServer, ServerCommand};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn sample() -> Message {
    Message {
        message_id: String::new(),
        server_msg_id: None,
        seq: 0,
        conversation_id: "c1".to_owned(),
        sender_id: String::new(),
        receiver_id: "peer".to_owned(),
        conversation_type: ConversationType::Single,
        message_type: MessageType::Text,
        content: "never acked".to_owned(),
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
async fn unacked_send_retries_then_terminally_fails() {
    let server = MockWsServer::start().await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    // Every send_msg_req on this connection is swallowed — enough drops to
    // cover the initial submit plus every retry.
    server.send_command(ServerCommand::DropNextSendMsg(8));

    let client = Client::new(common::test_config(url), "u1".to_owned()).await.unwrap();

    let statuses: Arc<Mutex<Vec<MessageStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let statuses_clone = statuses.clone();
    client
        .subscribe(Arc::new(move |event: &SdkEvent| {
            if let SdkEvent::MessageStatusChanged { status, .. } = event {
                statuses_clone.lock().unwrap().push(*status);
            }
        }))
        .await;

    client.login("u1".to_owned(), "tok".to_owned()).await;
    assert!(common::wait_for_state(&client, im_sdk::supervisor::ConnectionState::Connected, Duration::from_secs(5)).await);

    let saved = client.send_message(sample()).await.unwrap();
    assert_eq!(saved.status, MessageStatus::Sending);

    // Every ACK_TIMEOUT window without a response produces one retry
    // dispatch; after the retry cap is hit (three retries, four total
    // dispatches, ~20s) the message is terminally failed. Poll rather than
    // sleep a fixed amount so the assertion isn't sensitive to exact
    // scheduling jitter.
    let reached_terminal = common::wait_until_async(
        || {
            let statuses = statuses.clone();
            async move { statuses.lock().unwrap().last().copied() == Some(MessageStatus::Failed) }
        },
        Duration::from_secs(30),
    )
    .await;
    assert!(reached_terminal, "expected the send to reach a terminal Failed status after three retries");

    let final_statuses = statuses.lock().unwrap().clone();
    assert_eq!(
        final_statuses.last().copied(),
        Some(MessageStatus::Failed),
        "message should reach a terminal Failed status after exhausting retries"
    );

    let history = client.get_history("c1", i64::MAX, 10).await.unwrap();
    let row = history.iter().find(|m| m.message_id == saved.message_id).unwrap();
    assert_eq!(row.status, MessageStatus::Failed);

    // Three retries means four total dispatch attempts (the initial send
    // plus retries at retry_count 1, 2, 3) before the terminal failure.
    assert_eq!(server.send_msg_req_count(), 4, "expected the initial send plus exactly three retries");
}
