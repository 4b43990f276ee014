//! Scenario 1 (spec §8): incremental sync catches a client up in batches,
//! emitting one `SyncProgress` event per batch and stopping once the server
//! reports `has_more=false`.

mod common;

use im_protocol::*;
use im_sdk::{Client, SdkEvent};
use im_test_utils::{MockWsServer, ServerCommand};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn message(seq: u64) -> WireMessage {
    WireMessage {
        message_id: format!("m{seq}"),
        server_msg_id: Some(format!("s{seq}")),
        seq,
        conversation_id: "c1".to_owned(),
        sender_id: "peer".to_owned(),
        receiver_id: "u1".to_owned(),
        conversation_type: ConversationType::Single,
        message_type: MessageType::Text,
        content: format!("message {seq}"),
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

fn batch(from: u64, count: u64, has_more: bool, server_max_seq: u64, total: u64) -> SyncRsp {
    SyncRsp {
        messages: (from..from + count).map(message).collect(),
        server_max_seq,
        has_more,
        total_count: total,
    }
}

#[tokio::test]
async fn incremental_sync_delivers_every_batch_and_stops_when_exhausted() {
    let server = MockWsServer::start().await.unwrap();
    let url = format!("ws://{}", server.local_addr());

    server.send_command(ServerCommand::QueueSyncResponse(batch(1, 3, true, 3, 7)));
    server.send_command(ServerCommand::QueueSyncResponse(batch(4, 3, true, 6, 7)));
    server.send_command(ServerCommand::QueueSyncResponse(batch(7, 1, false, 7, 7)));

    let client = Client::new(common::test_config(url), "u1".to_owned()).await.unwrap();

    let progress = Arc::new(Mutex::new(Vec::new()));
    let progress_clone = progress.clone();
    client
        .subscribe(Arc::new(move |event: &SdkEvent| {
            if let SdkEvent::SyncProgress(p) = event {
                progress_clone.lock().unwrap().push(p.clone());
            }
        }))
        .await;

    client.login("u1".to_owned(), "tok".to_owned()).await;
    assert!(common::wait_for_state(&client, im_sdk::supervisor::ConnectionState::Connected, Duration::from_secs(5)).await);

    client.sync_now(im_sdk::sync::NetworkType::Unknown).await.unwrap();

    let batches = progress.lock().unwrap().clone();
    assert_eq!(batches.len(), 3, "expected one SyncProgress event per batch");
    assert_eq!(batches[0].current, 3);
    assert_eq!(batches[1].current, 6);
    assert_eq!(batches[2].current, 7);

    let history = client.get_history("c1", i64::MAX, 10).await.unwrap();
    assert_eq!(history.len(), 7, "all synced messages should be persisted");
}
