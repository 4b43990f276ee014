//! Scenario 6 (spec §8): a raw TCP frame stream of `push_msg` frames with
//! sequences 100, 101, 102, 106, 107 yields exactly one `PacketLoss` signal
//! (expected=103, received=106, gap=3), and no second signal even though
//! further gaps could in principle occur within the debounce window.
//!
//! This drives the real `im_sdk::transport::tcp` read loop against a raw
//! `TcpListener`, rather than exercising `PacketCodec` in isolation, so the
//! wiring between the stream decoder and `TransportEvent::PacketLoss` is
//! covered end to end.

use im_protocol::{encode, encode_binary, Command, ConversationType, MessageType, PushMsg, WireMessage, WsMessage};
use im_sdk::transport::{tcp, Credential, TransportEvent};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn push_frame(seq: u32) -> Vec<u8> {
    let wire = WireMessage {
        message_id: format!("m{seq}"),
        server_msg_id: Some(format!("s{seq}")),
        seq: seq as u64,
        conversation_id: "c1".to_owned(),
        sender_id: "peer".to_owned(),
        receiver_id: "u1".to_owned(),
        conversation_type: ConversationType::Single,
        message_type: MessageType::Text,
        content: "hi".to_owned(),
        create_time: seq as i64,
        server_time: seq as i64,
        status: im_protocol::MessageStatus::Delivered,
        direction: im_protocol::Direction::Receive,
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
    let msg = WsMessage::PushMsg(PushMsg { message: wire });
    let body = encode_binary(&msg).unwrap();
    encode(Command::PushMsg.as_u16(), seq, &body).unwrap()
}

#[tokio::test]
async fn single_gap_signal_with_no_duplicate() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        for seq in [100u32, 101, 102, 106, 107] {
            socket.write_all(&push_frame(seq)).await.unwrap();
        }
        // Keep the connection open long enough for the client to read and
        // process every frame before the test tears it down.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    });

    let credential = Credential { user_id: "u1".to_owned(), token: "tok".to_owned() };
    let (_handle, mut event_rx) = tcp::connect(&addr.to_string(), &credential, false).await.unwrap();

    let mut losses = Vec::new();
    let mut messages_seen = 0usize;
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while messages_seen < 5 && tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(std::time::Duration::from_millis(500), event_rx.recv()).await {
            Ok(Some(TransportEvent::PacketLoss(loss))) => losses.push(loss),
            Ok(Some(TransportEvent::Message(_))) => messages_seen += 1,
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => continue,
        }
    }

    assert_eq!(messages_seen, 5, "all five push frames should decode");
    assert_eq!(losses.len(), 1, "exactly one gap signal expected for a single gap run");
    assert_eq!(losses[0].expected, 103);
    assert_eq!(losses[0].received, 106);
    assert_eq!(losses[0].gap, 3);

    server_task.await.unwrap();
}
