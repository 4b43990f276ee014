//! im-test-utils: shared test harness for `im-sdk`'s transport layer.
//!
//! Provides a scriptable mock WebSocket server and client for integration
//! testing of the Connection Supervisor, Send Queue, and Sync Engine without
//! a real backend.

pub mod mock_ws_client;
pub mod mock_ws_server;

pub use mock_ws_client::MockWsClient;
pub use mock_ws_server::{MockWsServer, ServerCommand};

#[cfg(test)]
mod tests {
    use super::*;
    use im_protocol::*;

    #[tokio::test]
    async fn mock_server_starts_and_reports_port() {
        let server = MockWsServer::start().await.unwrap();
        assert_ne!(server.local_addr().port(), 0, "should bind to a real port");
    }

    #[tokio::test]
    async fn mock_server_auth_handshake_defaults_to_ok() {
        let server = MockWsServer::start().await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let mut client = MockWsClient::connect(&url).await.unwrap();

        client
            .send_message(&WsMessage::AuthReq(AuthReq {
                user_id: "u1".to_owned(),
                token: "tok".to_owned(),
            }))
            .await
            .unwrap();

        match client.recv_message().await.unwrap() {
            WsMessage::AuthRsp(rsp) => assert!(rsp.ok),
            other => panic!("expected AuthRsp, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_server_auth_can_be_scripted_to_fail() {
        let server = MockWsServer::start().await.unwrap();
        server.send_command(ServerCommand::SetAuthResult { ok: false, server_max_seq: 0 });
        let url = format!("ws://{}", server.local_addr());
        let mut client = MockWsClient::connect(&url).await.unwrap();

        client
            .send_message(&WsMessage::AuthReq(AuthReq {
                user_id: "u1".to_owned(),
                token: "bad".to_owned(),
            }))
            .await
            .unwrap();

        match client.recv_message().await.unwrap() {
            WsMessage::AuthRsp(rsp) => {
                assert!(!rsp.ok);
                assert_eq!(rsp.error_code.as_deref(), Some("INVALID_TOKEN"));
            }
            other => panic!("expected AuthRsp, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_server_acks_send_msg_with_incrementing_seq() {
        let server = MockWsServer::start().await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let mut client = MockWsClient::connect(&url).await.unwrap();

        let msg = WireMessage {
            message_id: "m1".to_owned(),
            server_msg_id: None,
            seq: 0,
            conversation_id: "c1".to_owned(),
            sender_id: "u1".to_owned(),
            receiver_id: "u2".to_owned(),
            conversation_type: ConversationType::Single,
            message_type: MessageType::Text,
            content: "hi".to_owned(),
            create_time: 1000,
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
        };
        client
            .send_message(&WsMessage::SendMsgReq(SendMsgReq { message: msg }))
            .await
            .unwrap();

        match client.recv_message().await.unwrap() {
            WsMessage::SendMsgRsp(rsp) => {
                assert!(rsp.ok);
                assert_eq!(rsp.message_id, "m1");
                assert_eq!(rsp.seq, 1);
            }
            other => panic!("expected SendMsgRsp, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_server_can_drop_send_msg_to_simulate_timeout() {
        let server = MockWsServer::start().await.unwrap();
        server.send_command(ServerCommand::DropNextSendMsg(1));
        let url = format!("ws://{}", server.local_addr());
        let mut client = MockWsClient::connect(&url).await.unwrap();

        client
            .send_message(&WsMessage::HeartbeatReq(HeartbeatReq { timestamp: 1 }))
            .await
            .unwrap();
        // The heartbeat still round-trips; only send_msg_req is dropped.
        match client.recv_message().await.unwrap() {
            WsMessage::HeartbeatRsp(_) => {}
            other => panic!("expected HeartbeatRsp, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_server_pushes_kick_out_on_command() {
        let server = MockWsServer::start().await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let mut client = MockWsClient::connect(&url).await.unwrap();

        server.send_command(ServerCommand::KickOut(
            KickOutReason::OtherDeviceLogin,
            "logged in elsewhere".to_owned(),
        ));

        match client.recv_message().await.unwrap() {
            WsMessage::KickOut(kick) => {
                assert_eq!(kick.reason_code, KickOutReason::OtherDeviceLogin as u8);
            }
            other => panic!("expected KickOut, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_client_send_recv_roundtrip() {
        let server = MockWsServer::start().await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let mut client = MockWsClient::connect(&url).await.unwrap();

        client
            .send_message(&WsMessage::HeartbeatReq(HeartbeatReq { timestamp: 42 }))
            .await
            .unwrap();
        match client.recv_message().await.unwrap() {
            WsMessage::HeartbeatRsp(rsp) => assert_eq!(rsp.server_time, 42),
            other => panic!("expected HeartbeatRsp, got {other:?}"),
        }
    }
}
