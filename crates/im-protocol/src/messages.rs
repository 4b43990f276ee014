//! Typed command bodies (§4.2, §6) and the WebSocket discriminated union.
//!
//! All WebSocket messages use a top-level `kind` field for discriminated
//! deserialization, following the same convention as the command table in
//! §6. The TCP transport carries the same body structs without the `kind`
//! wrapper — the `command` field in the packet header already disambiguates.

use crate::model::WireMessage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthReq {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRsp {
    pub ok: bool,
    pub error_code: Option<String>,
    pub error_msg: Option<String>,
    pub server_max_seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReq {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRsp {
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMsgReq {
    pub message: WireMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMsgRsp {
    pub ok: bool,
    pub error_code: Option<String>,
    pub message_id: String,
    pub server_msg_id: Option<String>,
    pub seq: u64,
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMsg {
    pub message: WireMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMsg {
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReq {
    pub last_seq: u64,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRsp {
    pub messages: Vec<WireMessage>,
    pub server_max_seq: u64,
    pub has_more: bool,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeMsgReq {
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeMsgPush {
    pub message_id: String,
    pub revoker_id: String,
    pub revoke_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceiptReq {
    pub conversation_id: String,
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceiptPush {
    pub conversation_id: String,
    pub message_ids: Vec<String>,
    pub reader_id: String,
    pub read_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingStatus {
    Start,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingStatusPush {
    pub conversation_id: String,
    pub user_id: String,
    pub status: TypingStatus,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum KickOutReason {
    OtherDeviceLogin = 1,
    AccountAbnormal = 2,
}

impl KickOutReason {
    pub fn from_code(code: u8) -> Option<KickOutReason> {
        match code {
            1 => Some(KickOutReason::OtherDeviceLogin),
            2 => Some(KickOutReason::AccountAbnormal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickOut {
    pub reason_code: u8,
    pub message: String,
}

/// Client-to-server acknowledgement that a `push_msg`/`batch_msg` was
/// received and persisted locally (§4.9 receive path). Distinct from
/// `ReadReceiptReq`, which additionally signals the message was read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAck {
    pub conversation_id: String,
    pub message_ids: Vec<String>,
}

/// All command bodies, tagged by `kind` for the WebSocket transport.
///
/// ```json
/// { "kind": "auth_req", "user_id": "...", "token": "..." }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum WsMessage {
    AuthReq(AuthReq),
    AuthRsp(AuthRsp),
    HeartbeatReq(HeartbeatReq),
    HeartbeatRsp(HeartbeatRsp),
    SendMsgReq(SendMsgReq),
    SendMsgRsp(SendMsgRsp),
    PushMsg(PushMsg),
    BatchMsg(BatchMsg),
    SyncReq(SyncReq),
    SyncRsp(SyncRsp),
    RevokeMsgReq(RevokeMsgReq),
    RevokeMsgPush(RevokeMsgPush),
    ReadReceiptReq(ReadReceiptReq),
    ReadReceiptPush(ReadReceiptPush),
    TypingStatusPush(TypingStatusPush),
    KickOut(KickOut),
    DeliveryAck(DeliveryAck),
}

impl WsMessage {
    /// The `Command` id this message corresponds to (used to populate the
    /// TCP header or to route a WS text frame to the same handler table).
    pub fn command(&self) -> crate::command::Command {
        use crate::command::Command;
        match self {
            WsMessage::AuthReq(_) => Command::AuthReq,
            WsMessage::AuthRsp(_) => Command::AuthRsp,
            WsMessage::HeartbeatReq(_) => Command::HeartbeatReq,
            WsMessage::HeartbeatRsp(_) => Command::HeartbeatRsp,
            WsMessage::SendMsgReq(_) => Command::SendMsgReq,
            WsMessage::SendMsgRsp(_) => Command::SendMsgRsp,
            WsMessage::PushMsg(_) => Command::PushMsg,
            WsMessage::BatchMsg(_) => Command::BatchMsg,
            WsMessage::SyncReq(_) => Command::SyncReq,
            WsMessage::SyncRsp(_) => Command::SyncRsp,
            WsMessage::RevokeMsgReq(_) => Command::RevokeMsgReq,
            WsMessage::RevokeMsgPush(_) => Command::RevokeMsgPush,
            WsMessage::ReadReceiptReq(_) => Command::ReadReceiptReq,
            WsMessage::ReadReceiptPush(_) => Command::ReadReceiptPush,
            WsMessage::TypingStatusPush(_) => Command::TypingStatusPush,
            WsMessage::KickOut(_) => Command::KickOut,
            WsMessage::DeliveryAck(_) => Command::DeliveryAck,
        }
    }
}
