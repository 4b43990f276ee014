//! Binary (bincode) body codec for the TCP transport.
//!
//! The TCP packet header already carries the `command` discriminant, so
//! bodies are encoded without the `kind` tag `WsMessage` uses for the
//! WebSocket (self-describing text) path — §4.2 allows the choice to be
//! per-transport.

use crate::command::Command;
use crate::messages::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinaryCodecError {
    #[error("bincode: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("unknown command id")]
    UnknownCommand,
}

pub fn encode_binary(msg: &WsMessage) -> Result<Vec<u8>, BinaryCodecError> {
    Ok(match msg {
        WsMessage::AuthReq(b) => bincode::serialize(b)?,
        WsMessage::AuthRsp(b) => bincode::serialize(b)?,
        WsMessage::HeartbeatReq(b) => bincode::serialize(b)?,
        WsMessage::HeartbeatRsp(b) => bincode::serialize(b)?,
        WsMessage::SendMsgReq(b) => bincode::serialize(b)?,
        WsMessage::SendMsgRsp(b) => bincode::serialize(b)?,
        WsMessage::PushMsg(b) => bincode::serialize(b)?,
        WsMessage::BatchMsg(b) => bincode::serialize(b)?,
        WsMessage::SyncReq(b) => bincode::serialize(b)?,
        WsMessage::SyncRsp(b) => bincode::serialize(b)?,
        WsMessage::RevokeMsgReq(b) => bincode::serialize(b)?,
        WsMessage::RevokeMsgPush(b) => bincode::serialize(b)?,
        WsMessage::ReadReceiptReq(b) => bincode::serialize(b)?,
        WsMessage::ReadReceiptPush(b) => bincode::serialize(b)?,
        WsMessage::TypingStatusPush(b) => bincode::serialize(b)?,
        WsMessage::KickOut(b) => bincode::serialize(b)?,
        WsMessage::DeliveryAck(b) => bincode::serialize(b)?,
    })
}

pub fn decode_binary(command: Command, body: &[u8]) -> Result<WsMessage, BinaryCodecError> {
    Ok(match command {
        Command::AuthReq => WsMessage::AuthReq(bincode::deserialize(body)?),
        Command::AuthRsp => WsMessage::AuthRsp(bincode::deserialize(body)?),
        Command::HeartbeatReq => WsMessage::HeartbeatReq(bincode::deserialize(body)?),
        Command::HeartbeatRsp => WsMessage::HeartbeatRsp(bincode::deserialize(body)?),
        Command::SendMsgReq => WsMessage::SendMsgReq(bincode::deserialize(body)?),
        Command::SendMsgRsp => WsMessage::SendMsgRsp(bincode::deserialize(body)?),
        Command::PushMsg => WsMessage::PushMsg(bincode::deserialize(body)?),
        Command::BatchMsg => WsMessage::BatchMsg(bincode::deserialize(body)?),
        Command::SyncReq => WsMessage::SyncReq(bincode::deserialize(body)?),
        Command::SyncRsp => WsMessage::SyncRsp(bincode::deserialize(body)?),
        Command::RevokeMsgReq => WsMessage::RevokeMsgReq(bincode::deserialize(body)?),
        Command::RevokeMsgPush => WsMessage::RevokeMsgPush(bincode::deserialize(body)?),
        Command::ReadReceiptReq => WsMessage::ReadReceiptReq(bincode::deserialize(body)?),
        Command::ReadReceiptPush => WsMessage::ReadReceiptPush(bincode::deserialize(body)?),
        Command::TypingStatusPush => WsMessage::TypingStatusPush(bincode::deserialize(body)?),
        Command::KickOut => WsMessage::KickOut(bincode::deserialize(body)?),
        Command::DeliveryAck => WsMessage::DeliveryAck(bincode::deserialize(body)?),
    })
}
