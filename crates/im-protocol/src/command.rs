//! Command id table for the TCP wire header's `command` field (§4.1, §6).
//!
//! The WebSocket transport uses the same discriminant values embedded in its
//! own minimal header, so one enum serves both transports.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    AuthReq = 1,
    AuthRsp = 2,
    HeartbeatReq = 3,
    HeartbeatRsp = 4,
    SendMsgReq = 5,
    SendMsgRsp = 6,
    PushMsg = 7,
    BatchMsg = 8,
    RevokeMsgReq = 9,
    RevokeMsgPush = 10,
    ReadReceiptReq = 11,
    ReadReceiptPush = 12,
    TypingStatusPush = 13,
    KickOut = 14,
    SyncReq = 15,
    SyncRsp = 16,
    DeliveryAck = 17,
}

impl Command {
    pub fn from_u16(v: u16) -> Option<Command> {
        use Command::*;
        Some(match v {
            1 => AuthReq,
            2 => AuthRsp,
            3 => HeartbeatReq,
            4 => HeartbeatRsp,
            5 => SendMsgReq,
            6 => SendMsgRsp,
            7 => PushMsg,
            8 => BatchMsg,
            9 => RevokeMsgReq,
            10 => RevokeMsgPush,
            11 => ReadReceiptReq,
            12 => ReadReceiptPush,
            13 => TypingStatusPush,
            14 => KickOut,
            15 => SyncReq,
            16 => SyncRsp,
            17 => DeliveryAck,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Pushes that participate in TCP gap detection (§4.1): server-initiated,
    /// per-conversation, sequence-correlated streams. Heartbeats and RPC
    /// responses are excluded.
    pub fn is_gap_tracked_push(self) -> bool {
        matches!(self, Command::PushMsg | Command::BatchMsg)
    }
}
