//! Shared wire-level data types (§3). These are the types that cross the
//! network; `im-store` persists a superset with the same field names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Single,
    Group,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Audio,
    Video,
    File,
    Location,
    Card,
    System,
    Custom,
}

impl MessageType {
    /// Image/video/file/transfer/red-packet messages are persisted
    /// synchronously (durability-first); everything else is persisted
    /// asynchronously (latency-first). §4.9.
    pub fn is_durability_first(self) -> bool {
        matches!(self, MessageType::Image | MessageType::Audio | MessageType::Video | MessageType::File)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Send,
    Receive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub message_id: String,
    pub sender_id: String,
    pub content_summary: String,
    pub message_type: MessageType,
}

/// The wire representation of a Message (§3). `server_msg_id`, `seq`, and
/// `server_time` are absent/zero until the server assigns them on ACK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_msg_id: Option<String>,
    #[serde(default)]
    pub seq: u64,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub conversation_type: ConversationType,
    pub message_type: MessageType,
    pub content: String,
    pub create_time: i64,
    #[serde(default)]
    pub server_time: i64,
    pub status: MessageStatus,
    pub direction: Direction,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_time: Option<i64>,
    #[serde(default)]
    pub at_user_ids: Vec<String>,
    #[serde(default)]
    pub at_all: bool,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    #[serde(default)]
    pub extra: serde_json::Value,
}
