//! Persisted row types (§3). These mirror `im_protocol`'s wire types but are
//! the store's own structs: every row the database can return, independent
//! of what a given wire version carries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Single,
    Group,
    System,
}

impl ConversationType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationType::Single => "single",
            ConversationType::Group => "group",
            ConversationType::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<ConversationType> {
        match s {
            "single" => Some(ConversationType::Single),
            "group" => Some(ConversationType::Group),
            "system" => Some(ConversationType::System),
            _ => None,
        }
    }
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
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Audio => "audio",
            MessageType::Video => "video",
            MessageType::File => "file",
            MessageType::Location => "location",
            MessageType::Card => "card",
            MessageType::System => "system",
            MessageType::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Option<MessageType> {
        Some(match s {
            "text" => MessageType::Text,
            "image" => MessageType::Image,
            "audio" => MessageType::Audio,
            "video" => MessageType::Video,
            "file" => MessageType::File,
            "location" => MessageType::Location,
            "card" => MessageType::Card,
            "system" => MessageType::System,
            "custom" => MessageType::Custom,
            _ => return None,
        })
    }

    /// Image/audio/video/file messages are persisted synchronously
    /// (durability-first) before `send` returns; everything else is
    /// persisted asynchronously on the background write pool
    /// (latency-first). §4.9.
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

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<MessageStatus> {
        Some(match s {
            "sending" => MessageStatus::Sending,
            "sent" => MessageStatus::Sent,
            "delivered" => MessageStatus::Delivered,
            "read" => MessageStatus::Read,
            "failed" => MessageStatus::Failed,
            _ => return None,
        })
    }

    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
            MessageStatus::Failed => 4,
        }
    }

    /// §4.7.1: "status changes to any later state in the lifecycle".
    pub fn is_later_than(self, other: MessageStatus) -> bool {
        self.rank() > other.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Receive => "receive",
        }
    }

    pub fn from_str(s: &str) -> Option<Direction> {
        match s {
            "send" => Some(Direction::Send),
            "receive" => Some(Direction::Receive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub message_id: String,
    pub sender_id: String,
    pub content_summary: String,
    pub message_type: MessageType,
}

/// A persisted message row (§3 Message). Superset of `im_protocol::WireMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub server_msg_id: Option<String>,
    pub seq: u64,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub conversation_type: ConversationType,
    pub message_type: MessageType,
    pub content: String,
    pub create_time: i64,
    pub server_time: i64,
    pub status: MessageStatus,
    pub direction: Direction,
    pub is_read: bool,
    pub is_deleted: bool,
    pub is_revoked: bool,
    pub revoked_by: Option<String>,
    pub revoked_time: Option<i64>,
    pub at_user_ids: Vec<String>,
    pub at_all: bool,
    pub read_by: Vec<String>,
    pub quote: Option<Quote>,
    pub extra: serde_json::Value,
}

/// A denormalized summary of the newest message in a conversation, stored
/// inline on the `conversations` row to avoid a join on every list render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestMessage {
    pub message_id: String,
    pub message_type: MessageType,
    pub content_summary: String,
    pub sender_id: String,
    pub create_time: i64,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Draft {
    pub text: String,
    #[serde(default)]
    pub at_user_ids: Vec<String>,
    #[serde(default)]
    pub quote: Option<Quote>,
    #[serde(default)]
    pub attachment_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub conversation_type: ConversationType,
    pub target_id: String,
    pub show_name: String,
    pub face_url: Option<String>,
    pub unread_count: i64,
    pub last_read_time: i64,
    pub latest_message: Option<LatestMessage>,
    pub last_message_time: i64,
    pub is_pinned: bool,
    pub is_muted: bool,
    pub draft: Option<Draft>,
    pub at_me: bool,
    pub at_me_message_id: Option<String>,
    pub create_time: i64,
    pub update_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub nickname: String,
    pub face_url: Option<String>,
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub group_id: String,
    pub name: String,
    pub face_url: Option<String>,
    pub owner_id: Option<String>,
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Member,
    Admin,
    Owner,
}

impl GroupRole {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupRole::Member => "member",
            GroupRole::Admin => "admin",
            GroupRole::Owner => "owner",
        }
    }

    pub fn from_str(s: &str) -> Option<GroupRole> {
        match s {
            "member" => Some(GroupRole::Member),
            "admin" => Some(GroupRole::Admin),
            "owner" => Some(GroupRole::Owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub role: GroupRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friend {
    pub user_id: String,
    pub friend_id: String,
    pub remark: Option<String>,
}

/// §4.7.2 batch dedup-merge outcome tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaveStats {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub total: u64,
}

impl SaveStats {
    pub fn dedup_rate(self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.skipped as f64 / self.total as f64
        }
    }

    fn record(&mut self, outcome: SaveOutcome) {
        self.total += 1;
        match outcome {
            SaveOutcome::Inserted => self.inserted += 1,
            SaveOutcome::Updated => self.updated += 1,
            SaveOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Per-row outcome of a dedup-merge write (§4.7.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
    Skipped,
}

pub(crate) fn accumulate(stats: &mut SaveStats, outcome: SaveOutcome) {
    stats.record(outcome);
}

/// Search filter bag for §4.7.4.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub conversation_id: Option<String>,
    pub message_types: Option<Vec<MessageType>>,
    pub sender_id: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: u32,
}

impl SearchFilter {
    pub fn with_limit(limit: u32) -> SearchFilter {
        SearchFilter {
            limit,
            ..Default::default()
        }
    }
}
