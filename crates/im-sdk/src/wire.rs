//! Conversions between the wire types (`im_protocol::WireMessage`, crossing
//! the network) and the store's persisted row type (`im_store::model::Message`,
//! a superset carrying local-only bookkeeping fields). Both sides define
//! their own identical-by-name enums rather than sharing one, so the only
//! work here is a field-by-field and variant-by-variant copy.

use im_protocol::{Quote as WireQuote, WireMessage};
use im_store::model::{
    ConversationType as StoreConversationType, Direction as StoreDirection, Message as StoreMessage,
    MessageStatus as StoreMessageStatus, MessageType as StoreMessageType, Quote as StoreQuote,
};

fn conv_type_to_wire(t: StoreConversationType) -> im_protocol::ConversationType {
    match t {
        StoreConversationType::Single => im_protocol::ConversationType::Single,
        StoreConversationType::Group => im_protocol::ConversationType::Group,
        StoreConversationType::System => im_protocol::ConversationType::System,
    }
}

fn conv_type_from_wire(t: im_protocol::ConversationType) -> StoreConversationType {
    match t {
        im_protocol::ConversationType::Single => StoreConversationType::Single,
        im_protocol::ConversationType::Group => StoreConversationType::Group,
        im_protocol::ConversationType::System => StoreConversationType::System,
    }
}

fn msg_type_to_wire(t: StoreMessageType) -> im_protocol::MessageType {
    match t {
        StoreMessageType::Text => im_protocol::MessageType::Text,
        StoreMessageType::Image => im_protocol::MessageType::Image,
        StoreMessageType::Audio => im_protocol::MessageType::Audio,
        StoreMessageType::Video => im_protocol::MessageType::Video,
        StoreMessageType::File => im_protocol::MessageType::File,
        StoreMessageType::Location => im_protocol::MessageType::Location,
        StoreMessageType::Card => im_protocol::MessageType::Card,
        StoreMessageType::System => im_protocol::MessageType::System,
        StoreMessageType::Custom => im_protocol::MessageType::Custom,
    }
}

fn msg_type_from_wire(t: im_protocol::MessageType) -> StoreMessageType {
    match t {
        im_protocol::MessageType::Text => StoreMessageType::Text,
        im_protocol::MessageType::Image => StoreMessageType::Image,
        im_protocol::MessageType::Audio => StoreMessageType::Audio,
        im_protocol::MessageType::Video => StoreMessageType::Video,
        im_protocol::MessageType::File => StoreMessageType::File,
        im_protocol::MessageType::Location => StoreMessageType::Location,
        im_protocol::MessageType::Card => StoreMessageType::Card,
        im_protocol::MessageType::System => StoreMessageType::System,
        im_protocol::MessageType::Custom => StoreMessageType::Custom,
    }
}

fn status_to_wire(s: StoreMessageStatus) -> im_protocol::MessageStatus {
    match s {
        StoreMessageStatus::Sending => im_protocol::MessageStatus::Sending,
        StoreMessageStatus::Sent => im_protocol::MessageStatus::Sent,
        StoreMessageStatus::Delivered => im_protocol::MessageStatus::Delivered,
        StoreMessageStatus::Read => im_protocol::MessageStatus::Read,
        StoreMessageStatus::Failed => im_protocol::MessageStatus::Failed,
    }
}

fn status_from_wire(s: im_protocol::MessageStatus) -> StoreMessageStatus {
    match s {
        im_protocol::MessageStatus::Sending => StoreMessageStatus::Sending,
        im_protocol::MessageStatus::Sent => StoreMessageStatus::Sent,
        im_protocol::MessageStatus::Delivered => StoreMessageStatus::Delivered,
        im_protocol::MessageStatus::Read => StoreMessageStatus::Read,
        im_protocol::MessageStatus::Failed => StoreMessageStatus::Failed,
    }
}

fn direction_to_wire(d: StoreDirection) -> im_protocol::Direction {
    match d {
        StoreDirection::Send => im_protocol::Direction::Send,
        StoreDirection::Receive => im_protocol::Direction::Receive,
    }
}

fn direction_from_wire(d: im_protocol::Direction) -> StoreDirection {
    match d {
        im_protocol::Direction::Send => StoreDirection::Send,
        im_protocol::Direction::Receive => StoreDirection::Receive,
    }
}

fn quote_to_wire(q: StoreQuote) -> WireQuote {
    WireQuote {
        message_id: q.message_id,
        sender_id: q.sender_id,
        content_summary: q.content_summary,
        message_type: msg_type_to_wire(q.message_type),
    }
}

fn quote_from_wire(q: WireQuote) -> StoreQuote {
    StoreQuote {
        message_id: q.message_id,
        sender_id: q.sender_id,
        content_summary: q.content_summary,
        message_type: msg_type_from_wire(q.message_type),
    }
}

pub fn to_wire(m: &StoreMessage) -> WireMessage {
    WireMessage {
        message_id: m.message_id.clone(),
        server_msg_id: m.server_msg_id.clone(),
        seq: m.seq,
        conversation_id: m.conversation_id.clone(),
        sender_id: m.sender_id.clone(),
        receiver_id: m.receiver_id.clone(),
        conversation_type: conv_type_to_wire(m.conversation_type),
        message_type: msg_type_to_wire(m.message_type),
        content: m.content.clone(),
        create_time: m.create_time,
        server_time: m.server_time,
        status: status_to_wire(m.status),
        direction: direction_to_wire(m.direction),
        is_read: m.is_read,
        is_deleted: m.is_deleted,
        is_revoked: m.is_revoked,
        revoked_by: m.revoked_by.clone(),
        revoked_time: m.revoked_time,
        at_user_ids: m.at_user_ids.clone(),
        at_all: m.at_all,
        read_by: m.read_by.clone(),
        quote: m.quote.clone().map(quote_to_wire),
        extra: m.extra.clone(),
    }
}

/// Reconstructs a persisted row from a wire message. `is_read` starts at
/// `false` and `is_deleted`/`is_revoked` carry over as received — the store
/// is responsible for dedup-merging against any existing row.
pub fn from_wire(w: WireMessage) -> StoreMessage {
    StoreMessage {
        message_id: w.message_id,
        server_msg_id: w.server_msg_id,
        seq: w.seq,
        conversation_id: w.conversation_id,
        sender_id: w.sender_id,
        receiver_id: w.receiver_id,
        conversation_type: conv_type_from_wire(w.conversation_type),
        message_type: msg_type_from_wire(w.message_type),
        content: w.content,
        create_time: w.create_time,
        server_time: w.server_time,
        status: status_from_wire(w.status),
        direction: direction_from_wire(w.direction),
        is_read: w.is_read,
        is_deleted: w.is_deleted,
        is_revoked: w.is_revoked,
        revoked_by: w.revoked_by,
        revoked_time: w.revoked_time,
        at_user_ids: w.at_user_ids,
        at_all: w.at_all,
        read_by: w.read_by,
        quote: w.quote.map(quote_from_wire),
        extra: w.extra,
    }
}
