//! Message Manager (§4.9): the send and receive paths, and the
//! active-conversation tracker. New code — the teacher's domain is
//! race-timing events, not chat messages — but it follows the
//! `AppState`-holds-shared-handles pattern from `control_api.rs`: one
//! struct bundling an `Arc<Mutex<Store>>`, the Send Queue, and the
//! Notifier, with a small `RwLock` cell for the one piece of UI-driven
//! mutable state (the active conversation).

use crate::error::SdkError;
use crate::notify::{Notifier, SdkEvent};
use crate::persist_pool::PersistPool;
use crate::send_queue::SendQueue;
use crate::supervisor::ConnectionSupervisor;
use crate::wire::from_wire;
use im_protocol::{DeliveryAck, WireMessage, WsMessage};
use im_store::model::{Direction, Message, MessageStatus, MessageType};
use im_store::Store;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub struct MessageManager {
    store: Arc<Mutex<Store>>,
    send_queue: Arc<SendQueue>,
    supervisor: Arc<ConnectionSupervisor>,
    persist_pool: Arc<PersistPool>,
    notifier: Notifier,
    current_user: String,
    active_conversation: RwLock<Option<String>>,
}

impl MessageManager {
    pub fn new(
        store: Arc<Mutex<Store>>,
        send_queue: Arc<SendQueue>,
        supervisor: Arc<ConnectionSupervisor>,
        persist_pool: Arc<PersistPool>,
        notifier: Notifier,
        current_user: String,
    ) -> Arc<Self> {
        Arc::new(MessageManager {
            store,
            send_queue,
            supervisor,
            persist_pool,
            notifier,
            current_user,
            active_conversation: RwLock::new(None),
        })
    }

    pub async fn set_active_conversation(&self, conversation_id: Option<String>) {
        *self.active_conversation.write().await = conversation_id;
    }

    pub async fn active_conversation(&self) -> Option<String> {
        self.active_conversation.read().await.clone()
    }

    /// §4.9 send path. Returns as soon as the message is durable and
    /// enqueued — not when the server has accepted it; that arrives later
    /// via `SdkEvent::MessageStatusChanged`.
    ///
    /// Hybrid dispatch: image/audio/video/file messages are persisted
    /// synchronously here, before this call returns (durability-first).
    /// Every other message type hands off to the Async Persist Pool, whose
    /// crash-recovery sidecar durably records the message before this call
    /// returns, and whose background workers do the actual store write off
    /// the critical path (latency-first).
    pub async fn send(&self, mut message: Message) -> Result<Message, SdkError> {
        if message.message_id.is_empty() {
            message.message_id = Uuid::new_v4().to_string();
        }
        message.create_time = crate::now_ms();
        message.status = MessageStatus::Sending;
        message.direction = Direction::Send;
        message.sender_id = self.current_user.clone();

        {
            let mut store = self.store.lock().await;
            store.ensure_conversation(&message.conversation_id, message.conversation_type, &message.receiver_id, crate::now_ms())?;
        }

        if message.message_type.is_durability_first() {
            let mut store = self.store.lock().await;
            store.save_message(&message)?;
        } else {
            self.persist_pool.submit(message.clone()).await?;
        }

        self.notifier.emit(SdkEvent::MessageCreated(message.clone()));
        self.send_queue.enqueue(message.clone()).await;

        Ok(message)
    }

    /// §4.9 receive path for a single pushed message.
    pub async fn on_push_msg(&self, wire: WireMessage) -> Result<(), SdkError> {
        let mut message = from_wire(wire);
        message.direction = Direction::Receive;

        let outcome = {
            let mut store = self.store.lock().await;
            let outcome = store.save_message(&message)?;
            store.ensure_conversation(&message.conversation_id, message.conversation_type, &message.sender_id, crate::now_ms())?;
            store.update_latest_message_if_newer(&message)?;
            outcome
        };

        self.send_delivery_ack(message.conversation_id.clone(), vec![message.message_id.clone()]).await;
        self.apply_post_receive_accounting(&message).await?;
        let _ = outcome;

        self.notifier.emit(SdkEvent::MessageReceived(message));
        Ok(())
    }

    /// §4.9 batch receive: dedup-merge as one transaction, then emit one
    /// notification per affected conversation.
    pub async fn on_batch_msg(&self, wire_messages: Vec<WireMessage>) -> Result<(), SdkError> {
        let mut messages: Vec<Message> = wire_messages
            .into_iter()
            .map(|w| {
                let mut m = from_wire(w);
                m.direction = Direction::Receive;
                m
            })
            .collect();

        {
            let mut store = self.store.lock().await;
            store.save_messages(&messages)?;
            for message in &messages {
                store.ensure_conversation(&message.conversation_id, message.conversation_type, &message.sender_id, crate::now_ms())?;
                store.update_latest_message_if_newer(message)?;
            }
        }

        let mut acks_by_conversation: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for message in &messages {
            acks_by_conversation.entry(message.conversation_id.clone()).or_default().push(message.message_id.clone());
        }
        for (conversation_id, message_ids) in acks_by_conversation {
            self.send_delivery_ack(conversation_id, message_ids).await;
        }

        let mut seen_conversations = std::collections::HashSet::new();
        for message in messages.drain(..) {
            self.apply_post_receive_accounting(&message).await?;
            if seen_conversations.insert(message.conversation_id.clone()) {
                self.notifier.emit(SdkEvent::MessageReceived(message));
            }
        }

        Ok(())
    }

    /// Tells the server a push was received and persisted locally (§4.9).
    /// Best-effort: a dropped ack just means the server's own redelivery
    /// timer fires again later, so a transport error here is swallowed
    /// rather than surfaced to the caller of `on_push_msg`/`on_batch_msg`.
    async fn send_delivery_ack(&self, conversation_id: String, message_ids: Vec<String>) {
        let _ = self.supervisor.send(WsMessage::DeliveryAck(DeliveryAck { conversation_id, message_ids })).await;
    }

    /// Increments unread, or — if the conversation is active — clears it
    /// locally and sends a read receipt back to the server, since the user
    /// is presumed to have seen the message as soon as it lands in an open
    /// conversation. Never both. System control messages never move the
    /// unread counter.
    async fn apply_post_receive_accounting(&self, message: &Message) -> Result<(), SdkError> {
        if message.message_type == MessageType::System {
            return Ok(());
        }

        let active = self.active_conversation.read().await.clone();
        if active.as_deref() == Some(message.conversation_id.as_str()) {
            {
                let mut store = self.store.lock().await;
                store.clear_unread(&message.conversation_id, crate::now_ms())?;
            }
            let _ = self
                .supervisor
                .send(WsMessage::ReadReceiptReq(im_protocol::ReadReceiptReq {
                    conversation_id: message.conversation_id.clone(),
                    message_ids: vec![message.message_id.clone()],
                }))
                .await;
        } else {
            let mut store = self.store.lock().await;
            store.increment_unread(&message.conversation_id, 1)?;
            let total = store.total_unread()?;
            drop(store);
            self.notifier.emit(SdkEvent::UnreadTotalChanged(total));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SdkConfig, TransportKind};
    use crate::router::Router;
    use crate::supervisor::ConnectionSupervisor;
    use im_store::model::ConversationType;

    fn sample_message(conversation_id: &str) -> Message {
        Message {
            message_id: String::new(),
            server_msg_id: None,
            seq: 0,
            conversation_id: conversation_id.to_owned(),
            sender_id: String::new(),
            receiver_id: "peer".to_owned(),
            conversation_type: ConversationType::Single,
            message_type: MessageType::Text,
            content: "hello".to_owned(),
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

    async fn manager() -> Arc<MessageManager> {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let router = Arc::new(Router::new());
        let notifier = Notifier::new();
        let mut cfg = SdkConfig::default().transport;
        cfg.kind = TransportKind::Ws;
        let supervisor = ConnectionSupervisor::new(cfg, router.clone(), notifier.clone());
        let send_queue = SendQueue::new(store.clone(), router, supervisor.clone(), notifier.clone());
        let sidecar_dir = std::env::temp_dir().join(format!("im-sdk-message-manager-test-{}", Uuid::new_v4()));
        let persist_pool = Arc::new(PersistPool::new(store.clone(), sidecar_dir, 2).await);
        MessageManager::new(store, send_queue, supervisor, persist_pool, notifier, "me".to_owned())
    }

    #[tokio::test]
    async fn send_assigns_id_and_marks_sending() {
        let mgr = manager().await;
        let saved = mgr.send(sample_message("c1")).await.unwrap();
        assert!(!saved.message_id.is_empty());
        assert_eq!(saved.status, MessageStatus::Sending);
        assert_eq!(saved.sender_id, "me");
    }

    #[tokio::test]
    async fn receive_increments_unread_when_conversation_not_active() {
        let mgr = manager().await;
        let mut wire_msg = sample_message("c1");
        wire_msg.message_id = "m1".to_owned();
        let wire = crate::wire::to_wire(&wire_msg);
        mgr.on_push_msg(wire).await.unwrap();

        let store = mgr.store.lock().await;
        assert_eq!(store.total_unread().unwrap(), 1);
    }

    #[tokio::test]
    async fn durability_first_types_are_saved_before_send_returns() {
        let mgr = manager().await;
        let mut image = sample_message("c1");
        image.message_type = MessageType::Image;
        let saved = mgr.send(image).await.unwrap();

        // No polling: a durability-first send only returns once the row is
        // already in the store, unlike the latency-first (async pool) path.
        let store = mgr.store.lock().await;
        let row = store.get_message_by_id(&saved.message_id).unwrap();
        assert!(row.is_some(), "image message should be persisted synchronously before send() returns");
    }

    #[tokio::test]
    async fn receive_clears_unread_when_conversation_active() {
        let mgr = manager().await;
        mgr.set_active_conversation(Some("c1".to_owned())).await;
        let mut wire_msg = sample_message("c1");
        wire_msg.message_id = "m1".to_owned();
        let wire = crate::wire::to_wire(&wire_msg);
        mgr.on_push_msg(wire).await.unwrap();

        let store = mgr.store.lock().await;
        assert_eq!(store.total_unread().unwrap(), 0);
    }
}
