//! Typing / Read-receipt / Revoke handlers (§4.11): unreliable control
//! messages layered over the same shared-handles shape as the other
//! managers. The inbound-expiry sweeper follows `local_proxy.rs`'s
//! `tokio::select! { biased; shutdown.changed() / timer }` task shape.

use crate::error::SdkError;
use crate::notify::{Notifier, SdkEvent};
use crate::supervisor::ConnectionSupervisor;
use im_protocol::{
    ConversationType, ReadReceiptPush, ReadReceiptReq, RevokeMsgPush, RevokeMsgReq, TypingStatus, TypingStatusPush,
    WsMessage,
};
use im_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

const SEND_INTERVAL: Duration = Duration::from_secs(5);
const STOP_DELAY: Duration = Duration::from_secs(3);
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const REVOKE_WINDOW: Duration = Duration::from_secs(120);

const REVOKE_TOMBSTONE: &str = "[message revoked]";

pub struct ControlHandlers {
    store: Arc<Mutex<Store>>,
    supervisor: Arc<ConnectionSupervisor>,
    notifier: Notifier,
    current_user: String,
    outbound_last_sent: Mutex<HashMap<String, Instant>>,
    auto_stop_timers: Mutex<HashMap<String, JoinHandle<()>>>,
    inbound_expiry: Mutex<HashMap<(String, String), Instant>>,
    shutdown: watch::Sender<bool>,
}

impl ControlHandlers {
    pub fn new(store: Arc<Mutex<Store>>, supervisor: Arc<ConnectionSupervisor>, notifier: Notifier, current_user: String) -> Arc<Self> {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handlers = Arc::new(ControlHandlers {
            store,
            supervisor,
            notifier,
            current_user,
            outbound_last_sent: Mutex::new(HashMap::new()),
            auto_stop_timers: Mutex::new(HashMap::new()),
            inbound_expiry: Mutex::new(HashMap::new()),
            shutdown,
        });

        let sweeper = handlers.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() { break; }
                    }
                    _ = tick.tick() => {
                        sweeper.sweep_expired_typing().await;
                    }
                }
            }
        });

        handlers
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    // -- Typing (outbound) --------------------------------------------------

    /// Call on every keystroke. Debounced to at most one `start` push per
    /// `send_interval`; always resets the auto-stop timer.
    pub async fn notify_typing(self: &Arc<Self>, conversation_id: String) -> Result<(), SdkError> {
        let should_send = {
            let mut last_sent = self.outbound_last_sent.lock().await;
            let now = Instant::now();
            let should = match last_sent.get(&conversation_id) {
                Some(t) => now.duration_since(*t) >= SEND_INTERVAL,
                None => true,
            };
            if should {
                last_sent.insert(conversation_id.clone(), now);
            }
            should
        };

        if should_send {
            self.send_typing(&conversation_id, TypingStatus::Start).await?;
        }

        self.reset_auto_stop(conversation_id).await;
        Ok(())
    }

    async fn reset_auto_stop(self: &Arc<Self>, conversation_id: String) {
        let mut timers = self.auto_stop_timers.lock().await;
        if let Some(handle) = timers.remove(&conversation_id) {
            handle.abort();
        }
        let this = self.clone();
        let cid = conversation_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(STOP_DELAY).await;
            let _ = this.send_typing(&cid, TypingStatus::Stop).await;
        });
        timers.insert(conversation_id, handle);
    }

    async fn send_typing(&self, conversation_id: &str, status: TypingStatus) -> Result<(), SdkError> {
        self.supervisor
            .send(WsMessage::TypingStatusPush(TypingStatusPush {
                conversation_id: conversation_id.to_owned(),
                user_id: self.current_user.clone(),
                status,
                timestamp: crate::now_ms(),
            }))
            .await
    }

    // -- Typing (inbound) ----------------------------------------------------

    pub async fn on_typing_status_push(&self, push: TypingStatusPush) {
        let key = (push.conversation_id.clone(), push.user_id.clone());
        match push.status {
            TypingStatus::Start => {
                self.inbound_expiry.lock().await.insert(key, Instant::now() + RECEIVE_TIMEOUT);
                self.notifier.emit(SdkEvent::TypingChanged {
                    conversation_id: push.conversation_id,
                    user_id: push.user_id,
                    is_typing: true,
                });
            }
            TypingStatus::Stop => {
                self.inbound_expiry.lock().await.remove(&key);
                self.notifier.emit(SdkEvent::TypingChanged {
                    conversation_id: push.conversation_id,
                    user_id: push.user_id,
                    is_typing: false,
                });
            }
        }
    }

    async fn sweep_expired_typing(&self) {
        let now = Instant::now();
        let expired: Vec<(String, String)> = {
            let mut expiry = self.inbound_expiry.lock().await;
            let expired: Vec<_> = expiry.iter().filter(|(_, t)| **t <= now).map(|(k, _)| k.clone()).collect();
            for key in &expired {
                expiry.remove(key);
            }
            expired
        };
        for (conversation_id, user_id) in expired {
            self.notifier.emit(SdkEvent::TypingChanged { conversation_id, user_id, is_typing: false });
        }
    }

    // -- Read receipts --------------------------------------------------------

    pub async fn send_read_receipt(&self, conversation_id: String, message_ids: Vec<String>) -> Result<(), SdkError> {
        self.supervisor
            .send(WsMessage::ReadReceiptReq(ReadReceiptReq { conversation_id, message_ids }))
            .await
    }

    /// Idempotent: single-chat sets `is_read`, group-chat appends to
    /// `read_by` without duplicates. When the reader is the local user
    /// (read from another device) also clears unread locally.
    pub async fn on_read_receipt_push(&self, push: ReadReceiptPush) -> Result<(), SdkError> {
        let mut store = self.store.lock().await;
        let conversation = store.get_conversation(&push.conversation_id)?;
        let is_group = conversation.as_ref().map(|c| c.conversation_type == ConversationType::Group).unwrap_or(false);

        for message_id in &push.message_ids {
            if is_group {
                store.append_read_by(message_id, &push.reader_id)?;
            } else {
                store.mark_read_single(message_id)?;
            }
        }

        if push.reader_id == self.current_user {
            store.clear_unread(&push.conversation_id, crate::now_ms())?;
        }
        drop(store);

        Ok(())
    }

    // -- Revoke ---------------------------------------------------------------

    /// Client-side gate on the 2-minute own-message revoke window; the
    /// server enforces its own copy of this policy, but failing fast here
    /// avoids a round trip for an outcome we can already rule out.
    pub async fn revoke(&self, message_id: String) -> Result<(), SdkError> {
        let message = { self.store.lock().await.get_message_by_id(&message_id)? };
        let Some(message) = message else { return Err(SdkError::MessageNotFound) };
        if message.sender_id != self.current_user {
            return Err(SdkError::PermissionDenied);
        }
        if crate::now_ms() - message.create_time > REVOKE_WINDOW.as_millis() as i64 {
            return Err(SdkError::RevokeTimeExpired);
        }

        self.supervisor.send(WsMessage::RevokeMsgReq(RevokeMsgReq { message_id })).await
    }

    /// Later sync pulls of the same `message_id` observe the revoked state
    /// through dedup-merge and cannot resurrect the original content, since
    /// the tombstone is what gets written here and `save_messages` only
    /// ever advances, never regresses, persisted fields it trusts the wire
    /// for.
    pub async fn on_revoke_msg_push(&self, push: RevokeMsgPush) -> Result<(), SdkError> {
        let mut store = self.store.lock().await;
        store.mark_revoked(&push.message_id, &push.revoker_id, push.revoke_time, REVOKE_TOMBSTONE)?;
        drop(store);
        self.notifier.emit(SdkEvent::MessageStatusChanged {
            message_id: push.message_id,
            status: im_store::model::MessageStatus::Delivered,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SdkConfig, TransportKind};
    use crate::router::Router;
    use im_store::model::ConversationType as StoreConversationType;

    async fn handlers() -> Arc<ControlHandlers> {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let router = Arc::new(Router::new());
        let notifier = Notifier::new();
        let mut cfg = SdkConfig::default().transport;
        cfg.kind = TransportKind::Ws;
        let supervisor = ConnectionSupervisor::new(cfg, router, notifier.clone());
        ControlHandlers::new(store, supervisor, notifier, "me".to_owned())
    }

    #[tokio::test]
    async fn inbound_typing_start_then_stop_emits_changes() {
        let h = handlers().await;
        h.on_typing_status_push(TypingStatusPush {
            conversation_id: "c1".to_owned(),
            user_id: "u2".to_owned(),
            status: TypingStatus::Start,
            timestamp: 0,
        })
        .await;
        assert_eq!(h.inbound_expiry.lock().await.len(), 1);

        h.on_typing_status_push(TypingStatusPush {
            conversation_id: "c1".to_owned(),
            user_id: "u2".to_owned(),
            status: TypingStatus::Stop,
            timestamp: 0,
        })
        .await;
        assert_eq!(h.inbound_expiry.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn revoke_sets_tombstone_and_does_not_resurrect_on_resync() {
        let h = handlers().await;
        let message = im_store::model::Message {
            message_id: "m1".to_owned(),
            server_msg_id: Some("s1".to_owned()),
            seq: 1,
            conversation_id: "c1".to_owned(),
            sender_id: "u2".to_owned(),
            receiver_id: "me".to_owned(),
            conversation_type: StoreConversationType::Single,
            message_type: im_store::model::MessageType::Text,
            content: "original text".to_owned(),
            create_time: 10,
            server_time: 10,
            status: im_store::model::MessageStatus::Delivered,
            direction: im_store::model::Direction::Receive,
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
        {
            let mut store = h.store.lock().await;
            store.ensure_conversation("c1", StoreConversationType::Single, "u2", 0).unwrap();
            store.save_message(&message).unwrap();
        }

        h.on_revoke_msg_push(RevokeMsgPush { message_id: "m1".to_owned(), revoker_id: "u2".to_owned(), revoke_time: 20 })
            .await
            .unwrap();

        {
            let store = h.store.lock().await;
            let rows = store.get_history("c1", i64::MAX, 10).unwrap();
            let revoked = rows.iter().find(|m| m.message_id == "m1").unwrap();
            assert!(revoked.is_revoked);
            assert_eq!(revoked.content, REVOKE_TOMBSTONE);
        }

        // A resync re-delivering the original content must not regress it:
        // a later-arriving row with the same message_id and an older status
        // should be dedup-merged without reviving the unrevoked content.
        let mut resynced = message.clone();
        resynced.content = "original text".to_owned();
        {
            let mut store = h.store.lock().await;
            store.save_message(&resynced).unwrap();
            let rows = store.get_history("c1", i64::MAX, 10).unwrap();
            let still_revoked = rows.iter().find(|m| m.message_id == "m1").unwrap();
            assert!(still_revoked.is_revoked, "dedup-merge must not un-revoke a message");
        }
    }
}
