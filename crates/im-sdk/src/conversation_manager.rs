//! Conversation/Unread Manager (§4.10): a thin notifying wrapper over
//! `im-store`'s conversation and unread-accounting operations, following
//! `control_api.rs::AppState`'s pattern of a shared `Arc<Mutex<Db>>` plus a
//! broadcast channel for UI events.

use crate::error::SdkError;
use crate::notify::{Notifier, SdkEvent};
use im_store::model::{Conversation, Draft};
use im_store::Store;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ConversationManager {
    store: Arc<Mutex<Store>>,
    notifier: Notifier,
}

impl ConversationManager {
    pub fn new(store: Arc<Mutex<Store>>, notifier: Notifier) -> Arc<Self> {
        Arc::new(ConversationManager { store, notifier })
    }

    pub async fn get_unread(&self, conversation_id: &str) -> Result<i64, SdkError> {
        let store = self.store.lock().await;
        Ok(store.get_conversation(conversation_id)?.map(|c| c.unread_count).unwrap_or(0))
    }

    pub async fn mark_as_read(&self, conversation_id: &str) -> Result<(), SdkError> {
        let conversation = {
            let mut store = self.store.lock().await;
            store.clear_unread(conversation_id, crate::now_ms())?;
            store.get_conversation(conversation_id)?
        };
        if let Some(conversation) = conversation {
            self.notifier.emit(SdkEvent::ConversationChanged(conversation));
        }
        self.emit_total().await?;
        Ok(())
    }

    pub async fn total_unread(&self) -> Result<i64, SdkError> {
        Ok(self.store.lock().await.total_unread()?)
    }

    pub async fn set_muted(&self, conversation_id: &str, muted: bool) -> Result<(), SdkError> {
        let conversation = {
            let mut store = self.store.lock().await;
            store.set_muted(conversation_id, muted, crate::now_ms())?;
            store.get_conversation(conversation_id)?
        };
        if let Some(conversation) = conversation {
            self.notifier.emit(SdkEvent::ConversationChanged(conversation));
        }
        self.emit_total().await?;
        Ok(())
    }

    pub async fn set_pinned(&self, conversation_id: &str, pinned: bool) -> Result<(), SdkError> {
        let conversation = {
            let mut store = self.store.lock().await;
            store.set_pinned(conversation_id, pinned, crate::now_ms())?;
            store.get_conversation(conversation_id)?
        };
        if let Some(conversation) = conversation {
            self.notifier.emit(SdkEvent::ConversationChanged(conversation));
        }
        Ok(())
    }

    pub async fn save_draft(&self, conversation_id: &str, draft: Draft) -> Result<(), SdkError> {
        let conversation = {
            let mut store = self.store.lock().await;
            store.save_draft(conversation_id, &draft, crate::now_ms())?;
            store.get_conversation(conversation_id)?
        };
        if let Some(conversation) = conversation {
            self.notifier.emit(SdkEvent::ConversationChanged(conversation));
        }
        Ok(())
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, SdkError> {
        Ok(self.store.lock().await.list_conversations()?)
    }

    async fn emit_total(&self) -> Result<(), SdkError> {
        let total = self.store.lock().await.total_unread()?;
        self.notifier.emit(SdkEvent::UnreadTotalChanged(total));
        Ok(())
    }
}
