//! Listener registry and the dedicated notification task (§5, §9).
//!
//! Listeners are held as weakly-flavored `Arc<dyn Fn>` callbacks behind a
//! short mutex; all delivery happens on a single background task fed by an
//! unbounded channel so callbacks never run while an internal lock is held,
//! and events for a given conversation are delivered in commit order.

use im_store::model::{Conversation, Message, MessageStatus};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::supervisor::{ConnectionState, DisconnectReason};
use crate::sync::SyncProgress;

#[derive(Debug, Clone)]
pub enum SdkEvent {
    MessageCreated(Message),
    MessageStatusChanged { message_id: String, status: MessageStatus },
    MessageReceived(Message),
    ConversationChanged(Conversation),
    UnreadTotalChanged(i64),
    TypingChanged { conversation_id: String, user_id: String, is_typing: bool },
    ConnectionStateChanged { state: ConnectionState },
    Disconnected { reason: Option<DisconnectReason> },
    /// Emitted once `auth_rsp.ok` is true, carrying the server's current max
    /// sequence so the caller can decide whether to kick off a sync pass.
    Authenticated { server_max_seq: u64 },
    SyncProgress(SyncProgress),
    PacketLoss { expected: u32, received: u32, gap: u32 },
    FileTransferProgress { task_id: String, completed_bytes: u64, total_bytes: u64 },
}

pub type Listener = Arc<dyn Fn(&SdkEvent) + Send + Sync>;

/// Fan-out hub: `emit` is non-blocking and safe to call from anywhere,
/// including while holding another component's lock.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<SdkEvent>,
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SdkEvent>();
        let listeners: Arc<Mutex<Vec<Listener>>> = Arc::new(Mutex::new(Vec::new()));
        let listeners_task = listeners.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let snapshot = { listeners_task.lock().await.clone() };
                for listener in &snapshot {
                    listener(&event);
                }
            }
        });
        Notifier { tx, listeners }
    }

    pub async fn register(&self, listener: Listener) {
        self.listeners.lock().await.push(listener);
    }

    /// Queue an event for delivery. Never blocks and never fails in a way
    /// the caller needs to act on: a dropped receiver means the SDK is
    /// shutting down.
    pub fn emit(&self, event: SdkEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
