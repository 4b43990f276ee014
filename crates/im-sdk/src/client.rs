//! Top-level facade (§6): wires the Connection Supervisor, Router, Send
//! Queue, Sync Engine, Message Manager, Conversation Manager, Control
//! Handlers, and File Transfer Manager into one handle and exposes the
//! external operations a host application calls.
//!
//! Follows `control_api.rs::AppState::new`'s shape: build the shared
//! handles first, register router handlers against them, then return the
//! bundle behind an `Arc`.

use crate::config::SdkConfig;
use crate::conversation_manager::ConversationManager;
use crate::error::SdkError;
use crate::file_transfer::{FileTransferManager, TransferHandle};
use crate::handlers::ControlHandlers;
use crate::message_manager::MessageManager;
use crate::notify::{Listener, Notifier, SdkEvent};
use crate::persist_pool::PersistPool;
use crate::router::Router;
use crate::send_queue::SendQueue;
use crate::supervisor::{ConnectionState, ConnectionSupervisor, NetworkType as SupervisorNetworkType};
use crate::sync::{NetworkType as SyncNetworkType, SyncEngine};
use crate::transport::Credential;
use im_protocol::{Command, WsMessage};
use im_store::model::{Conversation, Draft, Message};
use im_store::{Store, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// §5's bounded background worker pool for async "latency-first" message
/// persistence; clamped to 2..=4 by `PersistPool::new` regardless.
const PERSIST_POOL_WORKERS: usize = 3;

pub struct Client {
    config: SdkConfig,
    store: Arc<Mutex<Store>>,
    notifier: Notifier,
    supervisor: Arc<ConnectionSupervisor>,
    send_queue: Arc<SendQueue>,
    sync_engine: Arc<SyncEngine>,
    message_manager: Arc<MessageManager>,
    conversation_manager: Arc<ConversationManager>,
    handlers: Arc<ControlHandlers>,
    file_transfer: Arc<FileTransferManager>,
}

impl Client {
    /// Opens the local store, builds every component, registers router
    /// handlers, and subscribes the reconnect/sync wiring. Does not connect
    /// — call [`Client::login`] once the caller has credentials.
    pub async fn new(config: SdkConfig, current_user: String) -> Result<Arc<Self>, SdkError> {
        let store_config = StoreConfig {
            enable_wal: config.database.enable_wal,
            encryption_key: config.database.encryption_key.clone(),
            file_name: config.database.file_name.clone(),
        };
        let store = Arc::new(Mutex::new(Store::open(&store_config)?));

        // Draining the async-persist sidecar before `send_queue.restore_from_store`
        // runs means a message that crashed mid-write in a prior process is back
        // in the store — and therefore visible to the send queue's restore — by
        // the time the send queue looks for it.
        let persist_sidecar_dir = PathBuf::from(format!("{}.pending_messages", config.database.file_name));
        let persist_pool = Arc::new(PersistPool::new(store.clone(), persist_sidecar_dir, PERSIST_POOL_WORKERS).await);

        let notifier = Notifier::new();
        let router = Arc::new(Router::new());
        let supervisor = ConnectionSupervisor::new(config.transport.clone(), router.clone(), notifier.clone());
        let send_queue = SendQueue::new(store.clone(), router.clone(), supervisor.clone(), notifier.clone());
        let sync_engine = SyncEngine::new(store.clone(), router.clone(), supervisor.clone(), notifier.clone());
        let message_manager = MessageManager::new(
            store.clone(),
            send_queue.clone(),
            supervisor.clone(),
            persist_pool,
            notifier.clone(),
            current_user.clone(),
        );
        let conversation_manager = ConversationManager::new(store.clone(), notifier.clone());
        let handlers = ControlHandlers::new(store.clone(), supervisor.clone(), notifier.clone(), current_user.clone());

        let sidecar_dir = PathBuf::from(format!("{}.transfers", config.database.file_name));
        let file_transfer = FileTransferManager::new(notifier.clone(), sidecar_dir, format!("{}/files", config.api_url));

        register_router_handlers(&router, message_manager.clone(), handlers.clone()).await;

        send_queue.restore_from_store().await?;

        let client = Arc::new(Client {
            config,
            store,
            notifier: notifier.clone(),
            supervisor,
            send_queue,
            sync_engine,
            message_manager,
            conversation_manager,
            handlers,
            file_transfer,
        });

        subscribe_reconnect_wiring(client.clone(), notifier).await;

        Ok(client)
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub async fn subscribe(&self, listener: Listener) {
        self.notifier.register(listener).await;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.supervisor.state().await
    }

    pub async fn login(&self, user_id: String, token: String) {
        self.supervisor.login(Credential { user_id, token }).await;
    }

    pub async fn logout(&self) {
        self.handlers.shutdown();
        self.supervisor.logout().await;
    }

    pub async fn set_network_available(&self, available: bool) {
        self.supervisor.set_network_available(available).await;
    }

    pub async fn set_network_type(&self, net_type: SupervisorNetworkType) {
        self.supervisor.set_network_type(net_type).await;
    }

    // -- Messaging ------------------------------------------------------------

    pub async fn send_message(&self, message: Message) -> Result<Message, SdkError> {
        self.message_manager.send(message).await
    }

    pub async fn set_active_conversation(&self, conversation_id: Option<String>) {
        self.message_manager.set_active_conversation(conversation_id).await;
    }

    pub async fn revoke_message(&self, message_id: String) -> Result<(), SdkError> {
        self.handlers.revoke(message_id).await
    }

    pub async fn notify_typing(self: &Arc<Self>, conversation_id: String) -> Result<(), SdkError> {
        self.handlers.clone().notify_typing(conversation_id).await
    }

    pub async fn send_read_receipt(&self, conversation_id: String, message_ids: Vec<String>) -> Result<(), SdkError> {
        self.handlers.send_read_receipt(conversation_id, message_ids).await
    }

    // -- Conversations ----------------------------------------------------------

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, SdkError> {
        self.conversation_manager.list_conversations().await
    }

    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<(), SdkError> {
        self.conversation_manager.mark_as_read(conversation_id).await
    }

    pub async fn set_conversation_muted(&self, conversation_id: &str, muted: bool) -> Result<(), SdkError> {
        self.conversation_manager.set_muted(conversation_id, muted).await
    }

    pub async fn set_conversation_pinned(&self, conversation_id: &str, pinned: bool) -> Result<(), SdkError> {
        self.conversation_manager.set_pinned(conversation_id, pinned).await
    }

    pub async fn save_draft(&self, conversation_id: &str, draft: Draft) -> Result<(), SdkError> {
        self.conversation_manager.save_draft(conversation_id, draft).await
    }

    pub async fn total_unread(&self) -> Result<i64, SdkError> {
        self.conversation_manager.total_unread().await
    }

    pub async fn get_history(&self, conversation_id: &str, before_time: i64, limit: u32) -> Result<Vec<Message>, SdkError> {
        Ok(self.store.lock().await.get_history(conversation_id, before_time, limit)?)
    }

    pub async fn search(&self, keyword: &str, filter: im_store::model::SearchFilter) -> Result<Vec<Message>, SdkError> {
        Ok(self.store.lock().await.search(keyword, &filter)?)
    }

    // -- Sync -------------------------------------------------------------------

    pub async fn sync_now(self: &Arc<Self>, net_type: SyncNetworkType) -> Result<(), crate::sync::SyncError> {
        self.sync_engine.sync(None, net_type).await
    }

    // -- File transfer ------------------------------------------------------------

    pub async fn upload_file(self: &Arc<Self>, local_path: PathBuf) -> Result<String, SdkError> {
        self.file_transfer.upload(local_path).await
    }

    pub async fn download_file(self: &Arc<Self>, url: String, local_path: PathBuf, task_id: Option<String>) -> Result<TransferHandle, SdkError> {
        self.file_transfer.download(url, local_path, task_id).await
    }
}

async fn register_router_handlers(router: &Arc<Router>, message_manager: Arc<MessageManager>, handlers: Arc<ControlHandlers>) {
    {
        let message_manager = message_manager.clone();
        router
            .register(
                Command::PushMsg,
                Arc::new(move |msg| {
                    let message_manager = message_manager.clone();
                    Box::pin(async move {
                        if let WsMessage::PushMsg(push) = msg {
                            if let Err(e) = message_manager.on_push_msg(push.message).await {
                                tracing::warn!(error = %e, "on_push_msg failed");
                            }
                        }
                    })
                }),
            )
            .await;
    }
    {
        let message_manager = message_manager.clone();
        router
            .register(
                Command::BatchMsg,
                Arc::new(move |msg| {
                    let message_manager = message_manager.clone();
                    Box::pin(async move {
                        if let WsMessage::BatchMsg(batch) = msg {
                            if let Err(e) = message_manager.on_batch_msg(batch.messages).await {
                                tracing::warn!(error = %e, "on_batch_msg failed");
                            }
                        }
                    })
                }),
            )
            .await;
    }
    {
        let handlers = handlers.clone();
        router
            .register(
                Command::TypingStatusPush,
                Arc::new(move |msg| {
                    let handlers = handlers.clone();
                    Box::pin(async move {
                        if let WsMessage::TypingStatusPush(push) = msg {
                            handlers.on_typing_status_push(push).await;
                        }
                    })
                }),
            )
            .await;
    }
    {
        let handlers = handlers.clone();
        router
            .register(
                Command::ReadReceiptPush,
                Arc::new(move |msg| {
                    let handlers = handlers.clone();
                    Box::pin(async move {
                        if let WsMessage::ReadReceiptPush(push) = msg {
                            if let Err(e) = handlers.on_read_receipt_push(push).await {
                                tracing::warn!(error = %e, "on_read_receipt_push failed");
                            }
                        }
                    })
                }),
            )
            .await;
    }
    {
        let handlers = handlers.clone();
        router
            .register(
                Command::RevokeMsgPush,
                Arc::new(move |msg| {
                    let handlers = handlers.clone();
                    Box::pin(async move {
                        if let WsMessage::RevokeMsgPush(push) = msg {
                            if let Err(e) = handlers.on_revoke_msg_push(push).await {
                                tracing::warn!(error = %e, "on_revoke_msg_push failed");
                            }
                        }
                    })
                }),
            )
            .await;
    }
}

/// §4.4's transition wiring: a fresh `auth_rsp.ok` both kicks off an
/// incremental sync (when the server is ahead of the local cursor) and
/// tells the Send Queue to re-submit whatever was in flight when the
/// socket died.
async fn subscribe_reconnect_wiring(client: Arc<Client>, notifier: Notifier) {
    let listener: Listener = Arc::new(move |event: &SdkEvent| {
        if let SdkEvent::Authenticated { server_max_seq } = event {
            let client = client.clone();
            let server_max_seq = *server_max_seq;
            tokio::spawn(async move {
                client.send_queue.on_reconnected().await;

                let local_max_seq = { client.store.lock().await.max_seq().unwrap_or(0) };
                if server_max_seq > local_max_seq {
                    if let Err(e) = client.sync_engine.sync(Some(local_max_seq + 1), SyncNetworkType::Unknown).await {
                        tracing::warn!(error = %e, "post-auth sync failed");
                    }
                }
            });
        }
    });
    notifier.register(listener).await;
}
