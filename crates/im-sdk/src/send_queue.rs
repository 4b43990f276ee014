//! Send Queue (§4.6): a Pending/InFlight/Failed state machine keyed by
//! `message_id`, with a durable sidecar and reconnect-safe re-submission.
//! Grounded on `replay.rs::ReplayEngine::pending_events` for the
//! "what still needs to go out" question, re-targeted at a single session
//! instead of per-stream epochs — there is only ever one logical stream
//! here, so the durable sidecar is just the store's own `Sending` rows
//! (see `Store::pending_outbound`) rather than a second journal format.

use crate::notify::{Notifier, SdkEvent};
use crate::router::Router;
use crate::supervisor::ConnectionSupervisor;
use crate::wire::to_wire;
use im_protocol::{SendMsgReq, WsMessage};
use im_store::model::{Message, MessageStatus};
use im_store::Store;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const ACK_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 3;

struct PendingItem {
    message: Message,
    retry_count: u32,
}

struct InFlight {
    retry_count: u32,
    #[allow(dead_code)]
    sent_at: Instant,
}

pub struct SendQueue {
    store: Arc<Mutex<Store>>,
    router: Arc<Router>,
    supervisor: Arc<ConnectionSupervisor>,
    notifier: Notifier,
    pending: Mutex<VecDeque<PendingItem>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    draining: AtomicBool,
}

impl SendQueue {
    pub fn new(
        store: Arc<Mutex<Store>>,
        router: Arc<Router>,
        supervisor: Arc<ConnectionSupervisor>,
        notifier: Notifier,
    ) -> Arc<Self> {
        Arc::new(SendQueue {
            store,
            router,
            supervisor,
            notifier,
            pending: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            draining: AtomicBool::new(false),
        })
    }

    /// Rebuilds the in-memory queue from rows the store already has at
    /// `Sending` — these were enqueued in a previous process lifetime and
    /// never reached an ACK.
    pub async fn restore_from_store(self: &Arc<Self>) -> Result<(), im_store::StoreError> {
        let rows = { self.store.lock().await.pending_outbound()? };
        let mut pending = self.pending.lock().await;
        for message in rows {
            pending.push_back(PendingItem { message, retry_count: 0 });
        }
        drop(pending);
        self.clone().drain_pending();
        Ok(())
    }

    /// Enqueue an already-persisted message (the caller — Message Manager —
    /// is responsible for the initial `save_message` at `status = Sending`).
    pub async fn enqueue(self: &Arc<Self>, message: Message) {
        self.pending.lock().await.push_back(PendingItem { message, retry_count: 0 });
        self.clone().drain_pending();
    }

    /// Called when the Connection Supervisor reports a fresh `auth_rsp.ok`.
    /// In-flight items move back to the front of pending without a retry
    /// count bump — the socket died, not the send.
    pub async fn on_reconnected(self: &Arc<Self>) {
        let drained: Vec<(String, u32)> = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.drain().map(|(id, info)| (id, info.retry_count)).collect()
        };
        if !drained.is_empty() {
            let store_rows = { self.store.lock().await.pending_outbound().unwrap_or_default() };
            let mut pending = self.pending.lock().await;
            for (message_id, retry_count) in drained {
                if let Some(message) = store_rows.iter().find(|m| m.message_id == message_id).cloned() {
                    pending.push_front(PendingItem { message, retry_count });
                }
            }
        }
        // Also wakes items that were restored from the store at startup but
        // never got a first dispatch attempt because the transport wasn't up
        // yet (the drain loop backs off as soon as `supervisor.send` fails).
        self.clone().drain_pending();
    }

    /// Spawns the drain as a detached task so callers (enqueue, reconnect,
    /// timeout handling) never block on dispatch. `draining` collapses
    /// concurrent triggers into a single active loop — this is the
    /// reentrant-mutex role the spec calls for, expressed as a flag plus an
    /// explicit loop instead of a recursive call chain.
    fn drain_pending(self: Arc<Self>) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            loop {
                let next = { self.pending.lock().await.pop_front() };
                let Some(item) = next else { break };
                if !self.dispatch_one(item).await {
                    break;
                }
            }
            self.draining.store(false, Ordering::SeqCst);
        });
    }

    /// Sends one item. Returns `false` if the transport rejected the send
    /// (not connected) — the caller should stop draining until the next
    /// reconnect or enqueue wakes it back up.
    async fn dispatch_one(self: &Arc<Self>, item: PendingItem) -> bool {
        let message_id = item.message.message_id.clone();
        let rx = self.router.register_pending(message_id.clone()).await;
        let req = WsMessage::SendMsgReq(SendMsgReq { message: to_wire(&item.message) });

        if self.supervisor.send(req).await.is_err() {
            self.router.cancel_pending(&message_id).await;
            self.pending.lock().await.push_front(item);
            return false;
        }

        self.in_flight
            .lock()
            .await
            .insert(message_id.clone(), InFlight { retry_count: item.retry_count, sent_at: Instant::now() });

        let this = self.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(ACK_TIMEOUT, rx).await {
                Ok(Ok(WsMessage::SendMsgRsp(rsp))) => this.on_ack(rsp).await,
                Ok(Ok(_)) => {}
                Ok(Err(_)) => {
                    // Superseded: `on_reconnected` re-registered this id under
                    // a fresh oneshot and dropped this one. Nothing to do.
                }
                Err(_) => this.on_timeout(message_id).await,
            }
        });

        true
    }

    async fn on_ack(self: &Arc<Self>, rsp: im_protocol::SendMsgRsp) {
        self.in_flight.lock().await.remove(&rsp.message_id);

        let new_status = if rsp.ok { MessageStatus::Sent } else { MessageStatus::Failed };
        let mut store = self.store.lock().await;
        if let Ok(Some(mut message)) = find_by_id(&store, &rsp.message_id) {
            message.status = new_status;
            message.server_msg_id = rsp.server_msg_id.clone();
            message.seq = rsp.seq;
            message.server_time = rsp.server_time;
            let _ = store.save_message(&message);
        }
        drop(store);

        self.notifier.emit(SdkEvent::MessageStatusChanged { message_id: rsp.message_id, status: new_status });
    }

    async fn on_timeout(self: &Arc<Self>, message_id: String) {
        self.router.cancel_pending(&message_id).await;
        let retry_count = match self.in_flight.lock().await.remove(&message_id) {
            Some(info) => info.retry_count,
            None => return, // already resolved (ack arrived just as the timer fired)
        };

        let store_rows = { self.store.lock().await.pending_outbound().unwrap_or_default() };
        let Some(message) = store_rows.into_iter().find(|m| m.message_id == message_id) else { return };

        if retry_count < MAX_RETRIES {
            self.pending.lock().await.push_back(PendingItem { message, retry_count: retry_count + 1 });
            self.clone().drain_pending();
        } else {
            let mut failed = message;
            failed.status = MessageStatus::Failed;
            let mut store = self.store.lock().await;
            let _ = store.save_message(&failed);
            drop(store);
            self.notifier.emit(SdkEvent::MessageStatusChanged { message_id, status: MessageStatus::Failed });
        }
    }
}

fn find_by_id(store: &Store, message_id: &str) -> Result<Option<Message>, im_store::StoreError> {
    // `pending_outbound` only covers `Sending` rows, which is exactly the
    // set an in-flight ack or timeout can still be resolving against.
    Ok(store.pending_outbound()?.into_iter().find(|m| m.message_id == message_id))
}
