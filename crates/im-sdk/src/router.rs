//! Message Router (§4.5): demultiplexes inbound frames by command to
//! registered handlers, first attempting correlation against a pending
//! request table (used by the Send Queue for `send_msg_rsp`) before
//! falling back to the command-based handler map.

use im_protocol::{Command, WsMessage};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

pub type Handler = Arc<dyn Fn(WsMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct Router {
    handlers: Mutex<HashMap<Command, Handler>>,
    /// Correlation table keyed by `message_id`, populated by the Send Queue
    /// right before it submits a `send_msg_req` — the WebSocket path has no
    /// bare numeric sequence to correlate on, so `message_id` plays that
    /// role (the TCP path's frame `sequence` is consumed inside the
    /// transport layer during stream reassembly and does not need a second
    /// correlation step here).
    pending: Mutex<HashMap<String, oneshot::Sender<WsMessage>>>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            handlers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, command: Command, handler: Handler) {
        self.handlers.lock().await.insert(command, handler);
    }

    /// Register interest in the response for `message_id`; the returned
    /// receiver resolves the first time `dispatch` sees a message carrying
    /// that id (currently only `send_msg_rsp`).
    pub async fn register_pending(&self, message_id: String) -> oneshot::Receiver<WsMessage> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(message_id, tx);
        rx
    }

    pub async fn cancel_pending(&self, message_id: &str) {
        self.pending.lock().await.remove(message_id);
    }

    pub async fn dispatch(&self, msg: WsMessage) {
        if let WsMessage::SendMsgRsp(ref rsp) = msg {
            let correlated = { self.pending.lock().await.remove(&rsp.message_id) };
            if let Some(tx) = correlated {
                let _ = tx.send(msg);
                return;
            }
        }

        let command = msg.command();
        let handler = { self.handlers.lock().await.get(&command).cloned() };
        match handler {
            Some(handler) => handler(msg).await,
            None => tracing::debug!(?command, "no handler registered for command"),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
