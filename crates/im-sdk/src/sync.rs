//! Sync Engine (§4.8): batched incremental pull by `seq`, re-targeted from
//! `replay.rs`'s epoch-bucketed pagination at the single linear sequence
//! space the IM protocol uses — there is no epoch-reset analogue here, so
//! the cursor is just `last_sync_seq` instead of `(epoch, seq)`.

use crate::notify::{Notifier, SdkEvent};
use crate::router::Router;
use crate::supervisor::ConnectionSupervisor;
use crate::wire::from_wire;
use im_protocol::{Command, SyncReq, WsMessage};
use im_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub current: u64,
    pub total: u64,
    pub batch_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Wifi,
    Cellular,
    Unknown,
}

fn batch_size_for(net_type: NetworkType) -> u32 {
    match net_type {
        NetworkType::Wifi => 500,
        NetworkType::Cellular => 200,
        NetworkType::Unknown => 100,
    }
}

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const SYNC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a sync is already running")]
    AlreadySyncing,
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("server error: {0}")]
    Server(String),
    #[error(transparent)]
    Store(#[from] im_store::StoreError),
}

pub struct SyncEngine {
    store: Arc<Mutex<Store>>,
    router: Arc<Router>,
    supervisor: Arc<ConnectionSupervisor>,
    notifier: Notifier,
    running: Mutex<Option<watch::Receiver<SyncState>>>,
    last_full_repull: Mutex<Option<std::time::Instant>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<Mutex<Store>>,
        router: Arc<Router>,
        supervisor: Arc<ConnectionSupervisor>,
        notifier: Notifier,
    ) -> Arc<Self> {
        Arc::new(SyncEngine { store, router, supervisor, notifier, running: Mutex::new(None), last_full_repull: Mutex::new(None) })
    }

    /// Starts (or joins) a sync pass. Concurrent callers observe
    /// `AlreadySyncing` and await the running task's completion broadcast
    /// rather than starting a second pass.
    pub async fn sync(self: &Arc<Self>, from_seq: Option<u64>, net_type: NetworkType) -> Result<(), SyncError> {
        let mut guard = self.running.lock().await;
        if let Some(rx) = guard.as_ref() {
            if *rx.borrow() == SyncState::Running {
                let mut rx = rx.clone();
                drop(guard);
                let _ = rx.changed().await;
                return match *rx.borrow() {
                    SyncState::Succeeded => Ok(()),
                    _ => Err(SyncError::AlreadySyncing),
                };
            }
        }

        let (tx, rx) = watch::channel(SyncState::Running);
        *guard = Some(rx);
        drop(guard);

        let this = self.clone();
        let result = this.run_sync(from_seq, net_type).await;
        let _ = tx.send(if result.is_ok() { SyncState::Succeeded } else { SyncState::Failed });
        result
    }

    async fn run_sync(self: Arc<Self>, from_seq: Option<u64>, net_type: NetworkType) -> Result<(), SyncError> {
        let mut cursor = match from_seq {
            Some(s) => s,
            None => {
                let max = self.store.lock().await.max_seq()?;
                max + 1
            }
        };
        let batch_size = batch_size_for(net_type);
        let mut batch_index: u32 = 0;

        loop {
            let rsp = self.pull_batch_with_retry(cursor, batch_size).await?;

            let rows: Vec<_> = rsp.messages.into_iter().map(from_wire).collect();
            let max_seq_in_batch = rows.iter().map(|m| m.seq).max();

            {
                let mut store = self.store.lock().await;
                store.save_messages(&rows)?;
                if let Some(seq) = max_seq_in_batch {
                    store.set_last_sync_seq("current_user", seq, crate::now_ms())?;
                }
            }

            self.notifier.emit(SdkEvent::SyncProgress(SyncProgress {
                current: max_seq_in_batch.unwrap_or(cursor),
                total: rsp.total_count,
                batch_index,
            }));

            batch_index += 1;

            if rsp.has_more {
                cursor = rsp.server_max_seq + 1;
            } else {
                return Ok(());
            }
        }
    }

    async fn pull_batch_with_retry(&self, from_seq: u64, batch_size: u32) -> Result<im_protocol::SyncRsp, SyncError> {
        let mut attempt = 0;
        loop {
            match self.pull_batch(from_seq, batch_size).await {
                Ok(rsp) => return Ok(rsp),
                Err(SyncError::Network(msg)) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        return Err(SyncError::Network(msg));
                    }
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn pull_batch(&self, from_seq: u64, batch_size: u32) -> Result<im_protocol::SyncRsp, SyncError> {
        let message_id = format!("sync-{from_seq}-{}", crate::now_ms());
        let rx = self.router.register_pending(message_id.clone()).await;
        let req = WsMessage::SyncReq(SyncReq { last_seq: from_seq.saturating_sub(1), count: batch_size });

        self.supervisor.send(req).await.map_err(|e| SyncError::Network(e.to_string()))?;

        match tokio::time::timeout(SYNC_REQUEST_TIMEOUT, rx).await {
            Ok(Ok(WsMessage::SyncRsp(rsp))) => Ok(rsp),
            Ok(Ok(_)) => Err(SyncError::Server("unexpected response to sync_req".to_owned())),
            Ok(Err(_)) => Err(SyncError::Network("sync channel closed".to_owned())),
            Err(_) => {
                self.router.cancel_pending(&message_id).await;
                Err(SyncError::Network("sync_req timed out".to_owned()))
            }
        }
    }

    /// §4.8 fallback: after exhausted retries the supervisor may ask for a
    /// full re-pull. Rate-limited to once per 5 minutes.
    pub async fn maybe_full_repull(self: &Arc<Self>, net_type: NetworkType) -> Result<(), SyncError> {
        {
            let mut last = self.last_full_repull.lock().await;
            if let Some(t) = *last {
                if t.elapsed() < Duration::from_secs(300) {
                    return Err(SyncError::Network("full re-pull rate-limited".to_owned()));
                }
            }
            *last = Some(std::time::Instant::now());
        }
        self.sync(Some(0), net_type).await
    }
}

/// Used by the TCP transport's gap-detection policy (§4.1): a
/// `RequestSync` severity should kick off a sync pass from the local cursor
/// rather than a full reconnect.
pub fn command_triggers_sync(command: Command) -> bool {
    matches!(command, Command::PushMsg | Command::BatchMsg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_follows_network_type() {
        assert_eq!(batch_size_for(NetworkType::Wifi), 500);
        assert_eq!(batch_size_for(NetworkType::Cellular), 200);
        assert_eq!(batch_size_for(NetworkType::Unknown), 100);
    }
}
