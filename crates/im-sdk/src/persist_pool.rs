//! Async Persist Pool (§4.9, §5): the asynchronous half of the send path's
//! hybrid dispatch. "Latency-first" messages (text, location, card, and
//! anything not `is_durability_first`) return from `send()` before the row
//! lands in the database; a bounded worker pool (size 2-4 per §5) performs
//! the actual write off to the side. Grounded on `file_transfer.rs`'s
//! per-task JSON sidecar (same load/save/remove shape, keyed by
//! `message_id` instead of `task_id`) so a crash between `submit` and the
//! worker's write doesn't silently drop the message — the next
//! `PersistPool::new` replays whatever sidecar files are still on disk.

use im_store::model::Message;
use im_store::Store;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const QUEUE_CAPACITY: usize = 256;

fn sidecar_path(sidecar_dir: &Path, message_id: &str) -> PathBuf {
    sidecar_dir.join(format!("{message_id}.json"))
}

async fn write_sidecar(sidecar_dir: &Path, message: &Message) -> Result<(), crate::error::SdkError> {
    let json = serde_json::to_vec(message)?;
    tokio::fs::write(sidecar_path(sidecar_dir, &message.message_id), json).await?;
    Ok(())
}

async fn remove_sidecar(sidecar_dir: &Path, message_id: &str) {
    let _ = tokio::fs::remove_file(sidecar_path(sidecar_dir, message_id)).await;
}

/// Replays any sidecar entries left over from a process that crashed
/// between `submit`'s sidecar write and the worker's store write.
async fn drain_sidecar(store: &Arc<Mutex<Store>>, sidecar_dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(sidecar_dir).await else { return };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(bytes) = tokio::fs::read(&path).await {
            if let Ok(message) = serde_json::from_slice::<Message>(&bytes) {
                let mut store = store.lock().await;
                let _ = store.save_message(&message);
            }
        }
        let _ = tokio::fs::remove_file(&path).await;
    }
}

pub struct PersistPool {
    tx: mpsc::Sender<Message>,
    sidecar_dir: PathBuf,
}

impl PersistPool {
    /// Spawns `worker_count` (clamped to 2..=4) persistence workers sharing
    /// one bounded job queue, after draining whatever the sidecar directory
    /// already holds from a prior run.
    pub async fn new(store: Arc<Mutex<Store>>, sidecar_dir: PathBuf, worker_count: usize) -> Self {
        let worker_count = worker_count.clamp(2, 4);
        let _ = tokio::fs::create_dir_all(&sidecar_dir).await;
        drain_sidecar(&store, &sidecar_dir).await;

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..worker_count {
            let rx = rx.clone();
            let store = store.clone();
            let sidecar_dir = sidecar_dir.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(message) = job else { break };
                    let mut store = store.lock().await;
                    let _ = store.save_message(&message);
                    drop(store);
                    remove_sidecar(&sidecar_dir, &message.message_id).await;
                }
            });
        }

        PersistPool { tx, sidecar_dir }
    }

    /// Records `message` in the crash-recovery sidecar, then hands it to a
    /// worker. Returns once the sidecar write lands on disk — `send()`'s
    /// caller still gets a fast return relative to a synchronous SQLite
    /// write, but the message is durable the moment this call succeeds.
    pub async fn submit(&self, message: Message) -> Result<(), crate::error::SdkError> {
        write_sidecar(&self.sidecar_dir, &message).await?;
        let _ = self.tx.send(message).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use im_store::model::{ConversationType, Direction, MessageStatus, MessageType};

    fn sample(id: &str) -> Message {
        Message {
            message_id: id.to_owned(),
            server_msg_id: None,
            seq: 0,
            conversation_id: "c1".to_owned(),
            sender_id: "me".to_owned(),
            receiver_id: "peer".to_owned(),
            conversation_type: ConversationType::Single,
            message_type: MessageType::Text,
            content: "hi".to_owned(),
            create_time: 1,
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

    #[tokio::test]
    async fn submitted_message_eventually_lands_in_store() {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let dir = tempfile::tempdir().unwrap();
        let pool = PersistPool::new(store.clone(), dir.path().to_path_buf(), 2).await;

        pool.submit(sample("async1")).await.unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut found = false;
        while tokio::time::Instant::now() < deadline {
            if store.lock().await.get_message_by_id("async1").unwrap().is_some() {
                found = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(found, "worker should have persisted the message");
    }

    #[tokio::test]
    async fn worker_count_is_clamped_into_range() {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let dir = tempfile::tempdir().unwrap();
        // Requesting 0 or 100 workers should not panic; both clamp into 2..=4.
        let _low = PersistPool::new(store.clone(), dir.path().join("a"), 0).await;
        let _high = PersistPool::new(store, dir.path().join("b"), 100).await;
    }

    #[tokio::test]
    async fn restart_replays_sidecar_left_by_a_crashed_process() {
        let dir = tempfile::tempdir().unwrap();
        write_sidecar(dir.path(), &sample("crashed1")).await.unwrap();

        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let _pool = PersistPool::new(store.clone(), dir.path().to_path_buf(), 2).await;

        let row = store.lock().await.get_message_by_id("crashed1").unwrap();
        assert!(row.is_some(), "sidecar entry from a prior run should be replayed on startup");
    }
}
