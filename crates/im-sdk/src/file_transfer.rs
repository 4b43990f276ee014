//! File Transfer (§4.12): chunked upload with progress, byte-range
//! resumable download, a JSON sidecar per task. Grounded on
//! `local_proxy.rs`'s per-task `tokio::sync::watch` shutdown handle (here
//! reused for pause/cancel) and on `reqwest`, already in the teacher's
//! dependency set for outbound HTTP.

use crate::error::SdkError;
use crate::notify::{Notifier, SdkEvent};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use uuid::Uuid;

const CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSidecar {
    pub task_id: String,
    pub url: String,
    pub local_path: String,
    pub total_bytes: u64,
    pub completed_bytes: u64,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

impl TransferSidecar {
    fn path_for(sidecar_dir: &Path, task_id: &str) -> PathBuf {
        sidecar_dir.join(format!("{task_id}.json"))
    }

    async fn load(sidecar_dir: &Path, task_id: &str) -> Result<Option<TransferSidecar>, SdkError> {
        let path = Self::path_for(sidecar_dir, task_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SdkError::Io(e)),
        }
    }

    async fn save(&self, sidecar_dir: &Path) -> Result<(), SdkError> {
        let path = Self::path_for(sidecar_dir, &self.task_id);
        let json = serde_json::to_vec(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn remove(sidecar_dir: &Path, task_id: &str) -> Result<(), SdkError> {
        let path = Self::path_for(sidecar_dir, task_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SdkError::Io(e)),
        }
    }
}

pub struct FileTransferManager {
    client: Client,
    notifier: Notifier,
    sidecar_dir: PathBuf,
    upload_url: String,
}

/// A handle for an in-flight transfer; dropping it does not cancel the
/// task. Call `pause()` to stop while keeping the sidecar, or `cancel()` to
/// stop and remove both the sidecar and the partial file.
pub struct TransferHandle {
    task_id: String,
    control: watch::Sender<TransferControl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferControl {
    Run,
    Pause,
    Cancel,
}

impl TransferHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn pause(&self) {
        let _ = self.control.send(TransferControl::Pause);
    }

    pub fn cancel(&self) {
        let _ = self.control.send(TransferControl::Cancel);
    }
}

impl FileTransferManager {
    pub fn new(notifier: Notifier, sidecar_dir: PathBuf, upload_url: String) -> Arc<Self> {
        Arc::new(FileTransferManager { client: Client::new(), notifier, sidecar_dir, upload_url })
    }

    /// Chunked upload with progress callbacks via `SdkEvent::FileTransferProgress`.
    /// Returns the remote URL on completion.
    pub async fn upload(self: &Arc<Self>, local_path: PathBuf) -> Result<String, SdkError> {
        let task_id = Uuid::new_v4().to_string();
        let metadata = tokio::fs::metadata(&local_path).await?;
        let total_bytes = metadata.len();

        let mut file = tokio::fs::File::open(&local_path).await?;
        let mut buffer = vec![0u8; 256 * 1024];
        let mut sent: u64 = 0;
        let mut body = Vec::with_capacity(total_bytes as usize);

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buffer[..n]);
            sent += n as u64;
            self.notifier.emit(SdkEvent::FileTransferProgress { task_id: task_id.clone(), completed_bytes: sent, total_bytes });
        }

        let response = tokio::time::timeout(
            CHUNK_TIMEOUT,
            self.client.post(&self.upload_url).body(body).send(),
        )
        .await
        .map_err(|_| SdkError::Timeout)??;

        let response = response.error_for_status()?;
        let remote_url = response.text().await?;
        Ok(remote_url)
    }

    /// Starts (or resumes, if a sidecar exists) a byte-range download as a
    /// background task, returning a handle to pause/cancel it.
    pub async fn download(self: &Arc<Self>, url: String, local_path: PathBuf, task_id: Option<String>) -> Result<TransferHandle, SdkError> {
        let task_id = task_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let existing = TransferSidecar::load(&self.sidecar_dir, &task_id).await?;
        let sidecar = existing.unwrap_or_else(|| TransferSidecar {
            task_id: task_id.clone(),
            url: url.clone(),
            local_path: local_path.to_string_lossy().into_owned(),
            total_bytes: 0,
            completed_bytes: 0,
            last_modified: None,
            etag: None,
        });

        let (control_tx, control_rx) = watch::channel(TransferControl::Run);
        let this = self.clone();
        let task_id_for_log = task_id.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run_download(sidecar, control_rx).await {
                tracing::warn!(task_id = %task_id_for_log, error = %e, "download task failed");
            }
        });

        Ok(TransferHandle { task_id, control: control_tx })
    }

    async fn run_download(self: Arc<Self>, mut sidecar: TransferSidecar, mut control: watch::Receiver<TransferControl>) -> Result<(), SdkError> {
        loop {
            if *control.borrow() == TransferControl::Cancel {
                TransferSidecar::remove(&self.sidecar_dir, &sidecar.task_id).await?;
                let _ = tokio::fs::remove_file(&sidecar.local_path).await;
                return Ok(());
            }
            if *control.borrow() == TransferControl::Pause {
                sidecar.save(&self.sidecar_dir).await?;
                return Ok(());
            }

            let mut request = self.client.get(&sidecar.url);
            if sidecar.completed_bytes > 0 {
                request = request.header("Range", format!("bytes={}-", sidecar.completed_bytes));
            }

            let response = tokio::time::timeout(CHUNK_TIMEOUT, request.send()).await.map_err(|_| SdkError::Timeout)??;
            let response = response.error_for_status()?;

            if sidecar.total_bytes == 0 {
                if let Some(len) = response.content_length() {
                    sidecar.total_bytes = sidecar.completed_bytes + len;
                }
            }

            let mut file = OpenOptions::new().create(true).append(true).open(&sidecar.local_path).await?;
            let mut stream = response.bytes_stream();
            use futures_util::StreamExt;

            while let Some(chunk) = stream.next().await {
                if matches!(*control.borrow(), TransferControl::Pause | TransferControl::Cancel) {
                    break;
                }
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                sidecar.completed_bytes += chunk.len() as u64;
                sidecar.save(&self.sidecar_dir).await?;
                self.notifier.emit(SdkEvent::FileTransferProgress {
                    task_id: sidecar.task_id.clone(),
                    completed_bytes: sidecar.completed_bytes,
                    total_bytes: sidecar.total_bytes,
                });
            }

            if matches!(*control.borrow(), TransferControl::Pause | TransferControl::Cancel) {
                continue; // loop top handles the actual pause/cancel action
            }

            if sidecar.total_bytes == 0 || sidecar.completed_bytes >= sidecar.total_bytes {
                TransferSidecar::remove(&self.sidecar_dir, &sidecar.task_id).await?;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_round_trips_through_json() {
        let sidecar = TransferSidecar {
            task_id: "t1".to_owned(),
            url: "https://example.invalid/f".to_owned(),
            local_path: "/tmp/f".to_owned(),
            total_bytes: 100,
            completed_bytes: 40,
            last_modified: None,
            etag: Some("abc".to_owned()),
        };
        let json = serde_json::to_string(&sidecar).unwrap();
        let back: TransferSidecar = serde_json::from_str(&json).unwrap();
        assert_eq!(back.completed_bytes, 40);
        assert_eq!(back.etag.as_deref(), Some("abc"));
    }
}
