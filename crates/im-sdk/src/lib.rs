//! Client-side instant-messaging SDK core.
//!
//! Re-exports the public surface; internal wiring between the Connection
//! Supervisor, Send Queue, Sync Engine, Message Manager, Conversation
//! Manager, and Control Handlers lives in [`client`].

pub mod client;
pub mod config;
pub mod conversation_manager;
pub mod error;
pub mod file_transfer;
pub mod handlers;
pub mod message_manager;
pub mod notify;
pub mod persist_pool;
pub mod router;
pub mod send_queue;
pub mod supervisor;
pub mod sync;
pub mod transport;
pub mod wire;

pub use client::Client;
pub use config::{load_config_from_path, load_config_from_str, SdkConfig};
pub use error::{ExitCode, SdkError};
pub use notify::{Listener, SdkEvent};
pub use transport::Credential;

/// Current wall-clock time in epoch milliseconds. Every component that
/// stamps a `create_time`/`server_time`/retry deadline goes through this
/// one function so tests can reason about a single clock source.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
