//! Transport abstraction (§4.3): two interchangeable back-ends exposing the
//! same capability set — connect, disconnect, non-blocking send, a state
//! snapshot, and upward delivery of exactly one logical message per event.
//!
//! Rather than a trait object per connection, each back-end is a free
//! function (`ws::connect`, `tcp::connect`) that spawns the I/O task and
//! hands back a [`TransportHandle`] (outbound submission + state) and an
//! event receiver (inbound messages, state changes, errors). The supervisor
//! picks which one to call based on [`crate::config::TransportKind`] — the
//! "tagged variant" shape the design notes call for instead of a deep
//! trait hierarchy.

pub mod tcp;
pub mod ws;

use im_protocol::WsMessage;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

/// Credentials passed to `auth_req` once the socket is up.
#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    StateChanged(TransportState),
    Message(WsMessage),
    /// I/O error; the transport has already transitioned to `Disconnected`.
    Error(String),
    /// TCP-only gap-detection signal from the Packet Codec (§4.1).
    PacketLoss(im_protocol::PacketLoss),
}

pub(crate) enum TransportCommand {
    Send(WsMessage),
    Disconnect,
}

/// A live (or dying) transport connection. Sends are non-blocking
/// submissions to an internal outbound queue; the returned `Err` only
/// indicates the I/O task has already exited.
pub struct TransportHandle {
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
    state: Arc<Mutex<TransportState>>,
}

impl TransportHandle {
    pub(crate) fn new(cmd_tx: mpsc::UnboundedSender<TransportCommand>, state: Arc<Mutex<TransportState>>) -> Self {
        TransportHandle { cmd_tx, state }
    }

    pub fn send(&self, msg: WsMessage) -> Result<(), crate::error::SdkError> {
        self.cmd_tx
            .send(TransportCommand::Send(msg))
            .map_err(|_| crate::error::SdkError::NetworkError("transport task has exited".to_owned()))
    }

    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(TransportCommand::Disconnect);
    }

    pub async fn state(&self) -> TransportState {
        *self.state.lock().await
    }
}
