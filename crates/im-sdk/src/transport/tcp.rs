//! TCP transport: the same read-loop shape as the WebSocket transport but
//! feeding raw bytes through `im_protocol::PacketCodec` instead of the
//! WebSocket frame boundary, following `session.rs::run_session_loop`'s
//! biased-select structure applied to a raw `tokio::net::TcpStream`.

use super::{Credential, TransportCommand, TransportEvent, TransportHandle, TransportState};
use crate::error::SdkError;
use im_protocol::{decode_binary, encode, encode_binary, Command, PacketCodec};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

pub async fn connect(
    addr: &str,
    _credential: &Credential,
    enable_nagle: bool,
) -> Result<(TransportHandle, mpsc::UnboundedReceiver<TransportEvent>), SdkError> {
    let stream = TcpStream::connect(addr).await?;
    if let Err(e) = stream.set_nodelay(!enable_nagle) {
        warn!(error = %e, "failed to configure TCP_NODELAY");
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(TransportState::Connecting));

    let state_task = state.clone();
    tokio::spawn(async move {
        run_io_loop(stream, cmd_rx, event_tx, state_task).await;
    });

    Ok((TransportHandle::new(cmd_tx, state), event_rx))
}

async fn run_io_loop(
    mut stream: TcpStream,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<Mutex<TransportState>>,
) {
    *state.lock().await = TransportState::Connected;
    let _ = event_tx.send(TransportEvent::StateChanged(TransportState::Connected));

    let mut codec = PacketCodec::new();
    let mut read_buf = [0u8; 16 * 1024];
    let sequence = AtomicU32::new(1);

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Send(msg)) => {
                        let seq = sequence.fetch_add(1, Ordering::SeqCst);
                        let body = match encode_binary(&msg) {
                            Ok(b) => b,
                            Err(e) => {
                                let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                                continue;
                            }
                        };
                        let frame = match encode(msg.command().as_u16(), seq, &body) {
                            Ok(f) => f,
                            Err(e) => {
                                let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                                continue;
                            }
                        };
                        if let Err(e) = stream.write_all(&frame).await {
                            disconnect_with_error(&event_tx, &state, e.to_string()).await;
                            return;
                        }
                    }
                    Some(TransportCommand::Disconnect) | None => {
                        let _ = stream.shutdown().await;
                        disconnect_cleanly(&event_tx, &state).await;
                        return;
                    }
                }
            }

            read_result = stream.read(&mut read_buf) => {
                match read_result {
                    Ok(0) => {
                        disconnect_cleanly(&event_tx, &state).await;
                        return;
                    }
                    Ok(n) => {
                        let frames = match codec.feed(&read_buf[..n]) {
                            Ok(f) => f,
                            Err(e) => {
                                let fatal = e.is_fatal_stream_error();
                                let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                                if fatal {
                                    disconnect_cleanly(&event_tx, &state).await;
                                    return;
                                }
                                continue;
                            }
                        };
                        for frame in frames {
                            let Some(command) = Command::from_u16(frame.command) else {
                                warn!(command = frame.command, "dropping frame with unknown command id");
                                continue;
                            };
                            if command.is_gap_tracked_push() {
                                if let Some(loss) = codec.observe_push_sequence(frame.sequence, std::time::Instant::now()) {
                                    let _ = event_tx.send(TransportEvent::PacketLoss(loss));
                                }
                            }
                            match decode_binary(command, &frame.body) {
                                Ok(ws_msg) => { let _ = event_tx.send(TransportEvent::Message(ws_msg)); }
                                Err(e) => warn!(error = %e, "dropping undecodable tcp frame"),
                            }
                        }
                    }
                    Err(e) => {
                        disconnect_with_error(&event_tx, &state, e.to_string()).await;
                        return;
                    }
                }
            }
        }
    }
}

async fn disconnect_cleanly(event_tx: &mpsc::UnboundedSender<TransportEvent>, state: &Arc<Mutex<TransportState>>) {
    *state.lock().await = TransportState::Disconnected;
    let _ = event_tx.send(TransportEvent::StateChanged(TransportState::Disconnected));
}

async fn disconnect_with_error(
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
    state: &Arc<Mutex<TransportState>>,
    message: String,
) {
    *state.lock().await = TransportState::Disconnected;
    let _ = event_tx.send(TransportEvent::Error(message));
    let _ = event_tx.send(TransportEvent::StateChanged(TransportState::Disconnected));
}
