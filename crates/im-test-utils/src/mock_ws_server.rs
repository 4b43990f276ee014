//! A mock WebSocket server for testing `im-sdk` transports end-to-end.
//!
//! Binds to port 0 (random) and exposes the actual bound port; each test
//! gets its own isolated server instance. The server accepts exactly one
//! connection (the scripted scenarios in this crate only ever drive one
//! client) and drives it from a scriptable command channel so a test can
//! shape auth results, ack timing, pushes, and kick-outs without needing a
//! real backend.

use futures_util::{SinkExt, StreamExt};
use im_protocol::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Scripted behavior a test can push onto a running `MockWsServer`.
pub enum ServerCommand {
    /// Controls the next `auth_rsp`. Applies once, then reverts to the
    /// default (`ok=true, server_max_seq=0`).
    SetAuthResult { ok: bool, server_max_seq: u64 },
    /// Swallow the next `n` `send_msg_req` frames instead of acking them,
    /// simulating a dropped submission / timeout.
    DropNextSendMsg(usize),
    /// Push a message to the client as a `push_msg`.
    Push(WireMessage),
    /// Force a `kick_out` to the client.
    KickOut(KickOutReason, String),
    /// Script the next `sync_rsp` the server sends in reply to a `sync_req`.
    /// Multiple calls queue up FIFO, one consumed per `sync_req` received;
    /// once exhausted the server falls back to its empty default.
    QueueSyncResponse(SyncRsp),
}

/// A mock WebSocket server for integration testing.
pub struct MockWsServer {
    addr: std::net::SocketAddr,
    cmd_tx: mpsc::UnboundedSender<ServerCommand>,
    send_msg_req_count: Arc<AtomicUsize>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockWsServer {
    /// Start the mock server, binding to a random available port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let send_msg_req_count = Arc::new(AtomicUsize::new(0));

        let task_count = send_msg_req_count.clone();
        let task = tokio::spawn(async move {
            if let Ok((stream, _peer)) = listener.accept().await {
                let _ = Self::handle_connection(stream, cmd_rx, task_count).await;
            }
        });

        Ok(Self { addr, cmd_tx, send_msg_req_count, _task: task })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.addr
    }

    pub fn send_command(&self, cmd: ServerCommand) {
        let _ = self.cmd_tx.send(cmd);
    }

    /// Total `send_msg_req` frames observed so far, counted whether or not
    /// `DropNextSendMsg` swallowed the reply — lets a test assert exactly
    /// how many dispatch attempts a retry loop made.
    pub fn send_msg_req_count(&self) -> usize {
        self.send_msg_req_count.load(Ordering::SeqCst)
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mut cmd_rx: mpsc::UnboundedReceiver<ServerCommand>,
        send_msg_req_count: Arc<AtomicUsize>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws_stream.split();

        let mut next_auth: Option<(bool, u64)> = None;
        let mut drop_next_send_msg: usize = 0;
        let mut queued_sync_rsp: std::collections::VecDeque<SyncRsp> = std::collections::VecDeque::new();
        let mut next_seq: u64 = 1;

        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ServerCommand::SetAuthResult { ok, server_max_seq }) => {
                            next_auth = Some((ok, server_max_seq));
                        }
                        Some(ServerCommand::DropNextSendMsg(n)) => {
                            drop_next_send_msg = n;
                        }
                        Some(ServerCommand::Push(message)) => {
                            let push = WsMessage::PushMsg(PushMsg { message });
                            write.send(Message::Text(serde_json::to_string(&push)?.into())).await?;
                        }
                        Some(ServerCommand::KickOut(reason, message)) => {
                            let kick = WsMessage::KickOut(KickOut { reason_code: reason as u8, message });
                            write.send(Message::Text(serde_json::to_string(&kick)?.into())).await?;
                        }
                        Some(ServerCommand::QueueSyncResponse(rsp)) => {
                            queued_sync_rsp.push_back(rsp);
                        }
                        None => break,
                    }
                }

                msg = read.next() => {
                    let Some(msg_result) = msg else { break };
                    let msg = msg_result?;
                    let text = match msg {
                        Message::Text(t) => t,
                        Message::Close(_) => break,
                        Message::Ping(data) => {
                            write.send(Message::Pong(data)).await?;
                            continue;
                        }
                        _ => continue,
                    };

                    let ws_msg: WsMessage = serde_json::from_str(&text)?;
                    match ws_msg {
                        WsMessage::AuthReq(_req) => {
                            let (ok, server_max_seq) = next_auth.take().unwrap_or((true, 0));
                            let rsp = WsMessage::AuthRsp(AuthRsp {
                                ok,
                                error_code: if ok { None } else { Some("INVALID_TOKEN".to_owned()) },
                                error_msg: if ok { None } else { Some("invalid token".to_owned()) },
                                server_max_seq,
                            });
                            write.send(Message::Text(serde_json::to_string(&rsp)?.into())).await?;
                        }
                        WsMessage::HeartbeatReq(req) => {
                            let rsp = WsMessage::HeartbeatRsp(HeartbeatRsp { server_time: req.timestamp });
                            write.send(Message::Text(serde_json::to_string(&rsp)?.into())).await?;
                        }
                        WsMessage::SendMsgReq(req) => {
                            send_msg_req_count.fetch_add(1, Ordering::SeqCst);
                            if drop_next_send_msg > 0 {
                                drop_next_send_msg -= 1;
                                continue;
                            }
                            let seq = next_seq;
                            next_seq += 1;
                            let rsp = WsMessage::SendMsgRsp(SendMsgRsp {
                                ok: true,
                                error_code: None,
                                message_id: req.message.message_id.clone(),
                                server_msg_id: Some(format!("srv-{seq}")),
                                seq,
                                server_time: seq as i64 * 1000,
                            });
                            write.send(Message::Text(serde_json::to_string(&rsp)?.into())).await?;
                        }
                        WsMessage::SyncReq(_req) => {
                            let rsp = queued_sync_rsp.pop_front().unwrap_or(SyncRsp {
                                messages: Vec::new(),
                                server_max_seq: next_seq.saturating_sub(1),
                                has_more: false,
                                total_count: 0,
                            });
                            write
                                .send(Message::Text(serde_json::to_string(&WsMessage::SyncRsp(rsp))?.into()))
                                .await?;
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(())
    }
}
