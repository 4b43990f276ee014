//! WebSocket transport, grounded on the teacher's `UplinkSession`
//! (`uplink.rs`): a Bearer-authenticated `connect_async`, a `send`/`recv`
//! pair that auto-replies to pings, and a read loop shaped like
//! `session.rs::run_session_loop`'s `tokio::select! { biased; ... }`.

use super::{Credential, TransportCommand, TransportEvent, TransportHandle, TransportState};
use crate::error::SdkError;
use futures_util::{SinkExt, StreamExt};
use im_protocol::WsMessage;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::warn;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub async fn connect(
    url: &str,
    credential: &Credential,
    extra_headers: &[(String, String)],
) -> Result<(TransportHandle, mpsc::UnboundedReceiver<TransportEvent>), SdkError> {
    let request = build_ws_request(url, &credential.token, extra_headers)?;
    let (ws, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| SdkError::NetworkError(e.to_string()))?;

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(TransportState::Connecting));

    let state_task = state.clone();
    tokio::spawn(async move {
        run_io_loop(ws, cmd_rx, event_tx, state_task).await;
    });

    Ok((TransportHandle::new(cmd_tx, state), event_rx))
}

async fn run_io_loop(
    mut ws: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<Mutex<TransportState>>,
) {
    *state.lock().await = TransportState::Connected;
    let _ = event_tx.send(TransportEvent::StateChanged(TransportState::Connected));

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Send(msg)) => {
                        let json = match serde_json::to_string(&msg) {
                            Ok(j) => j,
                            Err(e) => {
                                let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                                continue;
                            }
                        };
                        if let Err(e) = ws.send(Message::Text(json.into())).await {
                            disconnect_with_error(&event_tx, &state, e.to_string()).await;
                            return;
                        }
                    }
                    Some(TransportCommand::Disconnect) | None => {
                        let _ = ws.send(Message::Close(None)).await;
                        disconnect_cleanly(&event_tx, &state).await;
                        return;
                    }
                }
            }

            msg = ws.next() => {
                match msg {
                    None => {
                        disconnect_cleanly(&event_tx, &state).await;
                        return;
                    }
                    Some(Err(e)) => {
                        disconnect_with_error(&event_tx, &state, e.to_string()).await;
                        return;
                    }
                    Some(Ok(Message::Text(t))) => {
                        match serde_json::from_str::<WsMessage>(&t) {
                            Ok(ws_msg) => { let _ = event_tx.send(TransportEvent::Message(ws_msg)); }
                            Err(e) => warn!(error = %e, "dropping undecodable ws frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        disconnect_cleanly(&event_tx, &state).await;
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(_)) => {}
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

fn build_ws_request(
    url: &str,
    token: &str,
    extra_headers: &[(String, String)],
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, SdkError> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .map_err(|e| SdkError::NetworkError(format!("invalid URL '{url}': {e}")))?;

    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {token}")
            .parse()
            .map_err(|e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue| {
                SdkError::NetworkError(format!("invalid auth header: {e}"))
            })?,
    );
    for (name, value) in extra_headers {
        let header_name: tokio_tungstenite::tungstenite::http::HeaderName = name
            .parse()
            .map_err(|_| SdkError::InvalidParameter(format!("invalid header name '{name}'")))?;
        let header_value = value
            .parse()
            .map_err(|_| SdkError::InvalidParameter(format!("invalid header value for '{name}'")))?;
        request.headers_mut().insert(header_name, header_value);
    }

    Ok(request)
}
