//! Connection Supervisor (§4.4): owns transport lifecycle, the
//! auth handshake, heartbeat, and exponential-backoff reconnect. Grounded on
//! `control_api.rs::AppState`'s shared-handles-plus-atomics shape and
//! `session.rs::run_session_loop`'s `tokio::select! { biased; ... }` read
//! loop; the backoff delay itself has no direct teacher analogue (the
//! closest, `connect_attempt`/`retry_streak`, only counts attempts) and is
//! new code in the same idiom.

use crate::error::SdkError;
use crate::notify::{Notifier, SdkEvent};
use crate::transport::{self, Credential, TransportEvent, TransportHandle, TransportState};
use crate::config::{TransportConfig, TransportKind};
use crate::router::Router;
use im_protocol::{AuthReq, HeartbeatReq, WsMessage};
use rand::Rng;
use std::sync::atomic::{AtomicU32, AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Wifi,
    Cellular,
    Unknown,
}

fn heartbeat_interval_for(net_type: NetworkType, configured_default: Duration) -> Duration {
    match net_type {
        NetworkType::Wifi => Duration::from_secs(30),
        NetworkType::Cellular => Duration::from_secs(45),
        NetworkType::Unknown => configured_default,
    }
}

/// Pure backoff computation, injectable rng so tests can bound the jitter.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration, rng: &mut impl Rng) -> Duration {
    let exp = base.mul_f64(2f64.powi(attempt as i32));
    let capped = if exp > cap { cap } else { exp };
    let jitter_frac: f64 = rng.gen_range(0.0..=0.3);
    capped + capped.mul_f64(jitter_frac)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub enum DisconnectReason {
    AuthError(String),
    KickedOut(String),
    MaxReconnectReached,
    IoError(String),
}

struct NetworkStatus {
    available: bool,
    net_type: NetworkType,
}

pub struct ConnectionSupervisor {
    config: TransportConfig,
    credential: Mutex<Option<Credential>>,
    state: Mutex<(ConnectionState, Option<DisconnectReason>)>,
    transport: Mutex<Option<TransportHandle>>,
    router: Arc<Router>,
    notifier: Notifier,
    attempt: AtomicU32,
    missed_heartbeats: Arc<AtomicU32>,
    network: Mutex<NetworkStatus>,
    is_logged_in: AtomicBool,
    session_shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl ConnectionSupervisor {
    pub fn new(config: TransportConfig, router: Arc<Router>, notifier: Notifier) -> Arc<Self> {
        Arc::new(ConnectionSupervisor {
            config,
            credential: Mutex::new(None),
            state: Mutex::new((ConnectionState::Disconnected, None)),
            transport: Mutex::new(None),
            router,
            notifier,
            attempt: AtomicU32::new(0),
            missed_heartbeats: Arc::new(AtomicU32::new(0)),
            network: Mutex::new(NetworkStatus { available: true, net_type: NetworkType::Unknown }),
            is_logged_in: AtomicBool::new(false),
            session_shutdown: Mutex::new(None),
        })
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.0
    }

    pub async fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.state.lock().await.1.clone()
    }

    pub async fn send(&self, msg: WsMessage) -> Result<(), SdkError> {
        let guard = self.transport.lock().await;
        match guard.as_ref() {
            Some(handle) => handle.send(msg),
            None => Err(SdkError::NetworkError("not connected".to_owned())),
        }
    }

    pub async fn login(self: &Arc<Self>, credential: Credential) {
        *self.credential.lock().await = Some(credential);
        self.is_logged_in.store(true, Ordering::SeqCst);
        self.attempt.store(0, Ordering::SeqCst);
        self.connect_internal().await;
    }

    pub async fn connect(self: &Arc<Self>) {
        self.connect_internal().await;
    }

    /// Idempotent: cancels the I/O task and heartbeat timer. Does not clear
    /// `is_logged_in`, so a later `set_network_available(true)` can still
    /// trigger reconnection.
    pub async fn disconnect(&self) {
        if let Some(tx) = self.session_shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.transport.lock().await.take() {
            handle.disconnect();
        }
        self.set_state(ConnectionState::Disconnected, None).await;
    }

    pub async fn logout(&self) {
        self.is_logged_in.store(false, Ordering::SeqCst);
        *self.credential.lock().await = None;
        self.disconnect().await;
    }

    pub async fn set_network_available(self: &Arc<Self>, available: bool) {
        {
            let mut net = self.network.lock().await;
            net.available = available;
        }
        if available {
            let disconnected = matches!(self.state().await, ConnectionState::Disconnected);
            if disconnected && self.is_logged_in.load(Ordering::SeqCst) {
                self.connect_internal().await;
            }
        }
    }

    pub async fn set_network_type(&self, net_type: NetworkType) {
        self.network.lock().await.net_type = net_type;
    }

    async fn set_state(&self, state: ConnectionState, reason: Option<DisconnectReason>) {
        *self.state.lock().await = (state, reason);
        self.notifier.emit(SdkEvent::ConnectionStateChanged { state });
    }

    async fn connect_internal(self: &Arc<Self>) {
        self.set_state(ConnectionState::Connecting, None).await;

        let Some(credential) = self.credential.lock().await.clone() else {
            self.set_state(ConnectionState::Disconnected, None).await;
            return;
        };

        let connect_result = match self.config.kind {
            TransportKind::Ws => transport::ws::connect(&self.config.url, &credential, &self.config.ws.headers).await,
            TransportKind::Tcp => {
                transport::tcp::connect(&self.config.url, &credential, self.config.tcp.enable_nagle).await
            }
        };

        let (handle, events) = match connect_result {
            Ok(pair) => pair,
            Err(e) => {
                self.schedule_reconnect(DisconnectReason::IoError(e.to_string())).await;
                return;
            }
        };

        *self.transport.lock().await = Some(handle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.session_shutdown.lock().await = Some(shutdown_tx);
        self.missed_heartbeats.store(0, Ordering::SeqCst);

        let this = self.clone();
        tokio::spawn(async move {
            this.run_session(events, shutdown_rx, credential).await;
        });
    }

    async fn run_session(
        self: Arc<Self>,
        mut events: tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
        credential: Credential,
    ) {
        let net_type = self.network.lock().await.net_type;
        let interval_duration = heartbeat_interval_for(net_type, self.config.heartbeat_interval);
        let mut heartbeat = tokio::time::interval(interval_duration);
        heartbeat.tick().await; // first tick fires immediately; discard it

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }

                _ = heartbeat.tick() => {
                    if self.state().await != ConnectionState::Connected {
                        continue;
                    }
                    if self.missed_heartbeats.load(Ordering::SeqCst) >= 3 {
                        self.schedule_reconnect(DisconnectReason::IoError("heartbeat timeout".to_owned())).await;
                        return;
                    }
                    let _ = self.send(WsMessage::HeartbeatReq(HeartbeatReq { timestamp: crate::now_ms() })).await;
                    self.missed_heartbeats.fetch_add(1, Ordering::SeqCst);
                }

                event = events.recv() => {
                    match event {
                        None => {
                            self.schedule_reconnect(DisconnectReason::IoError("transport stream closed".to_owned())).await;
                            return;
                        }
                        Some(TransportEvent::StateChanged(TransportState::Connected)) => {
                            self.set_state(ConnectionState::Authenticating, None).await;
                            let _ = self.send(WsMessage::AuthReq(AuthReq {
                                user_id: credential.user_id.clone(),
                                token: credential.token.clone(),
                            })).await;
                        }
                        Some(TransportEvent::StateChanged(TransportState::Disconnected)) => {
                            self.schedule_reconnect(DisconnectReason::IoError("transport disconnected".to_owned())).await;
                            return;
                        }
                        Some(TransportEvent::StateChanged(TransportState::Connecting)) => {}
                        Some(TransportEvent::Error(e)) => {
                            tracing::warn!(error = %e, "transport error");
                        }
                        Some(TransportEvent::PacketLoss(loss)) => {
                            self.notifier.emit(SdkEvent::PacketLoss {
                                expected: loss.expected,
                                received: loss.received,
                                gap: loss.gap,
                            });
                        }
                        Some(TransportEvent::Message(WsMessage::AuthRsp(rsp))) => {
                            if rsp.ok {
                                self.attempt.store(0, Ordering::SeqCst);
                                self.missed_heartbeats.store(0, Ordering::SeqCst);
                                self.set_state(ConnectionState::Connected, None).await;
                                self.notifier.emit(SdkEvent::Authenticated { server_max_seq: rsp.server_max_seq });
                            } else {
                                let reason = DisconnectReason::AuthError(
                                    rsp.error_msg.unwrap_or_else(|| "authentication failed".to_owned()),
                                );
                                self.terminate_without_reconnect(reason).await;
                                return;
                            }
                        }
                        Some(TransportEvent::Message(WsMessage::KickOut(kick))) => {
                            let reason = DisconnectReason::KickedOut(kick.message.clone());
                            self.terminate_without_reconnect(reason).await;
                            return;
                        }
                        Some(TransportEvent::Message(WsMessage::HeartbeatRsp(_))) => {
                            self.missed_heartbeats.store(0, Ordering::SeqCst);
                        }
                        Some(TransportEvent::Message(other)) => {
                            self.router.dispatch(other).await;
                        }
                    }
                }
            }
        }
    }

    async fn terminate_without_reconnect(&self, reason: DisconnectReason) {
        self.set_state(ConnectionState::Disconnected, Some(reason.clone())).await;
        self.notifier.emit(SdkEvent::Disconnected { reason: Some(reason) });
        if let Some(handle) = self.transport.lock().await.take() {
            handle.disconnect();
        }
    }

    async fn schedule_reconnect(self: &Arc<Self>, reason: DisconnectReason) {
        if let Some(handle) = self.transport.lock().await.take() {
            handle.disconnect();
        }

        if !self.is_logged_in.load(Ordering::SeqCst) || !self.config.auto_reconnect {
            self.set_state(ConnectionState::Disconnected, Some(reason.clone())).await;
            self.notifier.emit(SdkEvent::Disconnected { reason: Some(reason) });
            return;
        }

        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.config.max_reconnect_attempts {
            let reason = DisconnectReason::MaxReconnectReached;
            self.set_state(ConnectionState::Disconnected, Some(reason.clone())).await;
            self.notifier.emit(SdkEvent::Disconnected { reason: Some(reason) });
            return;
        }

        self.set_state(ConnectionState::Reconnecting, Some(reason)).await;
        let delay = backoff_delay(attempt, BASE_BACKOFF, MAX_BACKOFF, &mut rand::thread_rng());
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if this.is_logged_in.load(Ordering::SeqCst) {
                this.connect_internal().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_matches_the_quantified_shape() {
        let mut rng = rand::thread_rng();
        for attempt in 0..8u32 {
            let delay = backoff_delay(attempt, Duration::from_secs(1), Duration::from_secs(32), &mut rng);
            let lower = Duration::from_secs(1).mul_f64(2f64.powi(attempt as i32)).min(Duration::from_secs(32));
            let upper = lower.mul_f64(1.3);
            assert!(delay >= lower, "attempt {attempt}: {delay:?} < {lower:?}");
            assert!(delay <= upper, "attempt {attempt}: {delay:?} > {upper:?}");
        }
    }

    #[test]
    fn backoff_delay_caps_at_32_seconds_base() {
        let mut rng = rand::thread_rng();
        let delay = backoff_delay(10, Duration::from_secs(1), Duration::from_secs(32), &mut rng);
        assert!(delay >= Duration::from_secs(32));
        assert!(delay <= Duration::from_secs(32).mul_f64(1.3));
    }

    #[test]
    fn heartbeat_interval_follows_network_type() {
        assert_eq!(heartbeat_interval_for(NetworkType::Wifi, Duration::from_secs(99)), Duration::from_secs(30));
        assert_eq!(heartbeat_interval_for(NetworkType::Cellular, Duration::from_secs(99)), Duration::from_secs(45));
        assert_eq!(heartbeat_interval_for(NetworkType::Unknown, Duration::from_secs(99)), Duration::from_secs(99));
    }
}
