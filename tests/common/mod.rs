//! Shared helpers for the `tests/integration/*.rs` scenarios. Not a test
//! binary itself (no `[[test]]` entry points here) — just `mod common;`.

use im_sdk::config::SdkConfig;
use std::time::Duration;

/// A config pointed at a local mock server, with short timeouts so the
/// scenarios below don't spend real wall-clock time waiting on production
/// defaults (30s heartbeat, 5 reconnect attempts at up to 32s backoff).
pub fn test_config(ws_url: String) -> SdkConfig {
    let mut config = SdkConfig::default();
    config.database.file_name = ":memory:".to_owned();
    config.transport.url = ws_url;
    config.transport.heartbeat_interval = Duration::from_secs(60);
    config.transport.heartbeat_timeout = Duration::from_secs(30);
    config.transport.auto_reconnect = true;
    config.transport.max_reconnect_attempts = 3;
    config.transport.reconnect_interval = Duration::from_millis(50);
    config
}

pub async fn wait_for_state(client: &im_sdk::Client, state: im_sdk::supervisor::ConnectionState, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if client.connection_state().await == state {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_until_async<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
