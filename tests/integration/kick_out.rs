//! Scenario 4 (spec §8): a `kick_out` while `Connected` transitions the
//! supervisor straight to `Disconnected(KickedOut)` with no reconnect
//! attempt, and emits a disconnect notification carrying the reason.

mod common;

use im_protocol::KickOutReason;
use im_sdk::supervisor::{ConnectionState, DisconnectReason};
use im_sdk::{Client, SdkEvent};
use im_test_utils::{MockWsServer, ServerCommand};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn kick_out_disconnects_without_reconnecting() {
    let server = MockWsServer::start().await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    let client = Client::new(common::test_config(url), "u1".to_owned()).await.unwrap();

    let disconnect_reason: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let disconnect_reason_clone = disconnect_reason.clone();
    client
        .subscribe(Arc::new(move |event: &SdkEvent| {
            if let SdkEvent::Disconnected { reason: Some(DisconnectReason::KickedOut(msg)) } = event {
                *disconnect_reason_clone.lock().unwrap() = Some(msg.clone());
            }
        }))
        .await;

    client.login("u1".to_owned(), "tok".to_owned()).await;
    assert!(common::wait_for_state(&client, ConnectionState::Connected, Duration::from_secs(5)).await);

    server.send_command(ServerCommand::KickOut(KickOutReason::OtherDeviceLogin, "Logged in elsewhere".to_owned()));

    assert!(common::wait_for_state(&client, ConnectionState::Disconnected, Duration::from_secs(5)).await);

    assert_eq!(disconnect_reason.lock().unwrap().as_deref(), Some("Logged in elsewhere"));

    // No reconnect attempt should follow: state should remain Disconnected,
    // not cycle through Connecting/Reconnecting.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
}
