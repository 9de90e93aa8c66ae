//! Integration tests for WebSocket connection lifecycle, in-band auth, and heartbeat.

mod common;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

use common::{start_test_server, start_test_server_with, U1, U2};
use relay_server::auth::{TokenVerifier, VerifiedUser};
use relay_server::error::RelayError;
use relay_server::ws::heartbeat::HeartbeatConfig;

#[tokio::test]
async fn test_auth_sends_roster_with_own_identity() {
    let server = start_test_server().await;
    server.seed_user(U1, "A", "One", Some("https://avatars.example/a.png"));

    let (_a, roster) = server.connect_as(U1, "A", "One").await;

    assert_eq!(
        roster,
        json!({
            "online": [{
                "userId": U1,
                "username": "A One",
                "avatarLink": "https://avatars.example/a.png",
            }]
        })
    );
    assert_eq!(server.state.connections.connections_of(U1).len(), 1);
}

#[tokio::test]
async fn test_anonymous_connection_receives_nothing() {
    let server = start_test_server().await;
    let mut anon = server.connect().await;
    let (_a, _) = server.connect_as(U1, "A", "One").await;

    // Rosters only go to authenticated connections
    assert!(anon.try_next_json(Duration::from_millis(300)).await.is_none());
    assert_eq!(server.online_count().await, 1);
}

#[tokio::test]
async fn test_invalid_token_keeps_connection_open_and_anonymous() {
    let server = start_test_server().await;
    let mut client = server.connect().await;

    client
        .send_json(json!({"type": "auth", "token": "invalid_jwt_token"}))
        .await;
    assert_eq!(
        client.next_json().await,
        json!({"error": "Invalid authentication token"})
    );

    client.send_json(json!({"type": "auth", "token": 123})).await;
    assert_eq!(
        client.next_json().await,
        json!({"error": "Invalid authentication token"})
    );

    client.send_json(json!({"type": "auth"})).await;
    assert_eq!(
        client.next_json().await,
        json!({"error": "Invalid authentication token"})
    );
    assert_eq!(server.online_count().await, 0);

    // Same connection can still authenticate afterwards
    let token = server.token(U1, "A", "One");
    client.authenticate(&token, U1).await;
    assert_eq!(server.online_count().await, 1);
}

#[tokio::test]
async fn test_second_auth_is_rejected_and_identity_kept() {
    let server = start_test_server().await;
    let (mut a, _) = server.connect_as(U1, "A", "One").await;

    let other = server.token(U2, "B", "Two");
    a.send_json(json!({"type": "auth", "token": other})).await;

    assert_eq!(a.next_non_roster().await, json!({"error": "Already authenticated"}));
    assert_eq!(server.state.connections.connections_of(U1).len(), 1);
    assert!(server.state.connections.connections_of(U2).is_empty());
}

#[tokio::test]
async fn test_malformed_and_binary_frames_do_not_close_connection() {
    let server = start_test_server().await;
    let (mut a, _) = server.connect_as(U1, "A", "One").await;

    a.write.send(Message::text("not json")).await.unwrap();
    let frame = a.next_non_roster().await;
    assert!(frame["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid message format"));

    a.write
        .send(Message::Binary(vec![1, 2, 3].into()))
        .await
        .unwrap();
    assert_eq!(
        a.next_non_roster().await,
        json!({"error": "Binary frames are not supported"})
    );

    assert_eq!(server.online_count().await, 1);
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let server = start_test_server().await;
    let mut client = server.connect().await;

    client
        .write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), client.read.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_responsive_connection_survives_heartbeats() {
    let server = start_test_server_with(|state| {
        state.heartbeat = HeartbeatConfig {
            ping_interval: Duration::from_millis(100),
            pong_timeout: Duration::from_millis(200),
        };
    })
    .await;
    let (mut a, _) = server.connect_as(U1, "A", "One").await;

    // Keep reading so the client answers every ping
    assert!(a.try_next_json(Duration::from_millis(800)).await.is_none());
    assert_eq!(server.online_count().await, 1);
}

#[tokio::test]
async fn test_unresponsive_connection_is_evicted() {
    let server = start_test_server_with(|state| {
        state.heartbeat = HeartbeatConfig {
            ping_interval: Duration::from_millis(200),
            pong_timeout: Duration::from_millis(100),
        };
    })
    .await;

    // A authenticates, then never reads again, so it never answers a ping
    let (_a, _) = server.connect_as(U1, "A", "One").await;
    let mut b = server.connect().await;
    let token = server.token(U2, "B", "Two");
    b.send_json(json!({"type": "auth", "token": token})).await;

    let roster = b.wait_for_roster(&[U2]).await;
    assert_eq!(roster["online"][0]["username"], "B Two");
    assert!(server.state.connections.connections_of(U1).is_empty());
    assert_eq!(server.online_count().await, 1);
}

#[tokio::test]
async fn test_disconnect_removes_identity_from_roster() {
    let server = start_test_server().await;
    let (a, _) = server.connect_as(U1, "A", "One").await;
    let (mut b, roster) = server.connect_as(U2, "B", "Two").await;
    assert_eq!(common::roster_ids(&roster).unwrap(), vec![U1, U2]);

    a.close().await;

    b.wait_for_roster(&[U2]).await;
    assert_eq!(server.online_count().await, 1);
}

#[tokio::test]
async fn test_identity_stays_online_while_one_tab_remains() {
    let server = start_test_server().await;
    let (tab1, _) = server.connect_as(U1, "A", "One").await;
    let (mut tab2, _) = server.connect_as(U1, "A", "One").await;
    assert_eq!(server.state.connections.connections_of(U1).len(), 2);
    let health = server.health().await;
    assert_eq!(health["online"], 1);
    assert_eq!(health["connections"], 2);

    tab1.close().await;
    let roster = tab2.wait_for_roster(&[U1]).await;
    assert_eq!(roster["online"].as_array().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state.connections.connections_of(U1).len(), 1);
    assert_eq!(server.health().await["connections"], 1);
}

struct SlowVerifier;

#[async_trait]
impl TokenVerifier for SlowVerifier {
    async fn verify(&self, _token: &str) -> Result<VerifiedUser, RelayError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(RelayError::AuthInvalid)
    }
}

#[tokio::test]
async fn test_stalled_verifier_times_out_as_auth_failure() {
    let server = start_test_server_with(|state| {
        state.verifier = Arc::new(SlowVerifier);
        state.collaborator_timeout = Duration::from_millis(100);
    })
    .await;
    let mut client = server.connect().await;

    client
        .send_json(json!({"type": "auth", "token": "anything"}))
        .await;
    assert_eq!(
        client.next_json().await,
        json!({"error": "Invalid authentication token"})
    );
}
