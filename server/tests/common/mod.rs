//! Shared helpers for the relay integration tests.
#![allow(dead_code)]

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use relay_server::auth::jwt::issue_token;
use relay_server::auth::VerifiedUser;
use relay_server::db::users::{upsert_user, UserRecord};
use relay_server::db::DbPool;
use relay_server::state::AppState;

pub const U1: &str = "64b7f0c2a1d3e4f5a6b7c8d1";
pub const U2: &str = "64b7f0c2a1d3e4f5a6b7c8d2";
pub const U3: &str = "64b7f0c2a1d3e4f5a6b7c8d3";

const JWT_SECRET: &[u8] = b"integration-test-secret-32-bytes";
const READ_TIMEOUT: Duration = Duration::from_secs(3);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub db: DbPool,
    pub state: AppState,
    _tmp_dir: tempfile::TempDir,
}

/// Start the relay on a random port with default settings.
pub async fn start_test_server() -> TestServer {
    start_test_server_with(|_| {}).await
}

/// Start the relay on a random port after letting the caller adjust its state.
pub async fn start_test_server_with(configure: impl FnOnce(&mut AppState)) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = relay_server::db::init_db(&data_dir).expect("Failed to init DB");
    let mut state = AppState::with_sqlite(db.clone(), JWT_SECRET.to_vec());
    configure(&mut state);

    let app = relay_server::routes::build_router(state.clone(), &[]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        db,
        state,
        _tmp_dir: tmp_dir,
    }
}

impl TestServer {
    /// Token as the account service would issue it at login.
    pub fn token(&self, id: &str, first_name: &str, last_name: &str) -> String {
        let user = VerifiedUser {
            id: id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        issue_token(JWT_SECRET, &user, Some(3600)).expect("Failed to issue token")
    }

    pub fn seed_user(&self, id: &str, first_name: &str, last_name: &str, avatar_link: Option<&str>) {
        upsert_user(
            &self.db,
            &UserRecord {
                id: id.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                avatar_link: avatar_link.map(str::to_string),
            },
        )
        .expect("Failed to seed user");
    }

    pub fn message_count(&self) -> i64 {
        let conn = self.db.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap()
    }

    pub async fn connect(&self) -> TestClient {
        let url = format!("ws://{}/", self.addr);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("Failed to connect to WebSocket");
        let (write, read) = ws_stream.split();
        TestClient { write, read }
    }

    /// Connect and authenticate, returning the client and the first roster it saw.
    pub async fn connect_as(&self, id: &str, first_name: &str, last_name: &str) -> (TestClient, Value) {
        let mut client = self.connect().await;
        let token = self.token(id, first_name, last_name);
        let roster = client.authenticate(&token, id).await;
        (client, roster)
    }

    pub async fn health(&self) -> Value {
        reqwest::get(format!("http://{}/health", self.addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub async fn online_count(&self) -> u64 {
        self.health().await["online"].as_u64().unwrap()
    }
}

pub struct TestClient {
    pub write: SplitSink<WsStream, Message>,
    pub read: SplitStream<WsStream>,
}

impl TestClient {
    pub async fn send_json(&mut self, value: Value) {
        self.write
            .send(Message::text(value.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Next JSON frame within `timeout`, skipping control frames.
    pub async fn try_next_json(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.read.next()).await.ok()?;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str(text.as_str()).expect("Server sent invalid JSON"));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                _ => return None,
            }
        }
    }

    pub async fn next_json(&mut self) -> Value {
        self.try_next_json(READ_TIMEOUT)
            .await
            .expect("Expected a JSON frame within timeout")
    }

    /// Read frames until one satisfies `pred`.
    pub async fn wait_for(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let frame = self
                .try_next_json(remaining)
                .await
                .expect("Expected matching frame within timeout");
            if pred(&frame) {
                return frame;
            }
        }
    }

    /// Next frame that is not a presence roster.
    pub async fn next_non_roster(&mut self) -> Value {
        self.wait_for(|frame| frame.get("online").is_none()).await
    }

    /// Wait for a roster whose user ids are exactly `expected` (any order).
    pub async fn wait_for_roster(&mut self, expected: &[&str]) -> Value {
        let mut expected: Vec<String> = expected.iter().map(|id| id.to_string()).collect();
        expected.sort();
        self.wait_for(move |frame| roster_ids(frame).as_ref() == Some(&expected))
            .await
    }

    /// Send an auth frame and wait for the first roster listing `user_id`.
    pub async fn authenticate(&mut self, token: &str, user_id: &str) -> Value {
        self.send_json(serde_json::json!({"type": "auth", "token": token}))
            .await;
        self.wait_for(|frame| {
            roster_ids(frame).is_some_and(|ids| ids.iter().any(|id| id == user_id))
        })
        .await
    }

    pub async fn close(mut self) {
        let _ = self.write.send(Message::Close(None)).await;
    }
}

/// Sorted user ids of a roster frame, or `None` for other frames.
pub fn roster_ids(frame: &Value) -> Option<Vec<String>> {
    let online = frame.get("online")?.as_array()?;
    let mut ids: Vec<String> = online
        .iter()
        .filter_map(|entry| entry["userId"].as_str().map(str::to_string))
        .collect();
    ids.sort();
    Some(ids)
}
