//! JSON wire protocol and per-frame dispatch.

use std::sync::Arc;

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;
use crate::state::AppState;
use crate::ws::{handshake, router, Connection};

/// Frame kinds a client may send.
///
/// Field values are kept as raw JSON so that a wrongly typed field is
/// reported by the handshake or router, not as a malformed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// `{"type":"auth","token":...}`
    Auth { token: Option<Value> },
    /// `{"recipient":...,"text":...}`
    Chat(ChatFrame),
}

/// Unvalidated chat payload; the router decides whether it is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatFrame {
    pub recipient: Option<Value>,
    pub text: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    token: Option<Value>,
    #[serde(default)]
    recipient: Option<Value>,
    #[serde(default)]
    text: Option<Value>,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| RelayError::Malformed(e.to_string()))?;

        if raw.kind.as_ref().and_then(Value::as_str) == Some("auth") {
            return Ok(Self::Auth { token: raw.token });
        }

        Ok(Self::Chat(ChatFrame {
            recipient: raw.recipient,
            text: raw.text,
        }))
    }
}

/// One entry of the online roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: String,
    pub username: String,
    pub avatar_link: Option<String>,
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Online { online: Vec<PresenceEntry> },
    Delivery { sender: String, text: String, id: String },
    Error { error: String },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Encode as a WebSocket text message.
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server frame");
                None
            }
        }
    }
}

/// Handle an incoming text frame. Every failure is reported back to the
/// sender as an error frame; none of them closes the connection.
pub async fn handle_text_message(text: &str, conn: &Arc<Connection>, state: &AppState) {
    let result = match ClientFrame::parse(text) {
        Ok(ClientFrame::Auth { token }) => {
            handshake::authenticate(conn, token.as_ref(), state).await
        }
        Ok(ClientFrame::Chat(chat)) => router::route_message(conn, chat, state).await,
        Err(e) => Err(e),
    };

    if let Err(err) = result {
        tracing::debug!(
            conn_id = %conn.id(),
            error = %err,
            "Frame rejected"
        );
        send_error(conn, &err);
    }
}

/// Send an error frame. Dead transports get nothing; the actor tears them down.
pub fn send_error(conn: &Connection, err: &RelayError) {
    if matches!(err, RelayError::TransportDead) {
        return;
    }
    let _ = conn.send_frame(&ServerFrame::error(err.to_string()));
}
