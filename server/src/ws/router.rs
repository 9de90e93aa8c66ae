//! Validates chat frames, persists them, then fans them out to the recipient.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::timeout;

use crate::db::is_object_id;
use crate::error::{RelayError, StoreError, ValidationError};
use crate::state::AppState;
use crate::ws::protocol::{ChatFrame, ServerFrame};
use crate::ws::Connection;

/// Null and empty strings count as absent.
fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null() && v.as_str() != Some(""))
}

impl ChatFrame {
    /// Returns `(recipient, text)` when the payload may be persisted.
    ///
    /// A recipient that is not a string fails the id check. Text must be a string.
    pub fn validate(self) -> Result<(String, String), ValidationError> {
        let (Some(recipient), Some(text)) = (present(self.recipient), present(self.text)) else {
            return Err(ValidationError::MissingFields);
        };
        let recipient = match recipient {
            Value::String(id) if is_object_id(&id) => id,
            _ => return Err(ValidationError::InvalidRecipient),
        };
        let Value::String(text) = text else {
            return Err(ValidationError::MissingFields);
        };
        Ok((recipient, text))
    }
}

/// Relay a chat frame from an authenticated connection.
///
/// The message is durable before any recipient sees it. Delivery to the
/// recipient's connections is best-effort.
pub async fn route_message(
    conn: &Arc<Connection>,
    frame: ChatFrame,
    state: &AppState,
) -> Result<(), RelayError> {
    let sender = conn.identity().ok_or(RelayError::NotAuthenticated)?;
    let (recipient, text) = frame.validate()?;

    let stored = match timeout(
        state.collaborator_timeout,
        state.messages.append(&sender.id, &recipient, &text),
    )
    .await
    {
        Ok(Ok(stored)) => stored,
        Ok(Err(err)) => {
            tracing::warn!(
                conn_id = %conn.id(),
                user_id = %sender.id,
                error = %err,
                "Failed to persist message"
            );
            return Err(err.into());
        }
        Err(_) => {
            tracing::warn!(
                conn_id = %conn.id(),
                user_id = %sender.id,
                "Message store timed out"
            );
            return Err(StoreError::Timeout(state.collaborator_timeout).into());
        }
    };

    let frame = ServerFrame::Delivery {
        sender: sender.display_name.clone(),
        text,
        id: stored.id.clone(),
    };
    let delivered = match frame.to_message() {
        Some(msg) => state.connections.send_to_identity(&recipient, &msg),
        None => 0,
    };

    tracing::debug!(
        user_id = %sender.id,
        recipient = %recipient,
        message_id = %stored.id,
        delivered = delivered,
        "Message relayed"
    );
    Ok(())
}
