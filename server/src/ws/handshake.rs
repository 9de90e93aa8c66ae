//! In-band authentication: upgrades an anonymous connection to a bound identity.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::timeout;

use crate::error::RelayError;
use crate::state::AppState;
use crate::ws::{presence, Connection};

/// Verify `token`, bind the resulting identity to `conn`, register it and
/// push a fresh roster to every authenticated connection.
///
/// A failed attempt leaves the connection open and anonymous. A missing,
/// empty or non-string token fails like any other bad token.
pub async fn authenticate(
    conn: &Arc<Connection>,
    token: Option<&Value>,
    state: &AppState,
) -> Result<(), RelayError> {
    if conn.identity().is_some() {
        return Err(RelayError::AlreadyAuthenticated);
    }

    let result = match token.and_then(Value::as_str).filter(|t| !t.is_empty()) {
        Some(token) => match timeout(state.collaborator_timeout, state.verifier.verify(token)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    conn_id = %conn.id(),
                    timeout = ?state.collaborator_timeout,
                    "Token verification timed out"
                );
                Err(RelayError::AuthInvalid)
            }
        },
        None => Err(RelayError::AuthInvalid),
    };

    let verified = match result {
        Ok(verified) => verified,
        Err(err) => {
            let failures = conn.record_auth_failure();
            tracing::warn!(
                conn_id = %conn.id(),
                failures = failures,
                "WebSocket auth failed"
            );
            return Err(err);
        }
    };

    let identity = conn.bind(verified.into_identity())?;
    state.connections.register(conn);

    tracing::info!(
        conn_id = %conn.id(),
        user_id = %identity.id,
        "WebSocket connection authenticated"
    );

    presence::broadcast_roster(state).await;
    Ok(())
}
