//! Failure kinds raised while handling a single connection's frames.
//!
//! The `Display` text of each variant is exactly what the client sees in an
//! `{"error": ...}` frame, so wording changes here are protocol changes.

use std::time::Duration;

/// Per-frame failure. Always contained to the connection that caused it.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Bad, expired or malformed credential during the handshake.
    #[error("Invalid authentication token")]
    AuthInvalid,

    /// A second `auth` frame on a connection that already has an identity.
    #[error("Already authenticated")]
    AlreadyAuthenticated,

    /// Chat frame received before a successful handshake.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The peer can no longer be written to. Never reported back to it.
    #[error("Connection is no longer reachable")]
    TransportDead,

    #[error("Failed to store message")]
    Store(#[source] StoreError),

    /// Frame could not be decoded at all.
    #[error("Invalid message format: {0}")]
    Malformed(String),
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Chat payload rejected before anything is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Recipient and text are required")]
    MissingFields,

    #[error("Invalid recipient ID")]
    InvalidRecipient,
}

/// Failure inside the message store or the user directory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
