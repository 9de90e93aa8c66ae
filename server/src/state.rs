use std::sync::Arc;
use std::time::Duration;

use crate::auth::jwt::JwtVerifier;
use crate::auth::TokenVerifier;
use crate::db::messages::{MessageStore, SqliteMessageStore};
use crate::db::users::{SqliteUserDirectory, UserDirectory};
use crate::db::DbPool;
use crate::ws::heartbeat::HeartbeatConfig;
use crate::ws::ConnectionRegistry;

/// Upper bound on a single token verification or message append.
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Validates `auth` frames
    pub verifier: Arc<dyn TokenVerifier>,
    /// Avatar lookups for presence rosters
    pub directory: Arc<dyn UserDirectory>,
    /// Durable sink for relayed messages
    pub messages: Arc<dyn MessageStore>,
    /// Authenticated WebSocket connections per user
    pub connections: ConnectionRegistry,
    /// Ping cadence and pong deadline for every connection
    pub heartbeat: HeartbeatConfig,
    /// Applied to token verification and message appends
    pub collaborator_timeout: Duration,
}

impl AppState {
    /// State backed by the SQLite store and an HS256 verifier.
    pub fn with_sqlite(db: DbPool, jwt_secret: Vec<u8>) -> Self {
        Self {
            verifier: Arc::new(JwtVerifier::new(jwt_secret)),
            directory: Arc::new(SqliteUserDirectory::new(db.clone())),
            messages: Arc::new(SqliteMessageStore::new(db)),
            connections: ConnectionRegistry::new(),
            heartbeat: HeartbeatConfig::default(),
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }
}
