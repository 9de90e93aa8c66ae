pub mod actor;
pub mod handler;
pub mod handshake;
pub mod heartbeat;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod router;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use crate::error::RelayError;

pub use registry::ConnectionRegistry;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of a transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity a connection is bound to after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
}

/// One live WebSocket session.
///
/// Owned by the connection's actor task; the registry only holds shared
/// handles to it while the connection is authenticated. The bound identity
/// is write-once.
#[derive(Debug)]
pub struct Connection {
    id: ConnId,
    tx: ConnectionSender,
    identity: OnceLock<Identity>,
    auth_failures: AtomicU32,
}

impl Connection {
    pub fn new(tx: ConnectionSender) -> Arc<Self> {
        Arc::new(Self {
            id: ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)),
            tx,
            identity: OnceLock::new(),
            auth_failures: AtomicU32::new(0),
        })
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// The bound identity, or `None` while the connection is anonymous.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    /// Bind `identity` to this connection. Fails if one is already bound.
    pub fn bind(&self, identity: Identity) -> Result<&Identity, RelayError> {
        self.identity
            .set(identity)
            .map_err(|_| RelayError::AlreadyAuthenticated)?;
        self.identity.get().ok_or(RelayError::AlreadyAuthenticated)
    }

    /// Count a failed handshake and return the running total.
    pub fn record_auth_failure(&self) -> u32 {
        self.auth_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Queue a message for the writer task.
    pub fn send(&self, msg: Message) -> Result<(), RelayError> {
        self.tx.send(msg).map_err(|_| RelayError::TransportDead)
    }

    /// Serialize and queue a protocol frame.
    pub fn send_frame(&self, frame: &protocol::ServerFrame) -> Result<(), RelayError> {
        match frame.to_message() {
            Some(msg) => self.send(msg),
            None => Ok(()),
        }
    }
}
