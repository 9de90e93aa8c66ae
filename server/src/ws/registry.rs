//! Identity -> live connections index.
//!
//! One mutex serializes every mutation and every read used for fan-out, so a
//! frame is never sent to a connection that is halfway through removal and a
//! roster never mixes two membership states. An entry exists iff its set of
//! connections is non-empty.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use parking_lot::Mutex;

use crate::ws::{ConnId, Connection, Identity};

#[derive(Default)]
struct Inner {
    entries: HashMap<String, HashMap<ConnId, Arc<Connection>>>,
    /// Bumped on every membership change.
    version: u64,
}

/// Consistent view of who is online, tagged with the membership version it was taken at.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    pub version: u64,
    pub identities: Vec<Identity>,
}

/// Shared handle to the registry. Cloning is cheap.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` under its bound identity, creating the entry if absent.
    /// Returns `false` (and does nothing) for anonymous connections.
    pub fn register(&self, conn: &Arc<Connection>) -> bool {
        let Some(identity) = conn.identity() else {
            return false;
        };

        let mut inner = self.inner.lock();
        inner
            .entries
            .entry(identity.id.clone())
            .or_default()
            .insert(conn.id(), conn.clone());
        inner.version += 1;

        let conn_count = inner.entries.get(&identity.id).map_or(0, HashMap::len);
        tracing::debug!(
            user_id = %identity.id,
            conn_id = %conn.id(),
            connections = conn_count,
            "Connection registered"
        );
        true
    }

    /// Remove `conn` from whichever entry holds it, dropping the entry once empty.
    /// Returns whether membership changed.
    pub fn unregister(&self, conn: &Connection) -> bool {
        let Some(identity) = conn.identity() else {
            return false;
        };

        let mut inner = self.inner.lock();
        let Some(connections) = inner.entries.get_mut(&identity.id) else {
            return false;
        };
        if connections.remove(&conn.id()).is_none() {
            return false;
        }
        if connections.is_empty() {
            inner.entries.remove(&identity.id);
        }
        inner.version += 1;

        tracing::debug!(
            user_id = %identity.id,
            conn_id = %conn.id(),
            "Connection unregistered"
        );
        true
    }

    /// Snapshot of the connections bound to `user_id`.
    pub fn connections_of(&self, user_id: &str) -> Vec<Arc<Connection>> {
        self.inner
            .lock()
            .entries
            .get(user_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every identity with at least one live connection.
    pub fn all_identities(&self) -> Vec<Identity> {
        self.snapshot().identities
    }

    /// Online identities plus the membership version they reflect.
    /// The display name comes from one of the identity's connections.
    pub fn snapshot(&self) -> RosterSnapshot {
        let inner = self.inner.lock();
        let identities = inner
            .entries
            .values()
            .filter_map(|connections| connections.values().next())
            .filter_map(|conn| conn.identity().cloned())
            .collect();

        RosterSnapshot {
            version: inner.version,
            identities,
        }
    }

    /// Send `msg` to every connection of `user_id`. Returns how many accepted it.
    pub fn send_to_identity(&self, user_id: &str, msg: &Message) -> usize {
        let inner = self.inner.lock();
        let Some(connections) = inner.entries.get(user_id) else {
            return 0;
        };

        connections
            .values()
            .filter(|conn| conn.send(msg.clone()).is_ok())
            .count()
    }

    /// Send `msg` to every authenticated connection, but only if membership
    /// has not changed since `version`.
    /// A superseded roster is dropped because the change that superseded it
    /// schedules its own broadcast.
    pub fn broadcast_if_current(&self, version: u64, msg: &Message) -> Option<usize> {
        let inner = self.inner.lock();
        if inner.version != version {
            return None;
        }
        Some(broadcast_locked(&inner, msg))
    }

    /// Number of identities currently online.
    pub fn identity_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Number of authenticated connections across all identities.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().entries.values().map(HashMap::len).sum()
    }
}

fn broadcast_locked(inner: &Inner, msg: &Message) -> usize {
    inner
        .entries
        .values()
        .flat_map(HashMap::values)
        .filter(|conn| conn.send(msg.clone()).is_ok())
        .count()
}
