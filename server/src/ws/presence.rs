//! Full-roster presence broadcasts.
//!
//! Every membership change triggers a recomputation from the registry; the
//! roster is never patched incrementally.

use futures_util::future::join_all;
use tokio::time::timeout;

use crate::state::AppState;
use crate::ws::protocol::{PresenceEntry, ServerFrame};
use crate::ws::Identity;

/// Recompute the online roster and send it to every authenticated connection.
///
/// Avatar lookups run concurrently and are all joined before anything is sent.
/// If membership changes while the lookups are in flight, this roster is
/// dropped in favour of the one the newer change triggers.
pub async fn broadcast_roster(state: &AppState) {
    let snapshot = state.connections.snapshot();
    let online = resolve_entries(state, snapshot.identities).await;
    let count = online.len();

    let Some(msg) = (ServerFrame::Online { online }).to_message() else {
        return;
    };

    match state.connections.broadcast_if_current(snapshot.version, &msg) {
        Some(recipients) => tracing::debug!(
            online = count,
            recipients = recipients,
            "Presence roster broadcast"
        ),
        None => tracing::debug!(
            version = snapshot.version,
            "Presence roster superseded before send"
        ),
    }
}

/// Attach avatars to `identities`, one directory lookup per identity.
/// A failed or stalled lookup yields no avatar rather than failing the roster.
/// Each lookup is bounded by the collaborator timeout; the caller's
/// connection handles no frames or heartbeats until the roster is out.
pub async fn resolve_entries(state: &AppState, identities: Vec<Identity>) -> Vec<PresenceEntry> {
    let lookups = identities.into_iter().map(|identity| async move {
        let lookup = state.directory.avatar_link(&identity.id);
        let avatar_link = match timeout(state.collaborator_timeout, lookup).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                tracing::warn!(
                    user_id = %identity.id,
                    error = %e,
                    "Avatar lookup failed"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %identity.id,
                    timeout = ?state.collaborator_timeout,
                    "Avatar lookup timed out"
                );
                None
            }
        };

        PresenceEntry {
            user_id: identity.id,
            username: identity.display_name,
            avatar_link,
        }
    });

    join_all(lookups).await
}
