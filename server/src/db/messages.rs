//! Durable append-only store for relayed chat messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{new_object_id, DbPool};
use crate::error::StoreError;

/// Receipt returned once a message is durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Persists chat messages before they are fanned out.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        sender: &str,
        recipient: &str,
        text: &str,
    ) -> Result<StoredMessage, StoreError>;
}

/// `MessageStore` backed by the `messages` table.
#[derive(Clone)]
pub struct SqliteMessageStore {
    db: DbPool,
}

impl SqliteMessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(
        &self,
        sender: &str,
        recipient: &str,
        text: &str,
    ) -> Result<StoredMessage, StoreError> {
        let db = self.db.clone();
        let sender = sender.to_string();
        let recipient = recipient.to_string();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Poisoned)?;
            let stored = StoredMessage {
                id: new_object_id(),
                created_at: Utc::now(),
            };

            conn.execute(
                "INSERT INTO messages (id, sender, recipient, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    stored.id,
                    sender,
                    recipient,
                    text,
                    stored.created_at.to_rfc3339()
                ],
            )?;

            Ok(stored)
        })
        .await?
    }
}
