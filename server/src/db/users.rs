//! Read side of the user directory: the relay only needs avatars.

use async_trait::async_trait;
use chrono::Utc;

use crate::db::DbPool;
use crate::error::StoreError;

/// Resolves presentable profile details for an identity.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Avatar reference for `user_id`, or `None` for unknown users and users without one.
    async fn avatar_link(&self, user_id: &str) -> Result<Option<String>, StoreError>;
}

/// A row of the `users` table.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_link: Option<String>,
}

/// `UserDirectory` backed by the `users` table.
#[derive(Clone)]
pub struct SqliteUserDirectory {
    db: DbPool,
}

impl SqliteUserDirectory {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn avatar_link(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let db = self.db.clone();
        let uid = user_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Poisoned)?;
            let result = conn.query_row(
                "SELECT avatar_link FROM users WHERE id = ?1",
                rusqlite::params![uid],
                |row| row.get::<_, Option<String>>(0),
            );

            match result {
                Ok(link) => Ok(link),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}

/// Insert or replace a user profile. Profiles are owned by the account
/// service; the relay writes them only when seeding a directory.
pub fn upsert_user(db: &DbPool, user: &UserRecord) -> Result<(), StoreError> {
    let conn = db.lock().map_err(|_| StoreError::Poisoned)?;
    conn.execute(
        "INSERT INTO users (id, first_name, last_name, avatar_link, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             first_name = excluded.first_name,
             last_name = excluded.last_name,
             avatar_link = excluded.avatar_link",
        rusqlite::params![
            user.id,
            user.first_name,
            user.last_name,
            user.avatar_link,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}
