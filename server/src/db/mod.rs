pub mod messages;
pub mod migrations;
pub mod users;

use chrono::Utc;
use rand::Rng;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Type alias for the shared database connection.
/// rusqlite is synchronous, so the connection is shared behind a mutex.
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

/// Length of an identity or message id in hex characters (12 bytes).
pub const OBJECT_ID_LEN: usize = 24;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("relay.db");
    let mut conn = Connection::open(&db_path)?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let migrations = migrations::migrations();
    migrations.to_latest(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// Generate a 24-hex-character id: 4 bytes of big-endian unix seconds
/// followed by 8 random bytes. Ids sort roughly by creation time.
pub fn new_object_id() -> String {
    let secs = Utc::now().timestamp() as u32;
    let tail: [u8; 8] = rand::rng().random();

    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&secs.to_be_bytes());
    bytes[4..].copy_from_slice(&tail);
    hex::encode(bytes)
}

/// Whether `candidate` has the shape of an identity id (24 hex digits, any case).
pub fn is_object_id(candidate: &str) -> bool {
    candidate.len() == OBJECT_ID_LEN && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}
