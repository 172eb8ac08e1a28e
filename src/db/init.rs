use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How long a connection waits on a lock held by the other context.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (and migrate) the database at `db_path`.
///
/// The coordinator and the capture worker each open their own connection to
/// the same file, so WAL mode and a busy timeout are always set.
pub fn open_db(db_path: &Path) -> Result<Connection> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(db_path).context("Failed to open database connection")?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .context("Failed to set database busy timeout")?;
    let journal_mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("Failed to enable WAL journal mode")?;
    debug!("Opened {:?} (journal_mode={})", db_path, journal_mode);

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    // AUTOINCREMENT keeps sequence numbers from being reused after a clear
    conn.execute(
        "CREATE TABLE IF NOT EXISTS chunks (
            sequence INTEGER PRIMARY KEY AUTOINCREMENT,
            payload BLOB NOT NULL,
            size INTEGER NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create chunks table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS app_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create app_state table")?;

    Ok(())
}
