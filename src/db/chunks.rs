//! Durable, append-only buffer of encoded audio chunks.
//!
//! The capture worker appends one chunk per encoder flush and drops its local
//! copy right after, so working memory stays bounded by the flush interval
//! while the store grows with the recording. Raw SQL with rusqlite, same as
//! the rest of `db`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::init::open_db;

/// One stored slice of encoded audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence: i64,
    pub payload: Vec<u8>,
}

pub struct ChunkStore {
    conn: Connection,
}

impl ChunkStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_db(db_path)?,
        })
    }

    /// Wrap an already-migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Append a payload and return its sequence number.
    pub fn append(&self, payload: &[u8]) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO chunks (payload, size) VALUES (?1, ?2)",
                params![payload, payload.len() as i64],
            )
            .context("Failed to append chunk")?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Append with a bounded number of attempts, sleeping `backoff` between them.
    pub async fn append_with_retry(
        &self,
        payload: &[u8],
        attempts: u32,
        backoff: Duration,
    ) -> Result<i64> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.append(payload) {
                Ok(sequence) => return Ok(sequence),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Chunk append attempt {}/{} failed: {:#}",
                        attempt, attempts, e
                    );
                    attempt += 1;
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(e.context(format!("Chunk append failed after {attempts} attempts")))
                }
            }
        }
    }

    /// All chunks in insertion order.
    pub fn read_all_ordered(&self) -> Result<Vec<Chunk>> {
        let mut stmt = self
            .conn
            .prepare("SELECT sequence, payload FROM chunks ORDER BY sequence ASC")
            .context("Failed to prepare chunk query")?;

        let chunks = stmt
            .query_map([], |row| {
                Ok(Chunk {
                    sequence: row.get(0)?,
                    payload: row.get(1)?,
                })
            })
            .context("Failed to query chunks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map chunks")?;

        Ok(chunks)
    }

    /// Remove every chunk. Returns how many were deleted.
    pub fn clear(&self) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM chunks", [])
            .context("Failed to clear chunk store")?;

        if deleted > 0 {
            debug!("Cleared {} chunks from store", deleted);
        }
        Ok(deleted)
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .context("Failed to count chunks")?;

        Ok(count)
    }

    pub fn total_bytes(&self) -> Result<i64> {
        let total: i64 = self
            .conn
            .query_row("SELECT COALESCE(SUM(size), 0) FROM chunks", [], |row| {
                row.get(0)
            })
            .context("Failed to sum chunk sizes")?;

        Ok(total)
    }
}
