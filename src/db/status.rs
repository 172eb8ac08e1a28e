//! The one record that survives a coordinator restart.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::init::open_db;

/// Well-known key of the recording status record.
pub const RECORDING_STATE_KEY: &str = "recording_state";

/// Durable `{startTime, isRecording}` record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedStatus {
    /// Unix timestamp in milliseconds
    pub start_time: Option<i64>,
    pub is_recording: bool,
}

impl PersistedStatus {
    pub fn recording(start_time: i64) -> Self {
        Self {
            start_time: Some(start_time),
            is_recording: true,
        }
    }

    pub fn stopped() -> Self {
        Self {
            start_time: None,
            is_recording: false,
        }
    }
}

pub struct StatusStore {
    conn: Connection,
}

impl StatusStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_db(db_path)?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Load the record; `None` when nothing has been persisted.
    pub fn load(&self) -> Result<Option<PersistedStatus>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![RECORDING_STATE_KEY],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read recording state")?;

        value
            .map(|json| serde_json::from_str(&json).context("Failed to parse recording state"))
            .transpose()
    }

    pub fn save(&self, status: &PersistedStatus) -> Result<()> {
        let json = serde_json::to_string(status).context("Failed to serialize recording state")?;
        self.conn
            .execute(
                "INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
                params![RECORDING_STATE_KEY, json],
            )
            .context("Failed to write recording state")?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM app_state WHERE key = ?1",
                params![RECORDING_STATE_KEY],
            )
            .context("Failed to clear recording state")?;
        Ok(())
    }
}
