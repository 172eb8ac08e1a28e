//! Finalization: turning the stored chunks into one deliverable file.

pub mod sink;

pub use sink::{ArtifactSink, DownloadDirSink};

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

use crate::audio::encoder::{finalize_header, MAX_WAV_BYTES};
use crate::db::ChunkStore;
use crate::error::CaptureError;

/// The finished recording, handed from the worker to the coordinator.
#[derive(Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub suggested_name: String,
    pub completed_at: DateTime<Utc>,
    pub chunk_count: usize,
}

impl Artifact {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("suggested_name", &self.suggested_name)
            .field("size", &self.bytes.len())
            .field("chunk_count", &self.chunk_count)
            .finish()
    }
}

/// `<prefix>-2024-05-01T09-30-00-123Z.wav`
pub fn suggested_name(prefix: &str, completed_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}.wav",
        prefix,
        completed_at.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

/// Concatenate every stored chunk in sequence order and empty the store.
///
/// The first chunk carries the WAV header, so the concatenation is already a
/// file; only its length fields are patched.
pub fn assemble(
    store: &ChunkStore,
    prefix: &str,
    completed_at: DateTime<Utc>,
) -> Result<Artifact, CaptureError> {
    let chunks = store
        .read_all_ordered()
        .map_err(|e| CaptureError::Storage(format!("{e:#}")))?;

    if chunks.is_empty() {
        return Err(CaptureError::Pipeline(
            "No audio captured during the session".to_string(),
        ));
    }

    let total: usize = chunks.iter().map(|chunk| chunk.payload.len()).sum();
    check_size(total as u64)?;

    let mut bytes = Vec::with_capacity(total);
    for chunk in &chunks {
        bytes.extend_from_slice(&chunk.payload);
    }

    finalize_header(&mut bytes).map_err(|e| CaptureError::Pipeline(format!("{e:#}")))?;

    store
        .clear()
        .map_err(|e| CaptureError::Storage(format!("{e:#}")))?;

    info!(
        "Assembled {} chunks into {} bytes",
        chunks.len(),
        bytes.len()
    );

    Ok(Artifact {
        bytes,
        suggested_name: suggested_name(prefix, completed_at),
        completed_at,
        chunk_count: chunks.len(),
    })
}

fn check_size(total: u64) -> Result<(), CaptureError> {
    if total > MAX_WAV_BYTES {
        return Err(CaptureError::Pipeline(format!(
            "Recording of {} bytes exceeds the 4 GiB WAV size limit",
            total
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::WavChunkEncoder;
    use crate::db::migrate;
    use chrono::TimeZone;
    use rusqlite::Connection;

    fn memory_store() -> ChunkStore {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        ChunkStore::from_connection(conn)
    }

    #[test]
    fn test_suggested_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(
            suggested_name("meeting-recording", at),
            "meeting-recording-2024-05-01T09-30-00-123Z.wav"
        );
    }

    #[test]
    fn test_assemble_concatenates_and_clears() {
        let store = memory_store();
        let mut encoder = WavChunkEncoder::new(8000);
        let mut expected_size = 0;
        for window in [[0.1f32; 40], [0.2; 40], [-0.3; 40]] {
            let payload = encoder.encode(&window).unwrap();
            expected_size += payload.len();
            store.append(&payload).unwrap();
        }

        let artifact = assemble(&store, "test", Utc::now()).unwrap();
        assert_eq!(artifact.size(), expected_size);
        assert_eq!(artifact.chunk_count, 3);
        assert_eq!(store.count().unwrap(), 0);

        let reader = hound::WavReader::new(std::io::Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.len(), 120);
    }

    #[test]
    fn test_assemble_empty_store_fails() {
        let store = memory_store();
        let err = assemble(&store, "test", Utc::now()).unwrap_err();
        assert!(matches!(err, CaptureError::Pipeline(_)));
    }

    #[test]
    fn test_assemble_rejects_headerless_chunks() {
        let store = memory_store();
        store.append(&[0u8; 16]).unwrap();
        let err = assemble(&store, "test", Utc::now()).unwrap_err();
        assert!(matches!(err, CaptureError::Pipeline(_)));
    }

    #[test]
    fn test_oversized_recording_is_refused() {
        assert!(check_size(MAX_WAV_BYTES).is_ok());
        let err = check_size(MAX_WAV_BYTES + 1).unwrap_err();
        assert!(matches!(err, CaptureError::Pipeline(_)));
        assert!(err.to_string().contains("4 GiB"));
    }
}
