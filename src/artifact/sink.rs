//! Where finished recordings go.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use super::Artifact;

/// Receives the one artifact a session produces.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist the artifact and return where it ended up.
    async fn deliver(&self, artifact: Artifact) -> Result<PathBuf>;
}

/// Saves artifacts into a download directory without overwriting anything.
pub struct DownloadDirSink {
    dir: PathBuf,
}

impl DownloadDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn available_path(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(path);
        }

        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let extension = Path::new(name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        // Handle collision by appending counter
        for i in 1..100 {
            let alt_path = self.dir.join(format!("{stem}-{i}{extension}"));
            if !alt_path.exists() {
                return Ok(alt_path);
            }
        }

        bail!("No free file name for {:?} in {:?}", name, self.dir)
    }
}

#[async_trait]
impl ArtifactSink for DownloadDirSink {
    async fn deliver(&self, artifact: Artifact) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create download directory {:?}", self.dir))?;

        let path = self.available_path(&artifact.suggested_name)?;
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .with_context(|| format!("Failed to write recording to {:?}", path))?;

        info!("Recording saved: {:?} ({} bytes)", path, artifact.size());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn artifact(name: &str, bytes: &[u8]) -> Artifact {
        Artifact {
            bytes: bytes.to_vec(),
            suggested_name: name.to_string(),
            completed_at: Utc::now(),
            chunk_count: 1,
        }
    }

    #[tokio::test]
    async fn test_deliver_creates_directory() {
        let temp = TempDir::new().unwrap();
        let sink = DownloadDirSink::new(temp.path().join("nested").join("downloads"));

        let path = sink.deliver(artifact("a.wav", b"abc")).await.unwrap();
        assert_eq!(path, sink.dir().join("a.wav"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_deliver_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let sink = DownloadDirSink::new(temp.path());

        let first = sink.deliver(artifact("a.wav", b"one")).await.unwrap();
        let second = sink.deliver(artifact("a.wav", b"two")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "a-1.wav");
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }
}
