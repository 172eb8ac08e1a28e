//! Protocol between the coordinator and a capture worker.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::artifact::Artifact;
use crate::capture::CaptureHandle;
use crate::error::FailureReason;

/// Identity of one worker context. A new id is issued per provisioning, so
/// messages from a context that has since been replaced can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Coordinator → worker.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Begin capturing with the given single-use handle.
    Initialize(CaptureHandle),
    /// Flush, stop, and assemble the artifact.
    Finalize,
}

/// Worker → coordinator.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The context is up and waiting for `Initialize`.
    Ready,
    /// Both sources are capturing and the encoder is running.
    Started { started_at: DateTime<Utc> },
    Heartbeat,
    ArtifactReady(Artifact),
    Failed(FailureReason),
}

impl WorkerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Started { .. } => "started",
            Self::Heartbeat => "heartbeat",
            Self::ArtifactReady(_) => "artifact_ready",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct WorkerMessage {
    pub worker: WorkerId,
    pub event: WorkerEvent,
}
