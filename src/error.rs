//! Error taxonomy for the capture lifecycle.
//!
//! Application glue (config, paths, HTTP) uses `anyhow`; the types here exist
//! where the coordinator or worker has to branch on *what* failed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while provisioning or running a capture session.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Capture handle rejected: {0}")]
    InvalidHandle(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CaptureError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Provisioning(_) => FailureKind::Provisioning,
            Self::InvalidHandle(_) => FailureKind::InvalidHandle,
            Self::Permission(_) => FailureKind::Permission,
            Self::Pipeline(_) => FailureKind::Pipeline,
            Self::Storage(_) => FailureKind::Storage,
        }
    }
}

/// Failure category carried in a `failed` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Provisioning,
    InvalidHandle,
    Permission,
    Pipeline,
    Storage,
    /// The worker stopped heartbeating while it was expected to be encoding.
    Liveness,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::InvalidHandle => "invalid_handle",
            Self::Permission => "permission",
            Self::Pipeline => "pipeline",
            Self::Storage => "storage",
            Self::Liveness => "liveness",
        }
    }
}

/// Human-readable failure report sent from the worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&CaptureError> for FailureReason {
    fn from(err: &CaptureError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}
