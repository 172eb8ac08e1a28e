//! Single-use capture authorization.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::CaptureError;

/// Authorization for one worker to open one monitored source.
///
/// Not `Clone`: it moves into the worker's `Initialize` command exactly once
/// and is consumed there.
pub struct CaptureHandle {
    token: Uuid,
    target_id: String,
    device_name: String,
    issued_at: DateTime<Utc>,
    ttl: Duration,
}

impl CaptureHandle {
    pub fn issue(target_id: impl Into<String>, device_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            token: Uuid::new_v4(),
            target_id: target_id.into(),
            device_name: device_name.into(),
            issued_at: Utc::now(),
            ttl,
        }
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Input device the handle grants access to.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.issued_at).to_std().unwrap_or_default();
        age > self.ttl
    }

    /// Reject the handle if it outlived its TTL.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), CaptureError> {
        if self.is_expired_at(now) {
            return Err(CaptureError::InvalidHandle(format!(
                "capture handle for {:?} expired after {}s",
                self.target_id,
                self.ttl.as_secs()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("token", &self.token)
            .field("target_id", &self.target_id)
            .field("device_name", &self.device_name)
            .finish()
    }
}
