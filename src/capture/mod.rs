//! Capture authorization and the media backend the worker draws on.

pub mod backend;
pub mod handle;
pub mod provider;

pub use backend::{CpalBackend, MediaBackend};
pub use handle::CaptureHandle;
pub use provider::{CaptureHandleProvider, DeviceHandleProvider};
