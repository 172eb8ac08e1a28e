//! Media objects the capture worker builds its pipeline from.

use tracing::warn;

use super::handle::CaptureHandle;
use crate::audio::audio_source::AudioSource;
use crate::audio::mic_source::MicAudioSource;
use crate::audio::monitor_source::MonitorAudioSource;
use crate::audio::playback::{LoopbackPlayback, PlaybackSink};
use crate::error::CaptureError;

/// Opens the platform media objects for a capture session.
///
/// Shared across threads, but everything it returns is created on and stays
/// on the worker thread (cpal streams are not `Send`).
pub trait MediaBackend: Send + Sync {
    /// Open the monitored source the handle authorizes.
    fn open_monitor(&self, handle: &CaptureHandle) -> Result<Box<dyn AudioSource>, CaptureError>;

    fn open_microphone(&self) -> Result<Box<dyn AudioSource>, CaptureError>;

    /// Local playback for the monitored source; `None` when disabled.
    fn open_playback(&self) -> Result<Option<Box<dyn PlaybackSink>>, CaptureError>;
}

pub struct CpalBackend {
    loopback_playback: bool,
}

impl CpalBackend {
    pub fn new(loopback_playback: bool) -> Self {
        Self { loopback_playback }
    }
}

impl MediaBackend for CpalBackend {
    fn open_monitor(&self, handle: &CaptureHandle) -> Result<Box<dyn AudioSource>, CaptureError> {
        MonitorAudioSource::open(handle.device_name())
            .map(|source| Box::new(source) as Box<dyn AudioSource>)
            .map_err(monitor_open_error)
    }

    fn open_microphone(&self) -> Result<Box<dyn AudioSource>, CaptureError> {
        MicAudioSource::open_default()
            .map(|source| Box::new(source) as Box<dyn AudioSource>)
            .map_err(|e| CaptureError::Permission(format!("{e:#}")))
    }

    fn open_playback(&self) -> Result<Option<Box<dyn PlaybackSink>>, CaptureError> {
        if !self.loopback_playback {
            return Ok(None);
        }
        match LoopbackPlayback::open_default() {
            Ok(playback) => Ok(Some(Box::new(playback))),
            Err(e) => {
                // Recording still works without local monitoring
                warn!("Loopback playback unavailable: {:#}", e);
                Ok(None)
            }
        }
    }
}

/// The device exists but refused us, or the handle names a device that is gone.
fn monitor_open_error(err: anyhow::Error) -> CaptureError {
    let refused = err.downcast_ref::<cpal::DefaultStreamConfigError>().is_some()
        || err.downcast_ref::<cpal::DevicesError>().is_some();
    if refused {
        CaptureError::Permission(format!("{err:#}"))
    } else {
        CaptureError::InvalidHandle(format!("{err:#}"))
    }
}
