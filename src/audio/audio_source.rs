//! Audio source abstraction for the two capture inputs.

use anyhow::Result;
use std::sync::{Arc, Mutex};

/// A live capture input (monitored source or microphone).
///
/// Sources run at their native sample rate; the pipeline resamples. Unlike a
/// record-then-collect source, captured samples are handed out in windows via
/// `drain` so nothing accumulates past one flush interval.
pub trait AudioSource {
    /// Start capturing audio.
    fn start(&mut self) -> Result<()>;

    /// Take every sample captured since the previous drain (mono).
    fn drain(&mut self) -> Result<Vec<f32>>;

    /// Stop capturing and release the device.
    fn stop(&mut self) -> Result<()>;

    /// Whether this source is currently capturing.
    fn is_active(&self) -> bool;

    /// The sample rate of captured audio.
    fn sample_rate(&self) -> u32;
}

/// Buffer shared between a device callback and the owning source.
#[derive(Clone, Default)]
pub struct SampleBuffer {
    inner: Arc<Mutex<Vec<f32>>>,
}

impl SampleBuffer {
    /// Append interleaved frames, averaging channels down to mono.
    pub fn push_interleaved(&self, data: &[f32], channels: usize) {
        let Ok(mut samples) = self.inner.lock() else {
            return;
        };
        if channels <= 1 {
            samples.extend_from_slice(data);
            return;
        }
        samples.extend(
            data.chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
    }

    /// Take the buffered samples, leaving the buffer empty.
    pub fn take(&self) -> Result<Vec<f32>> {
        let mut samples = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("Sample buffer lock poisoned"))?;
        Ok(std::mem::take(&mut *samples))
    }

    pub fn clear(&self) {
        if let Ok(mut samples) = self.inner.lock() {
            samples.clear();
            samples.shrink_to_fit();
        }
    }
}
