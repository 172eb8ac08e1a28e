//! Local playback of the monitored source.
//!
//! Capturing a monitor source does not mute it, but on setups where the
//! monitored application is routed exclusively to the recorder the operator
//! would otherwise hear nothing. The worker forwards audio every few tens of
//! milliseconds; the queue is bounded so a stalled output device cannot grow
//! memory.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use super::audio_mixer::StreamResampler;

/// Sink for samples the operator should hear live.
pub trait PlaybackSink {
    fn play(&mut self, samples: &[f32], sample_rate: u32);
}

/// Bounded FIFO between the pipeline and the output callback.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// One second of audio at `sample_rate`.
    pub fn for_rate(sample_rate: u32) -> Self {
        Self::new(sample_rate as usize)
    }

    /// Push samples, discarding the oldest ones beyond capacity.
    pub fn push(&self, samples: &[f32]) {
        let Ok(mut queue) = self.inner.lock() else {
            return;
        };
        queue.extend(samples.iter().copied());
        let overflow = queue.len().saturating_sub(self.capacity);
        if overflow > 0 {
            queue.drain(..overflow);
        }
    }

    /// Fill interleaved output frames, writing silence on underrun.
    pub fn fill(&self, output: &mut [f32], channels: usize) {
        let mut queue = self.inner.lock().ok();
        for frame in output.chunks_mut(channels.max(1)) {
            let sample = queue
                .as_mut()
                .and_then(|queue| queue.pop_front())
                .unwrap_or(0.0);
            frame.fill(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LoopbackPlayback {
    queue: PlaybackQueue,
    output_rate: u32,
    resampler: Option<StreamResampler>,
    _stream: cpal::Stream,
}

impl LoopbackPlayback {
    /// Open the default output device.
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No output device available for loopback playback")?;

        let config: cpal::StreamConfig = device
            .default_output_config()
            .context("Output device refused to report a configuration")?
            .into();

        let output_rate = config.sample_rate.0;
        let channels = config.channels as usize;
        let queue = PlaybackQueue::for_rate(output_rate);
        let callback_queue = queue.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_queue.fill(data, channels);
                },
                |err| error!("Loopback playback stream error: {}", err),
                None,
            )
            .context("Failed to build loopback playback stream")?;

        stream
            .play()
            .context("Failed to start loopback playback stream")?;

        info!(
            "Loopback playback started on {} ({}Hz)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            output_rate
        );

        Ok(Self {
            queue,
            output_rate,
            resampler: None,
            _stream: stream,
        })
    }
}

impl PlaybackSink for LoopbackPlayback {
    fn play(&mut self, samples: &[f32], sample_rate: u32) {
        let output_rate = self.output_rate;
        let resampler = self
            .resampler
            .get_or_insert_with(|| StreamResampler::new(sample_rate, output_rate));
        if resampler.from_rate() != sample_rate {
            *resampler = StreamResampler::new(sample_rate, output_rate);
        }
        self.queue.push(&resampler.process(samples));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_bounded() {
        let queue = PlaybackQueue::new(4);
        queue.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(queue.len(), 4);

        let mut out = [0.0; 2];
        queue.fill(&mut out, 1);
        // Oldest samples were dropped
        assert_eq!(out, [3.0, 4.0]);
    }

    #[test]
    fn test_fill_duplicates_across_channels_and_pads_silence() {
        let queue = PlaybackQueue::new(16);
        queue.push(&[0.5]);

        let mut out = [9.0; 4];
        queue.fill(&mut out, 2);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
        assert!(queue.is_empty());
    }
}
