//! The live mixing pipeline: two sources in, encoded chunks out.
//!
//! Sources are pumped often so the monitored audio reaches local playback as
//! it arrives; the drained samples wait in the current window until the
//! encoder flushes it.

use tracing::{debug, info, warn};

use crate::audio::{mix, AudioSource, PlaybackSink, StreamResampler, WavChunkEncoder};
use crate::error::CaptureError;

pub struct MixPipeline {
    monitor: Box<dyn AudioSource>,
    mic: Box<dyn AudioSource>,
    playback: Option<Box<dyn PlaybackSink>>,
    monitor_resampler: StreamResampler,
    mic_resampler: StreamResampler,
    encoder: WavChunkEncoder,
    monitor_window: Vec<f32>,
    mic_window: Vec<f32>,
}

impl MixPipeline {
    pub fn new(
        monitor: Box<dyn AudioSource>,
        mic: Box<dyn AudioSource>,
        playback: Option<Box<dyn PlaybackSink>>,
        sample_rate: u32,
    ) -> Result<Self, CaptureError> {
        if sample_rate == 0 {
            return Err(CaptureError::Pipeline(
                "target sample rate must be non-zero".to_string(),
            ));
        }

        for (label, source) in [("monitored source", &monitor), ("microphone", &mic)] {
            if source.sample_rate() == 0 {
                return Err(CaptureError::Pipeline(format!(
                    "{label} reports a zero sample rate"
                )));
            }
        }

        let monitor_resampler = StreamResampler::new(monitor.sample_rate(), sample_rate);
        let mic_resampler = StreamResampler::new(mic.sample_rate(), sample_rate);

        Ok(Self {
            monitor,
            mic,
            playback,
            monitor_resampler,
            mic_resampler,
            encoder: WavChunkEncoder::new(sample_rate),
            monitor_window: Vec::new(),
            mic_window: Vec::new(),
        })
    }

    /// Start both sources. If the microphone refuses, the monitor is stopped
    /// again so nothing is left capturing.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.monitor
            .start()
            .map_err(|e| CaptureError::Permission(format!("{e:#}")))?;

        if let Err(e) = self.mic.start() {
            stop_source("monitored source", self.monitor.as_mut());
            return Err(CaptureError::Permission(format!("{e:#}")));
        }

        info!(
            "Mix pipeline started: monitor {}Hz + mic {}Hz -> {}Hz{}",
            self.monitor.sample_rate(),
            self.mic.sample_rate(),
            self.encoder.sample_rate(),
            if self.playback.is_some() {
                " (with loopback)"
            } else {
                ""
            }
        );
        Ok(())
    }

    pub fn has_playback(&self) -> bool {
        self.playback.is_some()
    }

    /// Move whatever both sources captured into the current window, and hand
    /// the new monitored samples to playback.
    pub fn pump(&mut self) -> Result<(), CaptureError> {
        let monitor = self
            .monitor
            .drain()
            .map_err(|e| CaptureError::Pipeline(format!("monitored source: {e:#}")))?;
        let mic = self
            .mic
            .drain()
            .map_err(|e| CaptureError::Pipeline(format!("microphone: {e:#}")))?;

        if let Some(playback) = self.playback.as_mut() {
            if !monitor.is_empty() {
                playback.play(&monitor, self.monitor.sample_rate());
            }
        }

        self.monitor_window.extend_from_slice(&monitor);
        self.mic_window.extend_from_slice(&mic);
        Ok(())
    }

    /// Close the current window and encode it.
    ///
    /// Returns `None` when neither source delivered audio since the last flush.
    pub fn flush(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        self.pump()?;

        let monitor = self
            .monitor_resampler
            .process(&std::mem::take(&mut self.monitor_window));
        let mic = self
            .mic_resampler
            .process(&std::mem::take(&mut self.mic_window));
        let mixed = mix(&[monitor.as_slice(), mic.as_slice()]);

        if mixed.is_empty() {
            return Ok(None);
        }

        debug!(
            "Flush window: {} monitor + {} mic samples -> {} mixed",
            monitor.len(),
            mic.len(),
            mixed.len()
        );

        self.encoder
            .encode(&mixed)
            .map(Some)
            .map_err(|e| CaptureError::Pipeline(format!("encoder: {e:#}")))
    }

    /// Stop both sources and release playback.
    pub fn stop(&mut self) {
        stop_source("monitored source", self.monitor.as_mut());
        stop_source("microphone", self.mic.as_mut());
        self.playback = None;
        self.monitor_window = Vec::new();
        self.mic_window = Vec::new();
    }
}

fn stop_source(label: &str, source: &mut dyn AudioSource) {
    if !source.is_active() {
        return;
    }
    if let Err(e) = source.stop() {
        warn!("Failed to stop {}: {:#}", label, e);
    }
}
