//! Microphone capture via cpal.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

use super::audio_source::{AudioSource, SampleBuffer};

pub struct MicAudioSource {
    device: cpal::Device,
    config: cpal::StreamConfig,
    samples: SampleBuffer,
    stream: Option<cpal::Stream>,
}

impl MicAudioSource {
    /// Open the default input device at its native configuration.
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("No microphone available")?;

        let config: cpal::StreamConfig = device
            .default_input_config()
            .context("Microphone refused to report a configuration")?
            .into();

        info!(
            "Microphone source using device: {} ({}Hz, {} ch)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            config.sample_rate.0,
            config.channels
        );

        Ok(Self {
            device,
            config,
            samples: SampleBuffer::default(),
            stream: None,
        })
    }
}

impl AudioSource for MicAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(anyhow!("Microphone source already capturing"));
        }

        self.samples.clear();
        let buffer = self.samples.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer.push_interleaved(data, channels);
                },
                |err| error!("Microphone stream error: {}", err),
                None,
            )
            .context("Microphone access denied")?;

        stream.play().context("Failed to start microphone stream")?;
        self.stream = Some(stream);

        info!("Microphone capture started");
        Ok(())
    }

    fn drain(&mut self) -> Result<Vec<f32>> {
        self.samples.take()
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!("Stopping microphone stream");
            drop(stream);
        }
        self.samples.clear();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for MicAudioSource {
    fn drop(&mut self) {
        if self.stream.is_some() {
            debug!("Dropping active MicAudioSource, cleaning up");
            let _ = self.stop();
        }
    }
}
