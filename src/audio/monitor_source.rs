//! Monitored-source capture (what the meeting participants say).
//!
//! The monitored source is a PipeWire/PulseAudio monitor exposed by cpal as an
//! input device. Which one is decided at start time by the capture handle, so
//! this type only opens a device by its exact name.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

use super::audio_source::{AudioSource, SampleBuffer};

/// Whether an input device name looks like an output monitor.
pub fn is_monitor_name(name: &str) -> bool {
    name.to_lowercase().contains("monitor")
}

/// Names of every input device the host exposes.
pub fn input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

pub struct MonitorAudioSource {
    device_name: String,
    device: cpal::Device,
    config: cpal::StreamConfig,
    samples: SampleBuffer,
    stream: Option<cpal::Stream>,
}

impl MonitorAudioSource {
    pub fn open(device_name: &str) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|device| device.name().map(|n| n == device_name).unwrap_or(false))
            .ok_or_else(|| anyhow!("Monitored source {:?} is no longer available", device_name))?;

        let config: cpal::StreamConfig = device
            .default_input_config()
            .with_context(|| format!("Monitored source {:?} has no usable configuration", device_name))?
            .into();

        info!(
            "Found monitored source: {} ({}Hz, {} ch)",
            device_name, config.sample_rate.0, config.channels
        );

        Ok(Self {
            device_name: device_name.to_string(),
            device,
            config,
            samples: SampleBuffer::default(),
            stream: None,
        })
    }
}

impl AudioSource for MonitorAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(anyhow!("Monitored source already capturing"));
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
                |err| error!("Monitored source stream error: {}", err),
                None,
            )
            .with_context(|| format!("Access to monitored source {:?} denied", self.device_name))?;

        stream
            .play()
            .context("Failed to start monitored source stream")?;
        self.stream = Some(stream);

        info!("Monitored source capture started");
        Ok(())
    }

    fn drain(&mut self) -> Result<Vec<f32>> {
        self.samples.take()
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!("Stopping monitored source stream");
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

impl Drop for MonitorAudioSource {
    fn drop(&mut self) {
        if self.stream.is_some() {
            debug!("Dropping active MonitorAudioSource, cleaning up");
            let _ = self.stop();
        }
    }
}
