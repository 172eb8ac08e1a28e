//! Chunked WAV encoding.
//!
//! The first chunk of a session starts with a WAV header whose length fields
//! are placeholders; every later chunk is bare 16-bit PCM. Concatenating the
//! chunks in order yields a complete file, and `finalize_header` patches the
//! lengths once the total size is known without changing it.

use anyhow::{anyhow, bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

pub const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: usize = (BITS_PER_SAMPLE / 8) as usize;

pub struct WavChunkEncoder {
    spec: WavSpec,
    header_written: bool,
}

impl WavChunkEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            spec: WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: BITS_PER_SAMPLE,
                sample_format: SampleFormat::Int,
            },
            header_written: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Encode one flush window of mono samples.
    pub fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>> {
        let mut payload = if self.header_written {
            Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE)
        } else {
            self.header()?
        };

        for &sample in samples {
            // Convert f32 (-1.0 to 1.0) to i16
            let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            payload.extend_from_slice(&amplitude.to_le_bytes());
        }

        self.header_written = true;
        Ok(payload)
    }

    fn header(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        WavWriter::new(&mut cursor, self.spec)
            .context("Failed to create WAV header")?
            .finalize()
            .context("Failed to write WAV header")?;
        Ok(cursor.into_inner())
    }
}

/// Largest file a RIFF length field can describe.
pub const MAX_WAV_BYTES: u64 = u32::MAX as u64 + 8;

/// Value for a RIFF length field covering `len` bytes.
pub fn length_field(len: u64) -> Result<u32> {
    u32::try_from(len).map_err(|_| anyhow!("{} bytes exceed the 4 GiB WAV size limit", len))
}

/// Patch the RIFF and `data` chunk lengths of an assembled WAV file in place.
pub fn finalize_header(bytes: &mut [u8]) -> Result<()> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("Stored chunks do not start with a WAV header");
    }

    let riff_len = length_field((bytes.len() - 8) as u64)?;
    bytes[4..8].copy_from_slice(&riff_len.to_le_bytes());

    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = [bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]];
        if &id == b"data" {
            let data_len = length_field((bytes.len() - pos - 8) as u64)?;
            bytes[pos + 4..pos + 8].copy_from_slice(&data_len.to_le_bytes());
            return Ok(());
        }
        let size = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]);
        // Chunks are word aligned
        pos += 8 + size as usize + (size as usize & 1);
    }

    bail!("WAV header has no data chunk")
}
