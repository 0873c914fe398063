//! RIFF/WAVE container encoding for linear PCM.
//!
//! The header layout is the canonical 44-byte form:
//!
//! ```text
//!  0  "RIFF"          4  riff size       8  "WAVE"
//! 12  "fmt "         16  16 (fmt size)  20  1 (PCM)     22 channels
//! 24  sample rate    28  byte rate      32  block align 34 bits/sample
//! 36  "data"         40  data size      44  samples...
//! ```

use crate::config_loader::Settings;
use crate::error::EncodingError;
use crate::transport::PcmBuffer;

pub const HEADER_LEN: usize = 44;

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

pub const MAX_SAMPLE_RATE: u32 = 768_000;
pub const MAX_CHANNELS: u16 = 64;

/// Sample layout of the PCM stream being wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl Default for WavFormat {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            bits_per_sample: 16,
            channels: 1,
        }
    }
}

impl From<&Settings> for WavFormat {
    fn from(settings: &Settings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            bits_per_sample: settings.bits_per_sample,
            channels: settings.channels,
        }
    }
}

impl WavFormat {
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// Bytes per frame, or `None` if it does not fit the header field.
    pub fn block_align(&self) -> Option<u16> {
        self.channels.checked_mul(self.bytes_per_sample())
    }

    /// Bytes per second, or `None` if it does not fit the header field.
    pub fn byte_rate(&self) -> Option<u32> {
        self.sample_rate.checked_mul(u32::from(self.block_align()?))
    }

    /// Playing time of `data_len` bytes of PCM, in seconds.
    pub fn duration_secs(&self, data_len: usize) -> f64 {
        let rate =
            self.sample_rate as f64 * self.channels as f64 * self.bytes_per_sample() as f64;
        if rate == 0.0 {
            return 0.0;
        }
        data_len as f64 / rate
    }

    /// Rejects formats the encoder cannot describe in a canonical header.
    pub fn validate(&self) -> Result<(), EncodingError> {
        if !(1..=MAX_SAMPLE_RATE).contains(&self.sample_rate)
            || !(1..=MAX_CHANNELS).contains(&self.channels)
        {
            return Err(EncodingError::UnsupportedFormat(format!(
                "{} Hz, {} channel(s)",
                self.sample_rate, self.channels
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(EncodingError::UnsupportedFormat(format!(
                "{} bits per sample",
                self.bits_per_sample
            )));
        }
        if self.byte_rate().is_none() {
            return Err(EncodingError::UnsupportedFormat(format!(
                "byte rate of {} Hz x {} channel(s) x {} bits overflows the header",
                self.sample_rate, self.channels, self.bits_per_sample
            )));
        }
        Ok(())
    }
}

/// Wraps `pcm` in a WAV container. Nothing is written unless the whole
/// buffer is a whole number of frames.
pub fn encode(pcm: &PcmBuffer, format: &WavFormat) -> Result<Vec<u8>, EncodingError> {
    format.validate()?;

    let (Some(block_align), Some(byte_rate)) = (format.block_align(), format.byte_rate()) else {
        return Err(EncodingError::UnsupportedFormat(format!("{:?}", format)));
    };
    if !pcm.is_frame_aligned(block_align as usize) {
        return Err(EncodingError::MisalignedFrames {
            length: pcm.len(),
            block_align,
        });
    }

    let data_len = u32::try_from(pcm.len())
        .ok()
        .filter(|len| len.checked_add(36).is_some())
        .ok_or(EncodingError::TooLarge { length: pcm.len() })?;
    let riff_len = 36 + data_len;

    let mut wav = Vec::with_capacity(HEADER_LEN + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&riff_len.to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    wav.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    wav.extend_from_slice(&format.channels.to_le_bytes());
    wav.extend_from_slice(&format.sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm.as_bytes());

    debug_assert_eq!(wav.len(), HEADER_LEN + pcm.len());
    Ok(wav)
}

/// Reads the format and data length back out of a canonical 44-byte header.
/// Returns `None` for anything else.
pub fn parse_header(bytes: &[u8]) -> Option<(WavFormat, usize)> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }
    if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
        return None;
    }

    let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
    let u32_at =
        |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

    if u16_at(20) != FORMAT_PCM {
        return None;
    }

    let format = WavFormat {
        channels: u16_at(22),
        sample_rate: u32_at(24),
        bits_per_sample: u16_at(34),
    };
    Some((format, u32_at(40) as usize))
}
