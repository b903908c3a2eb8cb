pub mod encoder;
pub mod header;
pub mod verify;

use chrono::{DateTime, Local};
use std::io;
use std::path::Path;
use thiserror::Error;

pub use encoder::{Phase, WavStreamEncoder};

/// Errors raised by the WAV encoder.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("chunk of {len} bytes is not a multiple of the {block_align}-byte frame size")]
    MisalignedChunk { len: usize, block_align: u16 },

    #[error("cannot {op} an encoder that is {phase:?}")]
    InvalidState { op: &'static str, phase: Phase },

    #[error("chunk of {len} bytes would exceed the WAV size limit ({written} bytes already written)")]
    DataOverflow { len: usize, written: u32 },

    #[error("failed to write to output: {0}")]
    SinkWrite(#[source] io::Error),

    #[error("failed to seek output: {0}")]
    SinkSeek(#[source] io::Error),
}

pub type EncodeResult<T> = Result<T, EncodeError>;

/// PCM stream parameters, fixed for the lifetime of a WAV container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> EncodeResult<Self> {
        if sample_rate == 0 {
            return Err(EncodeError::InvalidFormat("sample rate must be positive".into()));
        }
        if channels == 0 {
            return Err(EncodeError::InvalidFormat("channel count must be positive".into()));
        }
        if bits_per_sample == 0 || bits_per_sample % 8 != 0 {
            return Err(EncodeError::InvalidFormat(format!(
                "bit depth must be a positive multiple of 8, got {}",
                bits_per_sample
            )));
        }

        let block_align = channels as u32 * (bits_per_sample / 8) as u32;
        if block_align > u16::MAX as u32 {
            return Err(EncodeError::InvalidFormat(format!(
                "{} channels of {}-bit samples do not fit a WAV frame",
                channels, bits_per_sample
            )));
        }
        if sample_rate.checked_mul(block_align).is_none() {
            return Err(EncodeError::InvalidFormat(format!(
                "byte rate of {} Hz x {} bytes overflows",
                sample_rate, block_align
            )));
        }

        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
        })
    }

    /// Interleaved signed 16-bit PCM, the format synthesis engines emit.
    pub fn pcm16(sample_rate: u32, channels: u16) -> EncodeResult<Self> {
        Self::new(sample_rate, channels, 16)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    /// Bytes per second of audio.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Whole frames contained in `bytes` bytes of payload.
    pub fn frames(&self, bytes: u64) -> u64 {
        bytes / self.block_align() as u64
    }

    pub fn duration_secs(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }
}

/// Generate an output filename for a render written into a directory
pub fn generate_filename(input: &Path, base_time: DateTime<Local>) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty() && *s != "-")
        .unwrap_or("render");

    format!("{}_{}.wav", stem, base_time.format("%Y-%m-%d_%H-%M-%S"))
}

/// Format an audio duration as `mm:ss.mmm` (hours are folded into minutes)
pub fn format_duration(secs: f64) -> String {
    let total = chrono::Duration::milliseconds((secs * 1000.0).round() as i64);
    let minutes = total.num_minutes();
    let seconds = total.num_seconds() - minutes * 60;
    let millis = total.num_milliseconds() - total.num_seconds() * 1000;
    format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
}
