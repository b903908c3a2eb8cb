pub mod engine;
pub mod stream;
pub mod wav;

use std::io;
use std::process::ExitStatus;
use thiserror::Error;

pub use engine::EngineSource;
pub use stream::ReaderSource;
pub use wav::WavFileSource;

/// Where PCM comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// External synthesis engine writing raw PCM to stdout
    Engine,
    /// Raw interleaved s16le PCM file (`-` for stdin)
    Raw,
    /// Existing 16-bit PCM WAV file
    Wav,
    /// Raw s16le PCM over a TCP connection
    Tcp,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read PCM: {0}")]
    Io(#[from] io::Error),

    #[error("failed to start engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("engine `{program}` exited with {status}")]
    EngineFailed { program: String, status: ExitStatus },

    #[error("unsupported WAV input: {0}")]
    UnsupportedWav(String),

    #[error("WAV input: {0}")]
    Wav(#[from] hound::Error),
}

/// Outcome of a single pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pull {
    /// Bytes written to the front of the caller's buffer, always whole frames
    pub bytes: usize,
    /// No more data will follow
    pub end_of_stream: bool,
}

impl Pull {
    pub fn data(bytes: usize) -> Self {
        Self {
            bytes,
            end_of_stream: false,
        }
    }

    pub fn last(bytes: usize) -> Self {
        Self {
            bytes,
            end_of_stream: true,
        }
    }
}

/// A producer of interleaved signed 16-bit little-endian PCM.
///
/// `buf` is sized to a whole number of frames; implementations fill a
/// frame-aligned prefix of it and report how much they wrote.
pub trait PcmSource {
    fn pull(&mut self, buf: &mut [u8]) -> Result<Pull, SourceError>;
}

impl<S: PcmSource + ?Sized> PcmSource for Box<S> {
    fn pull(&mut self, buf: &mut [u8]) -> Result<Pull, SourceError> {
        (**self).pull(buf)
    }
}

/// Settings handed unchanged to the synthesis engine
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bank: u32,
    pub chips: u32,
    pub looping: bool,
    pub extra_args: Vec<String>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bank: 59,
            chips: 2,
            looping: false,
            extra_args: Vec::new(),
        }
    }
}
