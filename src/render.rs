use log::{debug, info};
use std::io::{Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::input::{PcmSource, SourceError};
use crate::output::{format_duration, AudioFormat, EncodeError, WavStreamEncoder};

/// Frames requested per pull unless configured otherwise
pub const DEFAULT_CHUNK_FRAMES: usize = 2048;

/// Seconds of audio between progress lines
const PROGRESS_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("chunk size must be a positive number of frames")]
    InvalidChunkSize,

    #[error("interrupted after {data_bytes} bytes; output left incomplete")]
    Interrupted { data_bytes: u32 },
}

/// How a render is driven
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub chunk_frames: usize,
    /// Stop after this many frames and finalize what was written
    pub max_frames: Option<u64>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSummary {
    pub chunks: usize,
    pub frames: u64,
    pub data_bytes: u32,
    /// The frame cap cut the stream short
    pub truncated: bool,
    pub duration_secs: f64,
}

/// Pull PCM from `source` until it ends and stream it into a WAV on `sink`.
///
/// Source errors and interruption abort the encoder, leaving the placeholder
/// header in place.
pub fn render<S, W>(
    source: &mut S,
    sink: W,
    format: AudioFormat,
    options: RenderOptions,
    interrupted: &AtomicBool,
) -> Result<RenderSummary, RenderError>
where
    S: PcmSource + ?Sized,
    W: Write + Seek,
{
    if options.chunk_frames == 0 {
        return Err(RenderError::InvalidChunkSize);
    }

    let block_align = format.block_align() as usize;
    let mut buffer = vec![0u8; options.chunk_frames * block_align];
    let mut encoder = WavStreamEncoder::open(sink, format)?;

    let mut chunks = 0;
    let mut truncated = false;
    let mut next_progress = PROGRESS_INTERVAL_SECS;

    loop {
        if interrupted.load(Ordering::SeqCst) {
            let data_bytes = encoder.data_bytes();
            encoder.abort();
            return Err(RenderError::Interrupted { data_bytes });
        }

        let pull = match source.pull(&mut buffer) {
            Ok(pull) => pull,
            Err(e) => {
                let data_bytes = encoder.data_bytes();
                encoder.abort();
                // The same Ctrl+C may have killed the engine mid-pull
                if interrupted.load(Ordering::SeqCst) {
                    debug!("Source failed after interrupt: {}", e);
                    return Err(RenderError::Interrupted { data_bytes });
                }
                return Err(e.into());
            }
        };

        let mut bytes = pull.bytes.min(buffer.len());
        if let Some(max_frames) = options.max_frames {
            let remaining = max_frames.saturating_sub(encoder.frames_written());
            let allowed = remaining.saturating_mul(block_align as u64);
            if (bytes as u64) > allowed {
                bytes = allowed as usize;
                truncated = true;
            }
        }

        if bytes > 0 {
            encoder.write_chunk(&buffer[..bytes])?;
            chunks += 1;
            debug!("Chunk {}: {} bytes", chunks, bytes);

            let seconds = encoder.frames_written() / format.sample_rate() as u64;
            if seconds >= next_progress {
                info!("Rendered {}", format_duration(seconds as f64));
                next_progress = seconds + PROGRESS_INTERVAL_SECS;
            }
        }

        if pull.end_of_stream || truncated {
            break;
        }
    }

    if truncated {
        info!("Reached the duration limit; finishing early");
    }

    encoder.finalize()?;

    let frames = encoder.frames_written();
    Ok(RenderSummary {
        chunks,
        frames,
        data_bytes: encoder.data_bytes(),
        truncated,
        duration_secs: format.duration_secs(frames),
    })
}
