//! Streaming WAV encoder.
//!
//! The encoder writes a placeholder header as soon as it is opened, appends
//! PCM chunks as they arrive and patches the two size fields on `finalize`.
//! The total length never has to be known up front and the payload is never
//! buffered in memory.

use log::{debug, warn};
use std::io::{Seek, SeekFrom, Write};

use super::header::{self, WavHeader, MAX_DATA_BYTES};
use super::{AudioFormat, EncodeError, EncodeResult};

/// Lifecycle of a [`WavStreamEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting chunks.
    Open,
    /// Header patched with the final sizes.
    Finalized,
    /// Sink released. Terminal.
    Closed,
}

/// Writes a canonical PCM WAV file to a seekable sink one chunk at a time.
///
/// The sink is owned by the encoder while it is `Open` and dropped as soon as
/// the encoder leaves that phase, on success and on failure alike.
pub struct WavStreamEncoder<W: Write + Seek> {
    sink: Option<W>,
    format: AudioFormat,
    start: u64,
    data_bytes: u32,
    phase: Phase,
}

impl<W: Write + Seek> WavStreamEncoder<W> {
    /// Write a placeholder header at the sink's current position and return
    /// an encoder ready for chunks.
    pub fn open(mut sink: W, format: AudioFormat) -> EncodeResult<Self> {
        let start = sink.stream_position().map_err(EncodeError::SinkSeek)?;

        sink.write_all(&header::encode(&format, 0))
            .map_err(EncodeError::SinkWrite)?;

        debug!(
            "Opened WAV stream at offset {} ({} Hz, {} ch, {}-bit)",
            start,
            format.sample_rate(),
            format.channels(),
            format.bits_per_sample()
        );

        Ok(Self {
            sink: Some(sink),
            format,
            start,
            data_bytes: 0,
            phase: Phase::Open,
        })
    }

    #[allow(dead_code)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Payload bytes accepted so far.
    pub fn data_bytes(&self) -> u32 {
        self.data_bytes
    }

    pub fn frames_written(&self) -> u64 {
        self.format.frames(self.data_bytes as u64)
    }

    /// Append a chunk of interleaved PCM.
    ///
    /// The chunk must hold whole frames. A rejected chunk leaves the running
    /// total untouched; an I/O failure closes the encoder.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> EncodeResult<()> {
        self.ensure_open("write to")?;

        let block_align = self.format.block_align();
        if bytes.len() % block_align as usize != 0 {
            return Err(EncodeError::MisalignedChunk {
                len: bytes.len(),
                block_align,
            });
        }

        let total = u32::try_from(bytes.len())
            .ok()
            .and_then(|len| self.data_bytes.checked_add(len))
            .filter(|&total| total <= MAX_DATA_BYTES)
            .ok_or(EncodeError::DataOverflow {
                len: bytes.len(),
                written: self.data_bytes,
            })?;

        if bytes.is_empty() {
            return Ok(());
        }

        let result = match self.sink.as_mut() {
            Some(sink) => sink.write_all(bytes),
            None => return Err(self.invalid_state("write to")),
        };

        if let Err(e) = result {
            warn!(
                "Write failed after {} payload bytes, closing output: {}",
                self.data_bytes, e
            );
            self.release();
            return Err(EncodeError::SinkWrite(e));
        }

        self.data_bytes = total;
        Ok(())
    }

    /// Patch the header with the final sizes and release the sink.
    ///
    /// On failure the encoder is closed and the file keeps its placeholder
    /// header.
    pub fn finalize(&mut self) -> EncodeResult<()> {
        self.ensure_open("finalize")?;

        let Some(mut sink) = self.sink.take() else {
            return Err(self.invalid_state("finalize"));
        };
        let header = WavHeader::new(&self.format, self.data_bytes);

        // Sink is dropped when this scope ends, whatever the outcome.
        match patch_header(&mut sink, self.start, &header) {
            Ok(()) => {
                self.phase = Phase::Finalized;
                debug!("Finalized WAV stream with {} data bytes", self.data_bytes);
                Ok(())
            }
            Err(e) => {
                self.phase = Phase::Closed;
                warn!("Could not patch WAV header, output keeps placeholder sizes: {}", e);
                Err(e)
            }
        }
    }

    /// Close without touching the header. Safe to call repeatedly.
    pub fn abort(&mut self) {
        if self.phase == Phase::Open {
            debug!("Aborting WAV stream after {} data bytes", self.data_bytes);
        }
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush() {
                warn!("Failed to flush output while closing: {}", e);
            }
        }
        self.phase = Phase::Closed;
    }

    fn ensure_open(&self, op: &'static str) -> EncodeResult<()> {
        if self.phase == Phase::Open {
            Ok(())
        } else {
            Err(self.invalid_state(op))
        }
    }

    fn invalid_state(&self, op: &'static str) -> EncodeError {
        EncodeError::InvalidState {
            op,
            phase: self.phase,
        }
    }
}

impl<W: Write + Seek> Drop for WavStreamEncoder<W> {
    fn drop(&mut self) {
        if self.phase == Phase::Open {
            warn!(
                "WAV encoder dropped without finalize; {} data bytes left behind a placeholder header",
                self.data_bytes
            );
            self.abort();
        }
    }
}

fn patch_header<W: Write + Seek>(sink: &mut W, start: u64, header: &WavHeader) -> EncodeResult<()> {
    sink.flush().map_err(EncodeError::SinkWrite)?;
    let end = sink.stream_position().map_err(EncodeError::SinkSeek)?;

    sink.seek(SeekFrom::Start(start)).map_err(EncodeError::SinkSeek)?;
    header.write(sink).map_err(EncodeError::SinkWrite)?;

    sink.seek(SeekFrom::Start(end)).map_err(EncodeError::SinkSeek)?;
    sink.flush().map_err(EncodeError::SinkWrite)
}
