use hound::{SampleFormat, WavIntoSamples, WavReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{PcmSource, Pull, SourceError};
use crate::output::AudioFormat;

/// Re-encode an existing 16-bit integer WAV file
pub struct WavFileSource {
    samples: WavIntoSamples<BufReader<File>, i16>,
    format: AudioFormat,
    finished: bool,
}

impl WavFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();

        // Validate format
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(SourceError::UnsupportedWav(format!(
                "expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        let format = AudioFormat::pcm16(spec.sample_rate, spec.channels)
            .map_err(|e| SourceError::UnsupportedWav(e.to_string()))?;

        Ok(Self {
            samples: reader.into_samples(),
            format,
            finished: false,
        })
    }

    /// Format of the file being read; the output must use the same one
    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

impl PcmSource for WavFileSource {
    fn pull(&mut self, buf: &mut [u8]) -> Result<Pull, SourceError> {
        if self.finished {
            return Ok(Pull::last(0));
        }

        let mut filled = 0;
        for slot in buf.chunks_exact_mut(2) {
            match self.samples.next() {
                Some(sample) => {
                    slot.copy_from_slice(&sample?.to_le_bytes());
                    filled += 2;
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        // hound only yields whole frames for a well-formed file
        let block_align = self.format.block_align() as usize;
        let aligned = filled - filled % block_align;

        if self.finished {
            Ok(Pull::last(aligned))
        } else {
            Ok(Pull::data(aligned))
        }
    }
}
