use hound::{SampleFormat, WavReader};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

use super::header::{WavHeader, HEADER_LEN};
use super::AudioFormat;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("not a canonical PCM WAV header")]
    BadHeader,

    #[error("WAV decode failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("{field} mismatch: expected {expected}, found {found}")]
    Mismatch {
        field: &'static str,
        expected: u64,
        found: u64,
    },
}

/// What a rendered file claims to contain
#[derive(Debug, Clone, Copy)]
pub struct VerifiedWav {
    pub header: WavHeader,
    pub frames: u32,
}

/// Re-open a rendered WAV and check that both its raw header and an
/// independent decoder agree with what was written.
pub fn verify_wav<P: AsRef<Path>>(
    path: P,
    format: &AudioFormat,
    data_bytes: u32,
) -> Result<VerifiedWav, VerifyError> {
    let path = path.as_ref();
    let io_err = |source| VerifyError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut raw = [0u8; HEADER_LEN];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut raw))
        .map_err(io_err)?;
    let header = WavHeader::decode(&raw).ok_or(VerifyError::BadHeader)?;

    check("data size", data_bytes as u64, header.data_size as u64)?;
    check("RIFF size", 36 + data_bytes as u64, header.riff_size as u64)?;

    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    check("sample format", 1, matches!(spec.sample_format, SampleFormat::Int) as u64)?;
    check("channel count", format.channels() as u64, spec.channels as u64)?;
    check("sample rate", format.sample_rate() as u64, spec.sample_rate as u64)?;
    check("bit depth", format.bits_per_sample() as u64, spec.bits_per_sample as u64)?;

    let frames = reader.duration();
    check("frame count", format.frames(data_bytes as u64), frames as u64)?;

    Ok(VerifiedWav { header, frames })
}

fn check(field: &'static str, expected: u64, found: u64) -> Result<(), VerifyError> {
    if expected == found {
        Ok(())
    } else {
        Err(VerifyError::Mismatch {
            field,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::WavStreamEncoder;
    use std::io::BufWriter;

    fn render(path: &Path, format: AudioFormat, payload: &[u8]) {
        let file = BufWriter::new(File::create(path).unwrap());
        let mut encoder = WavStreamEncoder::open(file, format).unwrap();
        encoder.write_chunk(payload).unwrap();
        encoder.finalize().unwrap();
    }

    #[test]
    fn test_verify_rendered_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.wav");
        let format = AudioFormat::pcm16(44100, 2).unwrap();
        render(&path, format, &[0; 400]);

        let verified = verify_wav(&path, &format, 400).unwrap();
        assert_eq!(verified.frames, 100);
        assert_eq!(verified.header.data_size, 400);
    }

    #[test]
    fn test_verify_detects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        let format = AudioFormat::pcm16(44100, 1).unwrap();
        render(&path, format, &[0; 20]);

        let err = verify_wav(&path, &format, 40).unwrap_err();
        assert!(
            matches!(err, VerifyError::Mismatch { field: "data size", expected: 40, found: 20 }),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_verify_detects_wrong_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        render(&path, AudioFormat::pcm16(22050, 1).unwrap(), &[0; 8]);

        let expected = AudioFormat::pcm16(22050, 2).unwrap();
        let err = verify_wav(&path, &expected, 8).unwrap_err();
        assert!(
            matches!(err, VerifyError::Mismatch { field: "channel count", .. }),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, [0x55u8; 64]).unwrap();

        let format = AudioFormat::pcm16(48000, 2).unwrap();
        assert!(matches!(verify_wav(&path, &format, 20), Err(VerifyError::BadHeader)));
    }
}
