use log::{debug, warn};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::net::TcpStream;
use std::path::Path;

use super::{PcmSource, Pull, SourceError};

/// Raw interleaved PCM read from any byte stream (file, stdin, pipe, socket)
pub struct ReaderSource<R: Read> {
    reader: R,
    block_align: usize,
    finished: bool,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R, block_align: u16) -> Self {
        Self {
            reader,
            block_align: block_align.max(1) as usize,
            finished: false,
        }
    }

    /// Read until `buf` is full or the stream ends
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl ReaderSource<Box<dyn Read + Send>> {
    /// Open a raw PCM file, or stdin when `path` is `-`
    pub fn open<P: AsRef<Path>>(path: P, block_align: u16) -> io::Result<Self> {
        let path = path.as_ref();
        let reader: Box<dyn Read + Send> = if path == Path::new("-") {
            Box::new(io::stdin())
        } else {
            Box::new(BufReader::new(File::open(path)?))
        };
        Ok(Self::new(reader, block_align))
    }
}

impl ReaderSource<BufReader<TcpStream>> {
    /// Connect to a TCP endpoint streaming raw PCM
    pub fn connect(addr: &str, block_align: u16) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        debug!("Connected to PCM stream at {}", addr);
        Ok(Self::new(BufReader::new(stream), block_align))
    }
}

impl<R: Read> PcmSource for ReaderSource<R> {
    fn pull(&mut self, buf: &mut [u8]) -> Result<Pull, SourceError> {
        if self.finished {
            return Ok(Pull::last(0));
        }

        let filled = self.fill(buf)?;
        let aligned = filled - filled % self.block_align;

        if filled < buf.len() {
            self.finished = true;
            if aligned != filled {
                warn!(
                    "Dropping {} trailing byte(s) that do not form a whole frame",
                    filled - aligned
                );
            }
            return Ok(Pull::last(aligned));
        }

        Ok(Pull::data(aligned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per read call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_full_chunks_then_tail() {
        let data: Vec<u8> = (0..20).collect();
        let mut source = ReaderSource::new(Cursor::new(data), 4);
        let mut buf = [0u8; 8];

        assert_eq!(source.pull(&mut buf).unwrap(), Pull::data(8));
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::data(8));
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::last(4));
        assert_eq!(&buf[..4], &[16, 17, 18, 19]);
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::last(0));
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_pull() {
        let mut source = ReaderSource::new(Cursor::new(vec![0u8; 16]), 4);
        let mut buf = [0u8; 8];

        assert_eq!(source.pull(&mut buf).unwrap(), Pull::data(8));
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::data(8));
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::last(0));
    }

    #[test]
    fn test_partial_frame_dropped() {
        let mut source = ReaderSource::new(Cursor::new(vec![1u8; 11]), 4);
        let mut buf = [0u8; 16];
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::last(8));
    }

    #[test]
    fn test_short_reads_are_coalesced() {
        let reader = Trickle {
            data: Cursor::new((0..12).collect()),
            step: 3,
        };
        let mut source = ReaderSource::new(reader, 4);
        let mut buf = [0u8; 8];

        assert_eq!(source.pull(&mut buf).unwrap(), Pull::data(8));
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::last(4));
    }

    #[test]
    fn test_open_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.raw");
        std::fs::write(&path, [9u8; 6]).unwrap();

        let mut source = ReaderSource::open(&path, 2).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::data(4));
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::last(2));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReaderSource::open(dir.path().join("missing.raw"), 4).is_err());
    }
}
