//! Canonical 44-byte PCM WAV header.
//!
//! Fields are serialized one by one in little-endian order, so the wire layout
//! never depends on how the host lays out a struct in memory.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read, Write};

use super::AudioFormat;

/// Size of the canonical header in bytes.
pub const HEADER_LEN: usize = 44;

/// Bytes of header that follow the RIFF size field.
const RIFF_OVERHEAD: u32 = 36;

/// `fmt ` chunk size for plain PCM.
const FMT_CHUNK_SIZE: u32 = 16;

/// WAVE_FORMAT_PCM.
const FORMAT_PCM: u16 = 1;

/// Largest payload a canonical header can describe.
pub const MAX_DATA_BYTES: u32 = u32::MAX - RIFF_OVERHEAD;

/// The header of a canonical PCM WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Header describing `data_bytes` bytes of payload in `format`.
    pub fn new(format: &AudioFormat, data_bytes: u32) -> Self {
        Self {
            riff_size: RIFF_OVERHEAD.saturating_add(data_bytes),
            channels: format.channels(),
            sample_rate: format.sample_rate(),
            byte_rate: format.byte_rate(),
            block_align: format.block_align(),
            bits_per_sample: format.bits_per_sample(),
            data_size: data_bytes,
        }
    }

    /// Serialize to the byte-exact wire layout.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];

        // RIFF header
        bytes[0..4].copy_from_slice(b"RIFF");
        LittleEndian::write_u32(&mut bytes[4..8], self.riff_size);
        bytes[8..12].copy_from_slice(b"WAVE");

        // fmt chunk
        bytes[12..16].copy_from_slice(b"fmt ");
        LittleEndian::write_u32(&mut bytes[16..20], FMT_CHUNK_SIZE);
        LittleEndian::write_u16(&mut bytes[20..22], FORMAT_PCM);
        LittleEndian::write_u16(&mut bytes[22..24], self.channels);
        LittleEndian::write_u32(&mut bytes[24..28], self.sample_rate);
        LittleEndian::write_u32(&mut bytes[28..32], self.byte_rate);
        LittleEndian::write_u16(&mut bytes[32..34], self.block_align);
        LittleEndian::write_u16(&mut bytes[34..36], self.bits_per_sample);

        // data chunk
        bytes[36..40].copy_from_slice(b"data");
        LittleEndian::write_u32(&mut bytes[40..44], self.data_size);

        bytes
    }

    /// Write the header fields to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }

    /// Parse a canonical PCM header.
    ///
    /// Returns `None` when the chunk ids are wrong, the fmt chunk is not
    /// 16 bytes, or the format code is not integer PCM.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let mut reader = Cursor::new(&bytes[..HEADER_LEN]);
        Self::read(&mut reader).ok().flatten()
    }

    fn read<R: Read>(reader: &mut R) -> io::Result<Option<Self>> {
        let mut id = [0u8; 4];

        reader.read_exact(&mut id)?;
        if &id != b"RIFF" {
            return Ok(None);
        }
        let riff_size = reader.read_u32::<LittleEndian>()?;
        reader.read_exact(&mut id)?;
        if &id != b"WAVE" {
            return Ok(None);
        }

        reader.read_exact(&mut id)?;
        if &id != b"fmt " || reader.read_u32::<LittleEndian>()? != FMT_CHUNK_SIZE {
            return Ok(None);
        }
        if reader.read_u16::<LittleEndian>()? != FORMAT_PCM {
            return Ok(None);
        }
        let channels = reader.read_u16::<LittleEndian>()?;
        let sample_rate = reader.read_u32::<LittleEndian>()?;
        let byte_rate = reader.read_u32::<LittleEndian>()?;
        let block_align = reader.read_u16::<LittleEndian>()?;
        let bits_per_sample = reader.read_u16::<LittleEndian>()?;

        reader.read_exact(&mut id)?;
        if &id != b"data" {
            return Ok(None);
        }
        let data_size = reader.read_u32::<LittleEndian>()?;

        Ok(Some(Self {
            riff_size,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
            data_size,
        }))
    }
}

/// Serialize the header for `data_bytes` bytes of payload in `format`.
///
/// With `data_bytes == 0` this is the placeholder written before any payload.
pub fn encode(format: &AudioFormat, data_bytes: u32) -> [u8; HEADER_LEN] {
    WavHeader::new(format, data_bytes).encode()
}
