// SPDX-License-Identifier: MIT
//! ASDF file format constants and the binary block header
//!
//! All header integers are big-endian.

use std::io::{Read, Write};

use serde::Serialize;

use crate::checksum::{Checksum, CHECKSUM_SIZE, NO_CHECKSUM};
use crate::codec::Compression;

/// Block magic bytes: `0xD3 'B' 'L' 'K'`
pub const BLOCK_MAGIC: [u8; 4] = [0xd3, 0x42, 0x4c, 0x4b];

/// Bytes of the fixed header fields that follow `header_size`
pub const BLOCK_HEADER_FIELDS_SIZE: usize = 4 + 4 + 8 + 8 + 8 + CHECKSUM_SIZE;

/// Version written in the `#ASDF` line
pub const ASDF_FORMAT_VERSION: &str = "1.0.0";

/// Version written in the `#ASDF_STANDARD` line
pub const ASDF_STANDARD_VERSION: &str = "1.1.0";

pub const FILE_MAGIC: &str = "#ASDF";
pub const STANDARD_MAGIC: &str = "#ASDF_STANDARD";
pub const FILE_COMMENT: &str = "# This is an ASDF file <https://asdf-standard.readthedocs.io/>";
pub const YAML_DIRECTIVE: &str = "%YAML 1.1";
pub const PRIMARY_TAG_DIRECTIVE: &str = "%TAG ! tag:stsci.edu:asdf/";
pub const DOCUMENT_START: &str = "---";
pub const DOCUMENT_END: &str = "...";
pub const BLOCK_INDEX_HEADER: &str = "#ASDF BLOCK INDEX";

/// Header of one binary block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHeader {
    /// Bytes following the `header_size` field, up to the payload
    pub header_size: u16,
    /// Must be zero
    pub flags: u32,
    /// Raw compression tag
    #[serde(rename = "compression_tag", serialize_with = "serialize_tag")]
    pub compression: [u8; 4],
    /// Length of the stored (possibly compressed) payload
    pub allocated_space: u64,
    /// Bytes the block occupies after its header; anything past
    /// `allocated_space` is padding
    pub used_space: u64,
    /// Decompressed payload length
    pub data_space: u64,
    /// MD5 of the stored (compressed) bytes, or zeros
    #[serde(serialize_with = "serialize_checksum")]
    pub checksum: Checksum,
}

fn serialize_tag<S: serde::Serializer>(tag: &[u8; 4], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(tag).trim_end_matches('\0'))
}

fn serialize_checksum<S: serde::Serializer>(checksum: &Checksum, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(checksum))
}

impl BlockHeader {
    /// Header for `stored` bytes that expand to `data_space` bytes
    pub fn new(compression: Compression, stored: u64, data_space: u64, checksum: Checksum) -> Self {
        Self {
            header_size: BLOCK_HEADER_FIELDS_SIZE as u16,
            flags: 0,
            compression: compression.tag(),
            allocated_space: stored,
            used_space: stored,
            data_space,
            checksum,
        }
    }

    /// Parse the fixed fields that follow the magic and `header_size`
    pub fn from_bytes(header_size: u16, bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < BLOCK_HEADER_FIELDS_SIZE {
            return Err(format!(
                "Block header needs {} bytes, got {}",
                BLOCK_HEADER_FIELDS_SIZE,
                bytes.len()
            ));
        }

        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_be_bytes(buf)
        };
        let mut flags = [0u8; 4];
        flags.copy_from_slice(&bytes[0..4]);
        let mut compression = [0u8; 4];
        compression.copy_from_slice(&bytes[4..8]);
        let mut checksum = NO_CHECKSUM;
        checksum.copy_from_slice(&bytes[32..32 + CHECKSUM_SIZE]);

        Ok(Self {
            header_size,
            flags: u32::from_be_bytes(flags),
            compression,
            allocated_space: u64_at(8),
            used_space: u64_at(16),
            data_space: u64_at(24),
            checksum,
        })
    }

    /// Read `header_size` and the header fields; the magic was already consumed.
    ///
    /// Returns the header and the number of header bytes read after
    /// `header_size`. Any remaining `header_size` bytes are skipped.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, u64), std::io::Error> {
        let mut size = [0u8; 2];
        reader.read_exact(&mut size)?;
        let header_size = u16::from_be_bytes(size);
        if (header_size as usize) < BLOCK_HEADER_FIELDS_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "header_size {} is smaller than the {} bytes of header fields",
                    header_size, BLOCK_HEADER_FIELDS_SIZE
                ),
            ));
        }
        let mut fields = [0u8; BLOCK_HEADER_FIELDS_SIZE];
        reader.read_exact(&mut fields)?;
        let header = Self::from_bytes(header_size, &fields)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let header_read = BLOCK_HEADER_FIELDS_SIZE as u64;
        let extra = header_size as u64 - header_read;
        if extra > 0 {
            std::io::copy(&mut reader.take(extra), &mut std::io::sink())?;
        }
        Ok((header, header_read))
    }

    /// Validate the header fields
    pub fn validate(&self) -> Result<(), String> {
        if self.flags != 0 {
            return Err(format!("Unsupported block flags: {:#010x}", self.flags));
        }

        if self.used_space < self.allocated_space {
            return Err(format!(
                "used_space {} is smaller than allocated_space {}",
                self.used_space, self.allocated_space
            ));
        }

        Ok(())
    }

    /// Offset of the payload from the start of the magic
    #[inline]
    pub fn payload_offset(&self) -> u64 {
        (BLOCK_MAGIC.len() + 2) as u64 + self.header_size as u64
    }

    /// Total bytes the block occupies in the stream
    #[inline]
    pub fn total_size(&self) -> u64 {
        self.payload_offset() + self.used_space
    }

    /// Padding bytes that follow the payload
    #[inline]
    pub fn padding(&self) -> u64 {
        self.used_space.saturating_sub(self.allocated_space)
    }

    /// Write magic and header directly to buffer
    #[inline]
    pub fn write_to_buffer(&self, buffer: &mut Vec<u8>) {
        buffer.reserve(BLOCK_MAGIC.len() + 2 + self.header_size as usize);

        buffer.extend_from_slice(&BLOCK_MAGIC);
        buffer.extend_from_slice(&self.header_size.to_be_bytes());
        self.write_fields(buffer);
        let padding = (self.header_size as usize).saturating_sub(BLOCK_HEADER_FIELDS_SIZE);
        buffer.resize(buffer.len() + padding, 0);
    }

    /// Write the fields that follow `header_size`
    #[inline]
    pub fn write_fields(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.flags.to_be_bytes());
        buffer.extend_from_slice(&self.compression);
        buffer.extend_from_slice(&self.allocated_space.to_be_bytes());
        buffer.extend_from_slice(&self.used_space.to_be_bytes());
        buffer.extend_from_slice(&self.data_space.to_be_bytes());
        buffer.extend_from_slice(&self.checksum);
    }

    /// Write magic and header to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        let mut buffer = Vec::with_capacity(BLOCK_MAGIC.len() + 2 + self.header_size as usize);
        self.write_to_buffer(&mut buffer);
        writer.write_all(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> BlockHeader {
        BlockHeader::new(Compression::Zlib, 100, 400, [7; CHECKSUM_SIZE])
    }

    #[test]
    fn test_header_layout() {
        let mut buffer = Vec::new();
        sample().write_to_buffer(&mut buffer);
        assert_eq!(buffer.len(), 4 + 2 + 48);
        assert_eq!(&buffer[0..4], &BLOCK_MAGIC);
        assert_eq!(&buffer[4..6], &48u16.to_be_bytes());
        assert_eq!(&buffer[6..10], &[0, 0, 0, 0]);
        assert_eq!(&buffer[10..14], b"zlib");
        assert_eq!(&buffer[14..22], &100u64.to_be_bytes());
        assert_eq!(&buffer[22..30], &100u64.to_be_bytes());
        assert_eq!(&buffer[30..38], &400u64.to_be_bytes());
        assert_eq!(&buffer[38..54], &[7; 16]);
    }

    #[test]
    fn test_read_round_trip() {
        let header = sample();
        let mut buffer = Vec::new();
        header.write_to(&mut buffer).unwrap();
        let mut cursor = Cursor::new(&buffer[4..]);
        let (read, header_read) = BlockHeader::read_from(&mut cursor).unwrap();
        assert_eq!(read, header);
        assert_eq!(header_read, 48);
        assert_eq!(read.payload_offset(), 54);
        assert_eq!(read.total_size(), 154);
    }

    #[test]
    fn test_larger_header_size_is_skipped() {
        let mut header = sample();
        header.header_size = 60;
        let mut buffer = Vec::new();
        header.write_to_buffer(&mut buffer);
        buffer.push(0xaa);
        let mut cursor = Cursor::new(&buffer[4..]);
        let (read, header_read) = BlockHeader::read_from(&mut cursor).unwrap();
        assert_eq!(read.header_size, 60);
        assert_eq!(header_read, 48);
        assert_eq!(cursor.position(), 62);
    }

    #[test]
    fn test_short_header_size_rejected() {
        let mut buffer = 20u16.to_be_bytes().to_vec();
        buffer.extend_from_slice(&[0; 64]);
        assert!(BlockHeader::read_from(&mut Cursor::new(buffer)).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(sample().validate().is_ok());

        let mut header = sample();
        header.flags = 1;
        assert!(header.validate().is_err());

        let mut header = sample();
        header.used_space = 99;
        assert!(header.validate().is_err());

        let mut header = sample();
        header.used_space = 200;
        assert!(header.validate().is_ok());
        assert_eq!(header.padding(), 100);
    }
}
