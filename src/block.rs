// SPDX-License-Identifier: MIT
//! Binary block framing: scanning blocks out of a stream and writing them
//!
//! Reading a block only parses its header. The payload is loaded, checked
//! and decompressed by a [`Memoized`] factory the first time it is needed.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::checksum;
use crate::codec::{decompress_block, Compression, CompressionEngine};
use crate::datatype::ScalarTypeId;
use crate::error::{AsdfError, Result};
use crate::format::{BlockHeader, BLOCK_HEADER_FIELDS_SIZE, BLOCK_MAGIC};
use crate::memoized::Memoized;

/// A seekable byte source that can be shared between threads
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Stream shared by a document and the lazy loaders of its blocks
pub type SharedStream = Arc<Mutex<Box<dyn ReadSeek>>>;

pub fn shared_stream<R: ReadSeek + 'static>(reader: R) -> SharedStream {
    Arc::new(Mutex::new(Box::new(reader)))
}

/// Decompressed block payload, tagged with its element type when known
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    bytes: Vec<u8>,
    element: Option<ScalarTypeId>,
}

impl Block {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            element: None,
        }
    }

    pub fn typed(bytes: Vec<u8>, element: ScalarTypeId) -> Self {
        Self {
            bytes,
            element: Some(element),
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn element(&self) -> Option<ScalarTypeId> {
        self.element
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Everything known about a block after its header was scanned
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockInfo {
    #[serde(flatten)]
    pub header: BlockHeader,
    /// Header bytes consumed after `header_size`
    pub header_read: u64,
    /// Codec named by the header's compression tag
    pub compression: Compression,
    /// Stream offset of the block magic
    pub block_offset: u64,
    /// Stream offset of the stored payload
    pub data_offset: u64,
}

impl BlockInfo {
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.header.checksum)
    }
}

fn header_error(err: std::io::Error) -> AsdfError {
    match err.kind() {
        ErrorKind::UnexpectedEof => AsdfError::MalformedHeader("truncated block header".to_string()),
        ErrorKind::InvalidData => AsdfError::MalformedHeader(err.to_string()),
        _ => AsdfError::Io(err),
    }
}

/// Read as many bytes as are available, up to `buf.len()`
fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Scan one block at the current stream position.
///
/// Returns `None` when the next bytes are not a block magic; the stream is
/// then left where the scan started so the caller can read what follows
/// (a block index or end of file). On success the stream is positioned
/// after the block's payload and padding.
pub fn read_block(
    stream: &SharedStream,
    verify_checksums: bool,
) -> Result<Option<(Memoized<Block>, BlockInfo)>> {
    let mut guard = stream.lock();
    let block_offset = guard.stream_position()?;

    let mut magic = [0u8; 4];
    let n = read_up_to(&mut *guard, &mut magic)?;
    if n < magic.len() || magic != BLOCK_MAGIC {
        guard.seek(SeekFrom::Current(-(n as i64)))?;
        return Ok(None);
    }

    let (header, header_read) = BlockHeader::read_from(&mut *guard).map_err(header_error)?;
    header.validate().map_err(AsdfError::MalformedHeader)?;
    let compression = Compression::from_tag(&header.compression)?;
    if !compression.is_available() {
        return Err(AsdfError::UnsupportedCodec(format!(
            "block at offset {block_offset} uses {}, which is not available in this build",
            compression.name()
        )));
    }

    let data_offset = guard.stream_position()?;
    let end = guard.seek(SeekFrom::End(0))?;
    let block_end = data_offset
        .checked_add(header.used_space)
        .filter(|&e| e <= end)
        .ok_or_else(|| {
            AsdfError::MalformedHeader(format!(
                "block at offset {block_offset} extends past the end of the stream"
            ))
        })?;
    guard.seek(SeekFrom::Start(block_end))?;
    drop(guard);

    let info = BlockInfo {
        header,
        header_read,
        compression,
        block_offset,
        data_offset,
    };
    tracing::debug!(
        offset = block_offset,
        compression = compression.name(),
        stored = header.allocated_space,
        data = header.data_space,
        "scanned block"
    );

    let source = Arc::clone(stream);
    let block = Memoized::new(move || load_payload(&source, &info, verify_checksums));
    Ok(Some((block, info)))
}

fn load_payload(stream: &SharedStream, info: &BlockInfo, verify_checksums: bool) -> Result<Arc<Block>> {
    let stored_len = usize::try_from(info.header.allocated_space).map_err(|_| {
        AsdfError::MalformedHeader("block payload does not fit in memory".to_string())
    })?;
    let data_len = usize::try_from(info.header.data_space).map_err(|_| {
        AsdfError::MalformedHeader("block data does not fit in memory".to_string())
    })?;

    let mut stored = vec![0u8; stored_len];
    {
        let mut guard = stream.lock();
        guard.seek(SeekFrom::Start(info.data_offset))?;
        guard.read_exact(&mut stored)?;
    }

    if verify_checksums {
        checksum::verify(&stored, &info.header.checksum)?;
    }
    let data = decompress_block(&stored, info.compression, data_len)?;
    tracing::trace!(offset = info.block_offset, bytes = data.len(), "loaded block payload");
    Ok(Arc::new(Block::new(data)))
}

/// Write one block at the current position.
///
/// The requested codec is only used when it is available and actually
/// shrinks the payload. `header_size` is written as a placeholder and
/// patched once the header length is known.
pub fn write_block<W: Write + Seek>(
    out: &mut W,
    block: &Block,
    compression: Compression,
    level: i32,
) -> Result<BlockHeader> {
    let (used, stored) = CompressionEngine::new(compression, level).compress(block.bytes())?;
    let mut header = BlockHeader::new(
        used,
        stored.len() as u64,
        block.len() as u64,
        checksum::compute(&stored),
    );

    out.write_all(&BLOCK_MAGIC)?;
    let size_pos = out.stream_position()?;
    out.write_all(&0u16.to_be_bytes())?;
    let mut fields = Vec::with_capacity(BLOCK_HEADER_FIELDS_SIZE);
    header.write_fields(&mut fields);
    out.write_all(&fields)?;
    let payload_pos = out.stream_position()?;

    header.header_size = u16::try_from(payload_pos - size_pos - 2).map_err(|_| {
        AsdfError::MalformedHeader("block header does not fit in header_size".to_string())
    })?;
    out.seek(SeekFrom::Start(size_pos))?;
    out.write_all(&header.header_size.to_be_bytes())?;
    out.seek(SeekFrom::Start(payload_pos))?;

    out.write_all(&stored)?;
    let padding = header.padding() as usize;
    if padding > 0 {
        out.write_all(&vec![0u8; padding])?;
    }

    tracing::debug!(
        compression = used.name(),
        stored = header.allocated_space,
        data = header.data_space,
        "wrote block"
    );
    Ok(header)
}
