// SPDX-License-Identifier: MIT
//! Block compression codecs and the write-side fallback policy
//!
//! Each codec is identified by the 4-byte tag stored in the block header.
//! Codecs are compiled in behind cargo features and report their own
//! availability, so a build without a codec can still recognize its tag.
//!
//! The streaming codecs (zlib, bzip2) are fed in chunks of at most
//! `u32::MAX` bytes and stop on the library's own end-of-stream status.

use std::borrow::Cow;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{AsdfError, Result};

/// Largest input slice handed to a streaming codec in one call
pub const CHUNK_LIMIT: usize = u32::MAX as usize;

/// Spare output capacity kept available for each streaming call
#[cfg(any(feature = "compression", feature = "bzip2", feature = "zstd"))]
const MIN_SPARE: usize = 64 * 1024;

/// Largest expansion of an LZ4 block: a 3-byte sequence plus one length
/// byte per extra 255 bytes of match
#[cfg(feature = "lz4")]
const LZ4_MAX_RATIO: usize = 255;

/// Compression applied to a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Zlib,
    Bzip2,
    Blosc,
    Blosc2,
    Lz4,
    Zstd,
}

impl Compression {
    pub const ALL: [Compression; 7] = [
        Compression::None,
        Compression::Zlib,
        Compression::Bzip2,
        Compression::Blosc,
        Compression::Blosc2,
        Compression::Lz4,
        Compression::Zstd,
    ];

    /// Tag stored in the block header
    pub fn tag(self) -> [u8; 4] {
        match self {
            Compression::None => [0; 4],
            Compression::Zlib => *b"zlib",
            Compression::Bzip2 => *b"bzp2",
            Compression::Blosc => *b"blsc",
            Compression::Blosc2 => *b"bls2",
            Compression::Lz4 => *b"lz4\0",
            Compression::Zstd => *b"zstd",
        }
    }

    pub fn from_tag(tag: &[u8; 4]) -> Result<Self> {
        Compression::ALL
            .iter()
            .copied()
            .find(|c| c.tag() == *tag)
            .ok_or_else(|| {
                AsdfError::UnsupportedCodec(format!(
                    "unknown compression tag {:?}",
                    String::from_utf8_lossy(tag)
                ))
            })
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zlib => "zlib",
            Compression::Bzip2 => "bzip2",
            Compression::Blosc => "blosc",
            Compression::Blosc2 => "blosc2",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }

    pub fn codec(self) -> &'static dyn Codec {
        match self {
            Compression::None => &NoneCodec,
            Compression::Zlib => &ZlibCodec,
            Compression::Bzip2 => &Bzip2Codec,
            Compression::Blosc => &BLOSC,
            Compression::Blosc2 => &BLOSC2,
            Compression::Lz4 => &Lz4Codec,
            Compression::Zstd => &ZstdCodec,
        }
    }

    #[inline]
    pub fn is_available(self) -> bool {
        self.codec().is_available()
    }

    /// Accepted compression levels
    pub fn level_range(self) -> RangeInclusive<i32> {
        match self {
            Compression::Zlib => 0..=9,
            Compression::Bzip2 => 1..=9,
            Compression::Zstd => 1..=22,
            Compression::None | Compression::Blosc | Compression::Blosc2 | Compression::Lz4 => {
                0..=9
            }
        }
    }

    /// Level used when none is given
    pub fn default_level(self) -> i32 {
        match self {
            Compression::Zlib => 6,
            Compression::Bzip2 => 9,
            Compression::Zstd => 3,
            _ => 0,
        }
    }
}

impl FromStr for Compression {
    type Err = AsdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Compression::None),
            "zlib" => Ok(Compression::Zlib),
            "bzip2" | "bzp2" => Ok(Compression::Bzip2),
            "blosc" | "blsc" => Ok(Compression::Blosc),
            "blosc2" | "bls2" => Ok(Compression::Blosc2),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            other => Err(AsdfError::UnsupportedCodec(format!(
                "unknown compression '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A block codec
pub trait Codec: Send + Sync {
    fn compression(&self) -> Compression;

    fn is_available(&self) -> bool;

    fn compress(&self, input: &[u8], level: i32) -> Result<Vec<u8>>;

    /// Decompress `input`, which must expand to exactly `expected_len` bytes
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

fn unavailable(compression: Compression) -> AsdfError {
    AsdfError::UnsupportedCodec(format!(
        "{} support is not available in this build",
        compression.name()
    ))
}

fn check_length(compression: Compression, out: Vec<u8>, expected_len: usize) -> Result<Vec<u8>> {
    if out.len() != expected_len {
        return Err(AsdfError::Decompression(format!(
            "{} produced {} bytes, expected {}",
            compression.name(),
            out.len(),
            expected_len
        )));
    }
    Ok(out)
}

#[cfg(any(feature = "compression", feature = "bzip2"))]
fn reserve_spare(output: &mut Vec<u8>) {
    if output.capacity() - output.len() < MIN_SPARE {
        output.reserve(output.capacity().max(MIN_SPARE));
    }
}

/// Output buffer for a decompression claimed to yield `expected_len` bytes.
///
/// `expected_len` comes from the block header, so the first allocation is
/// sized from the stored input and the buffer grows as output arrives.
#[cfg(any(feature = "compression", feature = "bzip2", feature = "zstd"))]
fn initial_output(input_len: usize, expected_len: usize) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let first = expected_len.min(input_len.saturating_mul(4).saturating_add(MIN_SPARE));
    output
        .try_reserve(first)
        .map_err(|e| AsdfError::Decompression(e.to_string()))?;
    Ok(output)
}

/// Make room for more output without letting it pass `limit` bytes
#[cfg(any(feature = "compression", feature = "bzip2"))]
fn grow_output(output: &mut Vec<u8>, limit: usize, compression: Compression) -> Result<()> {
    if output.len() >= limit {
        return Err(AsdfError::Decompression(format!(
            "{} output exceeds the {} bytes declared in the block header",
            compression.name(),
            limit - 1
        )));
    }
    if output.capacity() > output.len() {
        return Ok(());
    }
    let additional = output.len().max(MIN_SPARE).min(limit - output.len());
    output
        .try_reserve(additional)
        .map_err(|e| AsdfError::Decompression(e.to_string()))
}

struct NoneCodec;

impl Codec for NoneCodec {
    fn compression(&self) -> Compression {
        Compression::None
    }

    fn is_available(&self) -> bool {
        true
    }

    fn compress(&self, input: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        check_length(Compression::None, input.to_vec(), expected_len)
    }
}

struct ZlibCodec;

impl Codec for ZlibCodec {
    fn compression(&self) -> Compression {
        Compression::Zlib
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "compression")
    }

    #[cfg(feature = "compression")]
    fn compress(&self, input: &[u8], level: i32) -> Result<Vec<u8>> {
        zlib::deflate(input, level, CHUNK_LIMIT)
    }

    #[cfg(not(feature = "compression"))]
    fn compress(&self, _input: &[u8], _level: i32) -> Result<Vec<u8>> {
        Err(unavailable(Compression::Zlib))
    }

    #[cfg(feature = "compression")]
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let out = zlib::inflate(input, expected_len, CHUNK_LIMIT)?;
        check_length(Compression::Zlib, out, expected_len)
    }

    #[cfg(not(feature = "compression"))]
    fn decompress(&self, _input: &[u8], _expected_len: usize) -> Result<Vec<u8>> {
        Err(unavailable(Compression::Zlib))
    }
}

#[cfg(feature = "compression")]
mod zlib {
    use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};

    use super::{grow_output, initial_output, reserve_spare, Compression, MIN_SPARE};
    use crate::error::{AsdfError, Result};

    pub(super) fn deflate(input: &[u8], level: i32, chunk: usize) -> Result<Vec<u8>> {
        let level = flate2::Compression::new(level.clamp(0, 9) as u32);
        let mut stream = Compress::new(level, true);
        let mut output = Vec::with_capacity(input.len() / 2 + MIN_SPARE);
        loop {
            let consumed = stream.total_in() as usize;
            let end = consumed + (input.len() - consumed).min(chunk);
            let flush = if end == input.len() {
                FlushCompress::Finish
            } else {
                FlushCompress::None
            };
            reserve_spare(&mut output);
            let status = stream
                .compress_vec(&input[consumed..end], &mut output, flush)
                .map_err(|e| AsdfError::Compression(e.to_string()))?;
            if matches!(status, Status::StreamEnd) {
                break;
            }
        }
        Ok(output)
    }

    pub(super) fn inflate(input: &[u8], expected_len: usize, chunk: usize) -> Result<Vec<u8>> {
        let mut stream = Decompress::new(true);
        let mut output = initial_output(input.len(), expected_len)?;
        let limit = expected_len.saturating_add(1);
        loop {
            let consumed = stream.total_in() as usize;
            let end = consumed + (input.len() - consumed).min(chunk);
            let flush = if end == input.len() {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            grow_output(&mut output, limit, Compression::Zlib)?;
            let before = (stream.total_in(), stream.total_out());
            let status = stream
                .decompress_vec(&input[consumed..end], &mut output, flush)
                .map_err(|e| AsdfError::Decompression(e.to_string()))?;
            if matches!(status, Status::StreamEnd) {
                break;
            }
            if (stream.total_in(), stream.total_out()) == before {
                return Err(AsdfError::Decompression(
                    "zlib stream ended before its end marker".to_string(),
                ));
            }
        }
        if stream.total_in() as usize != input.len() {
            return Err(AsdfError::Decompression(format!(
                "{} trailing bytes after zlib stream",
                input.len() - stream.total_in() as usize
            )));
        }
        Ok(output)
    }
}

struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn compression(&self) -> Compression {
        Compression::Bzip2
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "bzip2")
    }

    #[cfg(feature = "bzip2")]
    fn compress(&self, input: &[u8], level: i32) -> Result<Vec<u8>> {
        bz::compress(input, level, CHUNK_LIMIT)
    }

    #[cfg(not(feature = "bzip2"))]
    fn compress(&self, _input: &[u8], _level: i32) -> Result<Vec<u8>> {
        Err(unavailable(Compression::Bzip2))
    }

    #[cfg(feature = "bzip2")]
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let out = bz::decompress(input, expected_len, CHUNK_LIMIT)?;
        check_length(Compression::Bzip2, out, expected_len)
    }

    #[cfg(not(feature = "bzip2"))]
    fn decompress(&self, _input: &[u8], _expected_len: usize) -> Result<Vec<u8>> {
        Err(unavailable(Compression::Bzip2))
    }
}

#[cfg(feature = "bzip2")]
mod bz {
    use bzip2::{Action, Compress, Decompress, Status};

    use super::{grow_output, initial_output, reserve_spare, Compression, MIN_SPARE};
    use crate::error::{AsdfError, Result};

    pub(super) fn compress(input: &[u8], level: i32, chunk: usize) -> Result<Vec<u8>> {
        let level = bzip2::Compression::new(level.clamp(1, 9) as u32);
        let mut stream = Compress::new(level, 0);
        let mut output = Vec::with_capacity(input.len() / 2 + MIN_SPARE);
        loop {
            let consumed = stream.total_in() as usize;
            let end = consumed + (input.len() - consumed).min(chunk);
            let action = if end == input.len() {
                Action::Finish
            } else {
                Action::Run
            };
            reserve_spare(&mut output);
            let status = stream
                .compress_vec(&input[consumed..end], &mut output, action)
                .map_err(|e| AsdfError::Compression(e.to_string()))?;
            if matches!(status, Status::StreamEnd) {
                break;
            }
        }
        Ok(output)
    }

    pub(super) fn decompress(input: &[u8], expected_len: usize, chunk: usize) -> Result<Vec<u8>> {
        let mut stream = Decompress::new(false);
        let mut output = initial_output(input.len(), expected_len)?;
        let limit = expected_len.saturating_add(1);
        loop {
            let consumed = stream.total_in() as usize;
            let end = consumed + (input.len() - consumed).min(chunk);
            grow_output(&mut output, limit, Compression::Bzip2)?;
            let before = (stream.total_in(), stream.total_out());
            let status = stream
                .decompress_vec(&input[consumed..end], &mut output)
                .map_err(|e| AsdfError::Decompression(e.to_string()))?;
            if matches!(status, Status::StreamEnd) {
                break;
            }
            if (stream.total_in(), stream.total_out()) == before {
                return Err(AsdfError::Decompression(
                    "bzip2 stream ended before its end marker".to_string(),
                ));
            }
        }
        if stream.total_in() as usize != input.len() {
            return Err(AsdfError::Decompression(format!(
                "{} trailing bytes after bzip2 stream",
                input.len() - stream.total_in() as usize
            )));
        }
        Ok(output)
    }
}

/// Blosc and blosc2 have no backend in this build
struct BloscCodec(Compression);

static BLOSC: BloscCodec = BloscCodec(Compression::Blosc);
static BLOSC2: BloscCodec = BloscCodec(Compression::Blosc2);

impl Codec for BloscCodec {
    fn compression(&self) -> Compression {
        self.0
    }

    fn is_available(&self) -> bool {
        false
    }

    fn compress(&self, _input: &[u8], _level: i32) -> Result<Vec<u8>> {
        Err(unavailable(self.0))
    }

    fn decompress(&self, _input: &[u8], _expected_len: usize) -> Result<Vec<u8>> {
        Err(unavailable(self.0))
    }
}

/// Raw LZ4 block format, no frame
struct Lz4Codec;

impl Codec for Lz4Codec {
    fn compression(&self) -> Compression {
        Compression::Lz4
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "lz4")
    }

    #[cfg(feature = "lz4")]
    fn compress(&self, input: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(lz4_flex::block::compress(input))
    }

    #[cfg(not(feature = "lz4"))]
    fn compress(&self, _input: &[u8], _level: i32) -> Result<Vec<u8>> {
        Err(unavailable(Compression::Lz4))
    }

    #[cfg(feature = "lz4")]
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        if expected_len > input.len().saturating_mul(LZ4_MAX_RATIO) {
            return Err(AsdfError::Decompression(format!(
                "{} lz4 bytes cannot expand to the {expected_len} bytes declared in the block header",
                input.len()
            )));
        }
        let out = lz4_flex::block::decompress(input, expected_len)
            .map_err(|e| AsdfError::Decompression(e.to_string()))?;
        check_length(Compression::Lz4, out, expected_len)
    }

    #[cfg(not(feature = "lz4"))]
    fn decompress(&self, _input: &[u8], _expected_len: usize) -> Result<Vec<u8>> {
        Err(unavailable(Compression::Lz4))
    }
}

struct ZstdCodec;

impl Codec for ZstdCodec {
    fn compression(&self) -> Compression {
        Compression::Zstd
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "zstd")
    }

    #[cfg(feature = "zstd")]
    fn compress(&self, input: &[u8], level: i32) -> Result<Vec<u8>> {
        zstd::bulk::compress(input, level).map_err(|e| AsdfError::Compression(e.to_string()))
    }

    #[cfg(not(feature = "zstd"))]
    fn compress(&self, _input: &[u8], _level: i32) -> Result<Vec<u8>> {
        Err(unavailable(Compression::Zstd))
    }

    #[cfg(feature = "zstd")]
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        use std::io::Read;

        let decoder = zstd::stream::read::Decoder::with_buffer(input)
            .map_err(|e| AsdfError::Decompression(e.to_string()))?;
        let mut out = initial_output(input.len(), expected_len)?;
        decoder
            .take((expected_len as u64).saturating_add(1))
            .read_to_end(&mut out)
            .map_err(|e| AsdfError::Decompression(e.to_string()))?;
        check_length(Compression::Zstd, out, expected_len)
    }

    #[cfg(not(feature = "zstd"))]
    fn decompress(&self, _input: &[u8], _expected_len: usize) -> Result<Vec<u8>> {
        Err(unavailable(Compression::Zstd))
    }
}

/// Chooses the stored form of a block payload
#[derive(Debug, Clone, Copy)]
pub struct CompressionEngine {
    requested: Compression,
    level: i32,
}

impl CompressionEngine {
    pub fn new(requested: Compression, level: i32) -> Self {
        Self { requested, level }
    }

    pub fn requested(&self) -> Compression {
        self.requested
    }

    /// Compress `data` with the requested codec.
    ///
    /// Falls back to storing the bytes uncompressed when the codec is not
    /// available in this build or when compression does not shrink the data.
    /// Returns the compression actually applied.
    pub fn compress<'a>(&self, data: &'a [u8]) -> Result<(Compression, Cow<'a, [u8]>)> {
        if self.requested == Compression::None {
            return Ok((Compression::None, Cow::Borrowed(data)));
        }
        if !self.requested.is_available() {
            tracing::warn!(
                compression = self.requested.name(),
                "codec unavailable, storing block uncompressed"
            );
            return Ok((Compression::None, Cow::Borrowed(data)));
        }
        let compressed = self.requested.codec().compress(data, self.level)?;
        if compressed.len() >= data.len() {
            tracing::debug!(
                compression = self.requested.name(),
                original = data.len(),
                compressed = compressed.len(),
                "compression does not shrink block, storing uncompressed"
            );
            return Ok((Compression::None, Cow::Borrowed(data)));
        }
        Ok((self.requested, Cow::Owned(compressed)))
    }
}

/// Expand stored block bytes to exactly `data_space` bytes
pub fn decompress_block(stored: &[u8], compression: Compression, data_space: usize) -> Result<Vec<u8>> {
    let codec = compression.codec();
    if !codec.is_available() {
        return Err(unavailable(compression));
    }
    codec.decompress(stored, data_space)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 17) as u8).collect()
    }

    #[test]
    fn test_tags_round_trip() {
        for c in Compression::ALL {
            assert_eq!(Compression::from_tag(&c.tag()).unwrap(), c);
            assert_eq!(c.name().parse::<Compression>().unwrap(), c);
        }
        assert_eq!(Compression::None.tag(), [0, 0, 0, 0]);
        assert!(matches!(
            Compression::from_tag(b"abcd"),
            Err(AsdfError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn test_available_codecs_round_trip() {
        let data = sample(10_000);
        for c in Compression::ALL.into_iter().filter(|c| c.is_available()) {
            let codec = c.codec();
            assert_eq!(codec.compression(), c);
            let packed = codec.compress(&data, c.default_level()).unwrap();
            assert_eq!(codec.decompress(&packed, data.len()).unwrap(), data, "{c}");
        }
    }

    #[test]
    fn test_blosc_is_unavailable() {
        assert!(!Compression::Blosc.is_available());
        assert!(!Compression::Blosc2.is_available());
        assert!(matches!(
            decompress_block(b"xx", Compression::Blosc, 2),
            Err(AsdfError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn test_engine_falls_back_when_unavailable() {
        let data = sample(4096);
        let (used, stored) = CompressionEngine::new(Compression::Blosc2, 5)
            .compress(&data)
            .unwrap();
        assert_eq!(used, Compression::None);
        assert_eq!(stored.as_ref(), data.as_slice());
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_engine_never_inflates() {
        let tiny = vec![42u8];
        let (used, stored) = CompressionEngine::new(Compression::Zlib, 9)
            .compress(&tiny)
            .unwrap();
        assert_eq!(used, Compression::None);
        assert_eq!(stored.len(), 1);

        let data = sample(8192);
        let (used, stored) = CompressionEngine::new(Compression::Zlib, 9)
            .compress(&data)
            .unwrap();
        assert_eq!(used, Compression::Zlib);
        assert!(stored.len() < data.len());
        assert_eq!(decompress_block(&stored, used, data.len()).unwrap(), data);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zlib_small_chunks() {
        let data = sample(5000);
        let packed = zlib::deflate(&data, 9, 7).unwrap();
        assert_eq!(zlib::inflate(&packed, data.len(), 3).unwrap(), data);
        assert_eq!(zlib::inflate(&packed, data.len(), CHUNK_LIMIT).unwrap(), data);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zlib_truncated_stream() {
        let data = sample(5000);
        let packed = zlib::deflate(&data, 6, CHUNK_LIMIT).unwrap();
        let truncated = &packed[..packed.len() / 2];
        assert!(matches!(
            Compression::Zlib.codec().decompress(truncated, data.len()),
            Err(AsdfError::Decompression(_))
        ));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zlib_wrong_expected_length() {
        let data = sample(1000);
        let packed = Compression::Zlib.codec().compress(&data, 6).unwrap();
        assert!(Compression::Zlib.codec().decompress(&packed, 999).is_err());
    }

    #[test]
    fn test_oversized_declared_length_is_an_error() {
        let data = sample(4096);
        for c in Compression::ALL
            .into_iter()
            .filter(|c| c.is_available() && *c != Compression::None)
        {
            let packed = c.codec().compress(&data, c.default_level()).unwrap();
            for declared in [usize::MAX, data.len() * 1000] {
                assert!(
                    matches!(
                        c.codec().decompress(&packed, declared),
                        Err(AsdfError::Decompression(_))
                    ),
                    "{c} accepted {declared} declared bytes"
                );
            }
        }
        assert!(matches!(
            decompress_block(&data, Compression::None, usize::MAX),
            Err(AsdfError::Decompression(_))
        ));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zlib_output_capped_at_declared_length() {
        let data = vec![0u8; 1 << 20];
        let packed = zlib::deflate(&data, 9, CHUNK_LIMIT).unwrap();
        let err = zlib::inflate(&packed, 1000, CHUNK_LIMIT).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[cfg(feature = "bzip2")]
    #[test]
    fn test_bzip2_small_chunks() {
        let data = sample(5000);
        let packed = bz::compress(&data, 9, 11).unwrap();
        assert_eq!(bz::decompress(&packed, data.len(), 5).unwrap(), data);
    }
}
