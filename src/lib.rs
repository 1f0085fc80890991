// SPDX-License-Identifier: MIT
//! # ASDF Container
//!
//! Reader and writer for ASDF files: a YAML metadata tree followed by
//! binary blocks that hold array payloads.
//!
//! ## Format Overview
//!
//! The tree describes everything in the file. Large arrays live in blocks
//! after the tree and are addressed from it by position; small arrays can be
//! written inline as nested sequences. Nodes can also point at nodes in
//! the same file or in other files through `$ref` maps.
//!
//! ## Key Features
//!
//! - **Lazy Blocks**: Opening a file reads only block headers; payloads are
//!   read, checksummed, and decompressed the first time an array needs them
//! - **Per-Array Compression**: zlib, bzip2, zstd and lz4, falling back to
//!   uncompressed storage when a codec is missing or would not help
//! - **Byte Order**: Payloads keep the byte order they were written in;
//!   typed access converts to host order
//! - **Strided Views**: Arrays carry an offset and byte strides into their
//!   block
//! - **References**: External documents are opened once and shared
//!
//! ## File Layout
//!
//! ```text
//! #ASDF 1.0.0
//! #ASDF_STANDARD 1.1.0
//! # This is an ASDF file <https://asdf-standard.readthedocs.io/>
//! %YAML 1.1
//! %TAG ! tag:stsci.edu:asdf/
//! --- !core/asdf-1.1.0
//! <tree>
//! ...
//!
//! Block (big-endian):
//! - Magic: "\xd3BLK" (4 bytes)
//! - Header size: bytes after this field (2 bytes, at least 48)
//! - Flags (4 bytes)
//! - Compression: "\0\0\0\0", "zlib", "bzp2", "blsc", "bls2", "lz4\0", "zstd" (4 bytes)
//! - Allocated space: stored payload length (8 bytes)
//! - Used space: payload plus trailing padding (8 bytes)
//! - Data space: decompressed length (8 bytes)
//! - Checksum: MD5 of the stored payload, or zeros (16 bytes)
//! - Payload, then padding
//!
//! #ASDF BLOCK INDEX
//! %YAML 1.1
//! ---
//! [<offset>, ...]
//! ...
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use asdf_container::{AsdfFile, Compression, Config, Document, NDArray};
//!
//! let mut document = Document::new();
//! let array = NDArray::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], vec![2, 2])?
//!     .with_compression(Compression::Zlib, 9);
//! document.insert("data", array);
//! let bytes = document.to_bytes()?;
//!
//! let mut file = AsdfFile::from_bytes(bytes, Config::default())?;
//! let data = file.ndarray(&["data"])?;
//! assert_eq!(data.shape(), &[2, 2]);
//! assert_eq!(data.to_vec::<f64>()?, vec![1.0, 2.0, 3.0, 4.0]);
//! # Ok::<(), asdf_container::AsdfError>(())
//! ```

pub mod arena;
pub mod block;
pub mod byteorder;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod container;
pub mod datatype;
pub mod element;
pub mod entry;
pub mod error;
pub mod format;
pub mod memoized;
pub mod ndarray;
pub mod reader;
pub mod reference;
pub mod tree;
pub mod writer;

// Re-export main types
pub use arena::{DocId, DocumentArena};
pub use block::{Block, BlockInfo};
pub use byteorder::{host_byteorder, ByteOrder};
pub use codec::{Codec, Compression, CompressionEngine};
pub use config::Config;
pub use container::{AsdfFile, Document};
pub use datatype::{Datatype, Field, ScalarTypeId};
pub use element::{Complex, Element};
pub use entry::Entry;
pub use error::{AsdfError, Result};
pub use format::{BlockHeader, BLOCK_MAGIC};
pub use memoized::Memoized;
pub use ndarray::{CopyState, NDArray, StorageMode};
pub use reader::DocumentState;
pub use reference::Reference;
pub use writer::BlockWriteQueue;
