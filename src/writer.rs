// SPDX-License-Identifier: MIT
//! Writing ASDF files: header lines, the YAML tree, blocks, and the block index

use std::fmt::Write as _;
use std::io::{Seek, Write};

use serde_yaml::Value;

use crate::block::{write_block, Block};
use crate::codec::Compression;
use crate::error::Result;
use crate::format::{
    ASDF_FORMAT_VERSION, ASDF_STANDARD_VERSION, BLOCK_INDEX_HEADER, DOCUMENT_END, DOCUMENT_START,
    FILE_COMMENT, FILE_MAGIC, PRIMARY_TAG_DIRECTIVE, STANDARD_MAGIC, YAML_DIRECTIVE,
};
use crate::memoized::Memoized;

struct BlockWriteTask {
    data: Memoized<Block>,
    compression: Compression,
    level: i32,
}

/// Blocks registered while the tree is emitted, written after it in order
#[derive(Default)]
pub struct BlockWriteQueue {
    tasks: Vec<BlockWriteTask>,
}

impl BlockWriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload and return the block index it will be written at.
    ///
    /// A payload already registered with the same settings reuses its index.
    pub fn push(&mut self, data: Memoized<Block>, compression: Compression, level: i32) -> i64 {
        if let Some(index) = self.tasks.iter().position(|task| {
            task.data.ptr_eq(&data) && task.compression == compression && task.level == level
        }) {
            return index as i64;
        }
        self.tasks.push(BlockWriteTask {
            data,
            compression,
            level,
        });
        (self.tasks.len() - 1) as i64
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Write every registered block and return their stream offsets.
    ///
    /// A payload that was not in memory before the write is forgotten again
    /// afterwards, so rewriting a large file does not keep every block alive.
    pub fn flush<W: Write + Seek>(self, out: &mut W) -> Result<Vec<u64>> {
        let mut offsets = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            let offset = out.stream_position()?;
            let was_materialized = task.data.is_materialized();
            let block = task.data.get()?;
            write_block(out, &block, task.compression, task.level)?;
            drop(block);
            if !was_materialized {
                task.data.forget();
            }
            offsets.push(offset);
        }
        Ok(offsets)
    }
}

/// Text that precedes the YAML tree
fn header_text(tag_directives: &[(String, String)]) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{FILE_MAGIC} {ASDF_FORMAT_VERSION}");
    let _ = writeln!(text, "{STANDARD_MAGIC} {ASDF_STANDARD_VERSION}");
    let _ = writeln!(text, "{FILE_COMMENT}");
    let _ = writeln!(text, "{YAML_DIRECTIVE}");
    let _ = writeln!(text, "{PRIMARY_TAG_DIRECTIVE}");
    for (handle, prefix) in tag_directives {
        if handle != "!" {
            let _ = writeln!(text, "%TAG {handle} {prefix}");
        }
    }
    let _ = writeln!(text, "{DOCUMENT_START}");
    text
}

/// Write a complete file: header, tree, queued blocks, and block index
pub fn write_document<W: Write + Seek>(
    out: &mut W,
    tag_directives: &[(String, String)],
    tree: &Value,
    queue: BlockWriteQueue,
) -> Result<()> {
    out.write_all(header_text(tag_directives).as_bytes())?;
    let yaml = serde_yaml::to_string(tree)?;
    out.write_all(yaml.as_bytes())?;
    if !yaml.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.write_all(DOCUMENT_END.as_bytes())?;
    out.write_all(b"\n")?;

    let offsets = queue.flush(out)?;
    if !offsets.is_empty() {
        let list = offsets
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let index = format!(
            "{BLOCK_INDEX_HEADER}\n{YAML_DIRECTIVE}\n{DOCUMENT_START}\n[{list}]\n{DOCUMENT_END}\n"
        );
        out.write_all(index.as_bytes())?;
    }
    out.flush()?;
    Ok(())
}
