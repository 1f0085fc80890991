// SPDX-License-Identifier: MIT
//! Reading ASDF files: header lines, the YAML tree, and the block scan

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::block::{read_block, shared_stream, Block, BlockInfo, ReadSeek, SharedStream};
use crate::config::Config;
use crate::error::{AsdfError, Result};
use crate::format::{BLOCK_INDEX_HEADER, DOCUMENT_END, FILE_MAGIC, STANDARD_MAGIC};
use crate::memoized::Memoized;
use crate::tree;

/// Text part of a file, up to and including the YAML end marker
#[derive(Debug, Clone, PartialEq)]
struct FileHeader {
    format_version: String,
    standard_version: Option<String>,
    tag_directives: Vec<(String, String)>,
    yaml: String,
}

fn read_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> Result<Option<String>> {
    line.clear();
    if reader.read_until(b'\n', line)? == 0 {
        return Ok(None);
    }
    String::from_utf8(line.clone())
        .map(Some)
        .map_err(|_| AsdfError::MalformedHeader("YAML tree is not valid UTF-8".to_string()))
}

/// Parse `%TAG <handle> <prefix>`
fn parse_tag_directive(line: &str) -> Option<(String, String)> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("%TAG"), Some(handle), Some(prefix)) => Some((handle.to_string(), prefix.to_string())),
        _ => None,
    }
}

/// Read the header lines and the YAML document.
///
/// The primary `!` tag directive is recorded but left out of the YAML text,
/// so `!core/...` tags stay local and are matched by name.
fn read_header<R: BufRead>(reader: &mut R) -> Result<FileHeader> {
    let mut line = Vec::new();
    let first = read_line(reader, &mut line)?
        .ok_or_else(|| AsdfError::MalformedHeader("empty stream".to_string()))?;
    let version = first
        .strip_prefix(FILE_MAGIC)
        .filter(|rest| rest.starts_with(' '))
        .map(|rest| rest.trim().to_string())
        .ok_or_else(|| AsdfError::MalformedHeader("stream does not start with #ASDF".to_string()))?;

    let mut header = FileHeader {
        format_version: version,
        standard_version: None,
        tag_directives: Vec::new(),
        yaml: first,
    };

    loop {
        let text = read_line(reader, &mut line)?.ok_or_else(|| {
            AsdfError::MalformedHeader("YAML tree has no end marker".to_string())
        })?;
        let content = text.trim_end_matches(['\r', '\n']);

        if let Some(rest) = content.strip_prefix(STANDARD_MAGIC) {
            header.standard_version = Some(rest.trim().to_string());
        }
        if let Some((handle, prefix)) = parse_tag_directive(content) {
            let primary = handle == "!";
            header.tag_directives.push((handle, prefix));
            if primary {
                continue;
            }
        }
        header.yaml.push_str(&text);
        if content == DOCUMENT_END {
            return Ok(header);
        }
    }
}

/// One opened file: its tree, its blocks, and where it came from
pub struct DocumentState {
    filename: Option<PathBuf>,
    format_version: String,
    standard_version: Option<String>,
    tag_directives: Vec<(String, String)>,
    tree: Value,
    blocks: Vec<Memoized<Block>>,
    block_infos: Vec<BlockInfo>,
    block_index: Option<Vec<u64>>,
}

impl DocumentState {
    /// Open and parse a file
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        tracing::debug!(path = %path.display(), "opening document");
        Self::from_reader(file, Some(path.to_path_buf()), config)
    }

    /// Parse a document from any seekable source.
    ///
    /// Block payloads stay in the source and are loaded on first use, so the
    /// source is kept alive by the returned state.
    pub fn from_reader<R: ReadSeek + 'static>(
        reader: R,
        filename: Option<PathBuf>,
        config: &Config,
    ) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let header = read_header(&mut reader)?;
        let tree: Value = serde_yaml::from_str(&header.yaml)?;

        let stream = shared_stream(reader);
        let mut blocks = Vec::new();
        let mut block_infos = Vec::new();
        while let Some((block, info)) = read_block(&stream, config.verify_checksums)? {
            blocks.push(block);
            block_infos.push(info);
        }
        let block_index = read_block_index(&stream, &block_infos)?;

        tracing::debug!(blocks = blocks.len(), "document loaded");
        Ok(Self {
            filename,
            format_version: header.format_version,
            standard_version: header.standard_version,
            tag_directives: header.tag_directives,
            tree,
            blocks,
            block_infos,
            block_index,
        })
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    pub fn standard_version(&self) -> Option<&str> {
        self.standard_version.as_deref()
    }

    /// `%TAG` directives in file order, including the primary handle
    pub fn tag_directives(&self) -> &[(String, String)] {
        &self.tag_directives
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn check_index(&self, index: i64) -> Result<usize> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.blocks.len())
            .ok_or_else(|| AsdfError::IndexOutOfRange {
                index: vec![index],
                shape: vec![self.blocks.len() as i64],
            })
    }

    /// Lazy handle to the payload of block `index`
    pub fn block(&self, index: i64) -> Result<Memoized<Block>> {
        Ok(self.blocks[self.check_index(index)?].clone())
    }

    pub fn block_info(&self, index: i64) -> Result<&BlockInfo> {
        Ok(&self.block_infos[self.check_index(index)?])
    }

    pub fn block_infos(&self) -> &[BlockInfo] {
        &self.block_infos
    }

    /// Offsets listed in the trailing block index, if the file has one
    pub fn block_index(&self) -> Option<&[u64]> {
        self.block_index.as_deref()
    }

    /// Walk the tree along `path`.
    ///
    /// Sequence segments must be decimal indices; mapping segments are keys.
    pub fn resolve_path<S: AsRef<str>>(&self, path: &[S]) -> Result<Value> {
        let mut node = &self.tree;
        for segment in path {
            let segment = segment.as_ref();
            node = match tree::untagged(node) {
                Value::Sequence(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| {
                        AsdfError::InvalidPath(format!(
                            "'{segment}' is not an index into a sequence of {}",
                            items.len()
                        ))
                    })?,
                Value::Mapping(map) => map.get(segment).ok_or_else(|| {
                    AsdfError::InvalidPath(format!("no key '{segment}'"))
                })?,
                _ => {
                    return Err(AsdfError::InvalidPath(format!(
                        "cannot descend into a scalar at '{segment}'"
                    )))
                }
            };
        }
        Ok(node.clone())
    }
}

impl std::fmt::Debug for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentState")
            .field("filename", &self.filename)
            .field("format_version", &self.format_version)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

/// Parse what follows the last block: nothing, whitespace, or a block index
fn read_block_index(stream: &SharedStream, infos: &[BlockInfo]) -> Result<Option<Vec<u64>>> {
    let mut rest = Vec::new();
    stream.lock().read_to_end(&mut rest)?;
    if rest.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let text = String::from_utf8_lossy(&rest);
    let Some(body) = text.strip_prefix(BLOCK_INDEX_HEADER) else {
        return Err(AsdfError::MalformedHeader(
            "unexpected data after the last block".to_string(),
        ));
    };

    let offsets: Vec<u64> = match serde_yaml::from_str(body) {
        Ok(offsets) => offsets,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable block index");
            return Ok(None);
        }
    };
    let scanned: Vec<u64> = infos.iter().map(|info| info.block_offset).collect();
    if offsets != scanned {
        tracing::warn!(
            ?offsets,
            ?scanned,
            "block index does not match the scanned blocks"
        );
    }
    Ok(Some(offsets))
}
