// SPDX-License-Identifier: MIT
//! Whole documents: building one for writing, and opening one for reading

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::arena::{DocId, DocumentArena};
use crate::block::ReadSeek;
use crate::config::Config;
use crate::entry::Entry;
use crate::error::{AsdfError, Result};
use crate::ndarray::{CopyState, NDArray};
use crate::reader::DocumentState;
use crate::reference::Reference;
use crate::tree::{self, TAG_ASDF, TAG_SOFTWARE};
use crate::writer::{write_document, BlockWriteQueue};

/// Key of the software stamp in the root mapping
pub const LIBRARY_KEY: &str = "asdf/library";

/// Longest chain of references followed before giving up
pub const MAX_REFERENCE_HOPS: usize = 32;

fn software_stamp() -> Value {
    let mut fields = vec![
        ("name", Value::String(env!("CARGO_PKG_NAME").to_string())),
        ("version", Value::String(env!("CARGO_PKG_VERSION").to_string())),
    ];
    let author = env!("CARGO_PKG_AUTHORS");
    if !author.is_empty() {
        fields.push(("author", Value::String(author.to_string())));
    }
    let homepage = env!("CARGO_PKG_HOMEPAGE");
    if !homepage.is_empty() {
        fields.push(("homepage", Value::String(homepage.to_string())));
    }
    tree::tagged(TAG_SOFTWARE, tree::mapping(fields))
}

/// A document being assembled for writing
#[derive(Debug, Clone, Default)]
pub struct Document {
    tag_directives: Vec<(String, String)>,
    entries: BTreeMap<String, Entry>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an extra `%TAG <handle> <prefix>` directive
    pub fn add_tag(&mut self, handle: impl Into<String>, prefix: impl Into<String>) {
        let handle = handle.into();
        let prefix = prefix.into();
        if let Some(existing) = self.tag_directives.iter_mut().find(|(h, _)| *h == handle) {
            existing.1 = prefix;
        } else {
            self.tag_directives.push((handle, prefix));
        }
    }

    pub fn tag_directives(&self) -> &[(String, String)] {
        &self.tag_directives
    }

    /// Add a top-level entry, replacing any entry with the same key
    pub fn insert(&mut self, key: impl Into<String>, entry: impl Into<Entry>) -> Option<Entry> {
        self.entries.insert(key.into(), entry.into())
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.entries.remove(key)
    }

    pub fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }

    /// Root node, with the arrays stored as blocks registered in `queue`
    pub fn to_tree(&self, queue: &mut BlockWriteQueue) -> Result<Value> {
        let mut root = Mapping::new();
        root.insert(LIBRARY_KEY.into(), software_stamp());
        for (key, entry) in &self.entries {
            root.insert(Value::String(key.clone()), entry.to_node(queue)?);
        }
        Ok(tree::tagged(TAG_ASDF, Value::Mapping(root)))
    }

    pub fn write_to<W: Write + Seek>(&self, out: &mut W) -> Result<()> {
        let mut queue = BlockWriteQueue::new();
        let tree = self.to_tree(&mut queue)?;
        tracing::debug!(blocks = queue.len(), "writing document");
        write_document(out, &self.tag_directives, &tree, queue)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.write_to(&mut out)?;
        Ok(out.into_inner())
    }

    /// Deep copy with `state` applied to every array
    pub fn copy(&self, state: &CopyState) -> Document {
        Document {
            tag_directives: self.tag_directives.clone(),
            entries: self
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.copy(state)))
                .collect(),
        }
    }
}

/// An opened document together with every document its references reach
#[derive(Debug)]
pub struct AsdfFile {
    arena: DocumentArena,
    root: DocId,
}

impl AsdfFile {
    /// Open with configuration from the environment
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, Config::from_env())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let mut arena = DocumentArena::new(config);
        let root = arena.open(path)?;
        Ok(Self { arena, root })
    }

    pub fn from_reader<R: ReadSeek + 'static>(reader: R, config: Config) -> Result<Self> {
        let mut arena = DocumentArena::new(config);
        let root = arena.insert_reader(reader)?;
        Ok(Self { arena, root })
    }

    pub fn from_bytes(bytes: Vec<u8>, config: Config) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes), config)
    }

    pub fn state(&self) -> &DocumentState {
        self.arena.get(self.root)
    }

    pub fn tree(&self) -> &Value {
        self.state().tree()
    }

    pub fn arena(&self) -> &DocumentArena {
        &self.arena
    }

    /// Follow `reference` from the root document, through any chain of
    /// references it lands on, to the first node that is not a reference
    pub fn resolve(&mut self, reference: &Reference) -> Result<(DocId, Value)> {
        self.resolve_from(self.root, reference)
    }

    fn resolve_from(&mut self, start: DocId, reference: &Reference) -> Result<(DocId, Value)> {
        let mut seen = HashSet::new();
        let mut doc = start;
        let mut current = reference.clone();
        for _ in 0..MAX_REFERENCE_HOPS {
            if !seen.insert((doc, current.target().to_string())) {
                return Err(AsdfError::InvalidPath(format!(
                    "reference cycle through '{current}'"
                )));
            }
            let (next_doc, node) = current.resolve(&mut self.arena, doc)?;
            if !Reference::is_reference(&node) {
                return Ok((next_doc, node));
            }
            doc = next_doc;
            current = Reference::from_node(&node)?;
        }
        Err(AsdfError::InvalidPath(format!(
            "more than {MAX_REFERENCE_HOPS} references chained from '{reference}'"
        )))
    }

    /// Read the array a reference points to, with blocks from the document
    /// that holds it
    pub fn resolve_ndarray(&mut self, reference: &Reference) -> Result<NDArray> {
        let (doc, node) = self.resolve(reference)?;
        NDArray::from_node(self.arena.get(doc), &node)
    }

    /// Read the array at `path` in the root tree, following references
    pub fn ndarray<S: AsRef<str>>(&mut self, path: &[S]) -> Result<NDArray> {
        let node = self.state().resolve_path(path)?;
        if Reference::is_reference(&node) {
            let reference = Reference::from_node(&node)?;
            return self.resolve_ndarray(&reference);
        }
        NDArray::from_node(self.state(), &node)
    }

    /// Typed entries of the root tree, ready to be written again.
    ///
    /// The software stamp and the primary tag directive are left out since
    /// every written document adds its own.
    pub fn to_document(&self) -> Result<Document> {
        let state = self.state();
        let mut document = Document::new();
        for (handle, prefix) in state.tag_directives() {
            if handle != "!" {
                document.add_tag(handle.clone(), prefix.clone());
            }
        }
        let Value::Mapping(root) = tree::untagged(state.tree()) else {
            return Err(AsdfError::invalid_node(
                "root",
                "document tree is not a mapping",
            ));
        };
        for (key, node) in root {
            let Some(key) = key.as_str() else {
                tracing::warn!(?key, "skipping non-string top-level key");
                continue;
            };
            if key == LIBRARY_KEY {
                continue;
            }
            document.insert(key, Entry::from_node(state, node)?);
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Compression;
    use crate::ndarray::StorageMode;

    #[test]
    fn test_software_stamp() {
        let stamp = software_stamp();
        assert!(tree::has_tag(&stamp, "core/software"));
        assert_eq!(
            tree::lookup(&stamp, "name"),
            Some(&Value::String("asdf-container".into()))
        );
    }

    #[test]
    fn test_written_tree_shape() {
        let mut document = Document::new();
        document.add_tag("!unit!", "tag:example.org/unit/");
        document.insert("answer", Value::Number(42.into()));
        let bytes = document.to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("#ASDF 1.0.0\n#ASDF_STANDARD 1.1.0\n"));
        assert!(text.contains("%TAG !unit! tag:example.org/unit/\n"));
        assert!(text.contains("--- !core/asdf-1.1.0\n") || text.contains("---\n!core/asdf-1.1.0\n"));
        assert!(text.contains("answer: 42\n"));
        assert!(!text.contains("BLOCK INDEX"));
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let mut document = Document::new();
        document.insert(
            "data",
            NDArray::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], vec![2, 2])
                .unwrap()
                .with_compression(Compression::Zlib, 9),
        );
        document.insert(
            "small",
            NDArray::from_vec(vec![7i32, 8], vec![2])
                .unwrap()
                .with_storage_mode(StorageMode::Inline),
        );
        document.insert("alias", Reference::new(None, &["data"]));

        let mut file = AsdfFile::from_bytes(document.to_bytes().unwrap(), Config::default()).unwrap();
        assert!(tree::has_tag(file.tree(), "core/asdf"));
        assert_eq!(file.state().block_count(), 1);

        let data = file.ndarray(&["data"]).unwrap();
        assert_eq!(data.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(data.strides(), &[16, 8]);

        let small = file.ndarray(&["small"]).unwrap();
        assert_eq!(small.storage_mode(), StorageMode::Inline);
        assert_eq!(small.to_vec::<i32>().unwrap(), vec![7, 8]);

        let alias = file.ndarray(&["alias"]).unwrap();
        assert!(alias.memoized().ptr_eq(data.memoized()));
    }

    #[test]
    fn test_reference_chains_and_cycles() {
        let text = "#ASDF 1.0.0\n---\na: {$ref: '#/b'}\nb: {$ref: '#/c'}\nc: 5\nx: {$ref: '#/y'}\ny: {$ref: '#/x'}\n...\n";
        let mut file = AsdfFile::from_bytes(text.as_bytes().to_vec(), Config::default()).unwrap();

        let (_, node) = file.resolve(&Reference::new(None, &["a"])).unwrap();
        assert_eq!(node, Value::Number(5.into()));

        assert!(matches!(
            file.resolve(&Reference::new(None, &["x"])),
            Err(AsdfError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_to_document_skips_stamp() {
        let mut document = Document::new();
        document.insert("label", Value::String("x".into()));
        let file = AsdfFile::from_bytes(document.to_bytes().unwrap(), Config::default()).unwrap();

        let copy = file.to_document().unwrap();
        assert!(copy.get(LIBRARY_KEY).is_none());
        assert!(matches!(copy.get("label"), Some(Entry::Value(Value::String(s))) if s == "x"));
        assert!(copy.tag_directives().is_empty());
    }
}
