// SPDX-License-Identifier: MIT
//! Documents opened while resolving references, indexed by file

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::block::ReadSeek;
use crate::config::Config;
use crate::error::Result;
use crate::reader::DocumentState;

/// Handle to a document held by a [`DocumentArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(usize);

impl DocId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Owner of every document reachable from one root.
///
/// Documents refer to each other by [`DocId`], so reference cycles between
/// files never become ownership cycles.
#[derive(Debug)]
pub struct DocumentArena {
    config: Config,
    documents: Vec<DocumentState>,
    by_path: HashMap<PathBuf, DocId>,
}

impl DocumentArena {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            documents: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add an already parsed document
    pub fn insert(&mut self, state: DocumentState) -> DocId {
        let id = DocId(self.documents.len());
        if let Some(path) = state.filename() {
            let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            self.by_path.entry(key).or_insert(id);
        }
        self.documents.push(state);
        id
    }

    /// Parse a document from a stream that has no file behind it
    pub fn insert_reader<R: ReadSeek + 'static>(&mut self, reader: R) -> Result<DocId> {
        let state = DocumentState::from_reader(reader, None, &self.config)?;
        Ok(self.insert(state))
    }

    /// Open `path`, or return the document already opened from it
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<DocId> {
        let key = std::fs::canonicalize(path.as_ref())?;
        if let Some(&id) = self.by_path.get(&key) {
            tracing::trace!(path = %key.display(), "document already open");
            return Ok(id);
        }
        let state = DocumentState::open(&key, &self.config)?;
        let id = DocId(self.documents.len());
        self.documents.push(state);
        self.by_path.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: DocId) -> &DocumentState {
        &self.documents[id.0]
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
