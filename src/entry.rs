// SPDX-License-Identifier: MIT
//! Typed view of a metadata tree: arrays and references among plain values

use std::collections::BTreeMap;

use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};

use crate::error::{AsdfError, Result};
use crate::ndarray::{CopyState, NDArray};
use crate::reader::DocumentState;
use crate::reference::Reference;
use crate::tree;
use crate::writer::BlockWriteQueue;

#[derive(Debug, Clone)]
pub enum Entry {
    /// Any node without special meaning, kept as YAML
    Value(Value),
    NDArray(NDArray),
    Reference(Reference),
    Sequence(Vec<Entry>),
    /// Mapping with string keys
    Group(BTreeMap<String, Entry>),
    /// A node under a tag this crate does not model; its contents are still
    /// read as entries so nested arrays are written again
    Tagged(Tag, Box<Entry>),
}

impl Entry {
    /// Interpret `node`, whose arrays point into `state`'s blocks
    pub fn from_node(state: &DocumentState, node: &Value) -> Result<Self> {
        if tree::has_tag(node, "core/ndarray") {
            return NDArray::from_node(state, node).map(Entry::NDArray);
        }
        if Reference::is_reference(node) {
            return Reference::from_node(node).map(Entry::Reference);
        }
        match node {
            Value::Tagged(tagged) => Entry::from_node(state, &tagged.value)
                .map(|inner| Entry::Tagged(tagged.tag.clone(), Box::new(inner))),
            Value::Sequence(items) => items
                .iter()
                .map(|item| Entry::from_node(state, item))
                .collect::<Result<Vec<_>>>()
                .map(Entry::Sequence),
            Value::Mapping(map) if map.keys().all(Value::is_string) => {
                let mut group = BTreeMap::new();
                for (key, value) in map {
                    let key = key.as_str().unwrap_or_default();
                    let entry = Entry::from_node(state, value).inspect_err(|e| {
                        tracing::debug!(key, error = %e, "cannot read tree entry");
                    })?;
                    group.insert(key.to_string(), entry);
                }
                Ok(Entry::Group(group))
            }
            other if tree::contains_tag(other, "core/ndarray") => Err(AsdfError::invalid_node(
                "ndarray",
                "arrays under a mapping with non-string keys cannot be rewritten",
            )),
            other => Ok(Entry::Value(other.clone())),
        }
    }

    /// Emit the YAML node, queueing the blocks of block-stored arrays
    pub fn to_node(&self, queue: &mut BlockWriteQueue) -> Result<Value> {
        match self {
            Entry::Value(value) => Ok(value.clone()),
            Entry::NDArray(array) => array.to_node(queue),
            Entry::Reference(reference) => Ok(reference.to_node()),
            Entry::Sequence(items) => items
                .iter()
                .map(|item| item.to_node(queue))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Entry::Group(group) => {
                let mut map = Mapping::new();
                for (key, entry) in group {
                    map.insert(Value::String(key.clone()), entry.to_node(queue)?);
                }
                Ok(Value::Mapping(map))
            }
            Entry::Tagged(tag, inner) => Ok(Value::Tagged(Box::new(TaggedValue {
                tag: tag.clone(),
                value: inner.to_node(queue)?,
            }))),
        }
    }

    /// Deep copy with `state` applied to every array
    pub fn copy(&self, state: &CopyState) -> Entry {
        match self {
            Entry::NDArray(array) => Entry::NDArray(array.copy(state)),
            Entry::Sequence(items) => {
                Entry::Sequence(items.iter().map(|item| item.copy(state)).collect())
            }
            Entry::Group(group) => Entry::Group(
                group
                    .iter()
                    .map(|(key, entry)| (key.clone(), entry.copy(state)))
                    .collect(),
            ),
            Entry::Tagged(tag, inner) => Entry::Tagged(tag.clone(), Box::new(inner.copy(state))),
            other => other.clone(),
        }
    }

    pub fn as_ndarray(&self) -> Option<&NDArray> {
        match self {
            Entry::NDArray(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Entry::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// Child of a group, looking through custom tags
    pub fn get(&self, key: &str) -> Option<&Entry> {
        match self {
            Entry::Group(group) => group.get(key),
            Entry::Tagged(_, inner) => inner.get(key),
            _ => None,
        }
    }
}

impl From<NDArray> for Entry {
    fn from(array: NDArray) -> Self {
        Entry::NDArray(array)
    }
}

impl From<Reference> for Entry {
    fn from(reference: Reference) -> Self {
        Entry::Reference(reference)
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Value(value)
    }
}

impl From<Vec<Entry>> for Entry {
    fn from(items: Vec<Entry>) -> Self {
        Entry::Sequence(items)
    }
}

impl From<BTreeMap<String, Entry>> for Entry {
    fn from(group: BTreeMap<String, Entry>) -> Self {
        Entry::Group(group)
    }
}
