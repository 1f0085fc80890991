// SPDX-License-Identifier: MIT
//! `$ref` links to nodes in the same or another document
//!
//! A target is `<uri>#<fragment>`. The fragment is a JSON pointer: each
//! path segment is prefixed with `/`, with `~` written as `~0` and `/` as
//! `~1`, and the result is percent-encoded for use in a URI.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::arena::{DocId, DocumentArena};
use crate::error::{AsdfError, Result};
use crate::tree;

const REF_KEY: &str = "$ref";

/// Bytes allowed unescaped in a URI fragment
fn is_fragment_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"-._~!$&'()*+,;=:@/?".contains(&byte)
}

fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &byte in text.as_bytes() {
        if is_fragment_safe(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn percent_decode(text: &str) -> Result<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = bytes
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| {
                    AsdfError::InvalidPath(format!("bad percent escape in '{text}'"))
                })?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out)
        .map_err(|_| AsdfError::InvalidPath(format!("'{text}' does not decode to UTF-8")))
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_segment(segment: &str) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(AsdfError::InvalidPath(format!(
                    "bad '~' escape in segment '{segment}'"
                )))
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    target: String,
}

impl Reference {
    /// Reference to `path` in the document at `doc_uri`, or in the
    /// referring document when `doc_uri` is `None`
    pub fn new<S: AsRef<str>>(doc_uri: Option<&str>, path: &[S]) -> Self {
        let fragment: String = path
            .iter()
            .map(|segment| format!("/{}", escape_segment(segment.as_ref())))
            .collect();
        Self {
            target: format!("{}#{}", doc_uri.unwrap_or(""), percent_encode(&fragment)),
        }
    }

    /// Wrap an already encoded target
    pub fn from_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Document URI and decoded path segments of the target
    pub fn split_target(&self) -> Result<(String, Vec<String>)> {
        let (uri, fragment) = match self.target.split_once('#') {
            Some((uri, fragment)) => (uri, fragment),
            None => (self.target.as_str(), ""),
        };
        let decoded = percent_decode(fragment)?;
        if decoded.is_empty() {
            return Ok((uri.to_string(), Vec::new()));
        }
        let mut segments = decoded.split('/');
        if segments.next() != Some("") {
            return Err(AsdfError::InvalidPath(format!(
                "fragment '{fragment}' does not start with '/'"
            )));
        }
        let path = segments.map(unescape_segment).collect::<Result<Vec<_>>>()?;
        Ok((uri.to_string(), path))
    }

    /// Whether `node` is a `{$ref: <target>}` map
    pub fn is_reference(node: &Value) -> bool {
        match tree::untagged(node) {
            Value::Mapping(map) => {
                map.len() == 1 && matches!(map.get(REF_KEY), Some(Value::String(_)))
            }
            _ => false,
        }
    }

    pub fn from_node(node: &Value) -> Result<Self> {
        match tree::lookup(node, REF_KEY) {
            Some(Value::String(target)) if Self::is_reference(node) => {
                Ok(Self::from_target(target.clone()))
            }
            _ => Err(AsdfError::invalid_node(
                REF_KEY,
                format!("expected a single-key $ref map, got {node:?}"),
            )),
        }
    }

    pub fn to_node(&self) -> Value {
        tree::mapping([(REF_KEY, Value::String(self.target.clone()))])
    }

    /// Locate the target, starting from the document `current`.
    ///
    /// External documents are opened at most once per arena. Relative URIs
    /// resolve against the directory of `current`, or against the working
    /// directory when `current` was not read from a file.
    pub fn resolve(&self, arena: &mut DocumentArena, current: DocId) -> Result<(DocId, Value)> {
        let (uri, path) = self.split_target()?;
        let doc = if uri.is_empty() {
            current
        } else {
            let location = document_path(arena, current, &uri)?;
            tracing::debug!(reference = %self.target, path = %location.display(), "resolving external reference");
            arena.open(&location)?
        };
        let node = arena.get(doc).resolve_path(path.as_slice())?;
        Ok((doc, node))
    }
}

fn document_path(arena: &DocumentArena, current: DocId, uri: &str) -> Result<PathBuf> {
    let location = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
    if location.is_absolute() {
        return Ok(location.to_path_buf());
    }
    let base = match arena.get(current).filename().and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    Ok(base.join(location))
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target)
    }
}
