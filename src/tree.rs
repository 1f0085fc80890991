// SPDX-License-Identifier: MIT
//! Helpers over the YAML metadata tree

use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};

use crate::error::{AsdfError, Result};

/// URI prefix bound to the primary `!` tag handle
pub const ASDF_TAG_PREFIX: &str = "tag:stsci.edu:asdf/";

pub const TAG_ASDF: &str = "core/asdf-1.1.0";
pub const TAG_NDARRAY: &str = "core/ndarray-1.0.0";
pub const TAG_COMPLEX: &str = "core/complex-1.0.0";
pub const TAG_SOFTWARE: &str = "core/software-1.0.0";

/// Strip any tags wrapped around a node
pub fn untagged(node: &Value) -> &Value {
    match node {
        Value::Tagged(tagged) => untagged(&tagged.value),
        other => other,
    }
}

/// Wrap `value` in a local tag such as `core/ndarray-1.0.0`
pub fn tagged(tag: &str, value: Value) -> Value {
    Value::Tagged(Box::new(TaggedValue {
        tag: Tag::new(tag),
        value,
    }))
}

/// Whether the node carries the tag `name` of any version.
///
/// `name` is given without version (`core/ndarray`). Tags are compared after
/// removing the leading `!` and the ASDF URI prefix, so `!core/ndarray-1.0.0`
/// and `tag:stsci.edu:asdf/core/ndarray-1.1.0` both match.
pub fn has_tag(node: &Value, name: &str) -> bool {
    let Value::Tagged(tagged) = node else {
        return false;
    };
    let tag = tagged.tag.to_string();
    let tag = tag.trim_start_matches('!');
    let tag = tag.strip_prefix(ASDF_TAG_PREFIX).unwrap_or(tag);
    match tag.rsplit_once('-') {
        Some((base, _version)) => base == name,
        None => tag == name,
    }
}

/// Whether a node tagged `name` appears anywhere under `node`
pub fn contains_tag(node: &Value, name: &str) -> bool {
    if has_tag(node, name) {
        return true;
    }
    match node {
        Value::Tagged(tagged) => contains_tag(&tagged.value, name),
        Value::Sequence(items) => items.iter().any(|item| contains_tag(item, name)),
        Value::Mapping(map) => map
            .iter()
            .any(|(key, value)| contains_tag(key, name) || contains_tag(value, name)),
        _ => false,
    }
}

/// Look up a string key in a (possibly tagged) mapping
pub fn lookup<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    match untagged(node) {
        Value::Mapping(map) => map.get(key),
        _ => None,
    }
}

/// Read an integer node
pub fn as_i64(node: &Value, key: &str) -> Result<i64> {
    match untagged(node) {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| AsdfError::invalid_node(key, format!("{n} is not an integer"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| AsdfError::invalid_node(key, format!("{s:?} is not an integer"))),
        other => Err(AsdfError::invalid_node(
            key,
            format!("expected an integer, got {other:?}"),
        )),
    }
}

/// Read a sequence of integers
pub fn as_i64_seq(node: &Value, key: &str) -> Result<Vec<i64>> {
    match untagged(node) {
        Value::Sequence(items) => items.iter().map(|item| as_i64(item, key)).collect(),
        other => Err(AsdfError::invalid_node(
            key,
            format!("expected a sequence of integers, got {other:?}"),
        )),
    }
}

pub fn i64_seq(values: &[i64]) -> Value {
    Value::Sequence(values.iter().map(|&v| Value::Number(v.into())).collect())
}

/// Text form of a scalar leaf, as it appears in the YAML source.
///
/// Floats keep a fractional part (`2.0`) so that integer parsing rejects them.
pub fn leaf_text(node: &Value) -> Result<String> {
    match untagged(node) {
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(v.to_string())
            } else if let Some(v) = n.as_u64() {
                Ok(v.to_string())
            } else {
                Ok(format!("{:?}", n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err(AsdfError::representation("~", "a scalar value")),
        other => Err(AsdfError::invalid_node(
            "data",
            format!("expected a scalar leaf, got {other:?}"),
        )),
    }
}

/// Build a mapping from string keys
pub fn mapping<I>(entries: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    let mut map = Mapping::new();
    for (key, value) in entries {
        map.insert(Value::String(key.to_string()), value);
    }
    Value::Mapping(map)
}
