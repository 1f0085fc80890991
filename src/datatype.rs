// SPDX-License-Identifier: MIT
//! Element datatypes: scalar type ids, composite records, and the text form
//! of scalars used by inline arrays.

use std::fmt;
use std::str::FromStr;

use half::f16;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Number, Value};

use crate::byteorder::{extend_in_order, to_host, ByteOrder};
use crate::error::{AsdfError, Result};
use crate::tree::{self, TAG_COMPLEX};

/// Scalar type identifiers understood by the format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarTypeId {
    Bool8,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    Float16,
    Float32,
    Float64,
    Complex32,
    Complex64,
    Complex128,
    /// Fixed-width ASCII character; recognized but not encodable
    Ascii,
    /// Fixed-width UCS-4 character; recognized but not encodable
    Ucs4,
}

impl ScalarTypeId {
    pub const ALL: [ScalarTypeId; 19] = [
        ScalarTypeId::Bool8,
        ScalarTypeId::Int8,
        ScalarTypeId::Int16,
        ScalarTypeId::Int32,
        ScalarTypeId::Int64,
        ScalarTypeId::Int128,
        ScalarTypeId::UInt8,
        ScalarTypeId::UInt16,
        ScalarTypeId::UInt32,
        ScalarTypeId::UInt64,
        ScalarTypeId::UInt128,
        ScalarTypeId::Float16,
        ScalarTypeId::Float32,
        ScalarTypeId::Float64,
        ScalarTypeId::Complex32,
        ScalarTypeId::Complex64,
        ScalarTypeId::Complex128,
        ScalarTypeId::Ascii,
        ScalarTypeId::Ucs4,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarTypeId::Bool8 => "bool8",
            ScalarTypeId::Int8 => "int8",
            ScalarTypeId::Int16 => "int16",
            ScalarTypeId::Int32 => "int32",
            ScalarTypeId::Int64 => "int64",
            ScalarTypeId::Int128 => "int128",
            ScalarTypeId::UInt8 => "uint8",
            ScalarTypeId::UInt16 => "uint16",
            ScalarTypeId::UInt32 => "uint32",
            ScalarTypeId::UInt64 => "uint64",
            ScalarTypeId::UInt128 => "uint128",
            ScalarTypeId::Float16 => "float16",
            ScalarTypeId::Float32 => "float32",
            ScalarTypeId::Float64 => "float64",
            ScalarTypeId::Complex32 => "complex32",
            ScalarTypeId::Complex64 => "complex64",
            ScalarTypeId::Complex128 => "complex128",
            ScalarTypeId::Ascii => "ascii",
            ScalarTypeId::Ucs4 => "ucs4",
        }
    }

    /// Size of one scalar in bytes
    pub fn size(self) -> usize {
        match self {
            ScalarTypeId::Bool8 | ScalarTypeId::Int8 | ScalarTypeId::UInt8 => 1,
            ScalarTypeId::Int16 | ScalarTypeId::UInt16 | ScalarTypeId::Float16 => 2,
            ScalarTypeId::Int32
            | ScalarTypeId::UInt32
            | ScalarTypeId::Float32
            | ScalarTypeId::Complex32 => 4,
            ScalarTypeId::Int64
            | ScalarTypeId::UInt64
            | ScalarTypeId::Float64
            | ScalarTypeId::Complex64 => 8,
            ScalarTypeId::Int128 | ScalarTypeId::UInt128 | ScalarTypeId::Complex128 => 16,
            ScalarTypeId::Ascii => 1,
            ScalarTypeId::Ucs4 => 4,
        }
    }

    /// Width of the byte-swapped unit (a complex swaps each component)
    pub fn word_size(self) -> usize {
        match self {
            ScalarTypeId::Complex32 | ScalarTypeId::Complex64 | ScalarTypeId::Complex128 => {
                self.size() / 2
            }
            ScalarTypeId::Ascii => 1,
            other => other.size(),
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(
            self,
            ScalarTypeId::Complex32 | ScalarTypeId::Complex64 | ScalarTypeId::Complex128
        )
    }
}

impl FromStr for ScalarTypeId {
    type Err = AsdfError;

    fn from_str(s: &str) -> Result<Self> {
        ScalarTypeId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == s)
            .ok_or_else(|| AsdfError::UnsupportedType(format!("unknown scalar type '{s}'")))
    }
}

impl fmt::Display for ScalarTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named member of a composite datatype
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Option<String>,
    pub datatype: Datatype,
    /// Overrides the enclosing byte order when present
    pub byteorder: Option<ByteOrder>,
    /// Sub-array shape of the field; empty for a single value
    pub shape: Vec<i64>,
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: Some(name.into()),
            datatype,
            byteorder: None,
            shape: Vec::new(),
        }
    }

    pub fn with_byteorder(mut self, byteorder: ByteOrder) -> Self {
        self.byteorder = Some(byteorder);
        self
    }

    pub fn with_shape(mut self, shape: Vec<i64>) -> Self {
        self.shape = shape;
        self
    }

    /// Bytes occupied by the field inside one record
    pub fn size(&self) -> usize {
        shape_bytes(&self.shape, self.datatype.type_size()).map_or(usize::MAX, |b| b as usize)
    }

    fn parse(node: &Value) -> Result<Self> {
        let datatype_node = tree::lookup(node, "datatype")
            .ok_or_else(|| AsdfError::invalid_node("datatype", "field has no datatype"))?;
        let name = match tree::lookup(node, "name") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(AsdfError::invalid_node(
                    "name",
                    format!("field name must be a string, got {other:?}"),
                ))
            }
            None => None,
        };
        let byteorder = tree::lookup(node, "byteorder")
            .map(ByteOrder::from_node)
            .transpose()?;
        let shape = tree::lookup(node, "shape")
            .map(|n| tree::as_i64_seq(n, "shape"))
            .transpose()?
            .unwrap_or_default();
        if shape.iter().any(|&d| d < 0) {
            return Err(AsdfError::invalid_node(
                "shape",
                format!("negative field dimension in {shape:?}"),
            ));
        }
        let datatype = Datatype::parse(datatype_node)?;
        if shape_bytes(&shape, datatype.type_size()).is_none() {
            return Err(AsdfError::ShapeMismatch(format!(
                "field shape {shape:?} of {datatype} overflows"
            )));
        }
        Ok(Self {
            name,
            datatype,
            byteorder,
            shape,
        })
    }

    fn to_node(&self) -> Value {
        let mut map = Mapping::new();
        if let Some(name) = &self.name {
            map.insert("name".into(), Value::String(name.clone()));
        }
        map.insert("datatype".into(), self.datatype.to_node());
        if let Some(order) = self.byteorder {
            map.insert("byteorder".into(), order.to_node());
        }
        if !self.shape.is_empty() {
            map.insert("shape".into(), tree::i64_seq(&self.shape));
        }
        Value::Mapping(map)
    }

    fn decode_value(&self, node: &Value, order: ByteOrder, out: &mut Vec<u8>) -> Result<()> {
        let order = self.byteorder.unwrap_or(order);
        decode_nested(&self.datatype, node, &self.shape, order, out)
    }

    fn encode_value(&self, bytes: &[u8], order: ByteOrder) -> Result<Value> {
        let order = self.byteorder.unwrap_or(order);
        encode_nested(&self.datatype, bytes, &self.shape, order)
    }
}

/// Bytes spanned by `shape` elements of `type_size` bytes, when that fits an
/// `i64` and no dimension is negative
pub(crate) fn shape_bytes(shape: &[i64], type_size: usize) -> Option<i64> {
    if shape.iter().any(|&d| d < 0) {
        return None;
    }
    if shape.contains(&0) {
        return Some(0);
    }
    let size = i64::try_from(type_size).ok()?;
    shape.iter().try_fold(size, |acc, &d| acc.checked_mul(d))
}

pub(crate) fn decode_nested(
    datatype: &Datatype,
    node: &Value,
    shape: &[i64],
    order: ByteOrder,
    out: &mut Vec<u8>,
) -> Result<()> {
    let Some((&dim, rest)) = shape.split_first() else {
        return datatype.decode_node(node, order, out);
    };
    match tree::untagged(node) {
        Value::Sequence(items) if items.len() as i64 == dim => {
            for item in items {
                decode_nested(datatype, item, rest, order, out)?;
            }
            Ok(())
        }
        other => Err(AsdfError::ShapeMismatch(format!(
            "expected a sequence of {dim} values, got {other:?}"
        ))),
    }
}

fn encode_nested(
    datatype: &Datatype,
    bytes: &[u8],
    shape: &[i64],
    order: ByteOrder,
) -> Result<Value> {
    let Some((&dim, rest)) = shape.split_first() else {
        return datatype.encode_node(bytes, order);
    };
    let count: i64 = rest.iter().product();
    let stride = datatype.type_size() * count.max(0) as usize;
    let mut items = Vec::with_capacity(dim.max(0) as usize);
    for i in 0..dim.max(0) as usize {
        let start = i * stride;
        let chunk = bytes
            .get(start..start + stride)
            .ok_or_else(|| AsdfError::ShapeMismatch("field data is truncated".to_string()))?;
        items.push(encode_nested(datatype, chunk, rest, order)?);
    }
    Ok(Value::Sequence(items))
}

/// Element type of an array: a scalar or an ordered record of fields
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    Scalar(ScalarTypeId),
    Composite(Vec<Field>),
}

impl Datatype {
    /// Parse the `datatype` node of an array or field
    pub fn parse(node: &Value) -> Result<Self> {
        match tree::untagged(node) {
            Value::String(name) => Ok(Datatype::Scalar(name.parse()?)),
            Value::Sequence(items) => {
                if let Some(Value::String(kind)) = items.first().map(tree::untagged) {
                    return Err(AsdfError::UnsupportedType(format!(
                        "string datatype [{kind}, ...] is not supported"
                    )));
                }
                let fields = items.iter().map(Field::parse).collect::<Result<Vec<_>>>()?;
                let size = fields.iter().try_fold(0i64, |acc, field| {
                    shape_bytes(&field.shape, field.datatype.type_size())
                        .and_then(|bytes| acc.checked_add(bytes))
                });
                if size.is_none() {
                    return Err(AsdfError::ShapeMismatch(format!(
                        "record of {} fields overflows",
                        fields.len()
                    )));
                }
                Ok(Datatype::Composite(fields))
            }
            other => Err(AsdfError::UnsupportedType(format!(
                "datatype node {other:?}"
            ))),
        }
    }

    pub fn to_node(&self) -> Value {
        match self {
            Datatype::Scalar(id) => Value::String(id.name().to_string()),
            Datatype::Composite(fields) => {
                Value::Sequence(fields.iter().map(Field::to_node).collect())
            }
        }
    }

    /// Size of one element in bytes
    pub fn type_size(&self) -> usize {
        match self {
            Datatype::Scalar(id) => id.size(),
            Datatype::Composite(fields) => fields
                .iter()
                .fold(0usize, |acc, field| acc.saturating_add(field.size())),
        }
    }

    pub fn scalar_id(&self) -> Option<ScalarTypeId> {
        match self {
            Datatype::Scalar(id) => Some(*id),
            Datatype::Composite(_) => None,
        }
    }

    /// Convert one element from its tree form and append its bytes to `out`
    pub fn decode_node(&self, node: &Value, order: ByteOrder, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Datatype::Scalar(id) => {
                let text = tree::leaf_text(node)?;
                decode_scalar_into(&text, *id, order, out)
            }
            Datatype::Composite(fields) => match tree::untagged(node) {
                Value::Sequence(values) if values.len() == fields.len() => {
                    for (field, value) in fields.iter().zip(values) {
                        field.decode_value(value, order, out)?;
                    }
                    Ok(())
                }
                other => Err(AsdfError::ShapeMismatch(format!(
                    "record with {} fields expected, got {other:?}",
                    fields.len()
                ))),
            },
        }
    }

    /// Tree form of the element stored in `bytes`
    pub fn encode_node(&self, bytes: &[u8], order: ByteOrder) -> Result<Value> {
        match self {
            Datatype::Scalar(id) => Ok(ScalarValue::read(bytes, *id, order)?.to_node()),
            Datatype::Composite(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                let mut offset = 0;
                for field in fields {
                    let size = field.size();
                    let chunk = bytes.get(offset..offset + size).ok_or_else(|| {
                        AsdfError::ShapeMismatch("record data is truncated".to_string())
                    })?;
                    values.push(field.encode_value(chunk, order)?);
                    offset += size;
                }
                Ok(Value::Sequence(values))
            }
        }
    }

    /// Reverse every scalar of the element in place (composites per field)
    pub(crate) fn swap_element(&self, bytes: &mut [u8]) {
        match self {
            Datatype::Scalar(id) => crate::byteorder::swap_words(bytes, id.word_size()),
            Datatype::Composite(fields) => {
                let mut offset = 0;
                for field in fields {
                    let size = field.size();
                    if let Some(chunk) = bytes.get_mut(offset..offset + size) {
                        let inner = field.datatype.type_size().max(1);
                        for element in chunk.chunks_exact_mut(inner) {
                            field.datatype.swap_element(element);
                        }
                    }
                    offset += size;
                }
            }
        }
    }
}

impl From<ScalarTypeId> for Datatype {
    fn from(id: ScalarTypeId) -> Self {
        Datatype::Scalar(id)
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::Scalar(id) => f.write_str(id.name()),
            Datatype::Composite(fields) => write!(f, "composite({} fields)", fields.len()),
        }
    }
}

const REAL: &str = r"[-+]?(?:(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:e[-+]?[0-9]+)?|inf(?:inity)?|nan)";
const SIGNED: &str = r"[-+](?:(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:e[-+]?[0-9]+)?|inf(?:inity)?|nan)";

static COMPLEX_RE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"(?i)^\(?(?:(?P<re>{REAL})(?P<im>{SIGNED})[ij]|(?P<pure_im>{REAL})[ij]|(?P<pure_re>{REAL}))\)?$"
    );
    Regex::new(&pattern).expect("complex number pattern is valid")
});

/// Parse a real number, accepting the YAML spellings `.inf` and `.nan`
fn parse_real<T: FromStr>(text: &str) -> Option<T> {
    let lower = text.trim().to_ascii_lowercase();
    let normalized = match lower.as_str() {
        ".inf" | "+.inf" => "inf",
        "-.inf" => "-inf",
        ".nan" => "nan",
        other => other,
    };
    normalized.parse().ok()
}

/// Parse `[sign]real[sign imag(i|j)]`, optionally parenthesized
fn parse_complex(text: &str) -> Option<(f64, f64)> {
    let caps = COMPLEX_RE.captures(text.trim())?;
    let part = |name: &str| caps.name(name).map(|m| m.as_str());
    if let (Some(re), Some(im)) = (part("re"), part("im")) {
        return Some((parse_real(re)?, parse_real(im)?));
    }
    if let Some(im) = part("pure_im") {
        return Some((0.0, parse_real(im)?));
    }
    let re = part("pure_re")?;
    Some((parse_real(re)?, 0.0))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "True" | "TRUE" | "1" => Some(true),
        "false" | "False" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

/// Parse the text form of a scalar and return its bytes in `order`
pub fn decode_scalar(text: &str, id: ScalarTypeId, order: ByteOrder) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(id.size());
    decode_scalar_into(text, id, order, &mut out)?;
    Ok(out)
}

fn decode_scalar_into(
    text: &str,
    id: ScalarTypeId,
    order: ByteOrder,
    out: &mut Vec<u8>,
) -> Result<()> {
    let trimmed = text.trim();
    let fail = || AsdfError::representation(text, id.name());

    macro_rules! integer {
        ($t:ty) => {
            extend_in_order(trimmed.parse::<$t>().map_err(|_| fail())?, order, out)
        };
    }

    match id {
        ScalarTypeId::Bool8 => out.push(parse_bool(trimmed).ok_or_else(fail)? as u8),
        ScalarTypeId::Int8 => integer!(i8),
        ScalarTypeId::Int16 => integer!(i16),
        ScalarTypeId::Int32 => integer!(i32),
        ScalarTypeId::Int64 => integer!(i64),
        ScalarTypeId::Int128 => integer!(i128),
        ScalarTypeId::UInt8 => integer!(u8),
        ScalarTypeId::UInt16 => integer!(u16),
        ScalarTypeId::UInt32 => integer!(u32),
        ScalarTypeId::UInt64 => integer!(u64),
        ScalarTypeId::UInt128 => integer!(u128),
        ScalarTypeId::Float16 => {
            let v: f32 = parse_real(trimmed).ok_or_else(fail)?;
            extend_in_order(f16::from_f32(v), order, out);
        }
        ScalarTypeId::Float32 => {
            extend_in_order(parse_real::<f32>(trimmed).ok_or_else(fail)?, order, out)
        }
        ScalarTypeId::Float64 => {
            extend_in_order(parse_real::<f64>(trimmed).ok_or_else(fail)?, order, out)
        }
        ScalarTypeId::Complex32 => {
            let (re, im) = parse_complex(trimmed).ok_or_else(fail)?;
            extend_in_order(f16::from_f64(re), order, out);
            extend_in_order(f16::from_f64(im), order, out);
        }
        ScalarTypeId::Complex64 => {
            let (re, im) = parse_complex(trimmed).ok_or_else(fail)?;
            extend_in_order(re as f32, order, out);
            extend_in_order(im as f32, order, out);
        }
        ScalarTypeId::Complex128 => {
            let (re, im) = parse_complex(trimmed).ok_or_else(fail)?;
            extend_in_order(re, order, out);
            extend_in_order(im, order, out);
        }
        ScalarTypeId::Ascii | ScalarTypeId::Ucs4 => {
            return Err(AsdfError::UnsupportedType(format!(
                "{} scalars cannot be converted",
                id.name()
            )))
        }
    }
    Ok(())
}

/// Render the scalar stored in `bytes` as text
pub fn encode_scalar(bytes: &[u8], id: ScalarTypeId, order: ByteOrder) -> Result<String> {
    Ok(ScalarValue::read(bytes, id, order)?.to_string())
}

#[derive(Debug, Clone, Copy)]
enum Real {
    Half(f16),
    Single(f32),
    Double(f64),
}

impl Real {
    fn to_f64(self) -> f64 {
        match self {
            Real::Half(v) => v.to_f64(),
            Real::Single(v) => v as f64,
            Real::Double(v) => v,
        }
    }

    /// Shortest decimal that reads back to the same value at this width
    fn tree_value(self) -> f64 {
        self.to_string().parse().unwrap_or_else(|_| self.to_f64())
    }
}

impl fmt::Display for Real {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Real::Half(v) => write!(f, "{:?}", v.to_f32()),
            Real::Single(v) => write!(f, "{v:?}"),
            Real::Double(v) => write!(f, "{v:?}"),
        }
    }
}

/// Host view of one stored scalar
#[derive(Debug, Clone, Copy)]
enum ScalarValue {
    Bool(bool),
    Int(i128),
    UInt(u128),
    Real(Real),
    Complex(Real, Real),
}

impl ScalarValue {
    fn read(bytes: &[u8], id: ScalarTypeId, order: ByteOrder) -> Result<Self> {
        if bytes.len() < id.size() {
            return Err(AsdfError::ShapeMismatch(format!(
                "{} needs {} bytes, got {}",
                id.name(),
                id.size(),
                bytes.len()
            )));
        }
        let half = id.size() / 2;
        Ok(match id {
            ScalarTypeId::Bool8 => ScalarValue::Bool(bytes[0] != 0),
            ScalarTypeId::Int8 => ScalarValue::Int(to_host::<i8>(bytes, order) as i128),
            ScalarTypeId::Int16 => ScalarValue::Int(to_host::<i16>(bytes, order) as i128),
            ScalarTypeId::Int32 => ScalarValue::Int(to_host::<i32>(bytes, order) as i128),
            ScalarTypeId::Int64 => ScalarValue::Int(to_host::<i64>(bytes, order) as i128),
            ScalarTypeId::Int128 => ScalarValue::Int(to_host::<i128>(bytes, order)),
            ScalarTypeId::UInt8 => ScalarValue::UInt(bytes[0] as u128),
            ScalarTypeId::UInt16 => ScalarValue::UInt(to_host::<u16>(bytes, order) as u128),
            ScalarTypeId::UInt32 => ScalarValue::UInt(to_host::<u32>(bytes, order) as u128),
            ScalarTypeId::UInt64 => ScalarValue::UInt(to_host::<u64>(bytes, order) as u128),
            ScalarTypeId::UInt128 => ScalarValue::UInt(to_host::<u128>(bytes, order)),
            ScalarTypeId::Float16 => ScalarValue::Real(Real::Half(to_host(bytes, order))),
            ScalarTypeId::Float32 => ScalarValue::Real(Real::Single(to_host(bytes, order))),
            ScalarTypeId::Float64 => ScalarValue::Real(Real::Double(to_host(bytes, order))),
            ScalarTypeId::Complex32 => ScalarValue::Complex(
                Real::Half(to_host(bytes, order)),
                Real::Half(to_host(&bytes[half..], order)),
            ),
            ScalarTypeId::Complex64 => ScalarValue::Complex(
                Real::Single(to_host(bytes, order)),
                Real::Single(to_host(&bytes[half..], order)),
            ),
            ScalarTypeId::Complex128 => ScalarValue::Complex(
                Real::Double(to_host(bytes, order)),
                Real::Double(to_host(&bytes[half..], order)),
            ),
            ScalarTypeId::Ascii | ScalarTypeId::Ucs4 => {
                return Err(AsdfError::UnsupportedType(format!(
                    "{} scalars cannot be converted",
                    id.name()
                )))
            }
        })
    }

    fn to_node(self) -> Value {
        match self {
            ScalarValue::Bool(b) => Value::Bool(b),
            ScalarValue::Int(v) => match i64::try_from(v) {
                Ok(v) => Value::Number(v.into()),
                Err(_) => Value::String(v.to_string()),
            },
            ScalarValue::UInt(v) => match u64::try_from(v) {
                Ok(v) => Value::Number(v.into()),
                Err(_) => Value::String(v.to_string()),
            },
            ScalarValue::Real(r) => Value::Number(Number::from(r.tree_value())),
            ScalarValue::Complex(..) => tree::tagged(TAG_COMPLEX, Value::String(self.to_string())),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::UInt(v) => write!(f, "{v}"),
            ScalarValue::Real(r) => write!(f, "{r}"),
            ScalarValue::Complex(re, im) => {
                let im = im.to_string();
                let sign = if im.starts_with('-') { "" } else { "+" };
                write!(f, "{re}{sign}{im}i")
            }
        }
    }
}
