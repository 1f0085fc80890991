// SPDX-License-Identifier: MIT
//! N-dimensional arrays backed by a block payload or by inline tree data
//!
//! An array is a view: a datatype, a byte order, a shape, and a byte offset
//! and strides into its payload. Block-backed arrays keep their payload lazy
//! until it is first used.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::block::{Block, BlockInfo};
use crate::byteorder::ByteOrder;
use crate::codec::Compression;
use crate::datatype::{decode_nested, shape_bytes, Datatype, ScalarTypeId};
use crate::element::{encode_elements, Element};
use crate::error::{AsdfError, Result};
use crate::memoized::Memoized;
use crate::reader::DocumentState;
use crate::tree::{self, TAG_NDARRAY};
use crate::writer::BlockWriteQueue;

/// Scalar types tried, in order, for inline data without a datatype
const INLINE_CANDIDATES: [ScalarTypeId; 3] = [
    ScalarTypeId::Int64,
    ScalarTypeId::Float64,
    ScalarTypeId::Complex128,
];

/// Where an array's elements are stored when written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// In a binary block after the tree
    Block,
    /// As nested sequences in the tree
    Inline,
}

impl StorageMode {
    pub fn name(self) -> &'static str {
        match self {
            StorageMode::Block => "block",
            StorageMode::Inline => "inline",
        }
    }
}

impl FromStr for StorageMode {
    type Err = AsdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(StorageMode::Block),
            "inline" => Ok(StorageMode::Inline),
            other => Err(AsdfError::Config(format!("unknown storage mode '{other}'"))),
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Overrides applied when copying an array; `None` keeps the source setting
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CopyState {
    pub storage_mode: Option<StorageMode>,
    pub compression: Option<Compression>,
    pub compression_level: Option<i32>,
}

/// C-order strides in bytes
pub fn default_strides(shape: &[i64], type_size: usize) -> Result<Vec<i64>> {
    let overflow = || {
        AsdfError::ShapeMismatch(format!(
            "shape {shape:?} of {type_size}-byte elements overflows"
        ))
    };
    let mut strides = vec![0; shape.len()];
    let mut stride = i64::try_from(type_size).map_err(|_| overflow())?;
    for d in (0..shape.len()).rev() {
        strides[d] = stride;
        stride = stride.checked_mul(shape[d]).ok_or_else(overflow)?;
    }
    Ok(strides)
}

#[derive(Clone)]
pub struct NDArray {
    data: Memoized<Block>,
    block_info: Option<BlockInfo>,
    storage_mode: StorageMode,
    compression: Compression,
    compression_level: i32,
    mask: Vec<bool>,
    datatype: Arc<Datatype>,
    byteorder: ByteOrder,
    shape: Vec<i64>,
    offset: i64,
    strides: Vec<i64>,
}

impl NDArray {
    /// A C-ordered array over `data`, stored as an uncompressed block
    pub fn new(
        data: Memoized<Block>,
        datatype: Datatype,
        byteorder: ByteOrder,
        shape: Vec<i64>,
    ) -> Result<Self> {
        if let Some(&dim) = shape.iter().find(|&&d| d < 0) {
            return Err(AsdfError::ShapeMismatch(format!(
                "negative dimension {dim} in shape {shape:?}"
            )));
        }
        if shape_bytes(&shape, 1).is_none() {
            return Err(AsdfError::ShapeMismatch(format!(
                "element count of shape {shape:?} overflows"
            )));
        }
        let strides = default_strides(&shape, datatype.type_size())?;
        Ok(Self {
            data,
            block_info: None,
            storage_mode: StorageMode::Block,
            compression: Compression::None,
            compression_level: 0,
            mask: Vec::new(),
            datatype: Arc::new(datatype),
            byteorder,
            shape,
            offset: 0,
            strides,
        })
    }

    /// An array over raw payload bytes, which must hold exactly
    /// `Π shape` elements of `datatype`
    pub fn from_bytes(
        bytes: Vec<u8>,
        datatype: Datatype,
        byteorder: ByteOrder,
        shape: Vec<i64>,
    ) -> Result<Self> {
        let block = match datatype.scalar_id() {
            Some(id) => Block::typed(bytes, id),
            None => Block::new(bytes),
        };
        let array = Self::new(Memoized::constant(block), datatype, byteorder, shape)?;
        array.data()?;
        Ok(array)
    }

    /// An array of host values in host byte order
    pub fn from_vec<T: Element>(values: Vec<T>, shape: Vec<i64>) -> Result<Self> {
        if shape_bytes(&shape, 1) != Some(values.len() as i64) {
            return Err(AsdfError::ShapeMismatch(format!(
                "shape {shape:?} does not hold {} elements",
                values.len()
            )));
        }
        let order = ByteOrder::host();
        let block = Block::typed(encode_elements(&values, order), T::TYPE_ID);
        Self::new(
            Memoized::constant(block),
            Datatype::Scalar(T::TYPE_ID),
            order,
            shape,
        )
    }

    /// Use a non-default byte offset and strides into the payload
    pub fn with_layout(mut self, offset: i64, strides: Vec<i64>) -> Result<Self> {
        if strides.len() != self.shape.len() {
            return Err(AsdfError::ShapeMismatch(format!(
                "{} strides for a rank {} shape",
                strides.len(),
                self.shape.len()
            )));
        }
        if strides.contains(&0) {
            return Err(AsdfError::ShapeMismatch(format!(
                "zero stride in {strides:?}"
            )));
        }
        if offset < 0 {
            return Err(AsdfError::ShapeMismatch(format!("negative offset {offset}")));
        }
        self.offset = offset;
        self.strides = strides;
        Ok(self)
    }

    pub fn with_storage_mode(mut self, storage_mode: StorageMode) -> Self {
        self.storage_mode = storage_mode;
        self
    }

    pub fn with_compression(mut self, compression: Compression, level: i32) -> Self {
        self.compression = compression;
        self.compression_level = level;
        self
    }

    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    pub fn byteorder(&self) -> ByteOrder {
        self.byteorder
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn strides(&self) -> &[i64] {
        &self.strides
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.storage_mode
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    /// Header of the block this array was read from
    pub fn block_info(&self) -> Option<&BlockInfo> {
        self.block_info.as_ref()
    }

    /// Per-element validity; masks are not read, so this is always empty
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Lazy payload handle shared with every other view of the same block
    pub fn memoized(&self) -> &Memoized<Block> {
        &self.data
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product::<i64>().max(0) as usize
    }

    fn has_default_layout(&self) -> bool {
        self.offset == 0
            && default_strides(&self.shape, self.datatype.type_size())
                .is_ok_and(|strides| strides == self.strides)
    }

    /// Materialize the payload and check that the view fits inside it
    pub fn data(&self) -> Result<Arc<Block>> {
        let block = self.data.get()?;
        let size = self.datatype.type_size() as i64;
        let len = block.len() as i64;

        if let (Some(tag), Some(id)) = (block.element(), self.datatype.scalar_id()) {
            if tag.size() != id.size() {
                return Err(AsdfError::ShapeMismatch(format!(
                    "payload holds {tag} elements, array declares {id}"
                )));
            }
        }

        let overflow = || {
            AsdfError::ShapeMismatch(format!(
                "view with shape {:?}, offset {} and strides {:?} overflows",
                self.shape, self.offset, self.strides
            ))
        };

        if self.has_default_layout() {
            let expected = shape_bytes(&self.shape, self.datatype.type_size()).ok_or_else(overflow)?;
            if len != expected {
                return Err(AsdfError::ShapeMismatch(format!(
                    "shape {:?} of {} needs {expected} bytes, payload has {len}",
                    self.shape, self.datatype
                )));
            }
        } else if self.element_count() > 0 {
            let (mut low, mut high) = (self.offset, self.offset);
            for (&dim, &stride) in self.shape.iter().zip(&self.strides) {
                let reach = (dim - 1).checked_mul(stride).ok_or_else(overflow)?;
                if reach < 0 {
                    low = low.checked_add(reach).ok_or_else(overflow)?;
                } else {
                    high = high.checked_add(reach).ok_or_else(overflow)?;
                }
            }
            if low < 0 || high.checked_add(size).map_or(true, |end| end > len) {
                return Err(AsdfError::ShapeMismatch(format!(
                    "view with offset {} and strides {:?} reaches outside a {len}-byte payload",
                    self.offset, self.strides
                )));
            }
        }
        Ok(block)
    }

    /// Byte position of the element at `index` within the payload
    pub fn linear_index(&self, index: &[i64]) -> Result<i64> {
        let out_of_range = || AsdfError::IndexOutOfRange {
            index: index.to_vec(),
            shape: self.shape.clone(),
        };
        if index.len() != self.shape.len() {
            return Err(out_of_range());
        }
        let mut position = self.offset;
        for ((&i, &dim), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if i < 0 || i >= dim {
                return Err(out_of_range());
            }
            position = i
                .checked_mul(stride)
                .and_then(|step| position.checked_add(step))
                .ok_or_else(|| {
                    AsdfError::ShapeMismatch(format!(
                        "position of {index:?} with strides {:?} overflows",
                        self.strides
                    ))
                })?;
        }
        Ok(position)
    }

    /// Byte positions of every element in C order.
    ///
    /// Only called once `data` has checked the view's extent; a carry may
    /// step one stride past it, so the running position wraps.
    fn element_positions(&self) -> Vec<i64> {
        let count = self.element_count();
        let mut positions = Vec::with_capacity(count);
        if count == 0 {
            return positions;
        }
        let mut index = vec![0i64; self.shape.len()];
        let mut position = self.offset;
        loop {
            positions.push(position);
            let mut d = self.shape.len();
            loop {
                if d == 0 {
                    return positions;
                }
                d -= 1;
                index[d] += 1;
                position = position.wrapping_add(self.strides[d]);
                if index[d] < self.shape[d] {
                    break;
                }
                position = position.wrapping_sub(self.strides[d].wrapping_mul(index[d]));
                index[d] = 0;
            }
        }
    }

    fn check_element<T: Element>(&self) -> Result<()> {
        match *self.datatype {
            Datatype::Scalar(id) if id == T::TYPE_ID => Ok(()),
            ref other => Err(AsdfError::UnsupportedType(format!(
                "array of {other} read as {}",
                T::TYPE_ID
            ))),
        }
    }

    /// Stored bytes of one element, in the array's byte order
    pub fn element_bytes(&self, index: &[i64]) -> Result<Vec<u8>> {
        let position = self.linear_index(index)? as usize;
        let block = self.data()?;
        Ok(block.bytes()[position..position + self.datatype.type_size()].to_vec())
    }

    /// One element converted to host order
    pub fn get<T: Element>(&self, index: &[i64]) -> Result<T> {
        self.check_element::<T>()?;
        let position = self.linear_index(index)? as usize;
        let block = self.data()?;
        Ok(T::read_from(&block.bytes()[position..], self.byteorder))
    }

    /// All elements in C order, converted to host order
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.check_element::<T>()?;
        let block = self.data()?;
        Ok(self
            .element_positions()
            .into_iter()
            .map(|p| T::read_from(&block.bytes()[p as usize..], self.byteorder))
            .collect())
    }

    /// Read an array node of `state`'s tree
    pub fn from_node(state: &DocumentState, node: &Value) -> Result<Self> {
        if !matches!(tree::untagged(node), Value::Mapping(_)) {
            return Err(AsdfError::invalid_node(
                "ndarray",
                format!("expected a mapping, got {node:?}"),
            ));
        }
        if tree::lookup(node, "mask").is_some() {
            tracing::warn!("ignoring ndarray mask");
        }
        if let Some(source) = tree::lookup(node, "source") {
            Self::from_block_node(state, node, tree::as_i64(source, "source")?)
        } else if let Some(data) = tree::lookup(node, "data") {
            Self::from_inline_node(node, data)
        } else {
            Err(AsdfError::invalid_node(
                "ndarray",
                "neither 'source' nor 'data' is present",
            ))
        }
    }

    fn from_block_node(state: &DocumentState, node: &Value, source: i64) -> Result<Self> {
        let required = |key: &'static str| {
            tree::lookup(node, key)
                .ok_or_else(|| AsdfError::invalid_node(key, "required for block arrays"))
        };
        let data = state.block(source)?;
        let info = *state.block_info(source)?;
        let datatype = Datatype::parse(required("datatype")?)?;
        let byteorder = ByteOrder::from_node(required("byteorder")?)?;
        let shape = tree::as_i64_seq(required("shape")?, "shape")?;

        let mut array = Self::new(data, datatype, byteorder, shape)?;
        let offset = tree::lookup(node, "offset")
            .map(|n| tree::as_i64(n, "offset"))
            .transpose()?
            .unwrap_or(0);
        if let Some(strides) = tree::lookup(node, "strides") {
            array = array.with_layout(offset, tree::as_i64_seq(strides, "strides")?)?;
        } else if offset != 0 {
            let strides = array.strides.clone();
            array = array.with_layout(offset, strides)?;
        }

        array.block_info = Some(info);
        array.compression = info.compression;
        array.compression_level = info.compression.default_level();
        Ok(array)
    }

    fn from_inline_node(node: &Value, data: &Value) -> Result<Self> {
        let declared = tree::lookup(node, "datatype").map(Datatype::parse).transpose()?;
        let shape = match tree::lookup(node, "shape") {
            Some(shape) => tree::as_i64_seq(shape, "shape")?,
            None if matches!(declared, Some(Datatype::Composite(_))) => {
                return Err(AsdfError::invalid_node(
                    "shape",
                    "required for inline arrays of records",
                ))
            }
            None => infer_shape(data),
        };

        let order = ByteOrder::host();
        let (bytes, datatype) = match declared {
            Some(datatype) => (decode_inline(data, &datatype, &shape, order)?, datatype),
            None => probe_inline(data, &shape, order)?,
        };

        let array = Self::new(Memoized::constant(Block::new(bytes)), datatype, order, shape)?
            .with_storage_mode(StorageMode::Inline);
        array.data()?;
        Ok(array)
    }

    /// Emit the array node, registering a block write when stored as a block
    pub fn to_node(&self, queue: &mut BlockWriteQueue) -> Result<Value> {
        let mut map = Mapping::new();
        match self.storage_mode {
            StorageMode::Block => {
                let source = queue.push(self.data.clone(), self.compression, self.compression_level);
                map.insert("source".into(), Value::Number(source.into()));
                map.insert("datatype".into(), self.datatype.to_node());
                map.insert("byteorder".into(), self.byteorder.to_node());
                map.insert("shape".into(), tree::i64_seq(&self.shape));
                map.insert("offset".into(), Value::Number(self.offset.into()));
                map.insert("strides".into(), tree::i64_seq(&self.strides));
            }
            StorageMode::Inline => {
                let block = self.data()?;
                let data = self.emit_inline(block.bytes(), 0, self.offset)?;
                map.insert("data".into(), data);
                map.insert("datatype".into(), self.datatype.to_node());
                map.insert("shape".into(), tree::i64_seq(&self.shape));
            }
        }
        Ok(tree::tagged(TAG_NDARRAY, Value::Mapping(map)))
    }

    fn emit_inline(&self, bytes: &[u8], dim: usize, position: i64) -> Result<Value> {
        if dim == self.shape.len() {
            let start = position as usize;
            let element = &bytes[start..start + self.datatype.type_size()];
            return self.datatype.encode_node(element, self.byteorder);
        }
        let items = (0..self.shape[dim])
            .map(|i| self.emit_inline(bytes, dim + 1, position + i * self.strides[dim]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Sequence(items))
    }

    /// A copy with the settings of `state` applied over this array's own.
    ///
    /// The payload handle is shared, so the copy does not load anything.
    pub fn copy(&self, state: &CopyState) -> NDArray {
        let mut copy = self.clone();
        if let Some(mode) = state.storage_mode {
            copy.storage_mode = mode;
        }
        if let Some(compression) = state.compression {
            if compression != copy.compression {
                copy.compression_level = compression.default_level();
            }
            copy.compression = compression;
        }
        if let Some(level) = state.compression_level {
            copy.compression_level = level;
        }
        copy
    }
}

impl fmt::Debug for NDArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NDArray")
            .field("datatype", &self.datatype)
            .field("byteorder", &self.byteorder)
            .field("shape", &self.shape)
            .field("offset", &self.offset)
            .field("strides", &self.strides)
            .field("storage_mode", &self.storage_mode)
            .field("compression", &self.compression)
            .finish()
    }
}

/// Shape of nested sequences, following first elements
fn infer_shape(data: &Value) -> Vec<i64> {
    let mut shape = Vec::new();
    let mut node = data;
    while let Value::Sequence(items) = tree::untagged(node) {
        shape.push(items.len() as i64);
        match items.first() {
            Some(first) => node = first,
            None => break,
        }
    }
    shape
}

fn decode_inline(
    data: &Value,
    datatype: &Datatype,
    shape: &[i64],
    order: ByteOrder,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decode_nested(datatype, data, shape, order, &mut out)?;
    Ok(out)
}

/// Try each candidate type in order; the first that represents every
/// element wins
fn probe_inline(data: &Value, shape: &[i64], order: ByteOrder) -> Result<(Vec<u8>, Datatype)> {
    for id in INLINE_CANDIDATES {
        let datatype = Datatype::Scalar(id);
        match decode_inline(data, &datatype, shape, order) {
            Ok(bytes) => return Ok((bytes, datatype)),
            Err(AsdfError::Representation { .. }) => continue,
            Err(other) => return Err(other),
        }
    }
    Err(AsdfError::UnsupportedType(
        "inline data is not int64, float64 or complex128".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::element::Complex;
    use std::io::Cursor;

    fn inline(yaml: &str) -> Result<NDArray> {
        let state = DocumentState::from_reader(
            Cursor::new(b"#ASDF 1.0.0\n---\n{}\n...\n".to_vec()),
            None,
            &Config::default(),
        )?;
        let node: Value = serde_yaml::from_str(yaml)?;
        NDArray::from_node(&state, &node)
    }

    #[test]
    fn test_default_strides() {
        assert_eq!(default_strides(&[3, 4, 2], 4).unwrap(), vec![32, 8, 4]);
        assert_eq!(default_strides(&[2, 3, 4], 8).unwrap(), vec![96, 32, 8]);
        assert_eq!(default_strides(&[], 8).unwrap(), Vec::<i64>::new());
        assert!(matches!(
            default_strides(&[1 << 40, 1 << 40], 8),
            Err(AsdfError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_oversized_layouts_are_errors() {
        let huge_stride = NDArray::from_vec(vec![1u8, 2, 3], vec![3])
            .unwrap()
            .with_layout(0, vec![1 << 62])
            .unwrap();
        assert!(matches!(
            huge_stride.to_vec::<u8>(),
            Err(AsdfError::ShapeMismatch(_))
        ));
        assert!(matches!(
            huge_stride.linear_index(&[2]),
            Err(AsdfError::ShapeMismatch(_))
        ));

        let huge_offset = NDArray::from_vec(vec![1u8, 2], vec![2])
            .unwrap()
            .with_layout(i64::MAX, vec![1])
            .unwrap();
        assert!(matches!(
            huge_offset.to_vec::<u8>(),
            Err(AsdfError::ShapeMismatch(_))
        ));

        assert!(matches!(
            NDArray::new(
                Memoized::constant(Block::new(Vec::new())),
                Datatype::Scalar(ScalarTypeId::Float64),
                ByteOrder::Little,
                vec![1 << 31, 1 << 31, 1 << 31],
            ),
            Err(AsdfError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_block_node_with_oversized_strides() {
        let mut bytes = b"#ASDF 1.0.0\n---\na: !core/ndarray-1.0.0 {source: 0, datatype: int32, \
            byteorder: little, shape: [3], strides: [4611686018427387904]}\n...\n"
            .to_vec();
        let mut blocks = Cursor::new(Vec::new());
        crate::block::write_block(&mut blocks, &Block::new(vec![0; 12]), Compression::None, 0)
            .unwrap();
        bytes.extend(blocks.into_inner());

        let state = DocumentState::from_reader(Cursor::new(bytes), None, &Config::default()).unwrap();
        let node = state.resolve_path(&["a"]).unwrap();
        let array = NDArray::from_node(&state, &node).unwrap();
        assert_eq!(array.strides(), &[1 << 62]);
        assert!(matches!(
            array.to_vec::<i32>(),
            Err(AsdfError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_linear_index() {
        let array = NDArray::from_vec((0..24).map(|v| v as f64).collect(), vec![2, 3, 4]).unwrap();
        assert_eq!(array.strides(), &[96, 32, 8]);
        assert_eq!(array.linear_index(&[1, 2, 3]).unwrap(), 96 + 64 + 24);
        assert_eq!(array.get::<f64>(&[1, 2, 3]).unwrap(), 23.0);
        assert!(matches!(
            array.linear_index(&[2, 0, 0]),
            Err(AsdfError::IndexOutOfRange { .. })
        ));
        assert!(array.linear_index(&[0, 0]).is_err());
        assert!(array.linear_index(&[0, -1, 0]).is_err());
    }

    #[test]
    fn test_from_vec_shape_mismatch() {
        assert!(matches!(
            NDArray::from_vec(vec![1i32, 2, 3], vec![2, 2]),
            Err(AsdfError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_from_bytes_checks_length() {
        let datatype = Datatype::Scalar(ScalarTypeId::Int32);
        assert!(NDArray::from_bytes(vec![0; 8], datatype.clone(), ByteOrder::Big, vec![2]).is_ok());
        assert!(NDArray::from_bytes(vec![0; 7], datatype, ByteOrder::Big, vec![2]).is_err());
    }

    #[test]
    fn test_big_endian_payload_read_as_host() {
        let bytes: Vec<u8> = [1u32, 2, 3].iter().flat_map(|v| v.to_be_bytes()).collect();
        let array = NDArray::from_bytes(
            bytes,
            Datatype::Scalar(ScalarTypeId::UInt32),
            ByteOrder::Big,
            vec![3],
        )
        .unwrap();
        assert_eq!(array.to_vec::<u32>().unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            array.to_vec::<i32>(),
            Err(AsdfError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_strided_view() {
        let base = NDArray::from_vec((0..12).collect::<Vec<i64>>(), vec![3, 4]).unwrap();
        let column = NDArray::new(
            base.memoized().clone(),
            Datatype::Scalar(ScalarTypeId::Int64),
            ByteOrder::host(),
            vec![3],
        )
        .unwrap()
        .with_layout(8, vec![32])
        .unwrap();
        assert_eq!(column.to_vec::<i64>().unwrap(), vec![1, 5, 9]);

        let reversed = NDArray::new(
            base.memoized().clone(),
            Datatype::Scalar(ScalarTypeId::Int64),
            ByteOrder::host(),
            vec![4],
        )
        .unwrap()
        .with_layout(24, vec![-8])
        .unwrap();
        assert_eq!(reversed.to_vec::<i64>().unwrap(), vec![3, 2, 1, 0]);

        let outside = NDArray::new(
            base.memoized().clone(),
            Datatype::Scalar(ScalarTypeId::Int64),
            ByteOrder::host(),
            vec![3],
        )
        .unwrap()
        .with_layout(8, vec![48])
        .unwrap();
        assert!(matches!(outside.data(), Err(AsdfError::ShapeMismatch(_))));
    }

    #[test]
    fn test_inline_inference_order() {
        let ints = inline("{data: [[1, 2], [3, 4]]}").unwrap();
        assert_eq!(ints.datatype(), &Datatype::Scalar(ScalarTypeId::Int64));
        assert_eq!(ints.shape(), &[2, 2]);
        assert_eq!(ints.storage_mode(), StorageMode::Inline);
        assert_eq!(ints.to_vec::<i64>().unwrap(), vec![1, 2, 3, 4]);

        let floats = inline("{data: [1.5, 2]}").unwrap();
        assert_eq!(floats.datatype(), &Datatype::Scalar(ScalarTypeId::Float64));
        assert_eq!(floats.to_vec::<f64>().unwrap(), vec![1.5, 2.0]);

        let complex = inline("{data: [1+2i, 3]}").unwrap();
        assert_eq!(complex.datatype(), &Datatype::Scalar(ScalarTypeId::Complex128));
        assert_eq!(
            complex.to_vec::<Complex<f64>>().unwrap(),
            vec![Complex::new(1.0, 2.0), Complex::new(3.0, 0.0)]
        );

        assert!(matches!(
            inline("{data: [true, false]}"),
            Err(AsdfError::UnsupportedType(_))
        ));
        assert!(matches!(
            inline("{data: [abc]}"),
            Err(AsdfError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_inline_with_declared_type() {
        let array = inline("{data: [1, 2, 3], datatype: uint8, shape: [3]}").unwrap();
        assert_eq!(array.to_vec::<u8>().unwrap(), vec![1, 2, 3]);
        assert!(inline("{data: [1, 2, 3], datatype: uint8, shape: [4]}").is_err());
        assert!(inline("{data: [1, 300], datatype: uint8}").is_err());
    }

    #[test]
    fn test_inline_records() {
        let yaml = "{data: [[1, 2.5], [3, 4.5]], shape: [2], datatype: [{name: id, datatype: int16}, {name: value, datatype: float32}]}";
        let array = inline(yaml).unwrap();
        assert_eq!(array.datatype().type_size(), 6);
        assert_eq!(array.element_bytes(&[1]).unwrap().len(), 6);

        let missing_shape = "{data: [[1, 2.5]], datatype: [{name: id, datatype: int16}, {name: value, datatype: float32}]}";
        assert!(matches!(
            inline(missing_shape),
            Err(AsdfError::InvalidNode { .. })
        ));
    }

    #[test]
    fn test_node_without_data() {
        assert!(matches!(
            inline("{shape: [2]}"),
            Err(AsdfError::InvalidNode { .. })
        ));
        assert!(inline("[1, 2]").is_err());
    }

    #[test]
    fn test_inline_to_node_round_trip() {
        let array = NDArray::from_vec(vec![1i64, 2, 3, 4], vec![2, 2])
            .unwrap()
            .with_storage_mode(StorageMode::Inline);
        let mut queue = BlockWriteQueue::new();
        let node = array.to_node(&mut queue).unwrap();
        assert!(queue.is_empty());
        assert!(tree::has_tag(&node, "core/ndarray"));
        let expected: Value = serde_yaml::from_str("[[1, 2], [3, 4]]").unwrap();
        assert_eq!(tree::lookup(&node, "data").unwrap(), &expected);
        assert_eq!(
            tree::lookup(&node, "datatype").unwrap(),
            &Value::String("int64".into())
        );
    }

    #[test]
    fn test_block_to_node_registers_write() {
        let array = NDArray::from_vec(vec![1.0f32, 2.0], vec![2])
            .unwrap()
            .with_compression(Compression::Zlib, 9);
        let mut queue = BlockWriteQueue::new();
        let node = array.to_node(&mut queue).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(tree::lookup(&node, "source").unwrap(), &Value::Number(0.into()));
        assert_eq!(
            tree::lookup(&node, "byteorder").unwrap(),
            &ByteOrder::host().to_node()
        );
        assert_eq!(
            tree::lookup(&node, "strides").unwrap(),
            &tree::i64_seq(&[4])
        );
    }

    #[test]
    fn test_copy_overrides() {
        let array = NDArray::from_vec(vec![1u16, 2], vec![2]).unwrap();
        let copy = array.copy(&CopyState {
            storage_mode: Some(StorageMode::Inline),
            compression: Some(Compression::Zlib),
            compression_level: None,
        });
        assert_eq!(copy.storage_mode(), StorageMode::Inline);
        assert_eq!(copy.compression(), Compression::Zlib);
        assert_eq!(copy.compression_level(), Compression::Zlib.default_level());
        assert!(copy.memoized().ptr_eq(array.memoized()));

        let same = array.copy(&CopyState::default());
        assert_eq!(same.storage_mode(), StorageMode::Block);
        assert_eq!(same.compression(), Compression::None);
    }

    #[test]
    fn test_zero_sized_array() {
        let array = NDArray::from_vec(Vec::<f64>::new(), vec![0, 3]).unwrap();
        assert_eq!(array.element_count(), 0);
        assert!(array.to_vec::<f64>().unwrap().is_empty());
        let inline = array.with_storage_mode(StorageMode::Inline);
        let node = inline.to_node(&mut BlockWriteQueue::new()).unwrap();
        assert_eq!(tree::lookup(&node, "data").unwrap(), &Value::Sequence(vec![]));
    }
}
