// SPDX-License-Identifier: MIT
//! Property-based tests using proptest
//!
//! These tests generate many random inputs to check the invariants of the
//! codecs, the block framing, scalar text forms, and reference targets.

use std::io::Cursor;

use proptest::prelude::*;

use asdf_container::block::{read_block, shared_stream, write_block};
use asdf_container::datatype::{decode_scalar, encode_scalar};
use asdf_container::{
    AsdfFile, Block, ByteOrder, Compression, Config, Document, NDArray, Reference, ScalarTypeId,
    StorageMode,
};

/// Payloads from incompressible noise to long runs
fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..4096),
        (any::<u8>(), 0..8192usize).prop_map(|(byte, len)| vec![byte; len]),
        prop::collection::vec(0u8..4, 0..4096),
    ]
}

fn available_compression() -> impl Strategy<Value = Compression> {
    prop::sample::select(
        Compression::ALL
            .iter()
            .copied()
            .filter(|c| c.is_available())
            .collect::<Vec<_>>(),
    )
}

fn byteorder_strategy() -> impl Strategy<Value = ByteOrder> {
    prop_oneof![Just(ByteOrder::Big), Just(ByteOrder::Little)]
}

/// Any double; NaN is reduced to the single quiet NaN that text can carry
fn any_double() -> impl Strategy<Value = f64> {
    prop_oneof![
        9 => any::<f64>().prop_map(|v| if v.is_nan() { f64::NAN } else { v }),
        1 => Just(f64::NAN),
    ]
}

proptest! {
    /// Every available codec restores its input exactly
    #[test]
    fn codec_round_trip(data in payload_strategy(), compression in available_compression()) {
        let codec = compression.codec();
        let packed = codec.compress(&data, compression.default_level()).unwrap();
        let unpacked = codec.decompress(&packed, data.len()).unwrap();
        prop_assert_eq!(unpacked, data);
    }

    /// Written blocks never store more than the raw payload unless uncompressed
    #[test]
    fn compression_never_inflates(data in payload_strategy(), compression in available_compression()) {
        let mut out = Cursor::new(Vec::new());
        let header = write_block(&mut out, &Block::new(data.clone()), compression, compression.default_level()).unwrap();
        prop_assert!(
            header.allocated_space <= header.data_space || header.compression == [0; 4],
            "{} stored {} bytes for {}", compression, header.allocated_space, header.data_space
        );
        prop_assert!(header.used_space >= header.allocated_space);

        let stream = shared_stream(Cursor::new(out.into_inner()));
        let (block, info) = read_block(&stream, true).unwrap().unwrap();
        prop_assert!(info.header_read <= u64::from(info.header.header_size));
        let loaded = block.get().unwrap();
        prop_assert_eq!(loaded.bytes(), data.as_slice());
    }

    /// Text forms of 64-bit scalars read back to the same bytes
    #[test]
    fn int64_text_round_trip(value in any::<i64>(), order in byteorder_strategy()) {
        let bytes = decode_scalar(&value.to_string(), ScalarTypeId::Int64, order).unwrap();
        let text = encode_scalar(&bytes, ScalarTypeId::Int64, order).unwrap();
        prop_assert_eq!(decode_scalar(&text, ScalarTypeId::Int64, order).unwrap(), bytes);
    }

    #[test]
    fn float64_text_round_trip(value in any_double(), order in byteorder_strategy()) {
        let bytes = match order {
            ByteOrder::Big => value.to_be_bytes().to_vec(),
            ByteOrder::Little => value.to_le_bytes().to_vec(),
        };
        let text = encode_scalar(&bytes, ScalarTypeId::Float64, order).unwrap();
        prop_assert_eq!(decode_scalar(&text, ScalarTypeId::Float64, order).unwrap(), bytes);
    }

    #[test]
    fn complex128_text_round_trip(re in any_double(), im in any_double()) {
        let order = ByteOrder::Little;
        let mut bytes = re.to_le_bytes().to_vec();
        bytes.extend_from_slice(&im.to_le_bytes());
        let text = encode_scalar(&bytes, ScalarTypeId::Complex128, order).unwrap();
        prop_assert_eq!(decode_scalar(&text, ScalarTypeId::Complex128, order).unwrap(), bytes);
    }

    /// Any path survives encoding into a target, including `/`, `~` and `%`
    #[test]
    fn reference_target_round_trip(
        uri in prop_oneof![Just(None), "[a-z]{1,8}\\.asdf".prop_map(Some)],
        path in prop::collection::vec("\\PC{0,12}", 0..5),
    ) {
        let reference = Reference::new(uri.as_deref(), &path);
        let (decoded_uri, decoded_path) = reference.split_target().unwrap();
        prop_assert_eq!(decoded_uri, uri.unwrap_or_default());
        prop_assert_eq!(decoded_path, path);
    }

    /// Inline and block storage carry the same values
    #[test]
    fn storage_modes_agree(
        values in prop::collection::vec(any::<i64>(), 1..64),
        inline in any::<bool>(),
    ) {
        let len = values.len() as i64;
        let mode = if inline { StorageMode::Inline } else { StorageMode::Block };
        let mut document = Document::new();
        document.insert(
            "v",
            NDArray::from_vec(values.clone(), vec![len]).unwrap().with_storage_mode(mode),
        );
        let mut file = AsdfFile::from_bytes(document.to_bytes().unwrap(), Config::default()).unwrap();
        let array = file.ndarray(&["v"]).unwrap();
        prop_assert_eq!(array.storage_mode(), mode);
        prop_assert_eq!(array.to_vec::<i64>().unwrap(), values);
    }
}
