// SPDX-License-Identifier: MIT
//! Benchmarks for block writing, lazy opening and array materialization

use asdf_container::{AsdfFile, Compression, Config, Document, NDArray, StorageMode};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

/// 1M float64 samples of a slow ramp, 8 MiB
fn create_test_array() -> NDArray {
    let values: Vec<f64> = (0..1024 * 1024).map(|i| (i / 64) as f64 * 0.5).collect();
    NDArray::from_vec(values, vec![1024, 1024]).unwrap()
}

fn document_with(array: NDArray) -> Document {
    let mut document = Document::new();
    document.insert("samples", array);
    document
}

fn benchmark_write_uncompressed(c: &mut Criterion) {
    let document = document_with(create_test_array());

    c.bench_function("write_none", |b| {
        b.iter(|| black_box(document.to_bytes().unwrap()))
    });
}

fn benchmark_write_zlib(c: &mut Criterion) {
    let document = document_with(create_test_array().with_compression(Compression::Zlib, 6));

    c.bench_function("write_zlib", |b| {
        b.iter(|| black_box(document.to_bytes().unwrap()))
    });
}

fn benchmark_open_lazy(c: &mut Criterion) {
    let bytes = document_with(create_test_array().with_compression(Compression::Zlib, 6))
        .to_bytes()
        .unwrap();

    // Only headers are read here, so this should not scale with payload size
    c.bench_function("open_headers_only", |b| {
        b.iter(|| {
            let file = AsdfFile::from_bytes(black_box(bytes.clone()), Config::default()).unwrap();
            black_box(file.state().block_count());
        })
    });
}

fn benchmark_materialize(c: &mut Criterion) {
    let bytes = document_with(create_test_array().with_compression(Compression::Zlib, 6))
        .to_bytes()
        .unwrap();

    c.bench_function("materialize_zlib", |b| {
        b.iter(|| {
            let mut file =
                AsdfFile::from_bytes(black_box(bytes.clone()), Config::default()).unwrap();
            let array = file.ndarray(&["samples"]).unwrap();
            black_box(array.to_vec::<f64>().unwrap());
        })
    });
}

fn benchmark_inline_write(c: &mut Criterion) {
    let values: Vec<i64> = (0..10_000).collect();
    let array = NDArray::from_vec(values, vec![100, 100])
        .unwrap()
        .with_storage_mode(StorageMode::Inline);
    let document = document_with(array);

    c.bench_function("write_inline_10k", |b| {
        b.iter(|| black_box(document.to_bytes().unwrap()))
    });
}

fn benchmark_file_sizes(c: &mut Criterion) {
    let plain = document_with(create_test_array()).to_bytes().unwrap();
    let zlib = document_with(create_test_array().with_compression(Compression::Zlib, 9))
        .to_bytes()
        .unwrap();

    c.bench_function("file_sizes", |b| {
        b.iter(|| {
            black_box(plain.len());
            black_box(zlib.len());
        })
    });

    println!("Uncompressed size: {} bytes", plain.len());
    println!("Zlib size: {} bytes", zlib.len());
    println!(
        "Zlib ratio: {:.2}%",
        (zlib.len() as f64 / plain.len() as f64) * 100.0
    );
}

criterion_group!(
    benches,
    benchmark_write_uncompressed,
    benchmark_write_zlib,
    benchmark_open_lazy,
    benchmark_materialize,
    benchmark_inline_write,
    benchmark_file_sizes
);
criterion_main!(benches);
