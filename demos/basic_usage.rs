// SPDX-License-Identifier: MIT
//! Basic usage example for the ASDF container

use asdf_container::{
    AsdfFile, Complex, Compression, Config, Document, Entry, NDArray, Reference, StorageMode,
};
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== ASDF Container - Basic Usage ===\n");

    // Step 1: Build arrays
    println!("1. Creating arrays...");
    let samples: Vec<f64> = (0..4096).map(|i| (i as f64 / 64.0).sin()).collect();
    let samples = NDArray::from_vec(samples, vec![64, 64])?.with_compression(Compression::Zlib, 9);
    let labels = NDArray::from_vec(vec![1i64, 2, 3, 4, 5, 6], vec![2, 3])?
        .with_storage_mode(StorageMode::Inline);
    let phases = NDArray::from_vec(
        vec![Complex::new(1.0f64, 0.0), Complex::new(0.0, -1.0)],
        vec![2],
    )?
    .with_storage_mode(StorageMode::Inline);
    println!("   samples: {:?} {}", samples.shape(), samples.datatype());
    println!("   labels: {:?} {}", labels.shape(), labels.datatype());
    println!("   phases: {:?} {}", phases.shape(), phases.datatype());

    // Step 2: Assemble the document
    println!("\n2. Assembling document...");
    let mut document = Document::new();
    document.insert("samples", samples);
    document.insert(
        "meta",
        Entry::Group(
            [
                ("labels".to_string(), Entry::from(labels)),
                ("phases".to_string(), Entry::from(phases)),
                (
                    "origin".to_string(),
                    Entry::Value(serde_yaml::Value::String("demo".into())),
                ),
            ]
            .into_iter()
            .collect(),
        ),
    );
    document.insert("first", Reference::new(None, &["samples"]));

    // Step 3: Write to file
    println!("\n3. Writing to file...");
    let output_path = std::env::temp_dir().join("asdf_container_demo.asdf");
    document.write_file(&output_path)?;
    let size = std::fs::metadata(&output_path)?.len();
    println!("   Written {} bytes to {}", size, output_path.display());

    // Step 4: Read back
    println!("\n4. Reading from file...");
    let mut file = AsdfFile::open_with_config(&output_path, Config::default())?;
    println!("   Blocks: {}", file.state().block_count());

    let samples = file.ndarray(&["samples"])?;
    if let Some(info) = samples.block_info() {
        println!(
            "   samples block: {} {} -> {} bytes",
            info.compression, info.header.allocated_space, info.header.data_space
        );
    }
    let values = samples.to_vec::<f64>()?;
    println!("   samples[0][1] = {:.4}", samples.get::<f64>(&[0, 1])?);
    println!("   {} values loaded", values.len());

    let labels = file.ndarray(&["meta", "labels"])?;
    println!("   labels = {:?}", labels.to_vec::<i64>()?);

    let phases = file.ndarray(&["meta", "phases"])?;
    println!("   phases = {:?}", phases.to_vec::<Complex<f64>>()?);

    // Step 5: Follow the reference
    println!("\n5. Resolving reference...");
    let first = file.ndarray(&["first"])?;
    println!(
        "   'first' shares the samples block: {}",
        first.memoized().ptr_eq(samples.memoized())
    );

    // Step 6: Copy with the environment's settings
    println!("\n6. Copying inline...");
    let mut config = Config::from_env();
    config.storage_mode = StorageMode::Inline;
    let copy = file.to_document()?.copy(&config.copy_state());
    let copy_path: PathBuf = std::env::temp_dir().join("asdf_container_demo_inline.asdf");
    copy.write_file(&copy_path)?;
    println!(
        "   Inline copy: {} bytes at {}",
        std::fs::metadata(&copy_path)?.len(),
        copy_path.display()
    );

    println!("\n=== ASDF Container Demo Complete ===");
    Ok(())
}
