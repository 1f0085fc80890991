// SPDX-License-Identifier: MIT
//! Rewrite an ASDF file with different array storage or compression

use std::path::PathBuf;

use anyhow::Context;
use asdf_container::{AsdfFile, Compression, Config, CopyState, StorageMode};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Copy an ASDF file, re-encoding its arrays")]
struct Cli {
    input: PathBuf,

    output: PathBuf,

    /// Codec for block arrays (none, zlib, bzip2, zstd, lz4)
    #[arg(long)]
    compression: Option<Compression>,

    /// Compression level
    #[arg(long)]
    level: Option<i32>,

    /// Where arrays are written (block or inline)
    #[arg(long)]
    storage_mode: Option<StorageMode>,

    /// Skip checksum verification while reading
    #[arg(long)]
    no_verify: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Settings left unset on the command line come from the environment,
    // and arrays keep their own when neither names one.
    let mut config = Config::from_env();
    let from_env = |name: &str| std::env::var_os(name).is_some();
    let state = CopyState {
        storage_mode: cli
            .storage_mode
            .or(from_env("ASDF_STORAGE_MODE").then_some(config.storage_mode)),
        compression: cli
            .compression
            .or(from_env("ASDF_COMPRESSION").then_some(config.compression)),
        compression_level: cli
            .level
            .or(from_env("ASDF_COMPRESSION_LEVEL").then_some(config.compression_level)),
    };

    if let Some(compression) = state.compression {
        config.compression = compression;
        config.compression_level = state
            .compression_level
            .unwrap_or(compression.default_level());
    }
    if cli.no_verify {
        config.verify_checksums = false;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let file = AsdfFile::open_with_config(&cli.input, config)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let document = file.to_document()?.copy(&state);
    document
        .write_file(&cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    info!(
        input = %cli.input.display(),
        output = %cli.output.display(),
        storage_mode = ?state.storage_mode,
        compression = ?state.compression,
        "copied"
    );
    Ok(())
}
