// SPDX-License-Identifier: MIT
//! List the tree, arrays, and blocks of ASDF files

use std::path::{Path, PathBuf};

use asdf_container::{tree, BlockInfo, Config, DocumentState, NDArray, Reference};
use clap::Parser;
use serde::Serialize;
use serde_yaml::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Show the tree, arrays and blocks of ASDF files")]
struct Cli {
    /// Files to inspect
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// Skip printing the YAML tree
    #[arg(long)]
    no_tree: bool,
}

#[derive(Serialize)]
struct ArrayReport {
    path: String,
    datatype: String,
    byteorder: String,
    shape: Vec<i64>,
    storage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<BlockInfo>,
}

#[derive(Serialize)]
struct FileReport {
    file: PathBuf,
    format_version: String,
    standard_version: Option<String>,
    blocks: Vec<BlockInfo>,
    block_index: Option<Vec<u64>>,
    arrays: Vec<ArrayReport>,
    references: Vec<(String, String)>,
}

fn collect(
    state: &DocumentState,
    node: &Value,
    path: &mut Vec<String>,
    report: &mut FileReport,
) -> anyhow::Result<()> {
    if tree::has_tag(node, "core/ndarray") {
        let array = NDArray::from_node(state, node)?;
        report.arrays.push(ArrayReport {
            path: format!("/{}", path.join("/")),
            datatype: array.datatype().to_string(),
            byteorder: array.byteorder().to_string(),
            shape: array.shape().to_vec(),
            storage: array.storage_mode().to_string(),
            block: array.block_info().copied(),
        });
        return Ok(());
    }
    if Reference::is_reference(node) {
        let reference = Reference::from_node(node)?;
        report
            .references
            .push((format!("/{}", path.join("/")), reference.target().to_string()));
        return Ok(());
    }
    match tree::untagged(node) {
        Value::Mapping(map) => {
            for (key, value) in map {
                let key = match key {
                    Value::String(s) => s.clone(),
                    other => tree::leaf_text(other).unwrap_or_else(|_| "?".to_string()),
                };
                path.push(key);
                collect(state, value, path, report)?;
                path.pop();
            }
        }
        Value::Sequence(items) => {
            for (i, value) in items.iter().enumerate() {
                path.push(i.to_string());
                collect(state, value, path, report)?;
                path.pop();
            }
        }
        _ => {}
    }
    Ok(())
}

fn inspect(file: &Path, config: &Config) -> anyhow::Result<(FileReport, Value)> {
    let state = DocumentState::open(file, config)?;
    let mut report = FileReport {
        file: file.to_path_buf(),
        format_version: state.format_version().to_string(),
        standard_version: state.standard_version().map(str::to_string),
        blocks: state.block_infos().to_vec(),
        block_index: state.block_index().map(<[u64]>::to_vec),
        arrays: Vec::new(),
        references: Vec::new(),
    };
    collect(&state, state.tree(), &mut Vec::new(), &mut report)?;
    Ok((report, state.tree().clone()))
}

fn print_text(report: &FileReport, tree: &Value, show_tree: bool) -> anyhow::Result<()> {
    println!("== {} ==", report.file.display());
    println!(
        "ASDF {} (standard {})",
        report.format_version,
        report.standard_version.as_deref().unwrap_or("unknown")
    );
    if show_tree {
        print!("{}", serde_yaml::to_string(tree)?);
    }

    println!("Arrays: {}", report.arrays.len());
    for array in &report.arrays {
        print!(
            "  {}: {} {:?} {} {}",
            array.path, array.datatype, array.shape, array.byteorder, array.storage
        );
        match &array.block {
            Some(info) => println!(
                " [{} {} -> {} bytes at {}]",
                info.compression, info.header.allocated_space, info.header.data_space, info.data_offset
            ),
            None => println!(),
        }
    }

    for (path, target) in &report.references {
        println!("  {path} -> {target}");
    }

    println!("Blocks: {}", report.blocks.len());
    for (i, info) in report.blocks.iter().enumerate() {
        println!(
            "  #{i} at {}: {} allocated={} used={} data={} md5={}",
            info.block_offset,
            info.compression,
            info.header.allocated_space,
            info.header.used_space,
            info.header.data_space,
            info.checksum_hex()
        );
    }
    if let Some(index) = &report.block_index {
        println!("Block index: {index:?}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    let mut reports = Vec::new();
    for file in &cli.files {
        let (report, tree) = inspect(file, &config)?;
        if !cli.json {
            print_text(&report, &tree, !cli.no_tree)?;
        }
        reports.push(report);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}
