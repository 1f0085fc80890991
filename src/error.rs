// SPDX-License-Identifier: MIT
//! Error types shared by every layer of the container

/// Errors that can occur while reading, writing or interpreting a container
#[derive(Debug, thiserror::Error)]
pub enum AsdfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// A text token cannot be represented as the requested scalar type
    #[error("Cannot represent {text:?} as {type_name}")]
    Representation {
        text: String,
        type_name: &'static str,
    },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Index {index:?} out of range for shape {shape:?}")]
    IndexOutOfRange { index: Vec<i64>, shape: Vec<i64> },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A tree node does not have the structure its tag promises
    #[error("Invalid node at '{key}': {message}")]
    InvalidNode { key: String, message: String },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AsdfError {
    pub(crate) fn invalid_node(key: impl Into<String>, message: impl Into<String>) -> Self {
        AsdfError::InvalidNode {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn representation(text: &str, type_name: &'static str) -> Self {
        AsdfError::Representation {
            text: text.to_string(),
            type_name,
        }
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, AsdfError>;
