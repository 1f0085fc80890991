// SPDX-License-Identifier: MIT
//! Runtime configuration read from the environment

use crate::codec::Compression;
use crate::ndarray::{CopyState, StorageMode};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Codec used when arrays are rewritten
    pub compression: Compression,
    pub compression_level: i32,
    /// Verify block digests when payloads are loaded
    pub verify_checksums: bool,
    /// Storage mode used when arrays are rewritten
    pub storage_mode: StorageMode,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            compression: setting(&var, "ASDF_COMPRESSION", defaults.compression, |s| {
                s.parse().ok()
            }),
            compression_level: setting(
                &var,
                "ASDF_COMPRESSION_LEVEL",
                defaults.compression_level,
                |s| s.trim().parse().ok(),
            ),
            verify_checksums: setting(
                &var,
                "ASDF_VERIFY_CHECKSUMS",
                defaults.verify_checksums,
                parse_flag,
            ),
            storage_mode: setting(&var, "ASDF_STORAGE_MODE", defaults.storage_mode, |s| {
                s.parse().ok()
            }),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.compression != Compression::None
            && !self.compression.level_range().contains(&self.compression_level)
        {
            let range = self.compression.level_range();
            return Err(format!(
                "ASDF_COMPRESSION_LEVEL for {} must be between {} and {}",
                self.compression,
                range.start(),
                range.end()
            ));
        }

        if !self.compression.is_available() {
            return Err(format!(
                "ASDF_COMPRESSION={} is not available in this build",
                self.compression
            ));
        }

        Ok(())
    }

    /// Rewrite settings for copying arrays under this configuration
    pub fn copy_state(&self) -> CopyState {
        CopyState {
            storage_mode: Some(self.storage_mode),
            compression: Some(self.compression),
            compression_level: Some(self.compression_level),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            compression_level: 6,
            verify_checksums: true,
            storage_mode: StorageMode::Block,
        }
    }
}

/// Parsed value of `name`, or `default` when it is unset or rejected
fn setting<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    parse: impl FnOnce(&str) -> Option<T>,
) -> T {
    let Some(value) = var(name) else {
        return default;
    };
    match parse(&value) {
        Some(parsed) => parsed,
        None => {
            tracing::warn!(variable = name, value = %value, "ignoring invalid setting, using default");
            default
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
