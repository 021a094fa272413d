// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration for `fs-harness` runs.
//!
//! All keys are optional; missing keys fall back to built-in defaults.
//!
//! ```toml
//! [sandbox]
//! mode = 509
//!
//! [coverage]
//! enabled = true
//! device = "/sys/kernel/debug/kcov"
//! cover-size = 65536
//!
//! [trace]
//! output = "trace.csv"
//! ```
//!
//! # Precedence
//!
//! Values are resolved with the following precedence (highest first):
//!
//! 1. CLI flags (e.g., `--cover-size`)
//! 2. Environment variables (e.g., `FS_HARNESS_COVER_SIZE`)
//! 3. Config file (via `--config` or `FS_HARNESS_CONFIG`)
//! 4. Built-in defaults
//!
//! The first two layers are applied by the binary; this crate owns the file
//! layer and the defaults.

use harness_core::DEFAULT_SANDBOX_MODE;
use harness_kcov::{KcovConfig, DEFAULT_COVER_SIZE, DEFAULT_DEVICE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TRACE_OUTPUT: &str = "trace.csv";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub sandbox: SandboxSection,
    pub coverage: CoverageSection,
    pub trace: TraceSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SandboxSection {
    /// Permission bits for the sandbox root when it has to be created.
    pub mode: u32,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            mode: DEFAULT_SANDBOX_MODE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CoverageSection {
    /// `false` skips the device entirely and runs without coverage.
    pub enabled: bool,
    pub device: PathBuf,
    /// Buffer capacity in slots, the counter slot included.
    pub cover_size: usize,
}

impl Default for CoverageSection {
    fn default() -> Self {
        Self {
            enabled: true,
            device: PathBuf::from(DEFAULT_DEVICE),
            cover_size: DEFAULT_COVER_SIZE,
        }
    }
}

impl CoverageSection {
    pub fn kcov(&self) -> KcovConfig {
        KcovConfig {
            device: self.device.clone(),
            cover_size: self.cover_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TraceSection {
    /// Relative paths are taken from the current directory.
    pub output: PathBuf,
}

impl Default for TraceSection {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_TRACE_OUTPUT),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` when given, otherwise start from the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}
