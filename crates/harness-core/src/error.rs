// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the harness core

use nix::errno::Errno;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

/// A workload path that does not start with `/`.
///
/// Paths are interpreted inside the sandbox namespace, so a relative path
/// means the workload generator is broken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected path '{path}' to start with '/'")]
pub struct PathFormatError {
    pub path: String,
}

/// Errors that stop the executor from recording an operation at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error(transparent)]
    PathFormat(#[from] PathFormatError),
}

/// Errors preparing the sandbox root.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("sandbox root must not be empty")]
    EmptyRoot,

    #[error("cannot determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("failed to create sandbox root '{path}': {errno}")]
    Create { path: PathBuf, errno: Errno },
}

/// Errors writing the trace file.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to open trace file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write trace file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors parsing a serialized trace back.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TraceParseError {
    #[error("trace is empty")]
    EmptyTrace,

    #[error("line {line}: expected 4 columns, found {found}")]
    InvalidColumnsCount { line: usize, found: usize },

    #[error("line {line}: {source}")]
    IntParse {
        line: usize,
        #[source]
        source: ParseIntError,
    },
}

/// Errors loading a workload description.
#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("failed to read workload '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workload: {0}")]
    Parse(#[from] serde_json::Error),
}
