// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for kcov sessions.

use nix::errno::Errno;
use thiserror::Error;

/// Errors that can occur while driving the kcov device.
///
/// `Init`, `Map` and `Enable` abort a run; the teardown variants are only
/// reported.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KcovError {
    #[error("cover size must hold the counter slot plus at least one address, got {0}")]
    InvalidCoverSize(usize),

    #[error("failed to set up trace mode: {0}")]
    Init(Errno),

    #[error("failed to mmap coverage buffer: {0}")]
    Map(Errno),

    #[error("failed to enable coverage collection: {0}")]
    Enable(Errno),

    #[error("failed to disable coverage collection: {0}")]
    Disable(Errno),

    #[error("failed to unmap coverage buffer: {0}")]
    Unmap(Errno),

    #[error("failed to close kcov device: {0}")]
    Close(Errno),
}
