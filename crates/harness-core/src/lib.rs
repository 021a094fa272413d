// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core of the filesystem replay harness.
//!
//! A run owns a [`RunContext`] (sandbox root, trace log, sequence counter)
//! and lends it to an [`Executor`], which performs workload operations
//! against a [`FsBackend`] and records one [`TraceEntry`] per operation.
//! At the end of the run the log is written out with [`save_trace`].

pub mod backend;
pub mod error;
pub mod executor;
pub mod remove;
pub mod sandbox;
pub mod trace;
pub mod workload;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{children, Child, EntryKind, FsBackend, OsBackend};
pub use error::{
    ExecError, PathFormatError, SandboxError, TraceError, TraceParseError, WorkloadError,
};
pub use executor::{Executor, RunContext};
pub use remove::remove_dir_recursive;
pub use sandbox::{Preparation, Sandbox, DEFAULT_SANDBOX_MODE};
pub use trace::{
    parse_trace, save_trace, write_trace, Command, SavedTrace, TraceEntry, TraceRecorder,
    TraceRow, TRACE_HEADER,
};
pub use workload::{Mode, ModeFlag, Operation, Workload};
