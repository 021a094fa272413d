// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Workload descriptions and their replay through an [`Executor`].
//!
//! A workload is a JSON document listing operations in the order they are
//! issued:
//!
//! ```json
//! {
//!   "ops": [
//!     { "MkDir":  { "path": "/a", "mode": ["S_IRWXU", "S_IRGRP", "S_IXGRP"] } },
//!     { "Create": { "path": "/a/f.txt", "mode": 420 } },
//!     { "Remove": { "path": "/a" } }
//!   ]
//! }
//! ```

use crate::backend::FsBackend;
use crate::error::{ExecError, WorkloadError};
use crate::executor::Executor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::trace;

/// Symbolic POSIX permission bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ModeFlag {
    S_IRWXU,
    S_IRUSR,
    S_IWUSR,
    S_IXUSR,
    S_IRWXG,
    S_IRGRP,
    S_IWGRP,
    S_IXGRP,
    S_IRWXO,
    S_IROTH,
    S_IWOTH,
    S_IXOTH,
    S_ISUID,
    S_ISGID,
    S_ISVTX,
}

impl ModeFlag {
    pub fn bits(self) -> u32 {
        match self {
            ModeFlag::S_IRWXU => 0o700,
            ModeFlag::S_IRUSR => 0o400,
            ModeFlag::S_IWUSR => 0o200,
            ModeFlag::S_IXUSR => 0o100,
            ModeFlag::S_IRWXG => 0o070,
            ModeFlag::S_IRGRP => 0o040,
            ModeFlag::S_IWGRP => 0o020,
            ModeFlag::S_IXGRP => 0o010,
            ModeFlag::S_IRWXO => 0o007,
            ModeFlag::S_IROTH => 0o004,
            ModeFlag::S_IWOTH => 0o002,
            ModeFlag::S_IXOTH => 0o001,
            ModeFlag::S_ISUID => 0o4000,
            ModeFlag::S_ISGID => 0o2000,
            ModeFlag::S_ISVTX => 0o1000,
        }
    }
}

/// Permission bits, written either as an integer or as a list of flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ModeRepr", into = "u32")]
pub struct Mode(pub u32);

#[derive(Deserialize)]
#[serde(untagged)]
enum ModeRepr {
    Bits(u32),
    Flags(Vec<ModeFlag>),
}

impl From<ModeRepr> for Mode {
    fn from(repr: ModeRepr) -> Self {
        match repr {
            ModeRepr::Bits(bits) => Mode(bits),
            ModeRepr::Flags(flags) => flags.into_iter().collect(),
        }
    }
}

impl From<Mode> for u32 {
    fn from(mode: Mode) -> Self {
        mode.0
    }
}

impl FromIterator<ModeFlag> for Mode {
    fn from_iter<I: IntoIterator<Item = ModeFlag>>(iter: I) -> Self {
        Mode(iter.into_iter().fold(0, |bits, flag| bits | flag.bits()))
    }
}

/// One top-level operation of a workload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    MkDir { path: String, mode: Mode },
    Create { path: String, mode: Mode },
    Remove { path: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub ops: Vec<Operation>,
}

impl Workload {
    pub fn new(ops: Vec<Operation>) -> Self {
        Self { ops }
    }

    pub fn from_json_str(json: &str) -> Result<Self, WorkloadError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, WorkloadError> {
        let json = std::fs::read_to_string(path).map_err(|source| WorkloadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Issue every operation in order.
    ///
    /// Recorded syscall failures do not stop the replay; a malformed path does.
    pub fn replay<B: FsBackend>(&self, executor: &mut Executor<'_, B>) -> Result<(), ExecError> {
        for op in &self.ops {
            trace!(?op, "replaying operation");
            match op {
                Operation::MkDir { path, mode } => {
                    executor.create_directory(path, mode.0)?;
                }
                Operation::Create { path, mode } => {
                    executor.create_file(path, mode.0)?;
                }
                Operation::Remove { path } => {
                    executor.remove(path)?;
                }
            }
        }
        Ok(())
    }
}
