// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Sandbox root preparation and path confinement.

use crate::error::{PathFormatError, SandboxError};
use nix::errno::Errno;
use nix::sys::stat::Mode;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `S_IRWXU | S_IRWXG | S_IROTH | S_IXOTH`
pub const DEFAULT_SANDBOX_MODE: u32 = 0o775;

/// How [`Sandbox::prepare`] found the root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    Created,
    AlreadyExisted,
}

/// The directory every workload path is confined under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Wrap an existing root without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the sandbox root with `mode`.
    ///
    /// A relative root is anchored at the current directory. An existing root
    /// is reused with a warning; the harness never deletes it.
    pub fn prepare(root: &Path, mode: u32) -> Result<(Self, Preparation), SandboxError> {
        if root.as_os_str().is_empty() {
            return Err(SandboxError::EmptyRoot);
        }
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir().map_err(SandboxError::CurrentDir)?.join(root)
        };

        info!(root = %root.display(), "preparing sandbox");
        match nix::unistd::mkdir(&root, Mode::from_bits_truncate(mode as libc::mode_t)) {
            Ok(()) => Ok((Self { root }, Preparation::Created)),
            Err(Errno::EEXIST) => {
                warn!(root = %root.display(), "sandbox directory already exists");
                Ok((Self { root }, Preparation::AlreadyExisted))
            }
            Err(errno) => Err(SandboxError::Create { path: root, errno }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a workload path onto the host filesystem.
    ///
    /// The result is the plain concatenation `root + path`, so `/a/b` inside a
    /// sandbox at `/tmp/ws` becomes `/tmp/ws/a/b`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathFormatError> {
        if !path.starts_with('/') {
            return Err(PathFormatError {
                path: path.to_owned(),
            });
        }
        let mut full = OsString::from(self.root.as_os_str());
        full.push(path);
        Ok(PathBuf::from(full))
    }
}
