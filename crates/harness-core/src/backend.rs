// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem backends the executor runs against.
//!
//! [`OsBackend`] issues real syscalls. Tests can substitute
//! [`crate::testing::MemBackend`] to drive the removal algorithm without
//! touching a real filesystem.

use nix::dir::Dir;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::{Mode, SFlag};
use std::ffi::{OsStr, OsString};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Classification from a non-following status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    /// Regular files, symlinks (including links to directories), devices, ...
    Other,
}

/// Raw directory entry names, possibly including `.` and `..`.
pub type DirEntries<'a> = Box<dyn Iterator<Item = Result<OsString, Errno>> + 'a>;

/// Syscall surface needed by the executor.
///
/// Every method takes `&self` so a directory listing can stay open while its
/// children are removed.
pub trait FsBackend {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<(), Errno>;

    /// Exclusively create a regular file, returning its descriptor.
    fn create(&self, path: &Path, mode: u32) -> Result<RawFd, Errno>;

    /// Status query that does not follow a trailing symlink.
    fn lstat(&self, path: &Path) -> Result<EntryKind, Errno>;

    fn read_dir<'a>(&'a self, path: &Path) -> Result<DirEntries<'a>, Errno>;

    fn unlink(&self, path: &Path) -> Result<(), Errno>;

    fn rmdir(&self, path: &Path) -> Result<(), Errno>;
}

/// A child of a directory being walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Lazily walk the direct children of `dir`, skipping `.` and `..`.
///
/// Each child is classified with [`FsBackend::lstat`] as it is yielded, so
/// entries removed by the caller mid-walk are never queried again.
pub fn children<'a, B: FsBackend + ?Sized>(
    backend: &'a B,
    dir: &'a Path,
) -> Result<impl Iterator<Item = Result<Child, Errno>> + 'a, Errno> {
    let entries = backend.read_dir(dir)?;
    Ok(entries
        .filter(|name| !matches!(name, Ok(n) if n == "." || n == ".."))
        .map(move |name| {
            let path = dir.join(name?);
            let kind = backend.lstat(&path)?;
            Ok(Child { path, kind })
        }))
}

fn errno_of(err: io::Error) -> Errno {
    err.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO)
}

/// Backend issuing real syscalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsBackend;

impl FsBackend for OsBackend {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<(), Errno> {
        nix::unistd::mkdir(path, Mode::from_bits_truncate(mode as libc::mode_t))
    }

    fn create(&self, path: &Path, mode: u32) -> Result<RawFd, Errno> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)
            .map_err(errno_of)?;
        // Descriptors stay open until process exit.
        Ok(file.into_raw_fd())
    }

    fn lstat(&self, path: &Path) -> Result<EntryKind, Errno> {
        let stat = nix::sys::stat::lstat(path)?;
        let file_type = SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT;
        if file_type == SFlag::S_IFDIR {
            Ok(EntryKind::Directory)
        } else {
            Ok(EntryKind::Other)
        }
    }

    fn read_dir<'a>(&'a self, path: &Path) -> Result<DirEntries<'a>, Errno> {
        let dir = Dir::open(
            path,
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )?;
        Ok(Box::new(dir.into_iter().map(|entry| {
            entry.map(|e| OsStr::from_bytes(e.file_name().to_bytes()).to_os_string())
        })))
    }

    fn unlink(&self, path: &Path) -> Result<(), Errno> {
        nix::unistd::unlink(path)
    }

    fn rmdir(&self, path: &Path) -> Result<(), Errno> {
        std::fs::remove_dir(path).map_err(errno_of)
    }
}
