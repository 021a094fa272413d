// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Trace recording and the `trace.csv` format.
//!
//! The recorder is an append-only log: entries are pushed in call order and
//! never rewritten. The serialized form is one header line followed by one
//! row per entry:
//!
//! ```text
//! Index,Command,ReturnCode,Errno
//!    1,       MKDIR,       0,Success(0)
//!    2,        STAT,      -1,No such file or directory(2)
//! ```

use crate::error::{TraceError, TraceParseError};
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::os::fd::IntoRawFd;
use std::path::{Path, PathBuf};
use tracing::error;

pub const TRACE_HEADER: &str = "Index,Command,ReturnCode,Errno";

/// Syscall-level command recorded for a top-level operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Mkdir,
    Create,
    Stat,
    Unlink,
    Rmdir,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Mkdir => "MKDIR",
            Command::Create => "CREATE",
            Command::Stat => "STAT",
            Command::Unlink => "UNLINK",
            Command::Rmdir => "RMDIR",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One immutable record of an executed operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub index: u32,
    pub command: Command,
    /// Syscall-style result: non-negative on success, negative on failure.
    pub result: i32,
    /// Raw errno captured at failure time, 0 on success.
    pub errno: i32,
}

impl TraceEntry {
    pub fn is_success(&self) -> bool {
        self.result >= 0
    }
}

/// Ordered in-memory log of operation outcomes plus the run counters.
#[derive(Debug, Default, Clone)]
pub struct TraceRecorder {
    entries: Vec<TraceEntry>,
    success_count: usize,
    failure_count: usize,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one entry and bump exactly one counter.
    pub fn append(&mut self, index: u32, command: Command, result: i32, errno: i32) {
        let entry = TraceEntry {
            index,
            command,
            result,
            errno,
        };
        if entry.is_success() {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }
}

/// Human-readable description of a raw errno, `Success` for 0.
pub fn errno_description(errno: i32) -> &'static str {
    if errno == 0 {
        "Success"
    } else {
        Errno::from_raw(errno).desc()
    }
}

/// Render the trace into `out`.
pub fn write_trace<W: Write>(entries: &[TraceEntry], out: &mut W) -> io::Result<()> {
    writeln!(out, "{TRACE_HEADER}")?;
    for entry in entries {
        writeln!(
            out,
            "{:>4},{:>12},{:>8},{}({})",
            entry.index,
            entry.command,
            entry.result,
            errno_description(entry.errno),
            entry.errno
        )?;
    }
    Ok(())
}

/// Location of a written trace file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTrace {
    pub path: PathBuf,
    /// `false` when closing the file reported an error. The content was
    /// flushed before the close, so this is diagnostic only.
    pub closed_cleanly: bool,
}

/// Write the recorder's log to `path`, replacing any existing file.
///
/// Open and write failures are returned. A failing `close(2)` is logged and
/// reflected in [`SavedTrace::closed_cleanly`].
pub fn save_trace(recorder: &TraceRecorder, path: &Path) -> Result<SavedTrace, TraceError> {
    let file = File::create(path).map_err(|source| TraceError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut writer = BufWriter::new(file);
    let write_err = |source| TraceError::Write {
        path: path.to_path_buf(),
        source,
    };
    write_trace(recorder.entries(), &mut writer).map_err(write_err)?;
    let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;

    let fd = file.into_raw_fd();
    // SAFETY: `fd` was just released from an owned `File`; nothing else holds it.
    let closed_cleanly = match Errno::result(unsafe { libc::close(fd) }) {
        Ok(_) => true,
        Err(errno) => {
            error!(path = %path.display(), %errno, "failed to close trace file");
            false
        }
    };

    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Ok(SavedTrace {
        path,
        closed_cleanly,
    })
}

/// One row of a serialized trace, as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRow {
    pub index: u32,
    pub command: String,
    pub return_code: i32,
    pub errno: String,
}

/// Parse a serialized trace.
///
/// The header line is required; parsing stops at the first blank line.
pub fn parse_trace(trace: &str) -> Result<Vec<TraceRow>, TraceParseError> {
    let mut lines = trace.lines();
    match lines.next() {
        Some(header) if !header.trim().is_empty() => {}
        _ => return Err(TraceParseError::EmptyTrace),
    }

    let mut rows = Vec::new();
    for (offset, line) in lines.enumerate() {
        let line_no = offset + 2;
        if line.trim().is_empty() {
            break;
        }
        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() != 4 {
            return Err(TraceParseError::InvalidColumnsCount {
                line: line_no,
                found: columns.len(),
            });
        }
        let parse_err = |source| TraceParseError::IntParse {
            line: line_no,
            source,
        };
        rows.push(TraceRow {
            index: columns[0].trim().parse().map_err(parse_err)?,
            command: columns[1].trim().to_owned(),
            return_code: columns[2].trim().parse().map_err(parse_err)?,
            errno: columns[3].trim().to_owned(),
        });
    }
    Ok(rows)
}
