// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Top-level filesystem operations issued by a workload.
//!
//! Every call resolves its path inside the sandbox, performs the syscall and
//! appends exactly one [`TraceEntry`](crate::trace::TraceEntry). Syscall
//! failures are recorded and returned as a `-1` result code; only a malformed
//! path is reported as an [`ExecError`], and in that case nothing is recorded.

use crate::backend::{EntryKind, FsBackend};
use crate::error::ExecError;
use crate::remove::remove_dir_recursive;
use crate::sandbox::Sandbox;
use crate::trace::{Command, TraceRecorder};
use nix::errno::Errno;
use tracing::{debug, warn};

/// State of one run: sandbox, trace log and sequence counter.
///
/// Owned by whoever orchestrates the run and lent to an [`Executor`].
#[derive(Debug)]
pub struct RunContext {
    sandbox: Sandbox,
    recorder: TraceRecorder,
    last_index: u32,
}

impl RunContext {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox,
            recorder: TraceRecorder::new(),
            last_index: 0,
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn recorder(&self) -> &TraceRecorder {
        &self.recorder
    }

    /// Number of top-level operations recorded so far.
    pub fn operations(&self) -> u32 {
        self.last_index
    }

    fn next_index(&mut self) -> u32 {
        self.last_index += 1;
        self.last_index
    }
}

/// Executes create/mkdir/remove against a backend, recording every outcome.
pub struct Executor<'ctx, B: FsBackend> {
    ctx: &'ctx mut RunContext,
    backend: B,
}

impl<'ctx, B: FsBackend> Executor<'ctx, B> {
    pub fn new(ctx: &'ctx mut RunContext, backend: B) -> Self {
        Self { ctx, backend }
    }

    pub fn context(&self) -> &RunContext {
        &*self.ctx
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// `mkdir(path, mode)`; records `MKDIR`.
    pub fn create_directory(&mut self, path: &str, mode: u32) -> Result<i32, ExecError> {
        let full = self.ctx.sandbox.resolve(path)?;
        let index = self.ctx.next_index();
        let outcome = self.backend.mkdir(&full, mode).map(|()| 0);
        Ok(self.record(index, Command::Mkdir, path, outcome))
    }

    /// Exclusive file creation; records `CREATE` with the new descriptor.
    pub fn create_file(&mut self, path: &str, mode: u32) -> Result<i32, ExecError> {
        let full = self.ctx.sandbox.resolve(path)?;
        let index = self.ctx.next_index();
        let outcome = self.backend.create(&full, mode);
        Ok(self.record(index, Command::Create, path, outcome))
    }

    /// Remove a file or a whole directory tree.
    ///
    /// Records a single entry: `STAT` if the target cannot be classified,
    /// otherwise `RMDIR` or `UNLINK`. Steps inside a recursive removal are
    /// not traced individually.
    pub fn remove(&mut self, path: &str) -> Result<i32, ExecError> {
        let full = self.ctx.sandbox.resolve(path)?;
        let index = self.ctx.next_index();

        let kind = match self.backend.lstat(&full) {
            Ok(kind) => kind,
            Err(errno) => return Ok(self.record(index, Command::Stat, path, Err(errno))),
        };

        let result = match kind {
            EntryKind::Directory => {
                let outcome = remove_dir_recursive(&self.backend, &full).map(|()| 0);
                self.record(index, Command::Rmdir, path, outcome)
            }
            EntryKind::Other => {
                let outcome = self.backend.unlink(&full).map(|()| 0);
                self.record(index, Command::Unlink, path, outcome)
            }
        };
        Ok(result)
    }

    fn record(
        &mut self,
        index: u32,
        command: Command,
        path: &str,
        outcome: Result<i32, Errno>,
    ) -> i32 {
        match outcome {
            Ok(result) => {
                debug!(index, %command, path, result, "operation succeeded");
                self.ctx.recorder.append(index, command, result, 0);
                result
            }
            Err(errno) => {
                warn!(index, %command, path, %errno, "operation failed");
                self.ctx.recorder.append(index, command, -1, errno as i32);
                -1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OsBackend;
    use crate::error::PathFormatError;
    use crate::testing::{FaultOp, MemBackend};
    use crate::trace::TraceEntry;

    fn mem_context() -> (RunContext, MemBackend) {
        let fs = MemBackend::new();
        fs.add_dir("/ws");
        (RunContext::new(Sandbox::new("/ws")), fs)
    }

    #[test]
    fn test_example_run_against_real_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::new(Sandbox::new(tmp.path()));
        let mut exec = Executor::new(&mut ctx, OsBackend);

        assert_eq!(exec.create_directory("/a", 0o755).unwrap(), 0);
        assert!(exec.create_file("/a/f.txt", 0o644).unwrap() >= 0);
        assert_eq!(exec.remove("/a").unwrap(), 0);

        let entries = ctx.recorder().entries();
        assert_eq!(
            entries[0],
            TraceEntry {
                index: 1,
                command: Command::Mkdir,
                result: 0,
                errno: 0
            }
        );
        assert_eq!(entries[1].index, 2);
        assert_eq!(entries[1].command, Command::Create);
        assert!(entries[1].result >= 0);
        assert_eq!(entries[1].errno, 0);
        assert_eq!(
            entries[2],
            TraceEntry {
                index: 3,
                command: Command::Rmdir,
                result: 0,
                errno: 0
            }
        );
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn test_nested_removal_yields_single_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::new(Sandbox::new(tmp.path()));
        let mut exec = Executor::new(&mut ctx, OsBackend);

        exec.create_directory("/top", 0o755).unwrap();
        exec.create_directory("/top/mid", 0o755).unwrap();
        exec.create_directory("/top/mid/leaf", 0o755).unwrap();
        exec.create_file("/top/mid/leaf/f", 0o644).unwrap();
        exec.create_file("/top/g", 0o644).unwrap();
        let before = exec.context().recorder().len();

        assert_eq!(exec.remove("/top").unwrap(), 0);

        assert_eq!(ctx.recorder().len(), before + 1);
        assert_eq!(ctx.recorder().entries().last().unwrap().command, Command::Rmdir);
        assert!(!tmp.path().join("top").exists());
    }

    #[test]
    fn test_remove_missing_path_records_stat_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::new(Sandbox::new(tmp.path()));
        let mut exec = Executor::new(&mut ctx, OsBackend);

        assert_eq!(exec.remove("/ghost").unwrap(), -1);
        assert_eq!(exec.create_directory("/after", 0o755).unwrap(), 0);

        let entries = ctx.recorder().entries();
        assert_eq!(
            entries[0],
            TraceEntry {
                index: 1,
                command: Command::Stat,
                result: -1,
                errno: libc::ENOENT
            }
        );
        assert_eq!(entries[1].index, 2);
        assert_eq!(ctx.recorder().failure_count(), 1);
        assert_eq!(ctx.recorder().success_count(), 1);
    }

    #[test]
    fn test_remove_file_records_unlink() {
        let (mut ctx, fs) = mem_context();
        let mut exec = Executor::new(&mut ctx, fs);

        exec.create_file("/f", 0o644).unwrap();
        assert_eq!(exec.remove("/f").unwrap(), 0);
        assert!(!exec.backend().exists("/ws/f"));
        assert_eq!(ctx.recorder().entries()[1].command, Command::Unlink);
    }

    #[test]
    fn test_remove_symlink_to_directory_unlinks_link() {
        let (mut ctx, fs) = mem_context();
        fs.add_dir("/ws/target");
        fs.add_file("/ws/target/keep");
        fs.add_symlink("/ws/link");
        let mut exec = Executor::new(&mut ctx, fs);

        assert_eq!(exec.remove("/link").unwrap(), 0);
        assert!(exec.backend().exists("/ws/target/keep"));
        assert_eq!(ctx.recorder().entries()[0].command, Command::Unlink);
    }

    #[test]
    fn test_partial_recursive_failure_is_recorded_once() {
        let (mut ctx, fs) = mem_context();
        fs.add_dir("/ws/d");
        fs.add_file("/ws/d/a");
        fs.add_file("/ws/d/b");
        fs.add_file("/ws/d/c");
        fs.fail(FaultOp::Unlink, "/ws/d/b", Errno::EACCES);
        let mut exec = Executor::new(&mut ctx, fs);

        assert_eq!(exec.remove("/d").unwrap(), -1);
        assert!(!exec.backend().exists("/ws/d/a"));
        assert!(exec.backend().exists("/ws/d/b"));
        assert!(exec.backend().exists("/ws/d/c"));

        assert_eq!(
            ctx.recorder().entries(),
            &[TraceEntry {
                index: 1,
                command: Command::Rmdir,
                result: -1,
                errno: libc::EACCES
            }]
        );
    }

    #[test]
    fn test_malformed_path_records_nothing() {
        let (mut ctx, fs) = mem_context();
        let mut exec = Executor::new(&mut ctx, fs);

        exec.create_directory("/ok", 0o755).unwrap();
        assert_eq!(
            exec.create_file("relative", 0o644),
            Err(ExecError::PathFormat(PathFormatError {
                path: "relative".to_owned()
            }))
        );
        assert!(exec.remove("").is_err());
        exec.create_directory("/ok2", 0o755).unwrap();

        let indices: Vec<u32> = ctx.recorder().entries().iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(ctx.operations(), 2);
    }

    #[test]
    fn test_counters_match_calls() {
        let (mut ctx, fs) = mem_context();
        let mut exec = Executor::new(&mut ctx, fs);

        exec.create_directory("/a", 0o755).unwrap();
        exec.create_directory("/a", 0o755).unwrap();
        exec.create_file("/a/f", 0o644).unwrap();
        exec.create_file("/missing/f", 0o644).unwrap();
        exec.remove("/a").unwrap();
        exec.remove("/a").unwrap();

        let recorder = ctx.recorder();
        assert_eq!(recorder.len(), 6);
        assert_eq!(recorder.success_count(), 3);
        assert_eq!(recorder.failure_count(), 3);
        let errnos: Vec<i32> = recorder.entries().iter().map(|e| e.errno).collect();
        assert_eq!(
            errnos,
            vec![0, libc::EEXIST, 0, libc::ENOENT, 0, libc::ENOENT]
        );
    }
}
