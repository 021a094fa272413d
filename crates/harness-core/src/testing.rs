// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory backend with fault injection for exercising the executor.

use crate::backend::{DirEntries, EntryKind, FsBackend};
use nix::errno::Errno;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Mkdir,
    Create,
    Lstat,
    ReadDir,
    Unlink,
    Rmdir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Dir,
    File,
    Symlink,
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    faults: HashMap<(FaultOp, PathBuf), Errno>,
    calls: Vec<(FaultOp, PathBuf)>,
    next_fd: RawFd,
}

/// Tree of directories and files kept in a map keyed by absolute path.
///
/// Listings report `.` and `..` first, then children in name order.
#[derive(Debug)]
pub struct MemBackend {
    state: RefCell<State>,
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemBackend {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::Dir);
        Self {
            state: RefCell::new(State {
                nodes,
                faults: HashMap::new(),
                calls: Vec::new(),
                next_fd: 3,
            }),
        }
    }

    /// Add a directory, creating missing ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.insert_with_ancestors(path.as_ref(), Node::Dir);
    }

    /// Add a regular file, creating missing ancestors.
    pub fn add_file(&self, path: impl AsRef<Path>) {
        self.insert_with_ancestors(path.as_ref(), Node::File);
    }

    /// Add a symlink. Its target is irrelevant: links are never followed.
    pub fn add_symlink(&self, path: impl AsRef<Path>) {
        self.insert_with_ancestors(path.as_ref(), Node::Symlink);
    }

    /// Make every `op` on `path` fail with `errno`.
    pub fn fail(&self, op: FaultOp, path: impl AsRef<Path>, errno: Errno) {
        self.state
            .borrow_mut()
            .faults
            .insert((op, path.as_ref().to_path_buf()), errno);
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.state.borrow().nodes.contains_key(path.as_ref())
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        self.state.borrow().nodes.get(path.as_ref()) == Some(&Node::Dir)
    }

    /// Paths passed to `op`, in call order.
    pub fn calls_for(&self, op: FaultOp) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, p)| p.display().to_string())
            .collect()
    }

    fn insert_with_ancestors(&self, path: &Path, node: Node) {
        let mut state = self.state.borrow_mut();
        for ancestor in path.ancestors().skip(1) {
            state.nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
        state.nodes.insert(path.to_path_buf(), node);
    }

    /// Record the call and return the injected fault, if any.
    fn enter(&self, op: FaultOp, path: &Path) -> Result<(), Errno> {
        let mut state = self.state.borrow_mut();
        state.calls.push((op, path.to_path_buf()));
        match state.faults.get(&(op, path.to_path_buf())) {
            Some(errno) => Err(*errno),
            None => Ok(()),
        }
    }

    fn node(&self, path: &Path) -> Option<Node> {
        self.state.borrow().nodes.get(path).copied()
    }

    fn check_parent(&self, path: &Path) -> Result<(), Errno> {
        let parent = path.parent().ok_or(Errno::EEXIST)?;
        match self.node(parent) {
            Some(Node::Dir) => Ok(()),
            Some(_) => Err(Errno::ENOTDIR),
            None => Err(Errno::ENOENT),
        }
    }

    fn child_names(&self, dir: &Path) -> Vec<OsString> {
        self.state
            .borrow()
            .nodes
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
            .collect()
    }
}

impl FsBackend for MemBackend {
    fn mkdir(&self, path: &Path, _mode: u32) -> Result<(), Errno> {
        self.enter(FaultOp::Mkdir, path)?;
        if self.node(path).is_some() {
            return Err(Errno::EEXIST);
        }
        self.check_parent(path)?;
        self.state.borrow_mut().nodes.insert(path.to_path_buf(), Node::Dir);
        Ok(())
    }

    fn create(&self, path: &Path, _mode: u32) -> Result<RawFd, Errno> {
        self.enter(FaultOp::Create, path)?;
        if self.node(path).is_some() {
            return Err(Errno::EEXIST);
        }
        self.check_parent(path)?;
        let mut state = self.state.borrow_mut();
        state.nodes.insert(path.to_path_buf(), Node::File);
        let fd = state.next_fd;
        state.next_fd += 1;
        Ok(fd)
    }

    fn lstat(&self, path: &Path) -> Result<EntryKind, Errno> {
        self.enter(FaultOp::Lstat, path)?;
        match self.node(path) {
            Some(Node::Dir) => Ok(EntryKind::Directory),
            Some(Node::File | Node::Symlink) => Ok(EntryKind::Other),
            None => Err(Errno::ENOENT),
        }
    }

    fn read_dir<'a>(&'a self, path: &Path) -> Result<DirEntries<'a>, Errno> {
        self.enter(FaultOp::ReadDir, path)?;
        match self.node(path) {
            Some(Node::Dir) => {}
            Some(_) => return Err(Errno::ENOTDIR),
            None => return Err(Errno::ENOENT),
        }
        let mut names = vec![OsString::from("."), OsString::from("..")];
        names.extend(self.child_names(path));
        Ok(Box::new(names.into_iter().map(Ok)))
    }

    fn unlink(&self, path: &Path) -> Result<(), Errno> {
        self.enter(FaultOp::Unlink, path)?;
        match self.node(path) {
            Some(Node::Dir) => Err(Errno::EISDIR),
            Some(_) => {
                self.state.borrow_mut().nodes.remove(path);
                Ok(())
            }
            None => Err(Errno::ENOENT),
        }
    }

    fn rmdir(&self, path: &Path) -> Result<(), Errno> {
        self.enter(FaultOp::Rmdir, path)?;
        match self.node(path) {
            Some(Node::Dir) if !self.child_names(path).is_empty() => Err(Errno::ENOTEMPTY),
            Some(Node::Dir) => {
                self.state.borrow_mut().nodes.remove(path);
                Ok(())
            }
            Some(_) => Err(Errno::ENOTDIR),
            None => Err(Errno::ENOENT),
        }
    }
}
