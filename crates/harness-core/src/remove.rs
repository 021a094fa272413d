// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Depth-first, post-order directory removal.

use crate::backend::{children, EntryKind, FsBackend};
use nix::errno::Errno;
use std::path::Path;
use tracing::debug;

/// Remove `dir` and everything below it.
///
/// Children are removed one by one; the first failure aborts the walk of
/// that directory and is propagated up, leaving the already removed siblings
/// gone. `dir` itself is removed only once all of its children were.
///
/// Symlinks are classified without following them, so a link to a directory
/// is unlinked rather than descended into.
pub fn remove_dir_recursive<B: FsBackend + ?Sized>(backend: &B, dir: &Path) -> Result<(), Errno> {
    for child in children(backend, dir).inspect_err(|errno| {
        debug!(path = %dir.display(), %errno, "cannot list directory");
    })? {
        let child = child?;
        match child.kind {
            EntryKind::Directory => remove_dir_recursive(backend, &child.path)?,
            EntryKind::Other => backend.unlink(&child.path).inspect_err(|errno| {
                debug!(path = %child.path.display(), %errno, "unlink failed");
            })?,
        }
    }

    backend.rmdir(dir).inspect_err(|errno| {
        debug!(path = %dir.display(), %errno, "rmdir failed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OsBackend;
    use crate::testing::{FaultOp, MemBackend};
    use std::os::unix::fs::symlink;

    #[test]
    fn test_removes_nested_tree() {
        let fs = MemBackend::new();
        fs.add_dir("/root/a");
        fs.add_dir("/root/a/b");
        fs.add_file("/root/a/b/f1");
        fs.add_file("/root/a/f2");
        fs.add_dir("/root/a/empty");

        remove_dir_recursive(&fs, Path::new("/root/a")).unwrap();

        assert!(!fs.exists("/root/a"));
        assert!(!fs.exists("/root/a/b/f1"));
        assert!(fs.exists("/root"));
    }

    #[test]
    fn test_stops_on_first_failed_child() {
        let fs = MemBackend::new();
        fs.add_dir("/d");
        fs.add_file("/d/a");
        fs.add_file("/d/b");
        fs.add_file("/d/c");
        fs.fail(FaultOp::Unlink, "/d/b", Errno::EACCES);

        let err = remove_dir_recursive(&fs, Path::new("/d")).unwrap_err();
        assert_eq!(err, Errno::EACCES);

        // Entries are listed in name order; `a` went before the failure,
        // `c` was never attempted and the directory itself stays.
        assert!(!fs.exists("/d/a"));
        assert!(fs.exists("/d/b"));
        assert!(fs.exists("/d/c"));
        assert!(fs.exists("/d"));
        assert_eq!(
            fs.calls_for(FaultOp::Unlink),
            vec!["/d/a".to_string(), "/d/b".to_string()]
        );
        assert!(fs.calls_for(FaultOp::Rmdir).is_empty());
    }

    #[test]
    fn test_failure_in_subdirectory_propagates() {
        let fs = MemBackend::new();
        fs.add_dir("/d");
        fs.add_dir("/d/sub");
        fs.add_file("/d/sub/locked");
        fs.add_file("/d/z");
        fs.fail(FaultOp::Rmdir, "/d/sub", Errno::EBUSY);

        assert_eq!(
            remove_dir_recursive(&fs, Path::new("/d")),
            Err(Errno::EBUSY)
        );
        assert!(!fs.exists("/d/sub/locked"));
        assert!(fs.exists("/d/sub"));
        assert!(fs.exists("/d/z"));
    }

    #[test]
    fn test_unreadable_directory() {
        let fs = MemBackend::new();
        fs.add_dir("/d");
        fs.add_file("/d/f");
        fs.fail(FaultOp::ReadDir, "/d", Errno::EACCES);

        assert_eq!(
            remove_dir_recursive(&fs, Path::new("/d")),
            Err(Errno::EACCES)
        );
        assert!(fs.exists("/d/f"));
    }

    #[test]
    fn test_child_classification_failure() {
        let fs = MemBackend::new();
        fs.add_dir("/d");
        fs.add_file("/d/f");
        fs.fail(FaultOp::Lstat, "/d/f", Errno::EIO);

        assert_eq!(remove_dir_recursive(&fs, Path::new("/d")), Err(Errno::EIO));
        assert!(fs.exists("/d"));
    }

    #[test]
    fn test_os_symlink_to_directory_is_unlinked_not_followed() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside");
        std::fs::create_dir(&outside).unwrap();
        std::fs::write(outside.join("keep"), b"x").unwrap();

        let doomed = tmp.path().join("doomed");
        std::fs::create_dir(&doomed).unwrap();
        symlink(&outside, doomed.join("link")).unwrap();

        remove_dir_recursive(&OsBackend, &doomed).unwrap();

        assert!(!doomed.exists());
        assert!(outside.join("keep").exists());
    }
}
