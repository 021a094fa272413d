// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Raw kcov ioctls and the shared coverage buffer.
//!
//! See <https://docs.kernel.org/dev-tools/kcov.html>.

use nix::errno::Errno;
use nix::sys::ioctl::ioctl_num_type;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::{request_code_none, request_code_read};
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// `_IOR('c', 1, unsigned long)`
const KCOV_INIT_TRACE: ioctl_num_type =
    request_code_read!(b'c', 1, std::mem::size_of::<libc::c_ulong>());
/// `_IO('c', 100)`
const KCOV_ENABLE: ioctl_num_type = request_code_none!(b'c', 100);
/// `_IO('c', 101)`
const KCOV_DISABLE: ioctl_num_type = request_code_none!(b'c', 101);

/// Collect program counters (as opposed to comparison operands).
const KCOV_TRACE_PC: libc::c_ulong = 0;

/// Configure the trace capacity in `unsigned long` slots.
pub fn init_trace(fd: BorrowedFd<'_>, slots: usize) -> Result<(), Errno> {
    // SAFETY: KCOV_INIT_TRACE takes the slot count by value.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), KCOV_INIT_TRACE as _, slots as libc::c_ulong) };
    Errno::result(ret).map(drop)
}

/// Start collecting coverage for the calling thread.
pub fn enable_pc_tracing(fd: BorrowedFd<'_>) -> Result<(), Errno> {
    // SAFETY: KCOV_ENABLE takes the trace mode by value.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), KCOV_ENABLE as _, KCOV_TRACE_PC) };
    Errno::result(ret).map(drop)
}

/// Stop collecting coverage for the calling thread.
pub fn disable_tracing(fd: BorrowedFd<'_>) -> Result<(), Errno> {
    // SAFETY: KCOV_DISABLE ignores its argument.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), KCOV_DISABLE as _, 0 as libc::c_ulong) };
    Errno::result(ret).map(drop)
}

/// Read the addresses out of a coverage buffer.
///
/// Slot 0 holds the number of valid entries; entries follow in recording
/// order. The count is clamped to the buffer so a bogus counter never reads
/// past the end.
pub fn read_addresses(slots: &[AtomicUsize]) -> Vec<u64> {
    let Some((count, entries)) = slots.split_first() else {
        return Vec::new();
    };
    let count = count.load(Ordering::Relaxed).min(entries.len());
    entries[..count].iter().map(|pc| pc.load(Ordering::Relaxed) as u64).collect()
}

/// Buffer shared between the kernel and this process.
///
/// Unmapping is explicit through [`CoverBuffer::unmap`]; the owner is
/// responsible for calling it.
#[derive(Debug)]
pub struct CoverBuffer {
    base: NonNull<c_void>,
    slots: usize,
}

impl CoverBuffer {
    /// Map `slots` entries of the kcov buffer behind `fd`.
    pub fn map(fd: BorrowedFd<'_>, slots: usize) -> Result<Self, Errno> {
        let len = slots
            .checked_mul(std::mem::size_of::<usize>())
            .and_then(NonZeroUsize::new)
            .ok_or(Errno::EINVAL)?;
        // SAFETY: a fresh shared mapping of the device; no existing memory is affected.
        let base = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                0,
            )?
        };
        Ok(Self { base, slots })
    }

    fn slots(&self) -> &[AtomicUsize] {
        // SAFETY: the mapping spans `slots` words, is page aligned and lives
        // until `unmap` consumes `self`. The kernel writes concurrently, so
        // every access goes through atomics.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr() as *const AtomicUsize, self.slots) }
    }

    /// Discard whatever was recorded so far.
    pub fn reset(&self) {
        self.slots()[0].store(0, Ordering::Relaxed);
    }

    pub fn addresses(&self) -> Vec<u64> {
        read_addresses(self.slots())
    }

    pub fn unmap(self) -> Result<(), Errno> {
        // SAFETY: `base`/`len` describe the mapping created in `map`, and no
        // borrow of it can outlive `self`.
        unsafe { munmap(self.base, self.slots * std::mem::size_of::<usize>()) }
    }
}
