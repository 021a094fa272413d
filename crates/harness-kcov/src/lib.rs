// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel code coverage for the calling thread through kcov.
//!
//! [`Coverage::attach`] picks the capability once per run: an active session
//! backed by the kcov device, or an inactive no-op when the device cannot be
//! opened. Everything after that drives both variants the same way.

pub mod collector;
pub mod error;
pub mod sys;

pub use collector::{Coverage, KcovSession};
pub use error::KcovError;
pub use sys::read_addresses;

use std::io::{self, Write};
use std::path::PathBuf;

pub const DEFAULT_DEVICE: &str = "/sys/kernel/debug/kcov";

/// Number of `unsigned long` slots in the coverage buffer, counter included.
pub const DEFAULT_COVER_SIZE: usize = 64 << 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KcovConfig {
    pub device: PathBuf,
    pub cover_size: usize,
}

impl Default for KcovConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            cover_size: DEFAULT_COVER_SIZE,
        }
    }
}

/// Write one `0x<hex>` address per line, in the order given.
pub fn write_coverage<W: Write>(addresses: &[u64], out: &mut W) -> io::Result<()> {
    for pc in addresses {
        writeln!(out, "0x{pc:x}")?;
    }
    out.flush()
}
