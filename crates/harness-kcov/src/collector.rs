// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::error::KcovError;
use crate::sys::{self, CoverBuffer};
use crate::KcovConfig;
use nix::errno::Errno;
use std::fs::OpenOptions;
use std::os::fd::{AsFd, IntoRawFd, OwnedFd};
use tracing::{debug, error, info, warn};

/// Coverage capability selected once when a run starts.
///
/// Callers drive both variants the same way; the `Inactive` variant turns
/// every step into a no-op and yields no addresses.
#[derive(Debug)]
pub enum Coverage {
    Active(KcovSession),
    Inactive,
}

impl Coverage {
    /// Open the kcov device and map its buffer.
    ///
    /// A device that cannot be opened degrades to [`Coverage::Inactive`].
    /// Once the device is open, any configuration or mapping failure is
    /// returned as an error.
    pub fn attach(config: &KcovConfig) -> Result<Self, KcovError> {
        if config.cover_size < 2 {
            return Err(KcovError::InvalidCoverSize(config.cover_size));
        }

        let file = match OpenOptions::new().read(true).write(true).open(&config.device) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    device = %config.device.display(),
                    error = %err,
                    "kcov device unavailable, running without coverage"
                );
                return Ok(Coverage::Inactive);
            }
        };

        let fd = OwnedFd::from(file);
        sys::init_trace(fd.as_fd(), config.cover_size).map_err(KcovError::Init)?;
        let buffer = CoverBuffer::map(fd.as_fd(), config.cover_size).map_err(KcovError::Map)?;

        debug!(
            device = %config.device.display(),
            cover_size = config.cover_size,
            "kcov attached"
        );
        Ok(Coverage::Active(KcovSession {
            fd: Some(fd),
            buffer: Some(buffer),
            enabled: false,
        }))
    }

    pub fn disabled() -> Self {
        Coverage::Inactive
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Coverage::Active(_))
    }

    /// Start tracing the calling thread and clear the buffer.
    pub fn enable(&mut self) -> Result<(), KcovError> {
        match self {
            Coverage::Active(session) => session.enable(),
            Coverage::Inactive => Ok(()),
        }
    }

    /// Addresses recorded since [`Coverage::enable`], in kernel order.
    pub fn collect(&self) -> Vec<u64> {
        match self {
            Coverage::Active(session) => session.addresses(),
            Coverage::Inactive => Vec::new(),
        }
    }

    /// Disable, unmap and close, returning every teardown failure.
    pub fn detach(self) -> Vec<KcovError> {
        match self {
            Coverage::Active(mut session) => session.teardown(),
            Coverage::Inactive => Vec::new(),
        }
    }
}

/// An open kcov device with its mapped buffer.
#[derive(Debug)]
pub struct KcovSession {
    fd: Option<OwnedFd>,
    buffer: Option<CoverBuffer>,
    enabled: bool,
}

impl KcovSession {
    fn enable(&mut self) -> Result<(), KcovError> {
        let fd = self.fd.as_ref().ok_or(KcovError::Enable(Errno::EBADF))?;
        sys::enable_pc_tracing(fd.as_fd()).map_err(KcovError::Enable)?;
        self.enabled = true;
        if let Some(buffer) = &self.buffer {
            buffer.reset();
        }
        info!("kcov enabled");
        Ok(())
    }

    fn addresses(&self) -> Vec<u64> {
        self.buffer
            .as_ref()
            .map(CoverBuffer::addresses)
            .unwrap_or_default()
    }

    /// Runs at most once; later calls find nothing left to release.
    fn teardown(&mut self) -> Vec<KcovError> {
        let mut errors = Vec::new();

        if self.enabled {
            self.enabled = false;
            if let Some(fd) = &self.fd {
                if let Err(errno) = sys::disable_tracing(fd.as_fd()) {
                    errors.push(KcovError::Disable(errno));
                }
            }
        }

        if let Some(buffer) = self.buffer.take() {
            if let Err(errno) = buffer.unmap() {
                errors.push(KcovError::Unmap(errno));
            }
        }

        if let Some(fd) = self.fd.take() {
            // SAFETY: into_raw_fd gives up ownership, so this is the only close.
            let ret = unsafe { libc::close(fd.into_raw_fd()) };
            if let Err(errno) = Errno::result(ret) {
                errors.push(KcovError::Close(errno));
            }
        }

        errors
    }
}

impl Drop for KcovSession {
    fn drop(&mut self) {
        for err in self.teardown() {
            error!(error = %err, "kcov teardown failed");
        }
    }
}
