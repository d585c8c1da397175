// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Platform Abstraction
//!
//! Minimal OS probes used at composition time: logical CPU count and
//! physical memory, the defaults a platform layout falls back to when the
//! configuration does not declare one.
//!
//! The probes are behind a trait so tests can inject fixed machines.

/// OS probe interface.
pub trait Platform: Send + Sync {
    /// Human-readable platform name.
    fn platform_name(&self) -> &'static str;

    /// Number of logical CPUs online.
    fn cpu_count(&self) -> usize;

    /// Physical memory in mebibytes, when the OS exposes it.
    fn total_memory_mb(&self) -> Option<u64>;
}

/// Unix implementation backed by `sysconf`.
#[cfg(unix)]
pub struct UnixPlatform;

#[cfg(unix)]
impl UnixPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Platform for UnixPlatform {
    fn platform_name(&self) -> &'static str {
        "unix"
    }

    fn cpu_count(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn total_memory_mb(&self) -> Option<u64> {
        // SAFETY: sysconf is async-signal-safe and has no preconditions
        let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
        if pages <= 0 || page_size <= 0 {
            return None;
        }
        Some((pages as u64).saturating_mul(page_size as u64) / (1024 * 1024))
    }
}

/// Creates a named FIFO with the given mode, tolerating an existing one.
///
/// # Errors
/// Propagates the OS error, except `EEXIST` which is success by design
/// of the command channel (daemon restarts reuse the FIFO).
#[cfg(unix)]
pub fn create_fifo(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let bytes = path.as_os_str().as_bytes();
    let c_path = std::ffi::CString::new(bytes)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "NUL in path"))?;
    // SAFETY: c_path is a valid NUL-terminated string for the call
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::AlreadyExists {
        Ok(())
    } else {
        Err(err)
    }
}

/// A fixed machine for tests.
pub struct StubPlatform {
    pub cpus: usize,
    pub memory_mb: Option<u64>,
}

impl Platform for StubPlatform {
    fn platform_name(&self) -> &'static str {
        "stub"
    }

    fn cpu_count(&self) -> usize {
        self.cpus
    }

    fn total_memory_mb(&self) -> Option<u64> {
        self.memory_mb
    }
}

/// Creates the platform probe for the current OS.
#[cfg(unix)]
pub fn create_platform() -> Box<dyn Platform> {
    Box::new(UnixPlatform::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_reports_at_least_one_cpu() {
        let platform = create_platform();
        assert!(platform.cpu_count() >= 1);
    }

    #[test]
    fn test_stub_platform() {
        let stub = StubPlatform {
            cpus: 4,
            memory_mb: Some(2048),
        };
        assert_eq!(stub.cpu_count(), 4);
        assert_eq!(stub.total_memory_mb(), Some(2048));
    }
}
