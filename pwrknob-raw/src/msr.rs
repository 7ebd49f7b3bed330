//! MSR (Model-Specific Register) read/write primitives
//!
//! This module provides low-level MSR access through `/dev/cpu/*/msr`.
//! For pooled handles, caching and transactional writes, use the `Msr`
//! accessor in pwrknob-core.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;

pub type Result<T> = std::result::Result<T, MsrError>;

/// Errors that can occur during MSR device operations
#[derive(Debug, thiserror::Error)]
pub enum MsrError {
    #[error("Failed to open MSR device for CPU {cpu}: {source}")]
    OpenFailed { cpu: u32, source: std::io::Error },

    #[error("Failed to read MSR 0x{addr:X} on CPU {cpu}: {source}")]
    ReadFailed {
        cpu: u32,
        addr: u64,
        source: std::io::Error,
    },

    #[error("Failed to write MSR 0x{addr:X} on CPU {cpu}: {source}")]
    WriteFailed {
        cpu: u32,
        addr: u64,
        source: std::io::Error,
    },

    #[error("Failed to seek to MSR 0x{addr:X} on CPU {cpu}: {source}")]
    SeekFailed {
        cpu: u32,
        addr: u64,
        source: std::io::Error,
    },
}

impl MsrError {
    /// Whether the failure means the MSR interface does not exist on this
    /// host/kernel ("msr" module not loaded, or no such CPU device node).
    pub fn is_not_found(&self) -> bool {
        let source = match self {
            MsrError::OpenFailed { source, .. }
            | MsrError::ReadFailed { source, .. }
            | MsrError::WriteFailed { source, .. }
            | MsrError::SeekFailed { source, .. } => source,
        };
        source.kind() == std::io::ErrorKind::NotFound
    }

    /// Whether the failure was a permission problem (needs root or
    /// CAP_SYS_RAWIO).
    pub fn is_permission_denied(&self) -> bool {
        let source = match self {
            MsrError::OpenFailed { source, .. }
            | MsrError::ReadFailed { source, .. }
            | MsrError::WriteFailed { source, .. }
            | MsrError::SeekFailed { source, .. } => source,
        };
        source.kind() == std::io::ErrorKind::PermissionDenied
    }
}

/// An open MSR device node for one CPU.
///
/// The file stays open for the lifetime of the handle, so repeated reads of
/// the same CPU cost one `pread`-style seek/read pair each, not an open.
#[derive(Debug)]
pub struct MsrDev {
    file: File,
    cpu: u32,
}

impl MsrDev {
    /// Open `/dev/cpu/<cpu>/msr` for reading and writing.
    ///
    /// Requires root or CAP_SYS_RAWIO, and the `msr` kernel module. Writes
    /// use O_SYNC so they reach the register before the call returns.
    pub fn open(cpu: u32) -> Result<Self> {
        let path = format!("/dev/cpu/{cpu}/msr");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&path)
            .map_err(|e| MsrError::OpenFailed { cpu, source: e })?;

        Ok(Self { file, cpu })
    }

    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    /// Read the 64-bit value of the MSR at `addr`.
    pub fn read(&mut self, addr: u64) -> Result<u64> {
        self.file
            .seek(SeekFrom::Start(addr))
            .map_err(|e| MsrError::SeekFailed {
                cpu: self.cpu,
                addr,
                source: e,
            })?;

        let mut buffer = [0u8; 8];
        self.file
            .read_exact(&mut buffer)
            .map_err(|e| MsrError::ReadFailed {
                cpu: self.cpu,
                addr,
                source: e,
            })?;

        Ok(u64::from_ne_bytes(buffer))
    }

    /// Write a 64-bit value to the MSR at `addr`.
    ///
    /// Writing wrong values to MSRs can destabilize the system. Callers are
    /// expected to go through the typed layouts in [`crate::regs`] or the
    /// bit-field RMW path in pwrknob-core rather than writing raw values.
    pub fn write(&mut self, addr: u64, value: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(addr))
            .map_err(|e| MsrError::SeekFailed {
                cpu: self.cpu,
                addr,
                source: e,
            })?;

        self.file
            .write_all(&value.to_ne_bytes())
            .map_err(|e| MsrError::WriteFailed {
                cpu: self.cpu,
                addr,
                source: e,
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = MsrError::OpenFailed {
            cpu: 0,
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.is_not_found());
        assert!(!err.is_permission_denied());

        let err = MsrError::WriteFailed {
            cpu: 3,
            addr: 0x1FC,
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("0x1FC"));
    }
}
