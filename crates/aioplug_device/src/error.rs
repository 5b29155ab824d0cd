//! Error types for device operations.

use crate::buffer::BufferId;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// A Device Contract operation, used to name the operation an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `block_size`
    BlockSize,
    /// `queue_depth`
    QueueDepth,
    /// `single_submit`
    SingleSubmit,
    /// `overlap_events`
    OverlapEvents,
    /// `thread_count`
    ThreadCount,
    /// `read`
    Read,
    /// `write`
    Write,
    /// `pread`
    Pread,
    /// `pwrite`
    Pwrite,
    /// `sync_pread`
    SyncPread,
    /// `sync_pwrite`
    SyncPwrite,
    /// `async_pread`
    AsyncPread,
    /// `async_pwrite`
    AsyncPwrite,
    /// `aio_read`
    AioRead,
    /// `aio_write`
    AioWrite,
    /// `new_cpu_locked_buffer`
    NewLockedBuffer,
    /// `free_cpu_locked_buffer`
    FreeLockedBuffer,
    /// `wait`
    Wait,
    /// `copy_buffer`
    CopyBuffer,
}

impl Operation {
    /// Returns the operation's name as it appears in the device contract.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::BlockSize => "block_size",
            Operation::QueueDepth => "queue_depth",
            Operation::SingleSubmit => "single_submit",
            Operation::OverlapEvents => "overlap_events",
            Operation::ThreadCount => "thread_count",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Pread => "pread",
            Operation::Pwrite => "pwrite",
            Operation::SyncPread => "sync_pread",
            Operation::SyncPwrite => "sync_pwrite",
            Operation::AsyncPread => "async_pread",
            Operation::AsyncPwrite => "async_pwrite",
            Operation::AioRead => "aio_read",
            Operation::AioWrite => "aio_write",
            Operation::NewLockedBuffer => "new_cpu_locked_buffer",
            Operation::FreeLockedBuffer => "free_cpu_locked_buffer",
            Operation::Wait => "wait",
            Operation::CopyBuffer => "copy_buffer",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a device or by the facade in front of it.
///
/// Every variant holds owned data only. An error produced inside a backend's
/// code image must stay valid after that image is unloaded, so no variant
/// carries a boxed trait object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// No backend is loaded behind the facade.
    #[error("no backend loaded for {op}")]
    NoBackend {
        /// The operation that was attempted.
        op: Operation,
    },

    /// The target file does not exist.
    #[error("file not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// An I/O error occurred during a transfer.
    #[error("I/O error on {}: {message}", path.display())]
    Io {
        /// The path being transferred.
        path: PathBuf,
        /// The kind reported by the operating system.
        kind: io::ErrorKind,
        /// The OS error message.
        message: String,
    },

    /// The file size does not match the buffer size for a whole-buffer read.
    #[error("size mismatch on {}: buffer holds {expected} bytes, file holds {actual}", path.display())]
    SizeMismatch {
        /// The path being transferred.
        path: PathBuf,
        /// Number of bytes the buffer holds.
        expected: u64,
        /// Number of bytes found.
        actual: u64,
    },

    /// The file is shorter than the buffer for a partial read.
    #[error("short file {}: need {needed} bytes, file holds {available}", path.display())]
    ShortFile {
        /// The path being read.
        path: PathBuf,
        /// Number of bytes the buffer needs.
        needed: u64,
        /// Number of bytes available.
        available: u64,
    },

    /// Transferred content did not match its source.
    #[error("validation failed on {}: first mismatch at byte {offset}", path.display())]
    ValidationFailed {
        /// The path whose content mismatched.
        path: PathBuf,
        /// Offset of the first mismatching byte.
        offset: u64,
    },

    /// Too many asynchronous operations are outstanding.
    #[error("submission queue full: {capacity} operations outstanding")]
    QueueFull {
        /// Maximum number of outstanding operations.
        capacity: usize,
    },

    /// A buffer was released that the backend never registered.
    #[error("buffer {id} is not registered with this device")]
    UnregisteredBuffer {
        /// The offending buffer.
        id: BufferId,
    },

    /// A registered buffer was released twice.
    #[error("buffer {id} was already released")]
    DoubleFree {
        /// The offending buffer.
        id: BufferId,
    },

    /// An argument violated the operation's preconditions.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend-specific failure that fits no other variant.
    #[error("backend error: {0}")]
    Backend(String),
}

impl DeviceError {
    /// Builds a transfer error from an I/O error on `path`.
    ///
    /// `NotFound` is mapped to [`DeviceError::NotFound`].
    pub fn io(path: &Path, err: &io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return DeviceError::NotFound {
                path: path.to_path_buf(),
            };
        }
        DeviceError::Io {
            path: path.to_path_buf(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Returns true if no backend was loaded.
    pub fn is_absence(&self) -> bool {
        matches!(self, DeviceError::NoBackend { .. })
    }

    /// Returns true for a content mismatch detected by validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, DeviceError::ValidationFailed { .. })
    }

    /// Returns true for pinned-buffer lifecycle violations.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            DeviceError::UnregisteredBuffer { .. } | DeviceError::DoubleFree { .. }
        )
    }

    /// Returns true for failures of the transfer itself.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            DeviceError::NotFound { .. }
                | DeviceError::Io { .. }
                | DeviceError::SizeMismatch { .. }
                | DeviceError::ShortFile { .. }
                | DeviceError::QueueFull { .. }
        )
    }
}
