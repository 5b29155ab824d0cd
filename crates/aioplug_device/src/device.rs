//! The device contract every backend implements.

use crate::buffer::IoBuffer;
use crate::error::{DeviceError, DeviceResult};
use std::path::Path;

/// A block-I/O device backend.
///
/// Backends move whole [`IoBuffer`]s to and from files. They are usually
/// compiled into their own code image and loaded at run time, so the trait
/// is the fixed interface shared by the host and every backend; changing it
/// requires bumping [`crate::AIOPLUG_ABI_VERSION`].
///
/// # Invariants
///
/// - Configuration queries return the same value for the backend's lifetime
/// - Synchronous operations return only after the transfer (and validation,
///   when requested) is complete
/// - `wait` returns only after every previously issued asynchronous
///   operation has completed
/// - Validation failures are reported as [`DeviceError::ValidationFailed`],
///   never as a plain I/O error
/// - Backends must be `Send + Sync`: facades dispatch from many threads
///
/// # Implementors
///
/// Backends are external. The workspace ships a file backend
/// (`aioplug_file`) and an in-memory test backend (`aioplug_testkit`).
pub trait Device: Send + Sync {
    /// Transfer block size in bytes.
    fn block_size(&self) -> usize;

    /// Number of requests the backend keeps in flight per submission.
    fn queue_depth(&self) -> usize;

    /// Whether requests are submitted one at a time.
    fn single_submit(&self) -> bool;

    /// Whether completion events of consecutive submissions may overlap.
    fn overlap_events(&self) -> bool;

    /// Number of worker threads serving asynchronous operations.
    fn thread_count(&self) -> usize;

    /// Reads the whole file at `path` into `buffer`.
    ///
    /// The file must hold exactly `buffer.byte_len()` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist or cannot be read
    /// - The file size differs from the buffer size
    /// - `validate` is set and the content does not match its source
    fn read(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()>;

    /// Writes the whole buffer to `path`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written, or if `validate` is
    /// set and the file content read back differs from `buffer`.
    fn write(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()>;

    /// Fills `buffer` from the start of `path`; the file may be longer.
    ///
    /// With `async_op` set this behaves like [`async_pread`](Self::async_pread)
    /// and `validate` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or shorter than the buffer,
    /// on I/O failure, or on validation mismatch.
    fn pread(
        &self,
        buffer: &IoBuffer,
        path: &Path,
        validate: bool,
        async_op: bool,
    ) -> DeviceResult<()>;

    /// Writes `buffer` over the start of `path` without truncating it.
    ///
    /// With `async_op` set this behaves like
    /// [`async_pwrite`](Self::async_pwrite) and `validate` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or validation mismatch.
    fn pwrite(
        &self,
        buffer: &IoBuffer,
        path: &Path,
        validate: bool,
        async_op: bool,
    ) -> DeviceResult<()>;

    /// Blocking partial read.
    ///
    /// # Errors
    ///
    /// Same as [`pread`](Self::pread) without validation.
    fn sync_pread(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()>;

    /// Blocking partial write.
    ///
    /// # Errors
    ///
    /// Same as [`pwrite`](Self::pwrite) without validation.
    fn sync_pwrite(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()>;

    /// Queues a partial read and returns immediately.
    ///
    /// The buffer content is defined only after [`wait`](Self::wait).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::QueueFull`] if the backend cannot accept more
    /// outstanding operations. Transfer failures surface from `wait`.
    fn async_pread(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()>;

    /// Queues a partial write and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::QueueFull`] if the backend cannot accept more
    /// outstanding operations. Transfer failures surface from `wait`.
    fn async_pwrite(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()>;

    /// One-shot whole-file read using the device's own transfer settings.
    ///
    /// Backends with a dedicated single-submission path override this; the
    /// default is [`read`](Self::read).
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read).
    fn aio_read(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        self.read(buffer, path, validate)
    }

    /// One-shot whole-file write using the device's own transfer settings.
    ///
    /// The default is [`write`](Self::write).
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    fn aio_write(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        self.write(buffer, path, validate)
    }

    /// Allocates a pinned buffer of `count` elements typed like `exemplar`.
    ///
    /// Every buffer returned here must be released with
    /// [`free_cpu_locked_buffer`](Self::free_cpu_locked_buffer).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot allocate or pin the region.
    fn new_cpu_locked_buffer(&self, count: usize, exemplar: &IoBuffer) -> DeviceResult<IoBuffer>;

    /// Releases a buffer obtained from
    /// [`new_cpu_locked_buffer`](Self::new_cpu_locked_buffer).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnregisteredBuffer`] for a buffer this device
    /// never pinned and [`DeviceError::DoubleFree`] for one already released.
    fn free_cpu_locked_buffer(&self, buffer: &IoBuffer) -> DeviceResult<()>;

    /// Blocks until every previously issued asynchronous operation is done.
    ///
    /// Returns the number of operations completed since the last `wait`.
    ///
    /// # Errors
    ///
    /// Returns the first asynchronous failure observed since the last `wait`.
    /// The queue is drained either way.
    fn wait(&self) -> DeviceResult<usize>;

    /// Copies `src` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidArgument`] if the byte lengths differ.
    fn copy_buffer(&self, dest: &IoBuffer, src: &IoBuffer) -> DeviceResult<()> {
        if dest.shares_region(src) {
            return Ok(());
        }
        if dest.byte_len() != src.byte_len() {
            return Err(DeviceError::InvalidArgument(format!(
                "copy between {} and {} bytes",
                dest.byte_len(),
                src.byte_len()
            )));
        }
        let data = src.to_vec();
        dest.fill_from(&data)
    }
}
