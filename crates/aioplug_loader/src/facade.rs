//! Caller-facing dispatch to the loaded backend.

use crate::loader::PluginLoader;
use aioplug_device::{Device, DeviceError, DeviceResult, IoBuffer, Operation};
use std::path::Path;
use std::sync::Arc;

/// Forwards every device operation to whatever backend is loaded.
///
/// A facade holds no backend of its own: each call looks up the loader's
/// current backend, so a reload takes effect on the next call. When nothing
/// is loaded every operation logs an error and returns
/// [`DeviceError::NoBackend`].
///
/// Facades are cheap to clone and can be shared across threads.
#[derive(Clone)]
pub struct Facade {
    loader: Arc<PluginLoader>,
}

impl Facade {
    /// Creates a facade bound to `loader`.
    #[must_use]
    pub fn new(loader: Arc<PluginLoader>) -> Self {
        Self { loader }
    }

    /// The loader this facade dispatches through.
    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    /// Returns true if a backend is currently loaded.
    pub fn is_bound(&self) -> bool {
        self.loader.is_loaded()
    }

    /// Transfer block size of the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded.
    pub fn block_size(&self) -> DeviceResult<usize> {
        self.dispatch(Operation::BlockSize, |d| Ok(d.block_size()))
    }

    /// Queue depth of the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded.
    pub fn queue_depth(&self) -> DeviceResult<usize> {
        self.dispatch(Operation::QueueDepth, |d| Ok(d.queue_depth()))
    }

    /// Single-submit mode of the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded.
    pub fn single_submit(&self) -> DeviceResult<bool> {
        self.dispatch(Operation::SingleSubmit, |d| Ok(d.single_submit()))
    }

    /// Overlap-events mode of the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded.
    pub fn overlap_events(&self) -> DeviceResult<bool> {
        self.dispatch(Operation::OverlapEvents, |d| Ok(d.overlap_events()))
    }

    /// Worker thread count of the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded.
    pub fn thread_count(&self) -> DeviceResult<usize> {
        self.dispatch(Operation::ThreadCount, |d| Ok(d.thread_count()))
    }

    /// See [`Device::read`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn read(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        self.dispatch(Operation::Read, |d| d.read(buffer, path, validate))
    }

    /// See [`Device::write`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn write(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        self.dispatch(Operation::Write, |d| d.write(buffer, path, validate))
    }

    /// See [`Device::pread`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn pread(
        &self,
        buffer: &IoBuffer,
        path: &Path,
        validate: bool,
        async_op: bool,
    ) -> DeviceResult<()> {
        self.dispatch(Operation::Pread, |d| {
            d.pread(buffer, path, validate, async_op)
        })
    }

    /// See [`Device::pwrite`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn pwrite(
        &self,
        buffer: &IoBuffer,
        path: &Path,
        validate: bool,
        async_op: bool,
    ) -> DeviceResult<()> {
        self.dispatch(Operation::Pwrite, |d| {
            d.pwrite(buffer, path, validate, async_op)
        })
    }

    /// See [`Device::sync_pread`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn sync_pread(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.dispatch(Operation::SyncPread, |d| d.sync_pread(buffer, path))
    }

    /// See [`Device::sync_pwrite`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn sync_pwrite(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.dispatch(Operation::SyncPwrite, |d| d.sync_pwrite(buffer, path))
    }

    /// See [`Device::async_pread`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn async_pread(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.dispatch(Operation::AsyncPread, |d| d.async_pread(buffer, path))
    }

    /// See [`Device::async_pwrite`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn async_pwrite(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.dispatch(Operation::AsyncPwrite, |d| d.async_pwrite(buffer, path))
    }

    /// See [`Device::aio_read`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn aio_read(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        self.dispatch(Operation::AioRead, |d| d.aio_read(buffer, path, validate))
    }

    /// See [`Device::aio_write`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn aio_write(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        self.dispatch(Operation::AioWrite, |d| d.aio_write(buffer, path, validate))
    }

    /// See [`Device::new_cpu_locked_buffer`].
    ///
    /// The buffer belongs to the backend loaded now; free it before the
    /// backend is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn new_cpu_locked_buffer(&self, count: usize, exemplar: &IoBuffer) -> DeviceResult<IoBuffer> {
        self.dispatch(Operation::NewLockedBuffer, |d| {
            d.new_cpu_locked_buffer(count, exemplar)
        })
    }

    /// See [`Device::free_cpu_locked_buffer`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn free_cpu_locked_buffer(&self, buffer: &IoBuffer) -> DeviceResult<()> {
        self.dispatch(Operation::FreeLockedBuffer, |d| {
            d.free_cpu_locked_buffer(buffer)
        })
    }

    /// See [`Device::wait`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn wait(&self) -> DeviceResult<usize> {
        self.dispatch(Operation::Wait, |d| d.wait())
    }

    /// See [`Device::copy_buffer`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoBackend`] if nothing is loaded, otherwise the
    /// backend's error.
    pub fn copy_buffer(&self, dest: &IoBuffer, src: &IoBuffer) -> DeviceResult<()> {
        self.dispatch(Operation::CopyBuffer, |d| d.copy_buffer(dest, src))
    }

    fn dispatch<T>(
        &self,
        op: Operation,
        f: impl FnOnce(&dyn Device) -> DeviceResult<T>,
    ) -> DeviceResult<T> {
        // The loader lock is released here; the Arc keeps the backend alive
        // for the duration of the call.
        let Some(backend) = self.loader.current() else {
            self.loader.stats().record_absent();
            tracing::error!(op = %op, "no backend loaded");
            return Err(DeviceError::NoBackend { op });
        };

        self.loader.stats().record_forwarded();
        tracing::trace!(
            op = %op,
            backend = backend.name(),
            generation = backend.generation(),
            "dispatch"
        );
        f(backend.device())
    }
}

impl std::fmt::Debug for Facade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facade")
            .field("backend", &self.loader.backend_name())
            .finish()
    }
}
