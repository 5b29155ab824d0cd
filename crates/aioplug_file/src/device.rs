//! File-backed device.

use crate::digest::DigestStore;
use crate::io;
use crate::pinned::PinnedRegistry;
use crate::pool::WorkerPool;
use aioplug_device::{first_mismatch, Device, DeviceConfig, DeviceError, DeviceResult, IoBuffer};
use std::path::Path;
use std::sync::Arc;

/// A device backend using ordinary file I/O.
///
/// Transfers go through the OS page cache in `block_size` chunks.
/// Asynchronous operations run on `thread_count` worker threads and are
/// drained by [`wait`](Device::wait) or when the device is dropped.
///
/// # Validation
///
/// A validated write reads the file back and compares it with the buffer.
/// A validated read re-reads the file and, if this device wrote the file,
/// compares the buffer against digests of what was written. Either mismatch
/// is reported as [`DeviceError::ValidationFailed`].
///
/// # Example
///
/// ```no_run
/// use aioplug_device::{Device, DeviceConfig, ElementType, IoBuffer};
/// use aioplug_file::FileDevice;
/// use std::path::Path;
///
/// let device = FileDevice::new(DeviceConfig::default()).unwrap();
/// let buffer = IoBuffer::zeroed(ElementType::F32, 256);
/// device.write(&buffer, Path::new("tensor.bin"), true).unwrap();
/// ```
pub struct FileDevice {
    config: DeviceConfig,
    digests: Arc<DigestStore>,
    pinned: PinnedRegistry,
    pool: WorkerPool,
}

impl FileDevice {
    /// Creates a device with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the worker
    /// threads cannot be started.
    pub fn new(config: DeviceConfig) -> DeviceResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.thread_count, config.max_pending)?;
        tracing::info!(
            block_size = config.block_size,
            queue_depth = config.queue_depth,
            threads = pool.threads(),
            max_pending = config.max_pending,
            "file device created"
        );
        Ok(Self {
            config,
            digests: Arc::new(DigestStore::new()),
            pinned: PinnedRegistry::new(),
            pool,
        })
    }

    /// Creates a device configured from `AIOPLUG_*` environment variables.
    ///
    /// # Errors
    ///
    /// Same as [`FileDevice::new`].
    pub fn from_env() -> DeviceResult<Self> {
        Self::new(DeviceConfig::from_env())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Number of pinned buffers not yet freed.
    #[must_use]
    pub fn pinned_count(&self) -> usize {
        self.pinned.live()
    }

    /// Number of released pinned buffers still remembered for double-free
    /// detection.
    #[must_use]
    pub fn remembered_releases(&self) -> usize {
        self.pinned.remembered()
    }

    /// Number of files whose written content is tracked for read validation.
    #[must_use]
    pub fn tracked_files(&self) -> usize {
        self.digests.len()
    }

    /// Number of asynchronous operations queued or running.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pool.outstanding()
    }

    fn put(&self, buffer: &IoBuffer, path: &Path, truncate: bool, validate: bool) -> DeviceResult<()> {
        let block_size = self.config.block_size;
        buffer.with_bytes(|data| -> DeviceResult<()> {
            io::write_blocks(path, data, block_size, truncate)
                .inspect_err(|_| self.digests.forget(path))?;
            self.digests.record(path, data, block_size);
            if validate {
                let len = if truncate { None } else { Some(data.len()) };
                let on_disk = io::read_back(path, len)?;
                check(path, first_mismatch(data, &on_disk))?;
            }
            Ok(())
        })
    }

    fn verify_read(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        buffer.with_bytes(|data| -> DeviceResult<()> {
            let on_disk = io::read_back(path, Some(data.len()))?;
            check(path, first_mismatch(data, &on_disk))?;
            check(path, self.digests.mismatch(path, data))
        })
    }

    fn submit_read(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        let buffer = buffer.clone();
        let path = path.to_path_buf();
        let block_size = self.config.block_size;
        tracing::debug!(path = %path.display(), bytes = buffer.byte_len(), "queue async read");
        self.pool
            .submit(Box::new(move || io::read_prefix(&buffer, &path, block_size)))
    }

    fn submit_write(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        let buffer = buffer.clone();
        let path = path.to_path_buf();
        let block_size = self.config.block_size;
        let digests = Arc::clone(&self.digests);
        tracing::debug!(path = %path.display(), bytes = buffer.byte_len(), "queue async write");
        self.pool.submit(Box::new(move || {
            buffer.with_bytes(|data| -> DeviceResult<()> {
                io::write_blocks(&path, data, block_size, false)
                    .inspect_err(|_| digests.forget(&path))?;
                digests.record(&path, data, block_size);
                Ok(())
            })
        }))
    }
}

fn check(path: &Path, mismatch: Option<u64>) -> DeviceResult<()> {
    match mismatch {
        Some(offset) => {
            tracing::warn!(path = %path.display(), offset, "validation mismatch");
            Err(DeviceError::ValidationFailed {
                path: path.to_path_buf(),
                offset,
            })
        }
        None => Ok(()),
    }
}

impl Device for FileDevice {
    fn block_size(&self) -> usize {
        self.config.block_size
    }

    fn queue_depth(&self) -> usize {
        self.config.queue_depth
    }

    fn single_submit(&self) -> bool {
        self.config.single_submit
    }

    fn overlap_events(&self) -> bool {
        self.config.overlap_events
    }

    fn thread_count(&self) -> usize {
        self.config.thread_count
    }

    fn read(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        io::read_whole(buffer, path, self.config.block_size)?;
        if validate {
            self.verify_read(buffer, path)?;
        }
        Ok(())
    }

    fn write(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        self.put(buffer, path, true, validate)
    }

    fn pread(
        &self,
        buffer: &IoBuffer,
        path: &Path,
        validate: bool,
        async_op: bool,
    ) -> DeviceResult<()> {
        if async_op {
            return self.submit_read(buffer, path);
        }
        io::read_prefix(buffer, path, self.config.block_size)?;
        if validate {
            self.verify_read(buffer, path)?;
        }
        Ok(())
    }

    fn pwrite(
        &self,
        buffer: &IoBuffer,
        path: &Path,
        validate: bool,
        async_op: bool,
    ) -> DeviceResult<()> {
        if async_op {
            return self.submit_write(buffer, path);
        }
        self.put(buffer, path, false, validate)
    }

    fn sync_pread(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.pread(buffer, path, false, false)
    }

    fn sync_pwrite(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.pwrite(buffer, path, false, false)
    }

    fn async_pread(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.submit_read(buffer, path)
    }

    fn async_pwrite(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.submit_write(buffer, path)
    }

    fn new_cpu_locked_buffer(&self, count: usize, exemplar: &IoBuffer) -> DeviceResult<IoBuffer> {
        let buffer = IoBuffer::try_like(exemplar, count)?;
        self.pinned.register(&buffer);
        tracing::debug!(id = %buffer.id(), bytes = buffer.byte_len(), "pinned buffer allocated");
        Ok(buffer)
    }

    fn free_cpu_locked_buffer(&self, buffer: &IoBuffer) -> DeviceResult<()> {
        self.pinned.release(buffer)
    }

    fn wait(&self) -> DeviceResult<usize> {
        let result = self.pool.wait();
        tracing::debug!(?result, "async operations drained");
        result
    }
}

impl Drop for FileDevice {
    fn drop(&mut self) {
        let leaked = self.pinned.live();
        if leaked > 0 {
            tracing::warn!(leaked, "file device dropped with pinned buffers outstanding");
        }
    }
}

impl std::fmt::Debug for FileDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDevice")
            .field("config", &self.config)
            .field("pinned", &self.pinned.live())
            .field("outstanding", &self.pool.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aioplug_device::{ElementType, ReleasedIds};
    use tempfile::tempdir;

    fn device() -> FileDevice {
        FileDevice::new(DeviceConfig::default().with_block_size(64).with_thread_count(2)).unwrap()
    }

    fn pattern(len: usize) -> IoBuffer {
        IoBuffer::from_bytes(ElementType::U8, (0..len).map(|i| (i % 251) as u8).collect()).unwrap()
    }

    #[test]
    fn configuration_queries() {
        let config = DeviceConfig::default()
            .with_block_size(4096)
            .with_queue_depth(16)
            .with_single_submit(true)
            .with_overlap_events(false)
            .with_thread_count(3);
        let device = FileDevice::new(config).unwrap();

        assert_eq!(device.block_size(), 4096);
        assert_eq!(device.queue_depth(), 16);
        assert!(device.single_submit());
        assert!(!device.overlap_events());
        assert_eq!(device.thread_count(), 3);
    }

    #[test]
    fn invalid_config_rejected() {
        let result = FileDevice::new(DeviceConfig::default().with_thread_count(0));
        assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
    }

    #[test]
    fn validated_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("round.bin");
        let device = device();
        let source = pattern(1000);

        device.write(&source, &path, true).unwrap();
        let target = IoBuffer::zeroed(ElementType::U8, 1000);
        device.read(&target, &path, true).unwrap();

        assert_eq!(target.to_vec(), source.to_vec());
    }

    #[test]
    fn read_size_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sized.bin");
        let device = device();
        device.write(&pattern(100), &path, false).unwrap();

        let target = IoBuffer::zeroed(ElementType::U8, 99);
        assert!(matches!(
            device.read(&target, &path, false),
            Err(DeviceError::SizeMismatch { expected: 99, actual: 100, .. })
        ));
    }

    #[test]
    fn read_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let target = IoBuffer::zeroed(ElementType::U8, 4);
        assert_eq!(
            device().read(&target, &path, true),
            Err(DeviceError::NotFound { path })
        );
    }

    #[test]
    fn corrupted_file_fails_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.bin");
        let device = device();
        device.write(&pattern(256), &path, false).unwrap();

        let mut on_disk = std::fs::read(&path).unwrap();
        on_disk[130] ^= 0xFF;
        std::fs::write(&path, &on_disk).unwrap();

        let target = IoBuffer::zeroed(ElementType::U8, 256);
        let err = device.read(&target, &path, true).unwrap_err();
        assert_eq!(
            err,
            DeviceError::ValidationFailed {
                path: path.clone(),
                offset: 128
            }
        );

        // Without validation the corrupted bytes come back as they are.
        device.read(&target, &path, false).unwrap();
        assert_eq!(target.to_vec(), on_disk);
    }

    #[test]
    fn pread_and_pwrite_on_longer_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.bin");
        std::fs::write(&path, vec![0xAAu8; 32]).unwrap();
        let device = device();

        let head = IoBuffer::from_bytes(ElementType::I32, vec![1u8; 8]).unwrap();
        device.pwrite(&head, &path, true, false).unwrap();

        let mut expected = vec![1u8; 8];
        expected.extend(vec![0xAAu8; 24]);
        assert_eq!(std::fs::read(&path).unwrap(), expected);

        let target = IoBuffer::zeroed(ElementType::I32, 2);
        device.pread(&target, &path, true, false).unwrap();
        assert_eq!(target.to_vec(), vec![1u8; 8]);
    }

    #[test]
    fn pread_short_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [0u8; 4]).unwrap();

        let target = IoBuffer::zeroed(ElementType::F64, 1);
        assert!(matches!(
            device().sync_pread(&target, &path),
            Err(DeviceError::ShortFile { needed: 8, available: 4, .. })
        ));
    }

    #[test]
    fn async_writes_then_wait() {
        let dir = tempdir().unwrap();
        let device = device();
        let buffers: Vec<IoBuffer> = (0..8).map(|i| pattern(100 + i)).collect();

        for (i, buffer) in buffers.iter().enumerate() {
            device
                .async_pwrite(buffer, &dir.path().join(format!("{i}.bin")))
                .unwrap();
        }
        assert_eq!(device.wait(), Ok(8));
        assert_eq!(device.outstanding(), 0);

        for (i, buffer) in buffers.iter().enumerate() {
            let target = IoBuffer::like(buffer, buffer.len());
            device
                .read(&target, &dir.path().join(format!("{i}.bin")), true)
                .unwrap();
            assert_eq!(target.to_vec(), buffer.to_vec());
        }
    }

    #[test]
    fn async_read_error_surfaces_on_wait() {
        let dir = tempdir().unwrap();
        let device = device();
        let target = IoBuffer::zeroed(ElementType::U8, 4);
        let missing = dir.path().join("missing.bin");

        device.pread(&target, &missing, true, true).unwrap();
        assert_eq!(device.wait(), Err(DeviceError::NotFound { path: missing }));
        assert_eq!(device.wait(), Ok(0));
    }

    #[test]
    fn async_read_fills_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("async.bin");
        let device = device();
        let source = pattern(300);
        device.write(&source, &path, false).unwrap();

        let target = IoBuffer::zeroed(ElementType::U8, 300);
        device.async_pread(&target, &path).unwrap();
        device.wait().unwrap();
        assert_eq!(target.to_vec(), source.to_vec());
    }

    #[test]
    fn pinned_buffer_lifecycle() {
        let device = device();
        let exemplar = IoBuffer::zeroed(ElementType::BF16, 1);

        let pinned = device.new_cpu_locked_buffer(10, &exemplar).unwrap();
        assert_eq!(pinned.dtype(), ElementType::BF16);
        assert_eq!(pinned.byte_len(), 20);
        assert_eq!(device.pinned_count(), 1);

        device.free_cpu_locked_buffer(&pinned).unwrap();
        assert_eq!(device.pinned_count(), 0);
        assert!(matches!(
            device.free_cpu_locked_buffer(&pinned),
            Err(DeviceError::DoubleFree { .. })
        ));
        assert!(matches!(
            device.free_cpu_locked_buffer(&exemplar),
            Err(DeviceError::UnregisteredBuffer { .. })
        ));
    }

    #[test]
    fn oversized_pinned_buffer_is_an_error() {
        let device = device();
        let exemplar = IoBuffer::zeroed(ElementType::F64, 1);
        assert!(matches!(
            device.new_cpu_locked_buffer(usize::MAX / 4, &exemplar),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert_eq!(device.pinned_count(), 0);
    }

    #[test]
    fn pin_and_free_loop_keeps_bounded_state() {
        let device = device();
        let exemplar = IoBuffer::zeroed(ElementType::U8, 1);
        let total = ReleasedIds::DEFAULT_CAPACITY + 500;

        let mut last = None;
        for _ in 0..total {
            let pinned = device.new_cpu_locked_buffer(4, &exemplar).unwrap();
            device.free_cpu_locked_buffer(&pinned).unwrap();
            last = Some(pinned);
        }

        assert_eq!(device.pinned_count(), 0);
        assert_eq!(device.remembered_releases(), ReleasedIds::DEFAULT_CAPACITY);
        let last = last.unwrap();
        assert!(matches!(
            device.free_cpu_locked_buffer(&last),
            Err(DeviceError::DoubleFree { .. })
        ));
    }

    #[test]
    fn failed_write_forgets_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        let device = device();
        device.write(&pattern(32), &path, false).unwrap();
        assert_eq!(device.tracked_files(), 1);

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(device.write(&pattern(32), &path, false).is_err());
        assert_eq!(device.tracked_files(), 0);
    }
}
