//! In-memory device backend with fault injection.

use aioplug_device::{
    first_mismatch, BufferId, Device, DeviceConfig, DeviceError, DeviceResult, IoBuffer,
    ReleasedIds,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Files held in memory, shareable between device instances.
///
/// Sharing a store lets a test reload a backend and still see what the
/// previous instance wrote, the way files on disk would survive.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the file at `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read().get(path).cloned()
    }

    /// Replaces the file at `path`.
    pub fn put(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files.write().insert(path.into(), data);
    }

    /// Returns true if a file exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Returns true if the store holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// Flips every bit of the byte at `offset` in the file at `path`.
    ///
    /// Returns false if there is no such file or byte.
    pub fn corrupt(&self, path: &Path, offset: usize) -> bool {
        match self.files.write().get_mut(path).and_then(|f| f.get_mut(offset)) {
            Some(byte) => {
                *byte ^= 0xFF;
                true
            }
            None => false,
        }
    }
}

/// Counts live device instances across reloads.
#[derive(Debug, Clone, Default)]
pub struct LiveCounter(Arc<AtomicUsize>);

impl LiveCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances currently alive.
    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Faults {
    corrupt_next_write: Option<usize>,
    fail_next: Option<DeviceError>,
}

#[derive(Debug)]
enum Pending {
    Read { buffer: IoBuffer, path: PathBuf },
    Write { buffer: IoBuffer, path: PathBuf },
}

#[derive(Debug, Default)]
struct Pinned {
    live: HashSet<BufferId>,
    released: ReleasedIds,
}

/// A [`Device`] keeping files in a [`MemoryStore`].
///
/// Asynchronous operations are queued and executed, in order, by
/// [`wait`](Device::wait). Faults are armed through
/// [`corrupt_next_write`](Self::corrupt_next_write) and
/// [`fail_next`](Self::fail_next).
///
/// # Example
///
/// ```rust
/// use aioplug_device::{Device, ElementType, IoBuffer};
/// use aioplug_testkit::MemoryDevice;
/// use std::path::Path;
///
/// let device = MemoryDevice::new();
/// let buffer = IoBuffer::from_bytes(ElementType::U8, vec![1, 2, 3]).unwrap();
/// device.write(&buffer, Path::new("a.bin"), true).unwrap();
///
/// device.corrupt_next_write(1);
/// device.write(&buffer, Path::new("b.bin"), false).unwrap();
///
/// let target = IoBuffer::zeroed(ElementType::U8, 3);
/// assert!(device.read(&target, Path::new("a.bin"), true).is_ok());
/// assert!(device.read(&target, Path::new("b.bin"), true).is_err());
/// ```
#[derive(Debug)]
pub struct MemoryDevice {
    config: DeviceConfig,
    store: MemoryStore,
    /// What each path should hold, independent of injected corruption.
    intended: Mutex<HashMap<PathBuf, Vec<u8>>>,
    faults: Mutex<Faults>,
    pending: Mutex<Vec<Pending>>,
    pinned: Mutex<Pinned>,
    live: Option<LiveCounter>,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::with_config(DeviceConfig::default())
    }
}

impl MemoryDevice {
    /// Creates a device with the default configuration and its own store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device with the given configuration and its own store.
    #[must_use]
    pub fn with_config(config: DeviceConfig) -> Self {
        Self {
            config,
            store: MemoryStore::new(),
            intended: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            pending: Mutex::new(Vec::new()),
            pinned: Mutex::new(Pinned::default()),
            live: None,
        }
    }

    /// Uses `store` for file content.
    #[must_use]
    pub fn with_store(mut self, store: MemoryStore) -> Self {
        self.store = store;
        self
    }

    /// Counts this instance in `counter` until it is dropped.
    #[must_use]
    pub fn with_live_counter(mut self, counter: &LiveCounter) -> Self {
        if self.live.is_none() {
            counter.0.fetch_add(1, Ordering::SeqCst);
            self.live = Some(counter.clone());
        }
        self
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Makes the next write store its data with the byte at `offset`
    /// flipped. Validation on later reads detects the difference.
    pub fn corrupt_next_write(&self, offset: usize) {
        self.faults.lock().corrupt_next_write = Some(offset);
    }

    /// Makes the next transfer fail with `error`.
    pub fn fail_next(&self, error: DeviceError) {
        self.faults.lock().fail_next = Some(error);
    }

    /// Number of queued asynchronous operations.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of pinned buffers not yet freed.
    #[must_use]
    pub fn pinned_count(&self) -> usize {
        self.pinned.lock().live.len()
    }

    /// Number of released pinned buffers still remembered for double-free
    /// detection.
    #[must_use]
    pub fn remembered_releases(&self) -> usize {
        self.pinned.lock().released.len()
    }

    fn take_failure(&self) -> DeviceResult<()> {
        match self.faults.lock().fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn load(&self, buffer: &IoBuffer, path: &Path, exact: bool) -> DeviceResult<()> {
        self.take_failure()?;
        let file = self.store.get(path).ok_or_else(|| DeviceError::NotFound {
            path: path.to_path_buf(),
        })?;
        let wanted = buffer.byte_len();
        if exact && file.len() != wanted {
            return Err(DeviceError::SizeMismatch {
                path: path.to_path_buf(),
                expected: wanted as u64,
                actual: file.len() as u64,
            });
        }
        if file.len() < wanted {
            return Err(DeviceError::ShortFile {
                path: path.to_path_buf(),
                needed: wanted as u64,
                available: file.len() as u64,
            });
        }
        buffer.fill_from(&file[..wanted])
    }

    fn store_from(&self, buffer: &IoBuffer, path: &Path, truncate: bool) -> DeviceResult<()> {
        self.take_failure()?;
        let data = buffer.to_vec();

        let mut stored = data.clone();
        if let Some(offset) = self.faults.lock().corrupt_next_write.take() {
            if let Some(byte) = stored.get_mut(offset) {
                *byte ^= 0xFF;
            }
        }

        let mut intended = self.intended.lock();
        let previous_intended = intended.remove(path).or_else(|| self.store.get(path));
        intended.insert(path.to_path_buf(), overlay(previous_intended, &data, truncate));
        drop(intended);

        let previous = self.store.get(path);
        self.store.put(path, overlay(previous, &stored, truncate));
        Ok(())
    }

    fn verify_write(&self, buffer: &IoBuffer, path: &Path, truncate: bool) -> DeviceResult<()> {
        let data = buffer.to_vec();
        let stored = self.store.get(path).unwrap_or_default();
        let stored = if truncate {
            &stored[..]
        } else {
            &stored[..data.len().min(stored.len())]
        };
        mismatch(path, first_mismatch(&data, stored))
    }

    fn verify_read(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        let data = buffer.to_vec();
        if let Some(stored) = self.store.get(path) {
            let len = data.len().min(stored.len());
            mismatch(path, first_mismatch(&data, &stored[..len]))?;
        }
        if let Some(intended) = self.intended.lock().get(path) {
            if intended.len() >= data.len() {
                mismatch(path, first_mismatch(&data, &intended[..data.len()]))?;
            }
        }
        Ok(())
    }

    fn enqueue(&self, op: Pending) -> DeviceResult<()> {
        let mut pending = self.pending.lock();
        if pending.len() >= self.config.max_pending {
            return Err(DeviceError::QueueFull {
                capacity: self.config.max_pending,
            });
        }
        pending.push(op);
        Ok(())
    }
}

fn overlay(previous: Option<Vec<u8>>, data: &[u8], truncate: bool) -> Vec<u8> {
    match previous {
        Some(mut file) if !truncate => {
            if file.len() < data.len() {
                file.resize(data.len(), 0);
            }
            file[..data.len()].copy_from_slice(data);
            file
        }
        _ => data.to_vec(),
    }
}

fn mismatch(path: &Path, offset: Option<u64>) -> DeviceResult<()> {
    match offset {
        Some(offset) => Err(DeviceError::ValidationFailed {
            path: path.to_path_buf(),
            offset,
        }),
        None => Ok(()),
    }
}

impl Device for MemoryDevice {
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
        self.load(buffer, path, true)?;
        if validate {
            self.verify_read(buffer, path)?;
        }
        Ok(())
    }

    fn write(&self, buffer: &IoBuffer, path: &Path, validate: bool) -> DeviceResult<()> {
        self.store_from(buffer, path, true)?;
        if validate {
            self.verify_write(buffer, path, true)?;
        }
        Ok(())
    }

    fn pread(
        &self,
        buffer: &IoBuffer,
        path: &Path,
        validate: bool,
        async_op: bool,
    ) -> DeviceResult<()> {
        if async_op {
            return self.async_pread(buffer, path);
        }
        self.load(buffer, path, false)?;
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
            return self.async_pwrite(buffer, path);
        }
        self.store_from(buffer, path, false)?;
        if validate {
            self.verify_write(buffer, path, false)?;
        }
        Ok(())
    }

    fn sync_pread(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.load(buffer, path, false)
    }

    fn sync_pwrite(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.store_from(buffer, path, false)
    }

    fn async_pread(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.enqueue(Pending::Read {
            buffer: buffer.clone(),
            path: path.to_path_buf(),
        })
    }

    fn async_pwrite(&self, buffer: &IoBuffer, path: &Path) -> DeviceResult<()> {
        self.enqueue(Pending::Write {
            buffer: buffer.clone(),
            path: path.to_path_buf(),
        })
    }

    fn new_cpu_locked_buffer(&self, count: usize, exemplar: &IoBuffer) -> DeviceResult<IoBuffer> {
        let buffer = IoBuffer::try_like(exemplar, count)?;
        self.pinned.lock().live.insert(buffer.id());
        Ok(buffer)
    }

    fn free_cpu_locked_buffer(&self, buffer: &IoBuffer) -> DeviceResult<()> {
        let id = buffer.id();
        let mut pinned = self.pinned.lock();
        if pinned.live.remove(&id) {
            pinned.released.insert(id);
            Ok(())
        } else if pinned.released.contains(&id) {
            Err(DeviceError::DoubleFree { id })
        } else {
            Err(DeviceError::UnregisteredBuffer { id })
        }
    }

    fn wait(&self) -> DeviceResult<usize> {
        let drained = std::mem::take(&mut *self.pending.lock());
        let count = drained.len();
        let mut first_error = None;
        for op in drained {
            let result = match op {
                Pending::Read { buffer, path } => self.load(&buffer, &path, false),
                Pending::Write { buffer, path } => self.store_from(&buffer, &path, false),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        tracing::debug!(count, failed = first_error.is_some(), "memory device drained");
        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }
}

impl Drop for MemoryDevice {
    fn drop(&mut self) {
        if let Some(counter) = &self.live {
            counter.0.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aioplug_device::ElementType;

    fn bytes(data: &[u8]) -> IoBuffer {
        IoBuffer::from_bytes(ElementType::U8, data.to_vec()).unwrap()
    }

    #[test]
    fn round_trip_with_validation() {
        let device = MemoryDevice::new();
        let path = Path::new("round.bin");
        let source = bytes(&[1, 2, 3, 4]);

        device.write(&source, path, true).unwrap();
        let target = IoBuffer::zeroed(ElementType::U8, 4);
        device.read(&target, path, true).unwrap();
        assert_eq!(target.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn corrupted_write_fails_later_validation() {
        let device = MemoryDevice::new();
        let path = Path::new("corrupt.bin");
        device.corrupt_next_write(2);
        device.write(&bytes(&[0; 8]), path, false).unwrap();

        let target = IoBuffer::zeroed(ElementType::U8, 8);
        assert_eq!(
            device.read(&target, path, true),
            Err(DeviceError::ValidationFailed {
                path: path.to_path_buf(),
                offset: 2
            })
        );
        device.read(&target, path, false).unwrap();
    }

    #[test]
    fn corrupted_write_fails_own_validation() {
        let device = MemoryDevice::new();
        device.corrupt_next_write(0);
        let err = device
            .write(&bytes(&[5, 5]), Path::new("x.bin"), true)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn store_corruption_detected() {
        let device = MemoryDevice::new();
        let path = Path::new("disk.bin");
        device.write(&bytes(&[7; 16]), path, false).unwrap();
        assert!(device.store().corrupt(path, 15));

        let target = IoBuffer::zeroed(ElementType::U8, 16);
        assert!(matches!(
            device.read(&target, path, true),
            Err(DeviceError::ValidationFailed { offset: 15, .. })
        ));
    }

    #[test]
    fn fail_next_is_consumed() {
        let device = MemoryDevice::new();
        device.fail_next(DeviceError::Backend("injected".into()));
        let source = bytes(&[1]);
        assert!(device.write(&source, Path::new("a"), false).is_err());
        assert!(device.write(&source, Path::new("a"), false).is_ok());
    }

    #[test]
    fn partial_transfers() {
        let device = MemoryDevice::new();
        let path = Path::new("partial.bin");
        device.store().put(path, vec![9; 6]);

        device.sync_pwrite(&bytes(&[1, 2]), path).unwrap();
        assert_eq!(device.store().get(path), Some(vec![1, 2, 9, 9, 9, 9]));

        let target = IoBuffer::zeroed(ElementType::U8, 3);
        device.pread(&target, path, true, false).unwrap();
        assert_eq!(target.to_vec(), vec![1, 2, 9]);

        let long = IoBuffer::zeroed(ElementType::U8, 7);
        assert!(matches!(
            device.sync_pread(&long, path),
            Err(DeviceError::ShortFile { .. })
        ));
        assert!(matches!(
            device.read(&target, path, false),
            Err(DeviceError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn async_ops_run_on_wait() {
        let device = MemoryDevice::new();
        for i in 0..3u8 {
            device
                .async_pwrite(&bytes(&[i; 4]), Path::new(&format!("{i}.bin")))
                .unwrap();
        }
        assert_eq!(device.pending(), 3);
        assert!(device.store().is_empty());

        assert_eq!(device.wait(), Ok(3));
        assert_eq!(device.store().len(), 3);
        assert_eq!(device.store().get(Path::new("2.bin")), Some(vec![2; 4]));
    }

    #[test]
    fn async_queue_limit() {
        let device = MemoryDevice::with_config(DeviceConfig::default().with_max_pending(1));
        device.async_pwrite(&bytes(&[1]), Path::new("a")).unwrap();
        assert_eq!(
            device.async_pwrite(&bytes(&[1]), Path::new("b")),
            Err(DeviceError::QueueFull { capacity: 1 })
        );
    }

    #[test]
    fn pinned_lifecycle() {
        let device = MemoryDevice::new();
        let exemplar = bytes(&[0]);
        let pinned = device.new_cpu_locked_buffer(4, &exemplar).unwrap();
        assert_eq!(device.pinned_count(), 1);

        device.free_cpu_locked_buffer(&pinned).unwrap();
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
    fn live_counter_tracks_instances() {
        let counter = LiveCounter::new();
        let a = MemoryDevice::new().with_live_counter(&counter);
        let b = MemoryDevice::new().with_live_counter(&counter);
        assert_eq!(counter.get(), 2);
        drop(a);
        assert_eq!(counter.get(), 1);
        drop(b);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn shared_store_outlives_instance() {
        let store = MemoryStore::new();
        let first = MemoryDevice::new().with_store(store.clone());
        first.write(&bytes(&[3, 3]), Path::new("kept"), false).unwrap();
        drop(first);

        let second = MemoryDevice::new().with_store(store);
        let target = IoBuffer::zeroed(ElementType::U8, 2);
        second.read(&target, Path::new("kept"), true).unwrap();
        assert_eq!(target.to_vec(), vec![3, 3]);
    }

    #[test]
    fn pinned_allocation_failures_and_bounded_history() {
        let device = MemoryDevice::new();
        let exemplar = bytes(&[0]);
        assert!(matches!(
            device.new_cpu_locked_buffer(usize::MAX, &exemplar),
            Err(DeviceError::Backend(_))
        ));

        for _ in 0..ReleasedIds::DEFAULT_CAPACITY * 2 {
            let pinned = device.new_cpu_locked_buffer(2, &exemplar).unwrap();
            device.free_cpu_locked_buffer(&pinned).unwrap();
        }
        assert_eq!(device.pinned_count(), 0);
        assert_eq!(device.remembered_releases(), ReleasedIds::DEFAULT_CAPACITY);
    }
}
