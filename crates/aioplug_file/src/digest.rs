//! Digests of content this backend wrote, for read validation.

use aioplug_device::content_digest;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Per-block digests of the first `len` bytes written to a file.
#[derive(Debug, Clone)]
struct Written {
    len: usize,
    block_size: usize,
    blocks: Vec<[u8; 32]>,
}

impl Written {
    fn new(data: &[u8], block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            len: data.len(),
            block_size,
            blocks: data.chunks(block_size).map(content_digest).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct Entries {
    by_path: HashMap<PathBuf, Written>,
    // Paths in the order they were last recorded, oldest first.
    order: VecDeque<PathBuf>,
}

/// Remembers what was last written to each path.
///
/// Blocks are hashed separately so a mismatch can be located to the block
/// it starts in. At most `capacity` paths are tracked; recording a new path
/// beyond that evicts the least recently written one, which then falls back
/// to read-back comparison only.
#[derive(Debug)]
pub(crate) struct DigestStore {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl DigestStore {
    /// Number of paths tracked by [`DigestStore::new`].
    pub(crate) const DEFAULT_CAPACITY: usize = 4096;

    pub(crate) fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity,
        }
    }

    /// Records `data` as the first `data.len()` bytes of `path`.
    pub(crate) fn record(&self, path: &Path, data: &[u8], block_size: usize) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        let written = Written::new(data, block_size);
        if entries.by_path.insert(path.to_path_buf(), written).is_some() {
            entries.order.retain(|p| p != path);
        }
        entries.order.push_back(path.to_path_buf());
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.by_path.remove(&oldest);
            }
        }
    }

    /// Drops whatever was recorded for `path`.
    pub(crate) fn forget(&self, path: &Path) {
        let mut entries = self.entries.lock();
        if entries.by_path.remove(path).is_some() {
            entries.order.retain(|p| p != path);
        }
    }

    /// Offset of the first block of `data` that differs from what was
    /// recorded for `path`.
    ///
    /// Returns None when the content matches or nothing of that length was
    /// recorded.
    pub(crate) fn mismatch(&self, path: &Path, data: &[u8]) -> Option<u64> {
        let entries = self.entries.lock();
        let written = entries.by_path.get(path)?;
        if written.len != data.len() {
            return None;
        }
        data.chunks(written.block_size)
            .zip(&written.blocks)
            .position(|(chunk, digest)| content_digest(chunk) != *digest)
            .map(|block| (block * written.block_size) as u64)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().by_path.len()
    }
}
