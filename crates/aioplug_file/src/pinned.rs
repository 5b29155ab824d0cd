//! Registry of buffers handed out as pinned.

use aioplug_device::{BufferId, DeviceError, DeviceResult, IoBuffer, ReleasedIds};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct State {
    live: HashMap<BufferId, IoBuffer>,
    released: ReleasedIds,
}

/// Tracks buffers from `new_cpu_locked_buffer` until they are freed.
///
/// A live entry holds a handle to the region, so the region stays allocated
/// while the caller might still hand it to a transfer. Only the most recent
/// releases are remembered for double-free detection.
#[derive(Debug, Default)]
pub(crate) struct PinnedRegistry {
    state: Mutex<State>,
}

impl PinnedRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_history(released: usize) -> Self {
        Self {
            state: Mutex::new(State {
                live: HashMap::new(),
                released: ReleasedIds::with_capacity(released),
            }),
        }
    }

    pub(crate) fn register(&self, buffer: &IoBuffer) {
        self.state.lock().live.insert(buffer.id(), buffer.clone());
    }

    pub(crate) fn release(&self, buffer: &IoBuffer) -> DeviceResult<()> {
        let id = buffer.id();
        let mut state = self.state.lock();
        if state.live.remove(&id).is_some() {
            state.released.insert(id);
            return Ok(());
        }
        if state.released.contains(&id) {
            Err(DeviceError::DoubleFree { id })
        } else {
            Err(DeviceError::UnregisteredBuffer { id })
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.state.lock().live.len()
    }

    pub(crate) fn remembered(&self) -> usize {
        self.state.lock().released.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aioplug_device::ElementType;

    #[test]
    fn register_then_release() {
        let registry = PinnedRegistry::new();
        let buffer = IoBuffer::zeroed(ElementType::U8, 8);

        registry.register(&buffer);
        assert_eq!(registry.live(), 1);
        registry.release(&buffer.clone()).unwrap();
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn lifecycle_violations() {
        let registry = PinnedRegistry::new();
        let stranger = IoBuffer::zeroed(ElementType::U8, 8);
        assert_eq!(
            registry.release(&stranger),
            Err(DeviceError::UnregisteredBuffer { id: stranger.id() })
        );

        let pinned = IoBuffer::zeroed(ElementType::F32, 2);
        registry.register(&pinned);
        registry.release(&pinned).unwrap();
        assert_eq!(
            registry.release(&pinned),
            Err(DeviceError::DoubleFree { id: pinned.id() })
        );
    }

    #[test]
    fn release_history_is_bounded() {
        let registry = PinnedRegistry::with_history(4);
        let buffers: Vec<IoBuffer> = (0..10).map(|_| IoBuffer::zeroed(ElementType::U8, 1)).collect();
        for buffer in &buffers {
            registry.register(buffer);
            registry.release(buffer).unwrap();
        }

        assert_eq!(registry.live(), 0);
        assert_eq!(registry.remembered(), 4);
        assert!(matches!(
            registry.release(&buffers[9]),
            Err(DeviceError::DoubleFree { .. })
        ));
        assert!(matches!(
            registry.release(&buffers[0]),
            Err(DeviceError::UnregisteredBuffer { .. })
        ));
    }
}
