//! Bounded memory of released buffer ids.

use crate::buffer::BufferId;
use std::collections::{HashSet, VecDeque};

/// Recently released pinned-buffer ids, oldest evicted first.
///
/// Backends consult it to tell a second free of the same buffer
/// ([`DeviceError::DoubleFree`](crate::DeviceError::DoubleFree)) from a
/// buffer they never handed out. Only the last `capacity` releases are
/// remembered; freeing an older id again is reported as
/// [`DeviceError::UnregisteredBuffer`](crate::DeviceError::UnregisteredBuffer).
#[derive(Debug, Clone)]
pub struct ReleasedIds {
    order: VecDeque<BufferId>,
    ids: HashSet<BufferId>,
    capacity: usize,
}

impl ReleasedIds {
    /// Number of releases remembered by [`ReleasedIds::new`].
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates an empty record holding [`DEFAULT_CAPACITY`](Self::DEFAULT_CAPACITY) ids.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates an empty record holding at most `capacity` ids.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity,
        }
    }

    /// Remembers `id`, forgetting the oldest id when full.
    pub fn insert(&mut self, id: BufferId) {
        if self.capacity == 0 || !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    /// Returns true if `id` was released recently enough to be remembered.
    #[must_use]
    pub fn contains(&self, id: &BufferId) -> bool {
        self.ids.contains(id)
    }

    /// Number of ids remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no id is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of ids remembered.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ReleasedIds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementType, IoBuffer};

    fn id() -> BufferId {
        IoBuffer::zeroed(ElementType::U8, 1).id()
    }

    #[test]
    fn oldest_ids_are_forgotten() {
        let mut released = ReleasedIds::with_capacity(3);
        let ids: Vec<BufferId> = (0..5).map(|_| id()).collect();
        for id in &ids {
            released.insert(*id);
        }

        assert_eq!(released.len(), 3);
        assert!(!released.contains(&ids[0]));
        assert!(!released.contains(&ids[1]));
        assert!(ids[2..].iter().all(|id| released.contains(id)));
    }

    #[test]
    fn reinserting_does_not_grow() {
        let mut released = ReleasedIds::with_capacity(4);
        let id = id();
        released.insert(id);
        released.insert(id);
        assert_eq!(released.len(), 1);
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut released = ReleasedIds::with_capacity(0);
        released.insert(id());
        assert!(released.is_empty());
    }
}
