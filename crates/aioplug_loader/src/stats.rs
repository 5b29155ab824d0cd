//! Loader statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Loader lifecycle and dispatch counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct LoaderStats {
    /// Successful loads.
    loads: AtomicU64,
    /// Failed loads.
    load_failures: AtomicU64,
    /// Backends released by a reload, an unload or the loader's drop.
    unloads: AtomicU64,
    /// Facade calls forwarded to a backend.
    forwarded: AtomicU64,
    /// Facade calls rejected because no backend was loaded.
    absent: AtomicU64,
}

impl LoaderStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unload(&self) {
        self.unloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_absent(&self) {
        self.absent.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of successful loads.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Returns the number of failed loads.
    pub fn load_failures(&self) -> u64 {
        self.load_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of released backends.
    pub fn unloads(&self) -> u64 {
        self.unloads.load(Ordering::Relaxed)
    }

    /// Returns the number of forwarded facade calls.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Returns the number of facade calls made with no backend loaded.
    pub fn absent(&self) -> u64 {
        self.absent.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            loads: self.loads(),
            load_failures: self.load_failures(),
            unloads: self.unloads(),
            forwarded: self.forwarded(),
            absent: self.absent(),
        }
    }
}

/// A point-in-time copy of [`LoaderStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Successful loads.
    pub loads: u64,
    /// Failed loads.
    pub load_failures: u64,
    /// Released backends.
    pub unloads: u64,
    /// Forwarded facade calls.
    pub forwarded: u64,
    /// Facade calls made with no backend loaded.
    pub absent: u64,
}
