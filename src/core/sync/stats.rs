/*!
 * Lock Statistics
 * Acquisition counters readable without touching the lock
 */

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters owned by a lock
///
/// Updated while the lock's bookkeeping mutex is held, so relaxed ordering
/// is enough; snapshots taken concurrently may be slightly stale.
#[derive(Debug, Default)]
pub struct LockStats {
    shared_acquisitions: AtomicU64,
    exclusive_acquisitions: AtomicU64,
    shared_contended: AtomicU64,
    exclusive_contended: AtomicU64,
    timeouts: AtomicU64,
    peak_readers: AtomicUsize,
}

/// Point-in-time copy of [`LockStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockStatsSnapshot {
    pub shared_acquisitions: u64,
    pub exclusive_acquisitions: u64,
    /// Shared acquisitions that had to wait
    pub shared_contended: u64,
    /// Exclusive acquisitions that had to wait
    pub exclusive_contended: u64,
    pub timeouts: u64,
    /// Largest number of simultaneous readers seen
    pub peak_readers: usize,
}

impl LockStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_shared(&self, readers: usize, contended: bool) {
        self.shared_acquisitions.fetch_add(1, Ordering::Relaxed);
        if contended {
            self.shared_contended.fetch_add(1, Ordering::Relaxed);
        }
        self.peak_readers.fetch_max(readers, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_exclusive(&self, contended: bool) {
        self.exclusive_acquisitions.fetch_add(1, Ordering::Relaxed);
        if contended {
            self.exclusive_contended.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LockStatsSnapshot {
        LockStatsSnapshot {
            shared_acquisitions: self.shared_acquisitions.load(Ordering::Relaxed),
            exclusive_acquisitions: self.exclusive_acquisitions.load(Ordering::Relaxed),
            shared_contended: self.shared_contended.load(Ordering::Relaxed),
            exclusive_contended: self.exclusive_contended.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            peak_readers: self.peak_readers.load(Ordering::Relaxed),
        }
    }
}

impl LockStatsSnapshot {
    /// Total successful acquisitions in either mode
    pub fn acquisitions(&self) -> u64 {
        self.shared_acquisitions + self.exclusive_acquisitions
    }
}
