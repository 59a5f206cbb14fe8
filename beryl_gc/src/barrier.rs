//! Remembered set for holder-to-buffer registrations.
//!
//! Adopted foreign objects hold raw pointers into heap buffers, so the
//! collector cannot discover those edges by scanning typed fields. The
//! write barrier records each edge explicitly: once when a slot store
//! first makes a buffer reachable, and again whenever a relocating pass
//! moves a buffer a holder references.
//!
//! # Design
//!
//! A locked append buffer with drain-side deduplication. The barrier
//! appends (O(1), tiny critical section); the collector drains during
//! pauses. An overflow buffer absorbs registrations that race a drain.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Maximum entries before the set reports that a drain is due.
const BUFFER_CAPACITY: usize = 4096;

/// One holder-to-buffer edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RememberedEntry {
    /// Address of the holder (the object containing the reference).
    pub holder: usize,
    /// Header address of the referenced buffer.
    pub buffer: usize,
}

/// Remembered set for write-barrier registrations.
///
/// Supports concurrent insertion from mutator threads and bulk drain
/// by the collector during pauses.
pub struct RememberedSet {
    /// Primary buffer for new entries.
    /// The critical section is a single push, so contention is negligible.
    buffer: Mutex<Vec<RememberedEntry>>,

    /// Overflow buffer for entries arriving during a drain.
    overflow: Mutex<Vec<RememberedEntry>>,

    /// Number of entries (approximate, for threshold checks).
    count: AtomicUsize,

    /// Flag indicating the collector is currently draining.
    draining: AtomicBool,
}

impl RememberedSet {
    /// Create a new empty remembered set.
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(BUFFER_CAPACITY)),
            overflow: Mutex::new(Vec::with_capacity(256)),
            count: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
        }
    }

    /// Record that `holder` references `buffer`.
    ///
    /// Called by the write barrier after a slot store. This is on the
    /// mutator's critical path and must stay cheap.
    #[inline]
    pub fn insert(&self, holder: *const u8, buffer: *const u8) {
        let entry = RememberedEntry {
            holder: holder as usize,
            buffer: buffer as usize,
        };

        // If the collector is draining the primary buffer, append to overflow
        if self.draining.load(Ordering::Acquire) {
            let mut overflow = self.overflow.lock();
            overflow.push(entry);
        } else {
            let mut buffer = self.buffer.lock();
            buffer.push(entry);
        }

        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain all entries for root scanning.
    ///
    /// Returns all remembered edges, clearing the set. Entries are
    /// deduplicated here so the cost lands in the pause, not on the
    /// mutator.
    pub fn drain(&self) -> Vec<RememberedEntry> {
        // Signal mutators to use the overflow buffer
        self.draining.store(true, Ordering::Release);

        let mut entries = {
            let mut buffer = self.buffer.lock();
            std::mem::replace(&mut *buffer, Vec::with_capacity(BUFFER_CAPACITY))
        };

        {
            let mut overflow = self.overflow.lock();
            entries.append(&mut overflow);
        }

        self.draining.store(false, Ordering::Release);
        self.count.store(0, Ordering::Relaxed);

        entries.sort_unstable_by_key(|e| (e.holder, e.buffer));
        entries.dedup();

        entries
    }

    /// Get the approximate number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Check if the remembered set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the set has grown enough that a drain would reclaim space.
    #[inline]
    pub fn should_drain(&self) -> bool {
        self.len() >= BUFFER_CAPACITY
    }

    /// Clear all entries without returning them.
    pub fn clear(&self) {
        self.draining.store(true, Ordering::Release);
        {
            let mut buffer = self.buffer.lock();
            buffer.clear();
        }
        {
            let mut overflow = self.overflow.lock();
            overflow.clear();
        }
        self.draining.store(false, Ordering::Release);
        self.count.store(0, Ordering::Relaxed);
    }
}

impl Default for RememberedSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remembered_set_creation() {
        let rs = RememberedSet::new();
        assert!(rs.is_empty());
        assert_eq!(rs.len(), 0);
    }

    #[test]
    fn test_insert_single() {
        let rs = RememberedSet::new();
        rs.insert(0x1000 as *const u8, 0x2000 as *const u8);
        assert_eq!(rs.len(), 1);
        assert!(!rs.is_empty());
    }

    #[test]
    fn test_drain_returns_all_entries() {
        let rs = RememberedSet::new();
        for i in 0..10 {
            rs.insert((0x1000 + i * 64) as *const u8, (0x8000 + i * 64) as *const u8);
        }

        let entries = rs.drain();
        assert_eq!(entries.len(), 10);
        assert!(rs.is_empty());
    }

    #[test]
    fn test_drain_deduplicates() {
        let rs = RememberedSet::new();

        for _ in 0..50 {
            rs.insert(0x2000 as *const u8, 0x3000 as *const u8);
        }

        let entries = rs.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].holder, 0x2000);
        assert_eq!(entries[0].buffer, 0x3000);
    }

    #[test]
    fn test_same_holder_different_buffers_kept() {
        let rs = RememberedSet::new();

        rs.insert(0x2000 as *const u8, 0x3000 as *const u8);
        rs.insert(0x2000 as *const u8, 0x4000 as *const u8);
        rs.insert(0x2000 as *const u8, 0x3000 as *const u8);

        let entries = rs.drain();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_drain_sorted_order() {
        let rs = RememberedSet::new();

        rs.insert(0x3000 as *const u8, 0x100 as *const u8);
        rs.insert(0x1000 as *const u8, 0x100 as *const u8);
        rs.insert(0x2000 as *const u8, 0x100 as *const u8);

        let entries = rs.drain();
        assert_eq!(entries[0].holder, 0x1000);
        assert_eq!(entries[1].holder, 0x2000);
        assert_eq!(entries[2].holder, 0x3000);
    }

    #[test]
    fn test_overflow_during_drain() {
        let rs = RememberedSet::new();

        rs.insert(0x1000 as *const u8, 0x100 as *const u8);
        rs.insert(0x2000 as *const u8, 0x100 as *const u8);

        // Simulate the draining flag being set
        rs.draining.store(true, Ordering::Release);

        rs.insert(0x3000 as *const u8, 0x100 as *const u8);
        rs.insert(0x4000 as *const u8, 0x100 as *const u8);

        rs.draining.store(false, Ordering::Release);

        let entries = rs.drain();
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_drain_then_insert() {
        let rs = RememberedSet::new();
        rs.insert(0x1000 as *const u8, 0x100 as *const u8);

        let entries = rs.drain();
        assert_eq!(entries.len(), 1);

        rs.insert(0x3000 as *const u8, 0x200 as *const u8);
        assert_eq!(rs.len(), 1);

        let entries2 = rs.drain();
        assert_eq!(entries2.len(), 1);
        assert_eq!(entries2[0].holder, 0x3000);
    }

    #[test]
    fn test_clear() {
        let rs = RememberedSet::new();
        for i in 0..20 {
            rs.insert((0x1000 + i * 8) as *const u8, 0x100 as *const u8);
        }
        assert_eq!(rs.len(), 20);

        rs.clear();
        assert!(rs.is_empty());
    }

    #[test]
    fn test_should_drain() {
        let rs = RememberedSet::new();
        assert!(!rs.should_drain());

        for i in 0..BUFFER_CAPACITY {
            rs.insert((0x1000 + i * 8) as *const u8, 0x100 as *const u8);
        }
        assert!(rs.should_drain());
    }
}
