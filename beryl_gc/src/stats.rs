//! Heap statistics.
//!
//! Tracks allocation and relocation activity for monitoring and for the
//! accounting assertions in tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about buffer heap activity.
#[derive(Debug)]
pub struct HeapStats {
    /// Buffers handed out since start.
    pub buffers_allocated: AtomicU64,
    /// Bytes handed out since start (headers and padding included).
    pub bytes_allocated: AtomicU64,
    /// Buffers copied to to-space by relocating passes.
    pub buffers_moved: AtomicU64,
    /// Bytes copied to to-space by relocating passes.
    pub bytes_moved: AtomicU64,
    /// Relocating passes started.
    pub relocation_passes: AtomicU64,
    /// Space swaps performed.
    pub space_swaps: AtomicU64,
    /// Holder-to-buffer registrations recorded by the write barrier.
    pub barrier_registrations: AtomicU64,
}

impl HeapStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            buffers_allocated: AtomicU64::new(0),
            bytes_allocated: AtomicU64::new(0),
            buffers_moved: AtomicU64::new(0),
            bytes_moved: AtomicU64::new(0),
            relocation_passes: AtomicU64::new(0),
            space_swaps: AtomicU64::new(0),
            barrier_registrations: AtomicU64::new(0),
        }
    }

    /// Record a buffer allocation of `size` total bytes.
    #[inline]
    pub fn record_allocation(&self, size: usize) {
        self.buffers_allocated.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Record a buffer copy of `size` total bytes during relocation.
    #[inline]
    pub fn record_move(&self, size: usize) {
        self.buffers_moved.fetch_add(1, Ordering::Relaxed);
        self.bytes_moved.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Record the start of a relocating pass.
    #[inline]
    pub fn record_relocation_pass(&self) {
        self.relocation_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a space swap.
    #[inline]
    pub fn record_swap(&self) {
        self.space_swaps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write-barrier registration.
    #[inline]
    pub fn record_barrier(&self) {
        self.barrier_registrations.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for HeapStats {
    fn default() -> Self {
        Self::new()
    }
}
