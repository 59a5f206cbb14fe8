//! Semi-space buffer heap with bump-pointer allocation.
//!
//! The heap owns two equal spaces:
//! - From-space: active allocation space, where new buffers land
//! - To-space: copy destination during a relocating pass
//!
//! Allocation is O(1) bump-pointer:
//! ```text
//! alloc_ptr += size;
//! return alloc_ptr - size;
//! ```
//!
//! A relocating pass copies every live buffer from from-space to
//! to-space, after which [`BufHeap::swap_spaces`] flips the roles and
//! resets the old from-space. Buffers never move outside a pass.

use crate::barrier::{RememberedEntry, RememberedSet};
use crate::buffer::{BufHeader, BufRef, BUF_ALIGN, HEADER_SIZE};
use crate::config::HeapConfig;
use crate::stats::HeapStats;

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A semi-space backing block.
struct Space {
    /// Start of the space.
    start: *mut u8,
    /// End of the space (start + size).
    end: *mut u8,
    /// Current allocation pointer (grows upward).
    alloc_ptr: AtomicPtr<u8>,
    /// Size of the space.
    size: usize,
}

impl Space {
    /// Allocate a new space with the given size.
    fn new(size: usize) -> Self {
        let layout = std::alloc::Layout::from_size_align(size, BUF_ALIGN)
            .expect("invalid space layout");

        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            panic!("failed to allocate heap space of {} bytes", size);
        }

        let end = unsafe { ptr.add(size) };

        Self {
            start: ptr,
            end,
            alloc_ptr: AtomicPtr::new(ptr),
            size,
        }
    }

    /// Try to allocate `size` bytes.
    #[inline]
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        loop {
            let current = self.alloc_ptr.load(Ordering::Relaxed);
            let new_ptr = unsafe { current.add(size) };

            if new_ptr > self.end {
                return None; // Space exhausted
            }

            // CAS to claim the range
            if self
                .alloc_ptr
                .compare_exchange_weak(current, new_ptr, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return NonNull::new(current);
            }
        }
    }

    /// Check if a pointer is within this space.
    #[inline]
    fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let start = self.start as usize;
        let end = self.end as usize;
        addr >= start && addr < end
    }

    /// Get bytes allocated in this space.
    #[inline]
    fn allocated(&self) -> usize {
        let current = self.alloc_ptr.load(Ordering::Relaxed);
        (current as usize).saturating_sub(self.start as usize)
    }

    /// Get remaining free bytes.
    #[inline]
    fn free(&self) -> usize {
        self.size.saturating_sub(self.allocated())
    }

    /// Reset the space for reuse.
    fn reset(&self) {
        self.alloc_ptr.store(self.start, Ordering::Release);

        // Zero memory so stale headers cannot pass tag checks
        #[cfg(debug_assertions)]
        unsafe {
            std::ptr::write_bytes(self.start, 0, self.size);
        }
    }
}

impl Drop for Space {
    fn drop(&mut self) {
        if !self.start.is_null() {
            let layout = std::alloc::Layout::from_size_align(self.size, BUF_ALIGN)
                .expect("invalid space layout");
            unsafe {
                std::alloc::dealloc(self.start, layout);
            }
        }
    }
}

// Safety: Space can be shared between threads (has atomic alloc_ptr).
unsafe impl Send for Space {}
unsafe impl Sync for Space {}

/// Buffer heap: two semi-spaces, a remembered set, and statistics.
///
/// All adopted foreign data lives in buffers handed out by this heap.
/// Methods taking `&self` are callable from any holder of the heap;
/// [`BufHeap::swap_spaces`] needs `&mut self` because it must not race
/// with allocation or an in-progress pass.
pub struct BufHeap {
    /// Configuration parameters.
    config: HeapConfig,
    /// From-space: current allocation space.
    from_space: Space,
    /// To-space: copy destination during relocation.
    to_space: Space,
    /// Heap statistics.
    stats: HeapStats,
    /// Holder-to-buffer registrations from the write barrier.
    remembered: RememberedSet,
}

impl BufHeap {
    /// Create a new heap with the given configuration.
    pub fn new(config: HeapConfig) -> Self {
        config.validate().expect("invalid heap configuration");

        let from_space = Space::new(config.space_size);
        let to_space = Space::new(config.space_size);

        Self {
            config,
            from_space,
            to_space,
            stats: HeapStats::new(),
            remembered: RememberedSet::new(),
        }
    }

    /// Create a heap with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(HeapConfig::default())
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate an owned buffer with a data region of `len` bytes.
    ///
    /// The data region is zeroed. Returns `None` when the from-space is
    /// exhausted or `len` exceeds the configured buffer cap; callers
    /// treat both as resource exhaustion.
    #[inline]
    pub fn alloc_buf(&self, len: usize) -> Option<BufRef> {
        if len > self.config.max_buffer_len {
            return None;
        }

        let total = HEADER_SIZE + align_up(len, BUF_ALIGN);
        let ptr = self.from_space.alloc(total)?;
        self.stats.record_allocation(total);

        // SAFETY: ptr is a fresh, aligned allocation of `total` bytes;
        // writing the header makes the buffer live.
        unsafe {
            let header = ptr.as_ptr() as *mut BufHeader;
            header.write(BufHeader::new(len as u32));
            Some(BufRef::from_header(NonNull::new_unchecked(header)))
        }
    }

    /// Allocate raw space in to-space for a relocating copy.
    #[inline]
    pub(crate) fn alloc_to_space(&self, size: usize) -> Option<NonNull<u8>> {
        self.to_space.alloc(size)
    }

    // =========================================================================
    // Space Queries
    // =========================================================================

    /// Check if a pointer is managed by this heap.
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.from_space.contains(ptr) || self.to_space.contains(ptr)
    }

    /// Check if a pointer is in the from-space.
    #[inline]
    pub fn in_from_space(&self, ptr: *const u8) -> bool {
        self.from_space.contains(ptr)
    }

    /// Check if a pointer is in the to-space.
    #[inline]
    pub fn in_to_space(&self, ptr: *const u8) -> bool {
        self.to_space.contains(ptr)
    }

    /// Check if a buffer belongs to this heap.
    #[inline]
    pub fn owns(&self, buf: BufRef) -> bool {
        self.contains(buf.header_ptr() as *const u8)
    }

    /// Get bytes allocated in from-space.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.from_space.allocated()
    }

    /// Get remaining free bytes in from-space.
    #[inline]
    pub fn free(&self) -> usize {
        self.from_space.free()
    }

    // =========================================================================
    // Relocation Support
    // =========================================================================

    /// Swap from-space and to-space after a relocating pass.
    ///
    /// The to-space (holding the copied survivors) becomes the new
    /// from-space; the old from-space is reset and becomes the new
    /// to-space. Every reference obtained before the pass and not
    /// forwarded through it is invalid after this call.
    ///
    /// With [`HeapConfig::verify_buffers`] set, the surviving buffers
    /// are tag-checked before the swap and a corrupt header panics.
    pub fn swap_spaces(&mut self) {
        if self.config.verify_buffers {
            self.verify_space(&self.to_space);
        }
        self.from_space.reset();
        std::mem::swap(&mut self.from_space, &mut self.to_space);
        self.stats.record_swap();
    }

    /// Walk a space's allocated region header by header, checking tags.
    fn verify_space(&self, space: &Space) {
        let end = space.alloc_ptr.load(Ordering::Relaxed) as usize;
        let mut cursor = space.start as usize;
        while cursor < end {
            // SAFETY: buffers are laid out back to back from the space
            // start, so every cursor position is a header address.
            let buf = unsafe { BufRef::from_addr(cursor) };
            assert!(
                buf.tag_ok(),
                "corrupt buffer header at {:#x} during space swap",
                cursor
            );
            cursor += buf.total_size();
        }
    }

    // =========================================================================
    // Write Barrier
    // =========================================================================

    /// Record that `holder` references `buf`.
    ///
    /// Called after a slot store makes a buffer reachable from a holder,
    /// and again when a pass moves a buffer a holder references.
    #[inline]
    pub fn write_barrier(&self, holder: *const u8, buf: BufRef) {
        self.remembered
            .insert(holder, buf.header_ptr() as *const u8);
        self.stats.record_barrier();
    }

    /// Get the remembered set.
    #[inline]
    pub fn remembered_set(&self) -> &RememberedSet {
        &self.remembered
    }

    /// Drain the remembered set for root scanning.
    pub fn drain_remembered_set(&self) -> Vec<RememberedEntry> {
        self.remembered.drain()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the configuration.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Get heap statistics.
    pub fn stats(&self) -> &HeapStats {
        &self.stats
    }
}

/// Align a size up to the given alignment.
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}
