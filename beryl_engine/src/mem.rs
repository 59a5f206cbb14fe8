//! Unmanaged block allocator with a release ledger.
//!
//! Every block the engine hands out is recorded here with its size.
//! Release goes through the ledger too, which gives the engine two
//! guarantees hosts rely on:
//!
//! - releasing an address the ledger does not know (never allocated, or
//!   already released) panics instead of corrupting the heap, and
//! - the outstanding-block counters expose exactly what the engine still
//!   owns, so a host can verify it returned everything it borrowed.

use dashmap::DashMap;
use std::alloc::{self, Layout};
use std::sync::atomic::{AtomicU64, Ordering};

/// Alignment of every engine block.
pub const BLOCK_ALIGN: usize = 8;

/// Rounds `size` up to the next multiple of [`BLOCK_ALIGN`].
#[inline]
pub(crate) const fn align_block(size: usize) -> usize {
    (size + BLOCK_ALIGN - 1) & !(BLOCK_ALIGN - 1)
}

// ============================================================================
// Counters
// ============================================================================

/// Allocation counters, updated with relaxed atomics.
#[derive(Debug)]
pub struct EngineStats {
    /// Blocks handed out.
    pub blocks_allocated: AtomicU64,
    /// Blocks taken back.
    pub blocks_released: AtomicU64,
    /// Bytes handed out.
    pub bytes_allocated: AtomicU64,
    /// Bytes taken back.
    pub bytes_released: AtomicU64,
}

impl EngineStats {
    /// Zeroed counters.
    pub const fn new() -> Self {
        Self {
            blocks_allocated: AtomicU64::new(0),
            blocks_released: AtomicU64::new(0),
            bytes_allocated: AtomicU64::new(0),
            bytes_released: AtomicU64::new(0),
        }
    }

    /// Blocks currently outstanding.
    #[inline]
    pub fn outstanding_blocks(&self) -> u64 {
        self.blocks_allocated.load(Ordering::Relaxed) - self.blocks_released.load(Ordering::Relaxed)
    }

    /// Bytes currently outstanding.
    #[inline]
    pub fn outstanding_bytes(&self) -> u64 {
        self.bytes_allocated.load(Ordering::Relaxed) - self.bytes_released.load(Ordering::Relaxed)
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Block allocator plus the address→size ledger behind it.
#[derive(Debug)]
pub struct Ledger {
    /// Live blocks, address → allocated size.
    blocks: DashMap<usize, usize>,
    stats: EngineStats,
}

impl Ledger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
            stats: EngineStats::new(),
        }
    }

    /// Allocates a zeroed block of at least `size` bytes and records it.
    ///
    /// `size` must be non-zero. The returned block is
    /// [`BLOCK_ALIGN`]-aligned and stays valid until
    /// [`release_block`](Self::release_block).
    pub fn alloc_block(&self, size: usize) -> *mut u8 {
        debug_assert!(size > 0, "zero-size engine block");
        let padded = align_block(size);
        let layout =
            Layout::from_size_align(padded, BLOCK_ALIGN).expect("engine block layout");
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            alloc::handle_alloc_error(layout);
        }
        self.blocks.insert(ptr as usize, padded);
        self.stats.blocks_allocated.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_allocated
            .fetch_add(padded as u64, Ordering::Relaxed);
        ptr
    }

    /// Releases a block previously returned by [`alloc_block`](Self::alloc_block).
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is not a live ledger block. A double release or a
    /// stray pointer is an ownership-protocol breach, and continuing
    /// would free memory someone else may own.
    ///
    /// # Safety
    ///
    /// No references into the block may survive the call.
    pub unsafe fn release_block(&self, ptr: *mut u8) {
        let Some((_, size)) = self.blocks.remove(&(ptr as usize)) else {
            panic!(
                "release of unknown or already released engine block {:p}",
                ptr
            );
        };
        let layout =
            Layout::from_size_align(size, BLOCK_ALIGN).expect("engine block layout");
        // SAFETY: ptr came from alloc_zeroed with this exact layout, and
        // the ledger entry was just removed so no second dealloc can
        // follow.
        unsafe { alloc::dealloc(ptr, layout) };
        self.stats.blocks_released.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_released
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Whether `ptr` is the base address of a live ledger block.
    #[inline]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.blocks.contains_key(&(ptr as usize))
    }

    /// Allocated size of a live block, if `ptr` is one.
    #[inline]
    pub fn block_size(&self, ptr: *const u8) -> Option<usize> {
        self.blocks.get(&(ptr as usize)).map(|entry| *entry)
    }

    /// Allocation counters.
    #[inline]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
