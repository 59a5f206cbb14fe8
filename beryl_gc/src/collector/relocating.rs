//! Relocating (copying) pass.
//!
//! A relocating pass copies each live buffer from from-space to to-space
//! exactly once:
//!
//! ```text
//! ┌──────────────────────────────────┬──────────────────────────────────┐
//! │  FROM-SPACE                      │  TO-SPACE                        │
//! │  ┌─────┬─────┬─────┬─────────┐   │  ┌─────┬─────┬────────────────┐  │
//! │  │  A  │  B  │  C  │  free   │   │  │  A' │  C' │     free       │  │
//! │  │live │dead │live │         │──▶│  │copy │copy │                │  │
//! │  └─────┴─────┴─────┴─────────┘   │  └─────┴─────┴────────────────┘  │
//! │                                  │                                  │
//! │  B is unreachable, not copied    │  Only reported buffers move      │
//! └──────────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Callers hand in each buffer they reference via [`RelocationPass::relocate`]
//! and must write the returned reference back into the referencing slot.
//! A forwarding table makes repeated calls on the same buffer return the
//! same new address, so entities reached through several paths are safe
//! to trace more than once. After the pass, [`crate::heap::BufHeap::swap_spaces`]
//! retires the old from-space.

use crate::buffer::BufRef;
use crate::heap::BufHeap;
use rustc_hash::FxHashMap;

/// One relocating traversal over the buffer graph.
///
/// Created per collection, used during the pause, then dropped after
/// the space swap.
pub struct RelocationPass<'h> {
    /// The heap whose from-space is being evacuated.
    heap: &'h BufHeap,
    /// Forwarding pointers: old header address to new header address.
    forwarding: FxHashMap<usize, usize>,
}

impl<'h> RelocationPass<'h> {
    /// Start a relocating pass over `heap`.
    pub fn new(heap: &'h BufHeap) -> Self {
        heap.stats().record_relocation_pass();
        Self {
            heap,
            forwarding: FxHashMap::default(),
        }
    }

    /// Relocate one buffer, returning its post-pass reference.
    ///
    /// - A from-space buffer is copied (header and data) to to-space and
    ///   its new reference returned; the caller must store that value
    ///   back into the slot it came from.
    /// - A buffer this pass already copied yields the same new reference
    ///   again without a second copy.
    /// - A buffer outside from-space (already copied and rewritten, or
    ///   not owned by this heap) is returned unchanged.
    pub fn relocate(&mut self, buf: BufRef) -> BufRef {
        let old_addr = buf.addr();

        // Fast path: already forwarded by this pass
        if let Some(&new_addr) = self.forwarding.get(&old_addr) {
            // SAFETY: new_addr was produced by a completed copy below.
            return unsafe { BufRef::from_addr(new_addr) };
        }

        if !self.heap.in_from_space(old_addr as *const u8) {
            return buf;
        }

        let total = buf.total_size();
        let new_ptr = match self.heap.alloc_to_space(total) {
            Some(p) => p,
            // To-space matches from-space in size and holds only copies
            // of from-space buffers, so exhaustion here means the space
            // accounting is corrupt. Not recoverable.
            None => panic!("to-space exhausted relocating a {} byte buffer", total),
        };

        // SAFETY: source and destination lie in different spaces and both
        // cover `total` bytes; the copy carries header and data together.
        unsafe {
            std::ptr::copy_nonoverlapping(old_addr as *const u8, new_ptr.as_ptr(), total);
        }

        let new_addr = new_ptr.as_ptr() as usize;
        self.forwarding.insert(old_addr, new_addr);
        self.heap.stats().record_move(total);

        // SAFETY: new_addr holds the header copy written above.
        unsafe { BufRef::from_addr(new_addr) }
    }

    /// Re-register a holder-to-buffer edge after a move.
    ///
    /// Entities call this for each slot they rewrote so the remembered
    /// set stays accurate across the collection.
    #[inline]
    pub fn record_reachable(&self, holder: *const u8, buf: BufRef) {
        self.heap.write_barrier(holder, buf);
    }

    /// Look up the forwarded address of a buffer this pass copied.
    #[inline]
    pub fn forwarded(&self, old_addr: usize) -> Option<usize> {
        self.forwarding.get(&old_addr).copied()
    }

    /// Number of buffers this pass has copied.
    #[inline]
    pub fn relocated_count(&self) -> usize {
        self.forwarding.len()
    }

    /// The heap this pass runs over.
    #[inline]
    pub fn heap(&self) -> &BufHeap {
        self.heap
    }
}
