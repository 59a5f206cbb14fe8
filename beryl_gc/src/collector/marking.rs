//! Marking (reachability-only) pass.
//!
//! The non-moving counterpart of [`crate::collector::RelocationPass`].
//! A marking pass records which buffers are reachable and promises to
//! move nothing; entities run the same traversal for both pass kinds,
//! so every buffer a relocating pass would copy gets marked here.
//!
//! Marks live in a side table rather than header bits, keeping the pass
//! strictly read-only over buffer memory.

use crate::buffer::BufRef;
use rustc_hash::FxHashSet;

/// One marking traversal over the buffer graph.
#[derive(Debug, Default)]
pub struct MarkingPass {
    /// Header addresses of buffers seen this pass.
    marked: FxHashSet<usize>,
}

impl MarkingPass {
    /// Start a marking pass.
    pub fn new() -> Self {
        Self {
            marked: FxHashSet::default(),
        }
    }

    /// Mark one buffer as reachable.
    ///
    /// Returns `true` the first time a buffer is reported, `false` on
    /// repeats. Never reads or writes the buffer's memory.
    #[inline]
    pub fn mark(&mut self, buf: BufRef) -> bool {
        self.marked.insert(buf.addr())
    }

    /// Whether a buffer has been marked this pass.
    #[inline]
    pub fn is_marked(&self, buf: BufRef) -> bool {
        self.marked.contains(&buf.addr())
    }

    /// Whether a header address has been marked this pass.
    #[inline]
    pub fn is_marked_addr(&self, addr: usize) -> bool {
        self.marked.contains(&addr)
    }

    /// Number of distinct buffers marked.
    #[inline]
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }
}
