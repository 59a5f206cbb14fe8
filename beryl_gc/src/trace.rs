//! Traversal seams between entities and the collector passes.
//!
//! An entity that embeds buffer references implements both traits with
//! the same traversal: visit the buffer holding the entity's own state
//! first, then each referenced buffer in a fixed order. The relocating
//! form rewrites stored references as buffers move; the marking form
//! only reports them.

use crate::collector::{MarkingPass, RelocationPass};

/// Entities whose buffer references survive a relocating pass.
///
/// # Safety
///
/// An incorrect implementation breaks memory safety of the whole heap:
/// - A reference not reported here is not copied, so the slot holding it
///   dangles once the spaces swap.
/// - A reported buffer whose returned reference is not written back
///   leaves the slot pointing at retired memory.
///
/// Implementations must:
/// 1. Report every buffer reference the entity holds, null slots skipped
/// 2. Write each returned reference back into the slot it came from
/// 3. Re-register rewritten slots via [`RelocationPass::record_reachable`]
///
/// The pass runs during a collector pause; implementations may rely on
/// exclusive access to the entity's slots for the duration of the call.
/// Traversals must tolerate being invoked more than once per pass, which
/// the pass's forwarding table makes safe.
pub unsafe trait Relocate {
    /// Visit every buffer reference, rewriting each through `pass`.
    fn relocate_refs(&self, pass: &mut RelocationPass<'_>);
}

/// Entities whose buffer references can be enumerated without moving them.
///
/// # Safety
///
/// The traversal must cover exactly the references [`Relocate`] covers;
/// a buffer missed here is invisible to reachability analysis and may be
/// reclaimed while still referenced. Implementations must not mutate any
/// slot during the pass.
pub unsafe trait Mark {
    /// Report every buffer reference to `pass`.
    fn mark_refs(&self, pass: &mut MarkingPass);
}

// =============================================================================
// Container implementations
// =============================================================================

unsafe impl<T: Relocate> Relocate for Option<T> {
    fn relocate_refs(&self, pass: &mut RelocationPass<'_>) {
        if let Some(inner) = self {
            inner.relocate_refs(pass);
        }
    }
}

unsafe impl<T: Mark> Mark for Option<T> {
    fn mark_refs(&self, pass: &mut MarkingPass) {
        if let Some(inner) = self {
            inner.mark_refs(pass);
        }
    }
}

unsafe impl<T: Relocate> Relocate for Vec<T> {
    fn relocate_refs(&self, pass: &mut RelocationPass<'_>) {
        for item in self {
            item.relocate_refs(pass);
        }
    }
}

unsafe impl<T: Mark> Mark for Vec<T> {
    fn mark_refs(&self, pass: &mut MarkingPass) {
        for item in self {
            item.mark_refs(pass);
        }
    }
}

unsafe impl<T: Relocate> Relocate for [T] {
    fn relocate_refs(&self, pass: &mut RelocationPass<'_>) {
        for item in self {
            item.relocate_refs(pass);
        }
    }
}

unsafe impl<T: Mark> Mark for [T] {
    fn mark_refs(&self, pass: &mut MarkingPass) {
        for item in self {
            item.mark_refs(pass);
        }
    }
}

unsafe impl<T: Relocate> Relocate for Box<T> {
    fn relocate_refs(&self, pass: &mut RelocationPass<'_>) {
        (**self).relocate_refs(pass);
    }
}

unsafe impl<T: Mark> Mark for Box<T> {
    fn mark_refs(&self, pass: &mut MarkingPass) {
        (**self).mark_refs(pass);
    }
}

unsafe impl<T: Relocate> Relocate for std::sync::Arc<T> {
    fn relocate_refs(&self, pass: &mut RelocationPass<'_>) {
        (**self).relocate_refs(pass);
    }
}

unsafe impl<T: Mark> Mark for std::sync::Arc<T> {
    fn mark_refs(&self, pass: &mut MarkingPass) {
        (**self).mark_refs(pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufRef;
    use crate::heap::BufHeap;
    use std::cell::Cell;

    /// Minimal entity: one buffer reference in a rewritable slot.
    struct Holder {
        buf: Cell<BufRef>,
    }

    unsafe impl Relocate for Holder {
        fn relocate_refs(&self, pass: &mut RelocationPass<'_>) {
            let moved = pass.relocate(self.buf.get());
            self.buf.set(moved);
        }
    }

    unsafe impl Mark for Holder {
        fn mark_refs(&self, pass: &mut MarkingPass) {
            pass.mark(self.buf.get());
        }
    }

    #[test]
    fn test_relocate_through_trait() {
        let mut heap = BufHeap::with_defaults();
        let holder = Holder {
            buf: Cell::new(heap.alloc_buf(16).expect("alloc failed")),
        };
        let before = holder.buf.get().addr();

        {
            let mut pass = RelocationPass::new(&heap);
            holder.relocate_refs(&mut pass);
        }
        heap.swap_spaces();

        assert_ne!(holder.buf.get().addr(), before);
        assert!(heap.in_from_space(holder.buf.get().header_ptr() as *const u8));
    }

    #[test]
    fn test_mark_through_trait() {
        let heap = BufHeap::with_defaults();
        let holder = Holder {
            buf: Cell::new(heap.alloc_buf(16).expect("alloc failed")),
        };

        let mut pass = MarkingPass::new();
        holder.mark_refs(&mut pass);

        assert!(pass.is_marked(holder.buf.get()));
        assert_eq!(pass.marked_count(), 1);
    }

    #[test]
    fn test_container_traversals() {
        let heap = BufHeap::with_defaults();
        let holders: Vec<Holder> = (0..3)
            .map(|_| Holder {
                buf: Cell::new(heap.alloc_buf(8).expect("alloc failed")),
            })
            .collect();

        let mut pass = MarkingPass::new();
        holders.mark_refs(&mut pass);
        assert_eq!(pass.marked_count(), 3);

        let none: Option<Holder> = None;
        none.mark_refs(&mut pass);
        assert_eq!(pass.marked_count(), 3);
    }
}
