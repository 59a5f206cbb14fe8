//! Adoption of engine programs into the managed heap.
//!
//! A freshly compiled program lives entirely on the engine's unmanaged
//! heap and would be invisible to the collector: relocations would
//! never move it, and nothing would ever free it. Adoption takes over
//! the whole object graph in one shot:
//!
//! ```text
//!   engine heap                      managed heap
//!  ┌────────────┐   byte copy      ┌────────────┐
//!  │ RawProgram │ ───────────────▶ │ header buf │──┐ rewritten
//!  ├────────────┤                  ├────────────┤  │ slots
//!  │ program    │ ───────────────▶ │ program    │◀─┤
//!  │ exact      │ ───────────────▶ │ exact      │◀─┤
//!  │ fwd_map    │ ───────────────▶ │ fwd_map    │◀─┘
//!  └────────────┘   released LAST  └────────────┘
//! ```
//!
//! Order matters everywhere:
//!
//! - Only the managed copy is ever mutated. The original stays intact
//!   until the single release call at the end, so the engine frees each
//!   of its blocks exactly once, through the pointers it allocated.
//! - Any allocation failure returns before that release. The caller
//!   still owns an untouched original; partially copied buffers are
//!   unreachable and simply get collected.
//!
//! One slot stays live after adoption: the engine plants a backward
//! scan map into the header on the first backward search, wherever the
//! header lives by then. [`absorb_backward_map`] migrates that late
//! arrival; search paths call it after every engine call.

use crate::error::PatternError;
use beryl_engine::{
    descriptor, read_slot, slot_size, write_slot, RawProgram, Slot, SLOTS,
};
use beryl_gc::{BufHeap, BufRef};
use std::ptr;

/// Size of the managed copy of a program header.
pub(crate) const HEADER_COPY_LEN: usize = std::mem::size_of::<RawProgram>();

/// Adopts `raw` and everything it references into `heap`.
///
/// On success the returned buffer holds a byte-exact header copy whose
/// slots all point at managed buffers, and the original program has
/// been released back to the engine. On error nothing foreign was
/// freed; `raw` is still the caller's to release.
///
/// # Panics
///
/// Panics if the program's chain link is set. A chained program is
/// still co-owned by the engine, and adopting it would tear shared
/// state in two.
///
/// # Safety
///
/// This is a safe entry point over an inherently raw handoff: `raw`
/// must be a live, standalone program from [`beryl_engine::compile`],
/// and the caller must not touch it again after a successful return.
pub fn adopt_program(heap: &BufHeap, raw: *mut RawProgram) -> Result<BufRef, PatternError> {
    // SAFETY: the caller hands us a live program header.
    let chain = unsafe { (*raw).chain };
    assert!(
        chain.is_null(),
        "cannot adopt a chained program still co-owned by the engine"
    );

    let header_buf = heap
        .alloc_buf(HEADER_COPY_LEN)
        .ok_or(PatternError::OutOfMemory {
            requested: HEADER_COPY_LEN,
        })?;
    // SAFETY: the buffer was sized for the header; source and
    // destination heaps cannot overlap.
    unsafe {
        ptr::copy_nonoverlapping(raw as *const u8, header_buf.data_ptr(), HEADER_COPY_LEN);
    }
    let copy = header_buf.data_ptr() as *mut RawProgram;

    // Migrate each referenced block, rewriting the copy's slot as we
    // go. The original keeps its engine pointers throughout.
    for desc in &SLOTS {
        // SAFETY: the copy is a live header in a buffer we own.
        let foreign = unsafe { read_slot(copy, desc) };
        if foreign.is_null() {
            continue;
        }
        // SAFETY: as above; sizing fields were copied with the header.
        let len = unsafe { slot_size(copy, desc) };
        let owned = heap
            .alloc_buf(len)
            .ok_or(PatternError::OutOfMemory { requested: len })?;
        // SAFETY: the foreign block spans `len` bytes by the sizing
        // rule, and the new buffer was allocated to hold them.
        unsafe {
            ptr::copy_nonoverlapping(foreign, owned.data_ptr(), len);
            write_slot(copy, desc, owned.data_ptr());
        }
        heap.write_barrier(header_buf.header_ptr() as *const u8, owned);
    }

    // Last act: a single release through the original's untouched
    // pointers. Nothing before this point freed foreign memory, and
    // nothing after this point may use `raw`.
    // SAFETY: `raw` is live, standalone, and fully migrated.
    unsafe { beryl_engine::release_program(raw) };

    Ok(header_buf)
}

/// Absorbs a backward map the engine planted during the last search.
///
/// `observed` is the backward-map slot value read before the search.
/// If the slot still holds it, there is nothing to do. Otherwise the
/// engine allocated a map on its own heap and stored it into our
/// header; the block is copied into a managed buffer, released back to
/// the engine, and the slot rewritten, all before any search result is
/// acted on.
///
/// If the managed allocation fails, the foreign block is released and
/// the slot cleared. The map is a derived structure the engine simply
/// rebuilds on the next backward search, so dropping it loses nothing.
pub fn absorb_backward_map(
    heap: &BufHeap,
    header_buf: BufRef,
    observed: *mut u8,
) -> Result<(), PatternError> {
    let copy = header_buf.data_ptr() as *mut RawProgram;
    let desc = descriptor(Slot::BackwardMap);
    // SAFETY: header_buf holds a live adopted header.
    let current = unsafe { read_slot(copy, desc) };
    if current == observed || current.is_null() {
        return Ok(());
    }

    // SAFETY: as above.
    let len = unsafe { slot_size(copy, desc) };
    let Some(owned) = heap.alloc_buf(len) else {
        // SAFETY: the foreign block is the engine's, ours to hand back;
        // clearing the slot drops our only pointer to it.
        unsafe {
            write_slot(copy, desc, ptr::null_mut());
            beryl_engine::release_block(current);
        }
        return Err(PatternError::OutOfMemory { requested: len });
    };
    // SAFETY: the foreign block spans `len` bytes; the buffer was sized
    // to hold them. The release comes after the copy and the rewrite,
    // mirroring adoption's original-last order.
    unsafe {
        ptr::copy_nonoverlapping(current, owned.data_ptr(), len);
        write_slot(copy, desc, owned.data_ptr());
        beryl_engine::release_block(current);
    }
    heap.write_barrier(header_buf.header_ptr() as *const u8, owned);
    Ok(())
}
