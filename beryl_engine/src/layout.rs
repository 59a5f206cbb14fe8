//! Slot descriptor table for [`RawProgram`].
//!
//! Everything a host needs to walk a compiled program's data slots
//! without knowing what any slot means: where each pointer field sits in
//! the header, and how to size the block it references. Hosts that copy
//! programs into their own memory iterate [`SLOTS`] instead of
//! hard-coding field names, so a header change is a one-line change here.
//!
//! [`read_slot`], [`write_slot`] and [`slot_size`] are the only
//! sanctioned way to touch slot fields through a raw header pointer.

use crate::raw::{RawProgram, CHAR_MAP_SIZE};
use std::mem::offset_of;

// ============================================================================
// Descriptors
// ============================================================================

/// Identity of one data slot in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Compiled form plus source bytes.
    Program,
    /// Literal prefix.
    ExactPrefix,
    /// Forward start-byte map.
    ForwardMap,
    /// Backward start-byte map, lazily built.
    BackwardMap,
    /// Bounded-repeat span table.
    RepeatTable,
}

/// How to size the block a slot references.
#[derive(Debug, Clone, Copy)]
pub enum SizeRule {
    /// Byte count held in a `u32` header field at this offset.
    Field {
        /// Offset of the length field inside [`RawProgram`].
        offset: usize,
    },
    /// Fixed byte count.
    Fixed {
        /// The constant block size.
        bytes: usize,
    },
    /// Product of two `u32` header fields (entry size times capacity).
    Product {
        /// Offset of the entry-size field.
        a: usize,
        /// Offset of the capacity field.
        b: usize,
    },
}

/// One slot: where its pointer lives and how its block is sized.
#[derive(Debug, Clone, Copy)]
pub struct SlotDescriptor {
    /// Which slot this is.
    pub slot: Slot,
    /// Offset of the pointer field inside [`RawProgram`].
    pub offset: usize,
    /// Sizing rule for the referenced block.
    pub size: SizeRule,
}

/// Every data slot in a compiled program, in header order.
///
/// The chain link is deliberately absent: it is engine-internal state,
/// never a data block, and hosts must refuse programs where it is set.
pub const SLOTS: [SlotDescriptor; 5] = [
    SlotDescriptor {
        slot: Slot::Program,
        offset: offset_of!(RawProgram, program),
        size: SizeRule::Field {
            offset: offset_of!(RawProgram, program_alloc),
        },
    },
    SlotDescriptor {
        slot: Slot::ExactPrefix,
        offset: offset_of!(RawProgram, exact),
        size: SizeRule::Field {
            offset: offset_of!(RawProgram, exact_len),
        },
    },
    SlotDescriptor {
        slot: Slot::ForwardMap,
        offset: offset_of!(RawProgram, fwd_map),
        size: SizeRule::Fixed {
            bytes: CHAR_MAP_SIZE,
        },
    },
    SlotDescriptor {
        slot: Slot::BackwardMap,
        offset: offset_of!(RawProgram, bwd_map),
        size: SizeRule::Fixed {
            bytes: CHAR_MAP_SIZE,
        },
    },
    SlotDescriptor {
        slot: Slot::RepeatTable,
        offset: offset_of!(RawProgram, repeats),
        size: SizeRule::Product {
            a: offset_of!(RawProgram, repeat_entry_size),
            b: offset_of!(RawProgram, repeat_capacity),
        },
    },
];

/// Descriptor for one named slot.
#[inline]
pub fn descriptor(slot: Slot) -> &'static SlotDescriptor {
    // SLOTS is in declaration order of the enum.
    &SLOTS[slot as usize]
}

// ============================================================================
// Accessors
// ============================================================================

/// Reads a slot's pointer value from a header.
///
/// # Safety
///
/// `header` must point to a live, properly aligned [`RawProgram`].
#[inline]
pub unsafe fn read_slot(header: *const RawProgram, desc: &SlotDescriptor) -> *mut u8 {
    // SAFETY: every descriptor offset names a pointer field inside the
    // header struct, so the read stays in bounds and pointer-aligned.
    unsafe {
        (header as *const u8)
            .add(desc.offset)
            .cast::<*mut u8>()
            .read()
    }
}

/// Writes a slot's pointer value into a header.
///
/// # Safety
///
/// `header` must point to a live, properly aligned [`RawProgram`] that
/// the caller may mutate.
#[inline]
pub unsafe fn write_slot(header: *mut RawProgram, desc: &SlotDescriptor, value: *mut u8) {
    // SAFETY: same bounds argument as read_slot, and the caller vouches
    // for exclusive write access.
    unsafe {
        (header as *mut u8)
            .add(desc.offset)
            .cast::<*mut u8>()
            .write(value);
    }
}

/// Computes the byte size of the block a slot references.
///
/// The size is meaningful only while the slot pointer is non-null; a
/// `Field` or `Product` rule may legitimately yield 0 for an absent
/// block.
///
/// # Safety
///
/// `header` must point to a live, properly aligned [`RawProgram`].
#[inline]
pub unsafe fn slot_size(header: *const RawProgram, desc: &SlotDescriptor) -> usize {
    match desc.size {
        SizeRule::Fixed { bytes } => bytes,
        // SAFETY: field offsets in the rules name u32 fields inside the
        // header struct; the reads stay in bounds and 4-aligned.
        SizeRule::Field { offset } => unsafe { read_u32_field(header, offset) as usize },
        SizeRule::Product { a, b } => {
            // SAFETY: as above.
            let entry = unsafe { read_u32_field(header, a) } as usize;
            let count = unsafe { read_u32_field(header, b) } as usize;
            entry * count
        }
    }
}

/// # Safety
///
/// `offset` must name a `u32` field of [`RawProgram`] and `header` must
/// be live and aligned.
#[inline]
unsafe fn read_u32_field(header: *const RawProgram, offset: usize) -> u32 {
    // SAFETY: guaranteed by the caller.
    unsafe { (header as *const u8).add(offset).cast::<u32>().read() }
}
