//! Byte-oriented pattern matching engine with a C-shaped ownership
//! contract.
//!
//! The engine compiles patterns into [`RawProgram`] headers on its own
//! unmanaged heap and hands out raw pointers. Callers own what they are
//! given: every program must come back through [`release_program`], and
//! individual blocks a caller has taken over come back through
//! [`release_block`]. The allocator keeps a ledger, so a double release
//! or a stray pointer panics instead of corrupting memory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────┐   compile    ┌────────────┐   search    ┌───────────┐
//! │ pattern │ ───────────▶ │ RawProgram │ ──────────▶ │ RawMatch  │
//! └─────────┘              │ + blocks   │             └───────────┘
//!                          └─────┬──────┘
//!                                │ exec_id
//!                          ┌─────▼──────┐
//!                          │ exec cache │  rebuilt from the program
//!                          └────────────┘  block on a miss
//! ```
//!
//! Headers are plain data. A caller may copy one elsewhere, rewrite its
//! slot pointers and keep searching through the copy; searches consult
//! the header they are handed and nothing else. The one mutation the
//! engine performs after compile time is lazy: the first backward
//! search writes a backward scan map into the header's `bwd_map` slot.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod compile;
pub mod layout;
pub mod mem;
pub mod raw;
pub mod search;

pub use compile::{compile, CompileError};
pub use layout::{
    descriptor, read_slot, slot_size, write_slot, SizeRule, Slot, SlotDescriptor, SLOTS,
};
pub use mem::{EngineStats, Ledger, BLOCK_ALIGN};
pub use raw::{PatternEncoding, PatternOptions, RawProgram, RepeatSpan, CHAR_MAP_SIZE};
pub use search::{enumerate_names, match_at, search, RawMatch, SearchDirection};

use dashmap::DashMap;
use regex::bytes::Regex;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, OnceLock};

// ============================================================================
// Engine state
// ============================================================================

pub(crate) struct EngineState {
    pub(crate) ledger: Ledger,
    pub(crate) execs: DashMap<u64, Arc<Regex>>,
    pub(crate) next_exec_id: AtomicU64,
}

static ENGINE: OnceLock<EngineState> = OnceLock::new();

pub(crate) fn engine_state() -> &'static EngineState {
    ENGINE.get_or_init(|| EngineState {
        ledger: Ledger::new(),
        execs: DashMap::new(),
        // 0 stays reserved for "no exec".
        next_exec_id: AtomicU64::new(1),
    })
}

/// Initializes the engine. Called once per process; later calls are
/// no-ops. Compile and search initialize implicitly, so this exists for
/// hosts that want the setup cost at a chosen time.
pub fn init() {
    let _ = engine_state();
}

/// Engine name and version string.
pub fn version() -> &'static str {
    concat!("beryl-engine ", env!("CARGO_PKG_VERSION"))
}

/// Allocation counters of the engine heap.
pub fn mem_stats() -> &'static EngineStats {
    engine_state().ledger.stats()
}

// ============================================================================
// Release
// ============================================================================

/// Releases a program and every block its header references.
///
/// Frees each non-null data slot, the header itself, and the cached
/// exec. A linked program (non-null chain) releases its tail first.
///
/// # Panics
///
/// Panics if any referenced block is not live on the engine heap, which
/// means the caller already released it or rewrote a slot to memory the
/// engine never owned.
///
/// # Safety
///
/// `raw` must be a header returned by [`compile`] that has not been
/// released, and no references into the program's blocks may survive
/// the call.
pub unsafe fn release_program(raw: *mut RawProgram) {
    let state = engine_state();

    // SAFETY: the caller vouches the header is live.
    let chain = unsafe { (*raw).chain };
    if !chain.is_null() {
        // SAFETY: a chain link is itself an unreleased program.
        unsafe { release_program(chain) };
    }

    // SAFETY: as above.
    let exec_id = unsafe { (*raw).exec_id };
    state.execs.remove(&exec_id);

    for desc in &SLOTS {
        // SAFETY: as above.
        let block = unsafe { read_slot(raw, desc) };
        if !block.is_null() {
            // SAFETY: slot blocks of a live program have no outside
            // borrowers once release starts.
            unsafe { state.ledger.release_block(block) };
        }
    }
    // SAFETY: the header block came from the same ledger; all reads of
    // it are done.
    unsafe { state.ledger.release_block(raw as *mut u8) };
}

/// Releases one block of the engine heap.
///
/// For callers that take over individual blocks out of a header (rather
/// than whole programs) and hand them back one at a time.
///
/// # Panics
///
/// Panics if `ptr` is not a live engine-heap block.
///
/// # Safety
///
/// `ptr` must be a block base address obtained from this engine, and no
/// references into the block may survive the call.
pub unsafe fn release_block(ptr: *mut u8) {
    // SAFETY: guaranteed by the caller.
    unsafe { engine_state().ledger.release_block(ptr) };
}
