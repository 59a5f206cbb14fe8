//! Managed hosting of engine-compiled patterns.
//!
//! The engine ([`beryl_engine`]) compiles patterns onto its own
//! unmanaged heap and hands out raw, pointer-linked object graphs. The
//! managed heap ([`beryl_gc`]) relocates its buffers whenever it
//! pleases. This crate is the border crossing between the two memory
//! disciplines:
//!
//! - [`adopt::adopt_program`] migrates a freshly compiled program into
//!   managed buffers in one shot, releasing the original last so every
//!   foreign block is freed exactly once.
//! - [`adopt::absorb_backward_map`] catches the one block the engine
//!   allocates after compile time and migrates it before search results
//!   are returned.
//! - [`Pattern`] wraps the adopted program in a safe entity that
//!   compiles, searches and participates in collector passes.
//!
//! After adoption, nothing the collector can reach points at engine
//! memory between operations, and nothing the engine frees is ever
//! freed twice.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod adopt;
pub mod error;
pub mod match_data;
pub mod pattern;

pub use adopt::{absorb_backward_map, adopt_program};
pub use error::PatternError;
pub use match_data::MatchData;
pub use pattern::Pattern;

// The runtime's public surface speaks in these engine and heap types.
pub use beryl_engine::{PatternEncoding, PatternOptions, SearchDirection};
pub use beryl_gc::{BufHeap, BufRef, HeapConfig, Mark, MarkingPass, Relocate, RelocationPass};
