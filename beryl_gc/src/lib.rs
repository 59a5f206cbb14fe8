//! Beryl buffer collector.
//!
//! The buffer side of a moving collector, sized for hosting foreign
//! objects: flat byte buffers that a relocating pass may copy at any
//! collection, plus the bookkeeping foreign holders need to keep raw
//! pointers into those buffers sound.
//!
//! # Architecture
//!
//! The heap is a pair of equal semi-spaces:
//!
//! - **From-space**: bump-pointer allocation; all new buffers land here.
//! - **To-space**: copy destination during a relocating pass; becomes
//!   the new from-space at [`BufHeap::swap_spaces`].
//!
//! Two traversal passes visit the buffer graph during pauses:
//!
//! - [`RelocationPass`] copies each reported buffer once and returns the
//!   forwarded reference for the caller to write back.
//! - [`MarkingPass`] records reachability and moves nothing.
//!
//! Entities embedding buffer references implement [`Relocate`] and
//! [`Mark`] with one traversal each; the [`BufHeap::write_barrier`]
//! remembered set keeps holder-to-buffer edges visible between passes.
//!
//! # Safety
//!
//! The collector requires that:
//! - Every buffer reference an entity holds is reported by its traversals
//! - Forwarded references are written back before the pause ends
//! - Buffer memory is only mutated before publication or during pauses

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod buffer;
pub mod collector;
pub mod config;
pub mod heap;
pub mod trace;

mod stats;

// Re-exports for convenient access
pub use barrier::{RememberedEntry, RememberedSet};
pub use buffer::{BufRef, BUF_ALIGN, HEADER_SIZE};
pub use collector::{MarkingPass, RelocationPass};
pub use config::HeapConfig;
pub use heap::{align_up, BufHeap};
pub use stats::HeapStats;
pub use trace::{Mark, Relocate};
