//! Collector traversal passes.
//!
//! Two pass kinds visit buffer references during a pause:
//! - [`RelocationPass`]: copies live buffers into to-space and hands the
//!   caller forwarded references to write back
//! - [`MarkingPass`]: records reachability only and never moves memory
//!
//! Entities expose their buffer graph to the passes through the traits
//! in [`crate::trace`].

mod marking;
mod relocating;

pub use marking::MarkingPass;
pub use relocating::RelocationPass;
