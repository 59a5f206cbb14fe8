//! Search execution over compiled programs.
//!
//! All entry points take a raw header pointer and work wherever that
//! header currently lives, which is what lets a host move adopted
//! headers freely between searches. The exec itself is fetched from the
//! process-wide cache by the header's exec id; on a miss it is rebuilt
//! from the self-describing program block, so a faithful byte copy of a
//! program is always searchable on its own.
//!
//! Backward searches have a side effect: a program that has never
//! searched backward gets its backward start-byte map built and stored
//! into the header it was called with. See [`crate::raw`].

use crate::compile::{build_exec, decode_program_block};
use crate::raw::{RawProgram, CHAR_MAP_SIZE};
use regex::bytes::{Captures, Regex};
use smallvec::SmallVec;
use std::ptr;
use std::sync::Arc;

/// Which end of the window a search favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    /// Leftmost match whose start lies in the window.
    Forward,
    /// Rightmost match whose start lies in the window.
    Backward,
}

/// Span table of one successful match.
///
/// Index 0 is the whole match; indices 1.. are capture groups, `None`
/// where a group did not participate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    /// Byte spans, `(start, end)` half-open.
    pub spans: SmallVec<[Option<(usize, usize)>; 8]>,
}

impl RawMatch {
    /// Span of the whole match.
    #[inline]
    pub fn full(&self) -> (usize, usize) {
        self.spans.first().copied().flatten().unwrap_or((0, 0))
    }

    /// Span of capture group `n` (1-based), `None` when absent.
    #[inline]
    pub fn group(&self, n: usize) -> Option<(usize, usize)> {
        self.spans.get(n).copied().flatten()
    }

    /// Number of capture groups, excluding the whole match.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.spans.len().saturating_sub(1)
    }
}

fn collect(caps: &Captures<'_>) -> RawMatch {
    let mut spans = SmallVec::new();
    for i in 0..caps.len() {
        spans.push(caps.get(i).map(|m| (m.start(), m.end())));
    }
    RawMatch { spans }
}

// ============================================================================
// Exec cache
// ============================================================================

/// Fetches the exec for a program, rebuilding it on a cache miss.
///
/// # Panics
///
/// Panics when the program block does not decode. The block is written
/// once at compile time and only ever byte-copied afterwards, so a
/// decode failure means the program's memory was corrupted.
///
/// # Safety
///
/// `raw` must point to a live [`RawProgram`] whose program slot is
/// intact.
unsafe fn exec_for(raw: *const RawProgram) -> Arc<Regex> {
    let state = crate::engine_state();
    // SAFETY: the caller vouches for the header.
    let exec_id = unsafe { (*raw).exec_id };
    if let Some(exec) = state.execs.get(&exec_id) {
        return Arc::clone(&exec);
    }

    // SAFETY: as above; program_used bytes of the program block are
    // meaningful.
    let block = unsafe {
        let program = (*raw).program;
        assert!(!program.is_null(), "program slot is null");
        std::slice::from_raw_parts(program, (*raw).program_used as usize)
    };
    let Some((options, encoding, pattern)) = decode_program_block(block) else {
        panic!("corrupt program block, cannot rebuild exec {}", exec_id);
    };
    let Ok(text) = std::str::from_utf8(pattern) else {
        panic!("corrupt program block, cannot rebuild exec {}", exec_id);
    };
    let Ok(exec) = build_exec(text, options, encoding) else {
        panic!("corrupt program block, cannot rebuild exec {}", exec_id);
    };

    let exec = Arc::new(exec);
    // Two threads racing the same miss both insert the same rebuild;
    // last write wins and both handles are equivalent.
    state.execs.insert(exec_id, Arc::clone(&exec));
    exec
}

// ============================================================================
// Search
// ============================================================================

/// Builds the backward map on first use and stores it into the header.
///
/// # Safety
///
/// `raw` must point to a live [`RawProgram`] the caller may mutate.
unsafe fn ensure_backward_map(raw: *mut RawProgram) {
    // SAFETY: the caller vouches for the header.
    if !unsafe { (*raw).bwd_map }.is_null() {
        return;
    }
    let block = crate::engine_state().ledger.alloc_block(CHAR_MAP_SIZE);
    // SAFETY: as above; both blocks span CHAR_MAP_SIZE bytes.
    unsafe {
        let fwd = (*raw).fwd_map;
        if fwd.is_null() {
            // Nothing to mirror; admit every byte.
            ptr::write_bytes(block, 1, CHAR_MAP_SIZE);
        } else {
            // Backward scanning skips to candidate start bytes, the same
            // property the forward map captures.
            ptr::copy_nonoverlapping(fwd, block, CHAR_MAP_SIZE);
        }
        // This store lands wherever the header lives right now. A host
        // holding a copied header must pick the block up after the call.
        (*raw).bwd_map = block;
    }
}

/// Searches `haystack` for a match starting inside `[start, end]`.
///
/// Forward returns the leftmost such match, backward the rightmost. A
/// backward search may populate the header's backward-map slot as a
/// side effect.
///
/// # Safety
///
/// `raw` must point to a live [`RawProgram`] the caller may mutate, and
/// no other thread may mutate it during the call.
pub unsafe fn search(
    raw: *mut RawProgram,
    haystack: &[u8],
    start: usize,
    end: usize,
    direction: SearchDirection,
) -> Option<RawMatch> {
    if start > haystack.len() || start > end {
        return None;
    }
    let end = end.min(haystack.len());
    // SAFETY: guaranteed by the caller.
    let exec = unsafe { exec_for(raw) };

    match direction {
        SearchDirection::Forward => {
            let caps = exec.captures_at(haystack, start)?;
            let found = caps.get(0)?;
            if found.start() > end {
                return None;
            }
            Some(collect(&caps))
        }
        SearchDirection::Backward => {
            // SAFETY: guaranteed by the caller.
            unsafe { ensure_backward_map(raw) };
            // Probe start positions right to left; the first position
            // where a match begins is the rightmost one.
            for at in (start..=end).rev() {
                if let Some(caps) = exec.captures_at(haystack, at) {
                    if caps.get(0).map(|m| m.start()) == Some(at) {
                        return Some(collect(&caps));
                    }
                }
            }
            None
        }
    }
}

/// Tests for a match beginning exactly at `at`.
///
/// # Safety
///
/// `raw` must point to a live [`RawProgram`]; no other thread may
/// mutate it during the call.
pub unsafe fn match_at(raw: *const RawProgram, haystack: &[u8], at: usize) -> Option<RawMatch> {
    if at > haystack.len() {
        return None;
    }
    // SAFETY: guaranteed by the caller.
    let exec = unsafe { exec_for(raw) };
    let caps = exec.captures_at(haystack, at)?;
    if caps.get(0).map(|m| m.start()) != Some(at) {
        return None;
    }
    Some(collect(&caps))
}

/// Calls `f` once per named capture group with the name and the
/// engine's group number (1-based, group 0 being the whole match).
///
/// # Safety
///
/// `raw` must point to a live [`RawProgram`]; no other thread may
/// mutate it during the call.
pub unsafe fn enumerate_names(raw: *const RawProgram, mut f: impl FnMut(&str, u32)) {
    // SAFETY: guaranteed by the caller.
    let exec = unsafe { exec_for(raw) };
    for (index, name) in exec.capture_names().enumerate() {
        if let Some(name) = name {
            f(name, index as u32);
        }
    }
}
