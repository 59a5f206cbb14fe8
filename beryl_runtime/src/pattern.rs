//! The pattern entity: a compiled, adopted, searchable program.
//!
//! A [`Pattern`] owns exactly one managed buffer graph: the adopted
//! header plus every block its slots reference. The entity itself is
//! host-native; only the program data lives on the managed heap, and
//! the header reference is the single root the collector needs.
//!
//! Search calls follow a fixed protocol around the engine:
//!
//! ```text
//!   lock ─▶ observe bwd slot ─▶ engine search ─▶ absorb ─▶ results
//! ```
//!
//! The absorb step runs before results are returned, so no foreign
//! block ever outlives the search that created it, and the collector
//! never sees a slot it cannot relocate.

use crate::adopt::{absorb_backward_map, adopt_program};
use crate::error::PatternError;
use crate::match_data::MatchData;
use beryl_engine::{
    descriptor, read_slot, write_slot, PatternEncoding, PatternOptions, RawProgram,
    SearchDirection, Slot, SLOTS,
};
use beryl_gc::{BufHeap, BufRef, Mark, MarkingPass, Relocate, RelocationPass};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::cell::Cell;

/// A compiled pattern whose program lives on the managed heap.
pub struct Pattern {
    /// Adopted header buffer. Updated by relocating passes.
    header: Cell<BufRef>,
    source: Box<str>,
    /// Named groups, host numbering (engine number minus one).
    names: FxHashMap<Box<str>, u32>,
    group_count: u32,
    options: PatternOptions,
    encoding: PatternEncoding,
    /// Serializes searches: the engine may store into the header
    /// mid-call, and the absorb step must pair with its own search.
    search_lock: Mutex<()>,
}

// SAFETY: the header cell is written from two places only, searches
// holding search_lock and collector passes, which run during a pause
// with exclusive access. No unsynchronized path mutates it.
unsafe impl Send for Pattern {}
unsafe impl Sync for Pattern {}

impl Pattern {
    /// Compiles `source` and adopts the program into `heap`.
    ///
    /// On any failure after compilation the engine-side program is
    /// released whole; an error never strands foreign memory.
    pub fn compile(
        heap: &BufHeap,
        source: &str,
        options: PatternOptions,
        encoding: PatternEncoding,
    ) -> Result<Self, PatternError> {
        beryl_engine::init();
        let raw = beryl_engine::compile(source.as_bytes(), options, encoding)?;

        // Harvest metadata while the engine still has the program hot;
        // group names shift down by one into host numbering.
        let mut names = FxHashMap::default();
        // SAFETY: raw is live until a release below.
        let group_count = unsafe {
            beryl_engine::enumerate_names(raw, |name, number| {
                names.insert(Box::from(name), number - 1);
            });
            (*raw).group_count
        };

        let header = match adopt_program(heap, raw) {
            Ok(buf) => buf,
            Err(e) => {
                // Adoption failed before touching the original, so the
                // whole program goes back to the engine in one piece.
                // SAFETY: raw is live and still fully engine-owned.
                unsafe { beryl_engine::release_program(raw) };
                return Err(e);
            }
        };

        Ok(Self {
            header: Cell::new(header),
            source: source.into(),
            names,
            group_count,
            options,
            encoding,
            search_lock: Mutex::new(()),
        })
    }

    /// Searches `haystack` for a match starting in `[start, end]`.
    ///
    /// Forward finds the leftmost such match, backward the rightmost.
    /// `Ok(None)` is a clean miss; `Err` is an allocation failure while
    /// absorbing engine-planted state, after which the pattern is still
    /// fully usable.
    pub fn search(
        &self,
        heap: &BufHeap,
        haystack: &[u8],
        start: usize,
        end: usize,
        direction: SearchDirection,
    ) -> Result<Option<MatchData>, PatternError> {
        let _guard = self.search_lock.lock();
        let raw = self.raw_header();
        // SAFETY: the header buffer is live and we hold the lock.
        let observed = unsafe { read_slot(raw, descriptor(Slot::BackwardMap)) };
        // SAFETY: as above; collector pauses never interleave a search.
        let found = unsafe { beryl_engine::search(raw, haystack, start, end, direction) };
        absorb_backward_map(heap, self.header.get(), observed)?;
        Ok(found.map(|m| MatchData::from_raw(&m)))
    }

    /// Tests for a match beginning exactly at `at`.
    pub fn match_at(
        &self,
        heap: &BufHeap,
        haystack: &[u8],
        at: usize,
    ) -> Result<Option<MatchData>, PatternError> {
        let _guard = self.search_lock.lock();
        let raw = self.raw_header();
        // SAFETY: as in search; anchored tests keep the same postlude
        // so every engine call is followed by an absorb check.
        let observed = unsafe { read_slot(raw, descriptor(Slot::BackwardMap)) };
        let found = unsafe { beryl_engine::match_at(raw, haystack, at) };
        absorb_backward_map(heap, self.header.get(), observed)?;
        Ok(found.map(|m| MatchData::from_raw(&m)))
    }

    /// The pattern text this entity was compiled from.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compile options.
    #[inline]
    pub fn options(&self) -> PatternOptions {
        self.options
    }

    /// Encoding tag.
    #[inline]
    pub fn encoding(&self) -> PatternEncoding {
        self.encoding
    }

    /// Options and encoding folded into one word, the form hosts store.
    #[inline]
    pub fn option_bits(&self) -> u32 {
        self.options.bits() | self.encoding.bits()
    }

    /// Number of capture groups.
    #[inline]
    pub fn group_count(&self) -> u32 {
        self.group_count
    }

    /// Host group index for a named group.
    #[inline]
    pub fn group_index(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    /// All named groups with their host indices.
    pub fn names(&self) -> impl Iterator<Item = (&str, u32)> {
        self.names.iter().map(|(name, &index)| (&**name, index))
    }

    /// The adopted header buffer.
    #[inline]
    pub fn header_buf(&self) -> BufRef {
        self.header.get()
    }

    #[inline]
    fn raw_header(&self) -> *mut RawProgram {
        self.header.get().data_ptr() as *mut RawProgram
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("source", &self.source)
            .field("group_count", &self.group_count)
            .field("options", &self.options)
            .field("header", &self.header.get())
            .finish()
    }
}

// ============================================================================
// Collector traversal
// ============================================================================

// SAFETY: the traversal visits the header buffer and then every slot
// buffer through the relocated header, writes every returned reference
// back, and re-registers each edge. Slots are all managed here: foreign
// blocks never survive past the search that planted them.
unsafe impl Relocate for Pattern {
    fn relocate_refs(&self, pass: &mut RelocationPass<'_>) {
        // Header first; slot pointers are read through its new home.
        let header = pass.relocate(self.header.get());
        self.header.set(header);
        pass.record_reachable(self as *const Self as *const u8, header);

        let raw = header.data_ptr() as *mut RawProgram;
        for desc in &SLOTS {
            // SAFETY: the relocated header buffer is live; slot values
            // are data pointers of adopted buffers or null.
            let slot = unsafe { read_slot(raw, desc) };
            if slot.is_null() {
                continue;
            }
            // SAFETY: adopted slots point at buffer data, so the buffer
            // header sits directly below.
            let buf = unsafe { BufRef::from_data_ptr(slot) };
            let moved = pass.relocate(buf);
            if moved != buf {
                // SAFETY: rewriting a slot inside the live header copy.
                unsafe { write_slot(raw, desc, moved.data_ptr()) };
            }
            pass.record_reachable(header.header_ptr() as *const u8, moved);
        }
    }
}

// SAFETY: covers exactly the references Relocate covers, mutating none.
unsafe impl Mark for Pattern {
    fn mark_refs(&self, pass: &mut MarkingPass) {
        let header = self.header.get();
        pass.mark(header);

        let raw = header.data_ptr() as *const RawProgram;
        for desc in &SLOTS {
            // SAFETY: live adopted header, as in relocate_refs.
            let slot = unsafe { read_slot(raw, desc) };
            if slot.is_null() {
                continue;
            }
            // SAFETY: as in relocate_refs.
            let buf = unsafe { BufRef::from_data_ptr(slot) };
            pass.mark(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> BufHeap {
        BufHeap::with_defaults()
    }

    fn plain(heap: &BufHeap, source: &str) -> Pattern {
        Pattern::compile(heap, source, PatternOptions::default(), PatternEncoding::Ascii)
            .unwrap()
    }

    #[test]
    fn test_compile_adopts_and_reports_shape() {
        let heap = heap();
        let p = plain(&heap, r"(\d+)-(\d+)");
        assert_eq!(p.source(), r"(\d+)-(\d+)");
        assert_eq!(p.group_count(), 2);
        assert!(heap.owns(p.header_buf()));
    }

    #[test]
    fn test_compile_error_carries_pattern() {
        let heap = heap();
        let err = Pattern::compile(&heap, "(", PatternOptions::default(), PatternEncoding::Ascii)
            .unwrap_err();
        match err {
            PatternError::Syntax { pattern, message } => {
                assert_eq!(pattern, "(");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_search_round_trip() {
        let heap = heap();
        let p = plain(&heap, r"(\d+)-(\d+)");
        let hay = b"order 42-7 done";

        let m = p
            .search(&heap, hay, 0, hay.len(), SearchDirection::Forward)
            .unwrap()
            .unwrap();
        assert_eq!(m.full(), (6, 10));
        assert_eq!(m.group(0), Some((6, 8)));
        assert_eq!(m.group(1), Some((9, 10)));
    }

    #[test]
    fn test_search_miss_is_ok_none() {
        let heap = heap();
        let p = plain(&heap, "^abc$");
        let r = p.search(&heap, b"xabcy", 0, 5, SearchDirection::Forward).unwrap();
        assert!(r.is_none());
    }

    #[test]
    fn test_named_groups_use_host_numbering() {
        let heap = heap();
        let p = plain(&heap, r"(?<year>\d{4})-(?<month>\d{2})");
        assert_eq!(p.group_index("year"), Some(0));
        assert_eq!(p.group_index("month"), Some(1));
        assert_eq!(p.group_index("day"), None);

        let mut names: Vec<(String, u32)> =
            p.names().map(|(n, i)| (n.to_string(), i)).collect();
        names.sort();
        assert_eq!(
            names,
            vec![("month".to_string(), 1), ("year".to_string(), 0)]
        );

        let m = p
            .search(&heap, b"on 2024-06.", 0, 11, SearchDirection::Forward)
            .unwrap()
            .unwrap();
        assert_eq!(m.group(0), Some((3, 7)));
        assert_eq!(m.group(1), Some((8, 10)));
    }

    #[test]
    fn test_option_bits_fold_in_encoding() {
        let heap = heap();
        let p = Pattern::compile(
            &heap,
            "a",
            PatternOptions::new(PatternOptions::IGNORECASE | PatternOptions::MULTILINE),
            PatternEncoding::Utf8,
        )
        .unwrap();
        assert_eq!(p.option_bits(), 0x05 | 64);
        assert_eq!(p.options().bits(), 0x05);
        assert_eq!(p.encoding(), PatternEncoding::Utf8);
    }

    #[test]
    fn test_backward_search_absorbs_synchronously() {
        let heap = heap();
        let p = plain(&heap, r"\d+");
        let hay = b"a1b22c333";

        let m = p
            .search(&heap, hay, 0, hay.len(), SearchDirection::Backward)
            .unwrap()
            .unwrap();
        assert_eq!(m.full(), (8, 9));

        // By the time results are out, the planted map is managed.
        let raw = p.raw_header();
        let slot = unsafe { read_slot(raw, descriptor(Slot::BackwardMap)) };
        assert!(!slot.is_null());
        assert!(heap.contains(slot));
    }

    #[test]
    fn test_match_at_is_anchored() {
        let heap = heap();
        let p = plain(&heap, "abc");
        let hay = b"zabc";
        assert!(p.match_at(&heap, hay, 0).unwrap().is_none());
        let m = p.match_at(&heap, hay, 1).unwrap().unwrap();
        assert_eq!(m.full(), (1, 4));
    }
}
