//! Pattern compilation.
//!
//! Compilation builds every block of a [`RawProgram`] on the engine heap:
//!
//! - the program block, carrying a self-describing copy of the source
//!   pattern and its flags so the exec can be rebuilt from the block
//!   alone,
//! - the forward start-byte map, always present,
//! - the literal-prefix block and the bounded-repeat table, only when
//!   the pattern has them.
//!
//! The backward map is never built here; the first backward search adds
//! it. The chain link is always left null: every program this module
//! produces is standalone.

use crate::mem::align_block;
use crate::raw::{PatternEncoding, PatternOptions, RawProgram, RepeatSpan, CHAR_MAP_SIZE};
use regex::bytes::{Regex, RegexBuilder};
use std::fmt;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Magic tag opening every program block.
pub(crate) const PROGRAM_MAGIC: u32 = 0x4252_5850; // "BRXP"

/// Fixed bytes before the pattern text in a program block.
pub(crate) const PROGRAM_PREFIX: usize = 16;

// ============================================================================
// Errors
// ============================================================================

/// A pattern the engine cannot compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// What was wrong with the pattern.
    pub message: String,
    /// The offending pattern, lossily decoded for display.
    pub pattern: String,
}

impl CompileError {
    fn new(message: impl Into<String>, pattern: &[u8]) -> Self {
        Self {
            message: message.into(),
            pattern: String::from_utf8_lossy(pattern).into_owned(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

// ============================================================================
// Exec construction
// ============================================================================

/// Translates header flags into an exec for `pattern`.
///
/// Shared by [`compile`] and by the cache-miss rebuild in the search
/// path, so a rebuilt exec always behaves exactly like the original.
pub(crate) fn build_exec(
    pattern: &str,
    options: PatternOptions,
    encoding: PatternEncoding,
) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        // Anchors are line anchors in the source dialect, always.
        .multi_line(true)
        .case_insensitive(options.is_ignorecase())
        .ignore_whitespace(options.is_extended())
        // The MULTILINE bit governs dot, not the anchors.
        .dot_matches_new_line(options.is_multiline())
        .unicode(encoding == PatternEncoding::Utf8)
        .build()
}

// ============================================================================
// Program block codec
// ============================================================================

/// Encodes the self-describing program block: magic, flags, encoding,
/// pattern length, pattern bytes.
pub(crate) fn encode_program_block(
    pattern: &[u8],
    options: PatternOptions,
    encoding: PatternEncoding,
) -> Vec<u8> {
    let mut block = Vec::with_capacity(PROGRAM_PREFIX + pattern.len());
    block.extend_from_slice(&PROGRAM_MAGIC.to_le_bytes());
    block.extend_from_slice(&options.bits().to_le_bytes());
    block.extend_from_slice(&encoding.bits().to_le_bytes());
    block.extend_from_slice(&(pattern.len() as u32).to_le_bytes());
    block.extend_from_slice(pattern);
    block
}

/// Decodes a program block back into flags, encoding and pattern bytes.
///
/// Returns `None` when the block does not carry a well-formed program,
/// which after a faithful byte copy can only mean corruption.
pub(crate) fn decode_program_block(
    block: &[u8],
) -> Option<(PatternOptions, PatternEncoding, &[u8])> {
    if block.len() < PROGRAM_PREFIX {
        return None;
    }
    let word = |at: usize| -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&block[at..at + 4]);
        u32::from_le_bytes(raw)
    };
    if word(0) != PROGRAM_MAGIC {
        return None;
    }
    let options = PatternOptions::new(word(4));
    let encoding = PatternEncoding::from_bits(word(8))?;
    let len = word(12) as usize;
    block
        .get(PROGRAM_PREFIX..PROGRAM_PREFIX + len)
        .map(|pattern| (options, encoding, pattern))
}

// ============================================================================
// Pattern scanners
// ============================================================================

/// Bytes that end a literal run.
const META: &[u8] = b"\\.^$|?*+()[]{";

/// Leading literal run of the pattern, used for the exact-prefix slot.
fn literal_prefix(pattern: &[u8]) -> &[u8] {
    let mut end = 0;
    for (i, &b) in pattern.iter().enumerate() {
        if META.contains(&b) {
            // A quantifier binds the previous character, so it leaves
            // the literal run.
            if matches!(b, b'?' | b'*' | b'+' | b'{') && end > 0 {
                end -= 1;
            }
            break;
        }
        end = i + 1;
    }
    &pattern[..end]
}

/// Bounded-repeat spans (`{n}`, `{n,}`, `{n,m}`) in source order.
///
/// Braces inside character classes and escaped braces are literals and
/// contribute nothing, matching how the exec treats them.
fn scan_repeat_spans(pattern: &[u8]) -> Vec<RepeatSpan> {
    let mut spans = Vec::new();
    let mut in_class = false;
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'{' if !in_class => {
                if let Some((span, next)) = parse_repeat(pattern, i) {
                    spans.push(span);
                    i = next;
                    continue;
                }
                // Not a repeat, `{` is a literal here.
            }
            _ => {}
        }
        i += 1;
    }
    spans
}

/// Parses one `{...}` repeat starting at `open`, returning the span and
/// the index just past the closing brace.
fn parse_repeat(pattern: &[u8], open: usize) -> Option<(RepeatSpan, usize)> {
    let close = pattern[open + 1..].iter().position(|&b| b == b'}')? + open + 1;
    let body = std::str::from_utf8(&pattern[open + 1..close]).ok()?;
    let (lower, upper) = match body.split_once(',') {
        None => {
            let n: u32 = body.parse().ok()?;
            (n, n)
        }
        Some((lo, "")) => (lo.parse().ok()?, RepeatSpan::INFINITE),
        Some((lo, hi)) => (lo.parse().ok()?, hi.parse().ok()?),
    };
    Some((RepeatSpan { lower, upper }, close + 1))
}

/// Builds the forward start-byte map.
///
/// With a literal prefix the map admits only its first byte (both cases
/// when folding); otherwise it conservatively admits every byte.
fn build_forward_map(prefix: &[u8], options: PatternOptions) -> [u8; CHAR_MAP_SIZE] {
    let mut map = [0u8; CHAR_MAP_SIZE];
    match prefix.first() {
        None => map = [1u8; CHAR_MAP_SIZE],
        Some(&b) => {
            map[b as usize] = 1;
            if options.is_ignorecase() {
                map[b.to_ascii_lowercase() as usize] = 1;
                map[b.to_ascii_uppercase() as usize] = 1;
            }
        }
    }
    map
}

// ============================================================================
// Compilation
// ============================================================================

/// Compiles `pattern` into a standalone [`RawProgram`] on the engine
/// heap.
///
/// The returned header and every block it references stay valid until
/// [`crate::release_program`]. Nothing is allocated on failure.
pub fn compile(
    pattern: &[u8],
    options: PatternOptions,
    encoding: PatternEncoding,
) -> Result<*mut RawProgram, CompileError> {
    let state = crate::engine_state();

    let text = std::str::from_utf8(pattern)
        .map_err(|_| CompileError::new("pattern is not valid UTF-8", pattern))?;
    let exec = build_exec(text, options, encoding)
        .map_err(|e| CompileError::new(e.to_string(), pattern))?;
    let group_count = (exec.captures_len() - 1) as u32;

    let exec_id = state.next_exec_id.fetch_add(1, Ordering::Relaxed);
    state.execs.insert(exec_id, Arc::new(exec));

    let ledger = &state.ledger;

    // Program block: self-describing pattern copy.
    let encoded = encode_program_block(pattern, options, encoding);
    let program_used = encoded.len() as u32;
    let program_alloc = align_block(encoded.len()) as u32;
    let program = ledger.alloc_block(encoded.len());
    // SAFETY: the block was just allocated with at least encoded.len()
    // bytes.
    unsafe { ptr::copy_nonoverlapping(encoded.as_ptr(), program, encoded.len()) };

    // Forward map: always present.
    let prefix = literal_prefix(pattern);
    let map = build_forward_map(prefix, options);
    let fwd_map = ledger.alloc_block(CHAR_MAP_SIZE);
    // SAFETY: the block spans CHAR_MAP_SIZE bytes.
    unsafe { ptr::copy_nonoverlapping(map.as_ptr(), fwd_map, CHAR_MAP_SIZE) };

    // Exact prefix: byte-exact matching is off the table under case
    // folding, so the slot stays empty then.
    let exact_bytes = if options.is_ignorecase() { &[][..] } else { prefix };
    let exact_len = exact_bytes.len() as u32;
    let exact = if exact_bytes.is_empty() {
        ptr::null_mut()
    } else {
        let block = ledger.alloc_block(exact_bytes.len());
        // SAFETY: the block was sized for exact_bytes.
        unsafe { ptr::copy_nonoverlapping(exact_bytes.as_ptr(), block, exact_bytes.len()) };
        block
    };

    // Repeat table.
    let spans = scan_repeat_spans(pattern);
    let repeat_capacity = spans.len() as u32;
    let repeats = if spans.is_empty() {
        ptr::null_mut()
    } else {
        let bytes = spans.len() * std::mem::size_of::<RepeatSpan>();
        let block = ledger.alloc_block(bytes);
        // SAFETY: RepeatSpan is plain repr(C) data and the block was
        // sized for the whole table.
        unsafe { ptr::copy_nonoverlapping(spans.as_ptr() as *const u8, block, bytes) };
        block
    };

    let header = ledger.alloc_block(std::mem::size_of::<RawProgram>()) as *mut RawProgram;
    // SAFETY: the header block is zeroed, 8-aligned and sized for a
    // RawProgram.
    unsafe {
        header.write(RawProgram {
            program,
            exact,
            fwd_map,
            bwd_map: ptr::null_mut(),
            repeats,
            chain: ptr::null_mut(),
            program_alloc,
            program_used,
            exact_len,
            repeat_entry_size: std::mem::size_of::<RepeatSpan>() as u32,
            repeat_capacity,
            group_count,
            options: options.bits(),
            encoding: encoding.bits(),
            exec_id,
        });
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release_program;

    fn plain(pattern: &str) -> *mut RawProgram {
        compile(
            pattern.as_bytes(),
            PatternOptions::default(),
            PatternEncoding::Ascii,
        )
        .unwrap()
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix(b"abc"), b"abc");
        assert_eq!(literal_prefix(b"ab*c"), b"a");
        assert_eq!(literal_prefix(br"order \d+"), b"order ");
        assert_eq!(literal_prefix(br"(\d+)-(\d+)"), b"");
        assert_eq!(literal_prefix(b"^abc$"), b"");
        assert_eq!(literal_prefix(b"abc{2,4}"), b"ab");
        assert_eq!(literal_prefix(b"?start"), b"");
    }

    #[test]
    fn test_scan_repeat_spans() {
        assert!(scan_repeat_spans(br"\d+").is_empty());
        assert_eq!(
            scan_repeat_spans(b"a{3}b{2,5}c{4,}"),
            vec![
                RepeatSpan { lower: 3, upper: 3 },
                RepeatSpan { lower: 2, upper: 5 },
                RepeatSpan {
                    lower: 4,
                    upper: RepeatSpan::INFINITE
                },
            ]
        );
        // Class members and escapes are literals.
        assert!(scan_repeat_spans(br"[{]x\{2}").is_empty());
        // Malformed counts are literals too.
        assert!(scan_repeat_spans(b"a{x}").is_empty());
    }

    #[test]
    fn test_program_block_round_trip() {
        let options = PatternOptions::new(PatternOptions::IGNORECASE | PatternOptions::EXTENDED);
        let block = encode_program_block(br"\w+ # word", options, PatternEncoding::Utf8);
        let (opts, enc, pattern) = decode_program_block(&block).unwrap();
        assert_eq!(opts, options);
        assert_eq!(enc, PatternEncoding::Utf8);
        assert_eq!(pattern, br"\w+ # word");

        assert!(decode_program_block(&block[..8]).is_none());
        let mut bad = block.clone();
        bad[0] ^= 0xFF;
        assert!(decode_program_block(&bad).is_none());
    }

    #[test]
    fn test_compile_builds_expected_slots() {
        let raw = plain(r"(\d+)-(\d+)");
        unsafe {
            assert!(!(*raw).program.is_null());
            assert!(!(*raw).fwd_map.is_null());
            assert!((*raw).exact.is_null());
            assert!((*raw).bwd_map.is_null());
            assert!((*raw).repeats.is_null());
            assert!((*raw).chain.is_null());
            assert_eq!((*raw).group_count, 2);
            assert!((*raw).program_used <= (*raw).program_alloc);
            release_program(raw);
        }
    }

    #[test]
    fn test_compile_stores_exact_prefix() {
        let raw = plain(r"order \d+");
        unsafe {
            assert_eq!((*raw).exact_len, 6);
            let exact = std::slice::from_raw_parts((*raw).exact, 6);
            assert_eq!(exact, b"order ");
            release_program(raw);
        }
    }

    #[test]
    fn test_ignorecase_drops_exact_prefix() {
        let raw = compile(
            b"hello",
            PatternOptions::new(PatternOptions::IGNORECASE),
            PatternEncoding::Ascii,
        )
        .unwrap();
        unsafe {
            assert!((*raw).exact.is_null());
            assert_eq!((*raw).exact_len, 0);
            // The forward map still admits both cases of the first byte.
            let map = std::slice::from_raw_parts((*raw).fwd_map, CHAR_MAP_SIZE);
            assert_eq!(map[b'h' as usize], 1);
            assert_eq!(map[b'H' as usize], 1);
            assert_eq!(map[b'x' as usize], 0);
            release_program(raw);
        }
    }

    #[test]
    fn test_compile_builds_repeat_table() {
        let raw = plain(r"ab{2,4}c{3}");
        unsafe {
            assert_eq!((*raw).repeat_capacity, 2);
            assert_eq!(
                (*raw).repeat_entry_size as usize,
                std::mem::size_of::<RepeatSpan>()
            );
            let table =
                std::slice::from_raw_parts((*raw).repeats as *const RepeatSpan, 2);
            assert_eq!(table[0], RepeatSpan { lower: 2, upper: 4 });
            assert_eq!(table[1], RepeatSpan { lower: 3, upper: 3 });
            release_program(raw);
        }
    }

    #[test]
    fn test_program_block_is_self_describing() {
        let options = PatternOptions::new(PatternOptions::MULTILINE);
        let raw = compile(br"a.c", options, PatternEncoding::Utf8).unwrap();
        unsafe {
            let block =
                std::slice::from_raw_parts((*raw).program, (*raw).program_used as usize);
            let (opts, enc, pattern) = decode_program_block(block).unwrap();
            assert_eq!(opts, options);
            assert_eq!(enc, PatternEncoding::Utf8);
            assert_eq!(pattern, br"a.c");
            release_program(raw);
        }
    }

    #[test]
    fn test_compile_rejects_bad_pattern() {
        let err = compile(b"(", PatternOptions::default(), PatternEncoding::Ascii).unwrap_err();
        assert!(!err.message.is_empty());
        assert_eq!(err.pattern, "(");
    }

    #[test]
    fn test_fresh_programs_get_distinct_exec_ids() {
        let a = plain("a");
        let b = plain("a");
        unsafe {
            assert_ne!((*a).exec_id, (*b).exec_id);
            release_program(a);
            release_program(b);
        }
    }
}
