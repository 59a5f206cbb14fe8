//! Compiled program header, C layout.
//!
//! [`RawProgram`] is the header a caller receives from [`crate::compile`].
//! It lives on the engine's unmanaged heap and links its auxiliary blocks
//! with raw data pointers:
//!
//! ```text
//! ┌───────────────── RawProgram ─────────────────┐
//! │ program ──────▶ compiled form + source bytes │
//! │ exact ────────▶ literal prefix (optional)    │
//! │ fwd_map ──────▶ 256-byte start-byte map      │
//! │ bwd_map ──────▶ 256-byte map, lazily built   │
//! │ repeats ──────▶ bounded-repeat span table    │
//! │ chain ────────▶ engine-internal link         │
//! │ size fields, options, encoding, exec id      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The `bwd_map` slot starts null and is populated by the first backward
//! search, a store that happens wherever the header lives at that moment.
//! Hosts that copy the header elsewhere must watch that slot after every
//! search.

/// Number of bytes in each character scan map.
pub const CHAR_MAP_SIZE: usize = 256;

/// Compile options.
///
/// Bit values follow the source dialect: MULTILINE means "dot matches
/// newline", not the anchor behavior other dialects attach to the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternOptions(u32);

impl PatternOptions {
    /// Case-insensitive matching.
    pub const IGNORECASE: u32 = 0x01;
    /// Ignore unescaped whitespace and `#` comments in the pattern.
    pub const EXTENDED: u32 = 0x02;
    /// `.` also matches newline.
    pub const MULTILINE: u32 = 0x04;
    /// No options.
    pub const NONE: u32 = 0;

    /// Build options from raw bits.
    #[inline]
    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bit value, as stored in the header.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether case-insensitive matching is on.
    #[inline]
    pub fn is_ignorecase(self) -> bool {
        self.0 & Self::IGNORECASE != 0
    }

    /// Whether extended (whitespace-insensitive) syntax is on.
    #[inline]
    pub fn is_extended(self) -> bool {
        self.0 & Self::EXTENDED != 0
    }

    /// Whether dot-matches-newline is on.
    #[inline]
    pub fn is_multiline(self) -> bool {
        self.0 & Self::MULTILINE != 0
    }
}

/// Text encoding tag carried by a compiled program.
///
/// Tag values match the source dialect's encoding constants so headers
/// round-trip bit-exactly.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternEncoding {
    /// 7-bit ASCII text.
    #[default]
    Ascii = 0,
    /// Raw bytes, no character interpretation.
    Raw = 16,
    /// UTF-8 text.
    Utf8 = 64,
}

impl PatternEncoding {
    /// Raw tag value, as stored in the header.
    #[inline]
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Decode a tag value.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Ascii),
            16 => Some(Self::Raw),
            64 => Some(Self::Utf8),
            _ => None,
        }
    }
}

/// One bounded-repeat span (`{n}`, `{n,}`, `{n,m}`) from the pattern.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatSpan {
    /// Minimum repeat count.
    pub lower: u32,
    /// Maximum repeat count, [`RepeatSpan::INFINITE`] when open-ended.
    pub upper: u32,
}

impl RepeatSpan {
    /// Upper bound of an open-ended repeat.
    pub const INFINITE: u32 = u32::MAX;
}

/// Compiled program header.
///
/// Field order is load-bearing: the five data slots come first, then the
/// engine-internal chain link, then the size and metadata fields the slot
/// sizing rules read. [`crate::layout::SLOTS`] indexes into this struct
/// by offset.
#[repr(C)]
#[derive(Debug)]
pub struct RawProgram {
    /// Compiled form plus source bytes. Sized by `program_alloc`.
    pub program: *mut u8,
    /// Literal prefix bytes, null when the pattern has none. Sized by
    /// `exact_len`.
    pub exact: *mut u8,
    /// Forward start-byte map, always present. [`CHAR_MAP_SIZE`] bytes.
    pub fwd_map: *mut u8,
    /// Backward start-byte map, built by the first backward search.
    /// [`CHAR_MAP_SIZE`] bytes once present.
    pub bwd_map: *mut u8,
    /// Bounded-repeat span table, null when the pattern has none. Sized
    /// by `repeat_entry_size * repeat_capacity`.
    pub repeats: *mut u8,
    /// Engine-internal sharing link. Null for every standalone program;
    /// a non-null value means the engine still co-owns this object.
    pub chain: *mut RawProgram,

    /// Bytes allocated for `program`.
    pub program_alloc: u32,
    /// Bytes meaningful in `program` (at most `program_alloc`).
    pub program_used: u32,
    /// Bytes in `exact`.
    pub exact_len: u32,
    /// Size of one entry in `repeats`.
    pub repeat_entry_size: u32,
    /// Entries allocated in `repeats`.
    pub repeat_capacity: u32,
    /// Capture group count, excluding the whole-match group.
    pub group_count: u32,
    /// [`PatternOptions`] bits.
    pub options: u32,
    /// [`PatternEncoding`] tag.
    pub encoding: u32,
    /// Process-local key into the exec cache. The program block carries
    /// everything needed to rebuild the exec if the cache entry is gone.
    pub exec_id: u64,
}
