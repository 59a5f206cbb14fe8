//! Relocatable byte buffers.
//!
//! Every allocation in the buffer heap is a header followed by a data
//! region:
//!
//! ```text
//! ┌────────────┬──────────────────────────────┐
//! │  BufHeader │  data (len bytes, 8-aligned) │
//! └────────────┴──────────────────────────────┘
//!              ▲
//!              └── data_ptr(): the address stored in foreign slot fields
//! ```
//!
//! Foreign objects store the *data* pointer, never the header pointer, so
//! a slot value can be handed to code that expects a plain byte block. The
//! header sits immediately below the data region and carries the length
//! plus a tag that validates reverse lookups ([`BufRef::from_data_ptr`]).

use crate::heap::align_up;
use std::ptr::NonNull;

/// Alignment of every buffer allocation.
pub const BUF_ALIGN: usize = 8;

/// Size of the per-buffer header in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<BufHeader>();

/// Tag written into every live header ("BRF1").
const BUF_TAG: u32 = 0x4252_4631;

/// Header preceding the data region of every owned buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BufHeader {
    /// Length of the data region in bytes (excludes header and padding).
    len: u32,
    /// Validation tag, always [`BUF_TAG`] for a live buffer.
    tag: u32,
}

impl BufHeader {
    /// Build a header for a data region of `len` bytes.
    #[inline]
    pub(crate) fn new(len: u32) -> Self {
        Self { len, tag: BUF_TAG }
    }

    /// Check the validation tag.
    #[inline]
    pub fn tag_ok(&self) -> bool {
        self.tag == BUF_TAG
    }
}

/// Reference to a heap-owned buffer.
///
/// `BufRef` is a plain address: `Copy`, pointer-sized, and compared by
/// identity. It stays valid until the buffer is moved by a relocating
/// pass or its space is reset; holders of stale references must consult
/// the pass that moved the buffer for the forwarded address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufRef(NonNull<BufHeader>);

// Safety: BufRef is an address. All mutation of the memory it names
// happens either before the buffer is published or during collector
// pauses, which exclude concurrent access.
unsafe impl Send for BufRef {}
unsafe impl Sync for BufRef {}

impl BufRef {
    /// Wrap an initialized header.
    #[inline]
    pub(crate) fn from_header(header: NonNull<BufHeader>) -> Self {
        Self(header)
    }

    /// Rebuild a reference from a header address.
    ///
    /// # Safety
    ///
    /// `addr` must be the address of a live, initialized [`BufHeader`].
    #[inline]
    pub(crate) unsafe fn from_addr(addr: usize) -> Self {
        debug_assert!(addr != 0);
        // SAFETY: caller guarantees addr names a live header.
        let ptr = unsafe { NonNull::new_unchecked(addr as *mut BufHeader) };
        Self(ptr)
    }

    /// Recover the buffer whose data region starts at `data`.
    ///
    /// Foreign slot fields store data pointers; this walks back over the
    /// header to recover the full reference.
    ///
    /// # Safety
    ///
    /// `data` must be a data pointer previously produced by
    /// [`BufRef::data_ptr`] on a buffer that is still live.
    #[inline]
    pub unsafe fn from_data_ptr(data: *mut u8) -> Self {
        debug_assert!(!data.is_null());
        // SAFETY: the header sits HEADER_SIZE bytes below the data region.
        let header = unsafe { data.sub(HEADER_SIZE) } as *mut BufHeader;
        // SAFETY: caller guarantees `data` came from a live buffer, so the
        // header below it is initialized and non-null.
        let r = Self(unsafe { NonNull::new_unchecked(header) });
        debug_assert!(r.tag_ok(), "reverse lookup on a non-buffer address");
        r
    }

    /// Address of the header. This is the buffer's identity.
    #[inline]
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Raw header pointer.
    #[inline]
    pub fn header_ptr(&self) -> *mut BufHeader {
        self.0.as_ptr()
    }

    /// Pointer to the start of the data region.
    #[inline]
    pub fn data_ptr(&self) -> *mut u8 {
        // SAFETY: the data region starts immediately after the header;
        // both live inside one allocation.
        unsafe { (self.0.as_ptr() as *mut u8).add(HEADER_SIZE) }
    }

    /// Length of the data region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        // SAFETY: self references a live header.
        unsafe { (*self.0.as_ptr()).len as usize }
    }

    /// Whether the data region is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total footprint of the allocation: header plus padded data region.
    ///
    /// This is the byte count a relocating pass copies.
    #[inline]
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + align_up(self.len(), BUF_ALIGN)
    }

    /// View the data region as a byte slice.
    ///
    /// The slice is valid until the buffer moves or its space is reset.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: data_ptr..data_ptr+len lies inside this buffer's
        // allocation and the buffer is live for the borrow of self.
        unsafe { std::slice::from_raw_parts(self.data_ptr(), self.len()) }
    }

    /// Check the header's validation tag.
    #[inline]
    pub fn tag_ok(&self) -> bool {
        // SAFETY: self references a live header.
        unsafe { (*self.0.as_ptr()).tag_ok() }
    }

    /// Whether `addr` falls inside this allocation (header or data).
    #[inline]
    pub fn contains_addr(&self, addr: usize) -> bool {
        let start = self.addr();
        addr >= start && addr < start + self.total_size()
    }

    /// Whether `addr` falls inside the data region.
    #[inline]
    pub fn data_contains_addr(&self, addr: usize) -> bool {
        let start = self.data_ptr() as usize;
        addr >= start && addr < start + self.len()
    }
}

impl std::fmt::Debug for BufRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufRef({:#x}, len={})", self.addr(), self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stack-crafted buffer for tests that need no heap.
    #[repr(C, align(8))]
    struct RawBuf<const N: usize> {
        header: BufHeader,
        data: [u8; N],
    }

    impl<const N: usize> RawBuf<N> {
        fn new() -> Self {
            Self {
                header: BufHeader::new(N as u32),
                data: [0; N],
            }
        }

        fn buf_ref(&mut self) -> BufRef {
            BufRef::from_header(NonNull::from(&mut self.header))
        }
    }

    #[test]
    fn test_layout_constants() {
        assert_eq!(HEADER_SIZE, 8);
        assert_eq!(std::mem::align_of::<BufHeader>(), 4);
    }

    #[test]
    fn test_accessors() {
        let mut raw = RawBuf::<16>::new();
        let buf = raw.buf_ref();

        assert_eq!(buf.len(), 16);
        assert!(!buf.is_empty());
        assert_eq!(buf.total_size(), HEADER_SIZE + 16);
        assert!(buf.tag_ok());
        assert_eq!(buf.data_ptr() as usize, buf.addr() + HEADER_SIZE);
    }

    #[test]
    fn test_slice_reflects_writes() {
        let mut raw = RawBuf::<8>::new();
        raw.data.copy_from_slice(b"beryl!!!");
        let buf = raw.buf_ref();

        assert_eq!(buf.as_slice(), b"beryl!!!");
    }

    #[test]
    fn test_reverse_lookup() {
        let mut raw = RawBuf::<32>::new();
        let buf = raw.buf_ref();
        let data = buf.data_ptr();

        let recovered = unsafe { BufRef::from_data_ptr(data) };
        assert_eq!(recovered, buf);
        assert_eq!(recovered.len(), 32);
    }

    #[test]
    fn test_address_ranges() {
        let mut raw = RawBuf::<16>::new();
        let buf = raw.buf_ref();

        assert!(buf.contains_addr(buf.addr()));
        assert!(buf.contains_addr(buf.data_ptr() as usize + 15));
        assert!(!buf.contains_addr(buf.addr() + buf.total_size()));

        assert!(!buf.data_contains_addr(buf.addr()));
        assert!(buf.data_contains_addr(buf.data_ptr() as usize));
    }

    #[test]
    fn test_identity_equality() {
        let mut a = RawBuf::<8>::new();
        let mut b = RawBuf::<8>::new();

        let ra = a.buf_ref();
        let rb = b.buf_ref();

        assert_eq!(ra, a.buf_ref());
        assert_ne!(ra, rb);
    }

    #[test]
    fn test_total_size_padded() {
        let mut raw = RawBuf::<13>::new();
        // 13 rounds up to 16.
        assert_eq!(raw.buf_ref().total_size(), HEADER_SIZE + 16);
    }
}
