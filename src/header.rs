//! The per-block header placed immediately before every user payload.
//!
//! Mirrors `original_source/src/test_resource.cpp`'s `Header`/`Link` pair:
//! a fixed-layout struct reached by pointer arithmetic from the payload
//! pointer, plus the magic numbers and scribble bytes used to validate it.
//! All reads of a header performed before its magic number has been
//! checked are `unsafe`, by construction, since the caller may have handed
//! back a corrupted or foreign pointer.

use std::ptr::NonNull;

use crate::align::MAX_ALIGN;
use crate::list::ListNode;

/// Identifies a live allocation made by this resource.
pub(crate) const MAGIC_ALLOCATED: u32 = 0xDEAD_BEEF;

/// Overwrites [`MAGIC_ALLOCATED`] once a block has been returned upstream.
pub(crate) const MAGIC_DEALLOCATED: u32 = 0xDEAD_F00D;

/// Byte pattern written into the redzones and the header's own sizing
/// padding immediately after allocation.
pub(crate) const PADDED_BYTE: u8 = 0xB1;

/// Byte pattern scribbled over a payload once it has been deallocated.
pub(crate) const SCRIBBLED_BYTE: u8 = 0xA5;

/// The block header. Maximally aligned so that the payload that follows it
/// (`self.add(1)`, exactly as in the source) begins at [`MAX_ALIGN`].
///
/// The trailing `_padding` field exists only to guarantee that
/// `size_of::<Header>()` is a multiple of `MAX_ALIGN`; the redzone bytes
/// themselves are written and checked via pointer arithmetic from the
/// payload, not through this field, matching the source's own
/// `(char *)(head + 1) - paddingSize` idiom.
#[repr(C, align(16))]
pub(crate) struct Header {
    pub magic: u32,
    pub bytes: usize,
    pub alignment: usize,
    pub index: i64,
    pub node: NonNull<ListNode>,
    pub owner: *const (),
    _padding: [u8; MAX_ALIGN],
}

const _: () = assert!(std::mem::size_of::<Header>() % MAX_ALIGN == 0);
const _: () = assert!(std::mem::align_of::<Header>() == MAX_ALIGN);

impl Header {
    pub(crate) fn new(
        bytes: usize,
        alignment: usize,
        index: i64,
        node: NonNull<ListNode>,
        owner: *const (),
    ) -> Self {
        Self {
            magic: MAGIC_ALLOCATED,
            bytes,
            alignment,
            index,
            node,
            owner,
            _padding: [0; MAX_ALIGN],
        }
    }

    /// Total upstream request size for a payload of `bytes`: the header
    /// itself, the payload, and one trailing redzone. The leading redzone
    /// lives in the header's own alignment slack, exactly as in the source.
    pub(crate) fn total_size(bytes: usize) -> usize {
        std::mem::size_of::<Header>() + bytes + MAX_ALIGN
    }

    pub(crate) fn layout() -> std::alloc::Layout {
        std::alloc::Layout::new::<Header>()
    }

    /// The payload pointer for a header at `header`: one past the header,
    /// exactly `head + 1` in the source.
    ///
    /// # Safety
    ///
    /// `header` must point to a valid, initialized `Header`.
    pub(crate) unsafe fn payload(header: NonNull<Header>) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(header.as_ptr().add(1).cast::<u8>()) }
    }

    /// Recovers the header for a previously returned payload pointer:
    /// `payload - 1` header-widths, matching `(AlignedHeader *)p - 1`.
    ///
    /// # Safety
    ///
    /// `payload` must have been produced by [`Header::payload`] on some
    /// (possibly already-invalidated) header; the memory must still be
    /// mapped, though its contents may be garbage.
    pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<Header> {
        unsafe { NonNull::new_unchecked(payload.as_ptr().cast::<Header>().sub(1)) }
    }

    /// Writes the leading and trailing redzones around a payload of
    /// `bytes` bytes. Never touches the payload itself.
    ///
    /// # Safety
    ///
    /// `payload` must point to a just-allocated, writable region of at
    /// least `bytes + MAX_ALIGN` bytes, preceded by at least `MAX_ALIGN`
    /// further writable bytes (the header's alignment slack).
    pub(crate) unsafe fn write_redzones(payload: NonNull<u8>, bytes: usize) {
        unsafe {
            std::ptr::write_bytes(payload.as_ptr().sub(MAX_ALIGN), PADDED_BYTE, MAX_ALIGN);
            std::ptr::write_bytes(payload.as_ptr().add(bytes), PADDED_BYTE, MAX_ALIGN);
        }
    }

    /// Scribbles a deallocated payload with [`SCRIBBLED_BYTE`].
    ///
    /// # Safety
    ///
    /// `payload` must point to `bytes` writable bytes this resource
    /// allocated and is in the process of deallocating.
    pub(crate) unsafe fn scribble(payload: NonNull<u8>, bytes: usize) {
        unsafe { std::ptr::write_bytes(payload.as_ptr(), SCRIBBLED_BYTE, bytes) }
    }

    /// Scans backward from `payload` for the first byte that is not
    /// [`PADDED_BYTE`], returning the 1-based distance from the payload
    /// boundary (the redzone is `MAX_ALIGN` bytes, so the result is in
    /// `1..=MAX_ALIGN`), or `None` if the whole redzone is intact.
    ///
    /// # Safety
    ///
    /// `payload` must be preceded by `MAX_ALIGN` readable bytes.
    pub(crate) unsafe fn check_underrun(payload: NonNull<u8>) -> Option<usize> {
        unsafe {
            for distance in 1..=MAX_ALIGN {
                if *payload.as_ptr().sub(distance) != PADDED_BYTE {
                    return Some(distance);
                }
            }
        }
        None
    }

    /// Scans forward from `payload + bytes` for the first byte that is not
    /// [`PADDED_BYTE`], returning the 1-based distance past the payload end.
    ///
    /// # Safety
    ///
    /// `payload + bytes` must be followed by `MAX_ALIGN` readable bytes.
    pub(crate) unsafe fn check_overrun(payload: NonNull<u8>, bytes: usize) -> Option<usize> {
        unsafe {
            let tail = payload.as_ptr().add(bytes);
            for distance in 1..=MAX_ALIGN {
                if *tail.add(distance - 1) != PADDED_BYTE {
                    return Some(distance);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_multiple_of_max_align() {
        assert_eq!(std::mem::size_of::<Header>() % MAX_ALIGN, 0);
    }

    #[test]
    fn redzones_round_trip_clean() {
        let total = Header::total_size(32) + MAX_ALIGN; // extra slack before the header
        let layout = std::alloc::Layout::from_size_align(total, MAX_ALIGN).unwrap();
        unsafe {
            let raw = std::alloc::alloc(layout);
            let header = NonNull::new(raw.add(MAX_ALIGN)).unwrap().cast::<Header>();
            let payload = Header::payload(header);
            Header::write_redzones(payload, 32);
            assert!(Header::check_underrun(payload).is_none());
            assert!(Header::check_overrun(payload, 32).is_none());

            // Corrupt one byte past the end and confirm detection.
            *payload.as_ptr().add(32) = 0;
            assert_eq!(Header::check_overrun(payload, 32), Some(1));

            std::alloc::dealloc(raw, layout);
        }
    }
}
