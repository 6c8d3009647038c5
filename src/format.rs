//! Diagnostic printers writing the bit-exact `stdout` formats the test
//! resource's callers may assert against.
//!
//! Grounded directly on `original_source/src/test_resource.cpp`'s
//! `formatBlock`/`formatInvalidMemoryBlock`: 16 bytes per line for the hex
//! dumper (the source groups them as 4-of-4, which reads as the same
//! 16-byte line), one specific diagnostic line per detected problem, then
//! the header and up to 64 bytes of payload.

use std::io::Write;
use std::ptr::NonNull;

use crate::align::MAX_ALIGN;
use crate::header::{Header, MAGIC_ALLOCATED, MAGIC_DEALLOCATED};

/// Formats `length` bytes starting at `address` as hex, 16 bytes per line,
/// each line prefixed with the address of its first byte.
pub(crate) fn format_block(address: *const u8, length: usize) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut offset = 0usize;
    while offset < length {
        let line_len = (length - offset).min(16);
        let line_addr = unsafe { address.add(offset) };
        let _ = write!(out, "{line_addr:p}:\t");
        for i in 0..line_len {
            let byte = unsafe { *address.add(offset + i) };
            if i > 0 && i % 4 == 0 {
                let _ = write!(out, "  ");
            }
            let _ = write!(out, "{byte:02x} ");
        }
        let _ = writeln!(out);
        offset += line_len;
    }
}

/// What's wrong with a block under inspection at deallocate time, found in
/// the order the validation algorithm checks it (magic, then owner, then
/// size/alignment, then the redzones): see the module doc on `TestResource`
/// for why that order is load-bearing.
pub(crate) struct Diagnosis {
    pub deallocated_bytes: usize,
    pub deallocated_alignment: usize,
    pub underrun_by: Option<usize>,
    pub overrun_by: Option<usize>,
}

/// Prints the full corruption report for a suspect header: the specific
/// error line(s), the header bytes, and up to 64 bytes of payload.
///
/// # Safety
///
/// `header` must point to readable memory of at least `size_of::<Header>()`
/// bytes (its *contents* may be garbage — that's the point).
pub(crate) unsafe fn format_invalid_block(header: NonNull<Header>, owner: *const (), diagnosis: &Diagnosis) {
    let header_ref = unsafe { header.as_ref() };
    let payload = unsafe { Header::payload(header) };
    let magic = header_ref.magic;
    let num_bytes = header_ref.bytes;
    let alignment = header_ref.alignment;

    if magic != MAGIC_ALLOCATED {
        if magic == MAGIC_DEALLOCATED {
            println!("*** Deallocating previously deallocated memory at {payload:p}. ***");
        } else {
            println!("*** Invalid magic number 0x{magic:08x} at address {payload:p}. ***");
        }
    } else {
        if diagnosis.deallocated_bytes != num_bytes {
            println!(
                "*** Freeing segment at {:p} using wrong size ({} vs. {}). ***",
                payload, diagnosis.deallocated_bytes, num_bytes
            );
        }
        if diagnosis.deallocated_alignment != alignment {
            println!(
                "*** Freeing segment at {:p} using wrong alignment ({} vs. {}). ***",
                payload, diagnosis.deallocated_alignment, alignment
            );
        }
        if owner != header_ref.owner {
            println!("*** Freeing segment at {payload:p} from wrong allocator. ***");
        }
        if let Some(underrun_by) = diagnosis.underrun_by {
            println!(
                "*** Memory corrupted at {underrun_by} bytes before {num_bytes} byte segment at {payload:p}. ***"
            );
            println!("Pad area before user segment:");
            format_block(unsafe { payload.as_ptr().sub(MAX_ALIGN) }, MAX_ALIGN);
        }
        if let Some(overrun_by) = diagnosis.overrun_by {
            println!(
                "*** Memory corrupted at {overrun_by} bytes after {num_bytes} byte segment at {payload:p}. ***"
            );
            println!("Pad area after user segment:");
            format_block(unsafe { payload.as_ptr().add(num_bytes) }, MAX_ALIGN);
        }
    }

    println!("Header:");
    format_block(header.as_ptr().cast::<u8>(), std::mem::size_of::<Header>());
    println!("User segment:");
    format_block(payload.as_ptr(), num_bytes.min(64));
}

/// Prints the diagnostic for a deallocate call on a null pointer with a
/// non-zero claimed size, the one malformed-parameter case a null pointer
/// can still report.
pub(crate) fn format_bad_bytes_for_nullptr(bytes: usize, alignment: usize) {
    println!("*** Freeing a nullptr using non-zero size ({bytes}) with alignment ({alignment}). ***");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_block_does_not_panic_on_partial_final_line() {
        let data = [0u8; 20];
        format_block(data.as_ptr(), data.len());
    }

    #[test]
    fn format_bad_bytes_for_nullptr_does_not_panic() {
        format_bad_bytes_for_nullptr(16, 8);
    }
}
