//! Alignment validation shared by the header and allocation paths.
//!
//! Generalizes the bit trick behind a fixed-size `align!` macro so the
//! alignment is a runtime parameter instead of a constant machine-word
//! size, since a [`crate::TestResource`] must honor whatever alignment the
//! caller's [`Layout`](std::alloc::Layout) asks for (up to [`MAX_ALIGN`]).

/// The platform's maximum scalar alignment (the Rust analogue of
/// `alignof(std::max_align_t)`). Allocations with a larger alignment are
/// rejected with `TestResourceError::BadAlignment`.
pub const MAX_ALIGN: usize = 16;

const _: () = assert!(MAX_ALIGN == std::mem::align_of::<u128>());

/// True if `align` is a power of two no greater than [`MAX_ALIGN`].
pub fn is_valid_alignment(align: usize) -> bool {
    align != 0 && align.is_power_of_two() && align <= MAX_ALIGN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_alignment_rejects_non_power_of_two_and_oversized() {
        assert!(is_valid_alignment(1));
        assert!(is_valid_alignment(8));
        assert!(is_valid_alignment(MAX_ALIGN));
        assert!(!is_valid_alignment(0));
        assert!(!is_valid_alignment(3));
        assert!(!is_valid_alignment(MAX_ALIGN * 2));
    }
}
