//! Errors a [`crate::TestResource`] can raise synchronously from `allocate`.
//!
//! Deallocation errors never appear here: per the error-handling design,
//! they are recorded in counters and printed to `stdout`, not propagated as
//! `Result::Err` (see [`crate::TestResource::deallocate`]).

use crate::resource::AllocError;

/// A synchronous failure from [`crate::TestResource::allocate`].
#[derive(thiserror::Error, Debug)]
pub enum TestResourceError {
    /// The requested alignment exceeds the platform's maximum scalar
    /// alignment ([`crate::align::MAX_ALIGN`]). Over-aligned requests are
    /// out of scope for this resource.
    #[error("alignment {alignment} exceeds the maximum scalar alignment ({})", crate::align::MAX_ALIGN)]
    BadAlignment {
        /// The alignment the caller requested.
        alignment: usize,
    },

    /// The resource's allocation-count limit was reached; this is a
    /// cooperative, test-only fault, not a real out-of-memory condition.
    #[error("test_resource allocation limit exhausted (requested {bytes} bytes, align {alignment})")]
    InjectedOom {
        /// Identity of the `TestResource` that raised the fault, as an
        /// opaque address; compare with
        /// [`crate::TestResource::identity`].
        originating: usize,
        /// The size of the allocation that was about to be attempted.
        bytes: usize,
        /// The alignment of the allocation that was about to be attempted.
        alignment: usize,
    },

    /// The upstream resource failed to satisfy the request; propagated
    /// unchanged.
    #[error(transparent)]
    Upstream(#[from] AllocError),
}
