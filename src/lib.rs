//! # test-resource
//!
//! An instrumented, polymorphic memory resource for exercising
//! allocator-exception safety in tests.
//!
//! `TestResource` wraps an upstream [`MemoryResource`] — by default
//! [`SYSTEM_RESOURCE`], the process heap — and tracks every block it hands
//! out: how many are outstanding, how many bytes, the high-water marks, and
//! whether a deallocation's size, alignment, owner, or surrounding redzone
//! bytes still match what was allocated. It can also be told to fail the
//! `N`th allocation on demand, which [`exception_test_loop`] uses to drive a
//! test body through every possible allocation-failure point.
//!
//! ```
//! use test_resource::TestResource;
//!
//! let resource = TestResource::new().with_quiet(true);
//! let block = resource.allocate(64, 8).unwrap();
//! unsafe { resource.deallocate(block.as_ptr(), 64, 8) };
//! assert_eq!(resource.blocks_in_use(), 0);
//! ```
//!
//! ## Crate structure
//!
//! ```text
//!   test_resource
//!   ├── resource       - the MemoryResource trait and the system-heap fallback
//!   ├── header          - per-block header, magic numbers, redzones
//!   ├── list            - intrusive list of outstanding blocks
//!   ├── align            - alignment validation shared by header and resource
//!   ├── format           - stdout diagnostic formatting
//!   ├── errors           - the crate's error taxonomy
//!   ├── test_resource    - TestResource itself
//!   ├── monitor          - snapshot/delta observer
//!   ├── guard            - scoped process-wide default resource
//!   └── driver           - exception-test retry loop
//! ```
//!
//! ## Safety
//!
//! Most of this crate's unsafe surface is confined to `header` and `list`
//! and is not exposed past `TestResource`; the one unsafe entry point on
//! the public API is [`TestResource::deallocate`], whose safety contract is
//! documented there.

pub mod align;
mod driver;
mod errors;
mod format;
mod guard;
mod header;
mod list;
mod monitor;
mod resource;
mod test_resource;

pub use driver::{exception_test_loop, exception_test_loop_bounded, DriveError, RetriesExceeded};
pub use errors::TestResourceError;
pub use guard::{default_resource, DefaultResourceGuard};
pub use monitor::TestResourceMonitor;
pub use resource::{AllocError, MemoryResource, SystemResource, SYSTEM_RESOURCE};
pub use test_resource::TestResource;
