//! The host-supplied polymorphic memory resource contract.
//!
//! Rust has no standard equivalent of C++'s `std::pmr::memory_resource`, so
//! this module supplies the minimal version of it that the rest of the
//! crate treats as an external, given abstraction: `allocate`, `deallocate`,
//! and `is_equal`. [`SystemResource`] is the process-wide malloc/free-backed
//! fallback used whenever a [`crate::TestResource`] is not given an explicit
//! upstream.

use std::alloc::Layout;
use std::any::Any;
use std::ptr::NonNull;

/// Allocation failed upstream. Carries no detail beyond that fact, matching
/// `std::bad_alloc`'s role in the source material.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("upstream memory resource failed to satisfy the allocation request")]
pub struct AllocError;

/// A source of raw memory that can be swapped out at runtime.
///
/// Implementations must be thread-safe and `'static`: a resource may be
/// shared across threads and installed as the process-wide default for an
/// unbounded duration (directly, or transitively through a
/// [`crate::TestResource`] wrapping it).
pub trait MemoryResource: Send + Sync + 'static {
    /// Obtain a block of memory satisfying `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError>;

    /// Return a block previously obtained from [`MemoryResource::allocate`]
    /// on this same resource.
    ///
    /// # Safety
    ///
    /// `ptr` and `layout` must match a still-live allocation from this
    /// resource; this resource must not have already deallocated `ptr`.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Type-erased view of `self`, used by [`MemoryResource::is_equal`]
    /// overrides that need to recognize another instance of their own type
    /// (a singleton resource, say) rather than comparing addresses.
    fn as_any(&self) -> &dyn Any;

    /// True if `other` refers to the very same resource as `self`.
    ///
    /// The default implementation compares data-pointer identity, which is
    /// correct for any resource that is not itself a transparent proxy over
    /// another. The one case that needs overriding is a resource type with
    /// singleton semantics (see [`SystemResource::is_equal`]), where any two
    /// instances should compare equal.
    ///
    /// Takes `&dyn MemoryResource` rather than a generic `Self` bound so the
    /// method stays in the vtable and is callable through a trait object —
    /// every holder of a resource in this crate stores one as `&dyn
    /// MemoryResource`.
    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        std::ptr::eq(
            (self as *const Self).cast::<()>(),
            (other as *const dyn MemoryResource).cast::<()>(),
        )
    }
}

/// The process-wide malloc/free-backed resource used when no upstream is
/// supplied. Stateless; every instance (and the crate's single `'static`
/// instance in particular) compares equal to every other.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResource;

impl MemoryResource for SystemResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        // A zero-sized request still needs a distinguishable, well-aligned
        // pointer, so the system call always asks for at least one byte; the
        // caller-visible slice length is whatever `layout.size()` actually was.
        let request_size = layout.size().max(1);
        let request = Layout::from_size_align(request_size, layout.align()).map_err(|_| AllocError)?;
        let raw = unsafe { std::alloc::alloc(request) };
        let ptr = NonNull::new(raw).ok_or(AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let request_size = layout.size().max(1);
        let request =
            Layout::from_size_align(request_size, layout.align()).expect("layout was valid at allocation");
        unsafe { std::alloc::dealloc(ptr.as_ptr(), request) }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        other.as_any().downcast_ref::<SystemResource>().is_some()
    }
}

/// The crate-wide singleton [`SystemResource`], borrowed with `'static`
/// lifetime by any [`crate::TestResource`] that isn't given an explicit
/// upstream.
pub static SYSTEM_RESOURCE: SystemResource = SystemResource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_resource_round_trips_allocation() {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = SYSTEM_RESOURCE.allocate(layout).unwrap();
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr().cast::<u8>(), 0x42, 64);
            SYSTEM_RESOURCE.deallocate(ptr.cast(), layout);
        }
    }

    #[test]
    fn system_resource_handles_zero_sized_allocation() {
        let layout = Layout::from_size_align(0, 8).unwrap();
        let ptr = SYSTEM_RESOURCE.allocate(layout).unwrap();
        assert_eq!(ptr.len(), 0);
        unsafe { SYSTEM_RESOURCE.deallocate(ptr.cast(), layout) };
    }

    #[test]
    fn all_system_resource_instances_are_equal() {
        let other = SystemResource;
        assert!(SYSTEM_RESOURCE.is_equal(&other));
    }

    #[test]
    fn is_equal_is_reachable_through_a_trait_object() {
        let other = SystemResource;
        let dynamic: &dyn MemoryResource = &SYSTEM_RESOURCE;
        assert!(dynamic.is_equal(&other));
    }
}
