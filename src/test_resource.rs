//! The instrumented resource itself.
//!
//! Wraps an arbitrary upstream [`MemoryResource`] behind a mutex-serialized
//! header-before-payload allocation scheme with intrusive-list bookkeeping
//! of every outstanding block.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use crate::align;
use crate::errors::TestResourceError;
use crate::format::{format_bad_bytes_for_nullptr, format_invalid_block, Diagnosis};
use crate::header::{Header, MAGIC_ALLOCATED, MAGIC_DEALLOCATED};
use crate::list::List;
use crate::resource::{AllocError, MemoryResource, SYSTEM_RESOURCE};

const RELAXED: Ordering = Ordering::Relaxed;

/// An allocator wrapper that records per-block statistics, validates every
/// block's redzones at deallocation time, and can inject deterministic
/// allocation failures.
///
/// # Identity and movement
///
/// Every live block's header stores the address of the `TestResource` that
/// allocated it, used later to validate that a deallocation is routed back
/// to the resource that produced the block. Like the C++ source (which
/// deletes the copy constructor and, owning a `std::mutex`, has no implicit
/// move constructor either), a `TestResource` must not be moved once any
/// allocation has been made through it — construct it where it will live
/// (a local variable, a `Box`, a struct field) and interact with it only
/// through `&TestResource` thereafter.
pub struct TestResource {
    name: String,
    upstream: &'static dyn MemoryResource,

    verbose: AtomicBool,
    quiet: AtomicBool,
    no_abort: AtomicBool,
    allocation_limit: AtomicI64,

    allocate_calls: AtomicI64,
    deallocate_calls: AtomicI64,
    allocations: AtomicI64,
    deallocations: AtomicI64,
    mismatches: AtomicI64,
    bounds_errors: AtomicI64,
    bad_deallocate_params: AtomicI64,

    blocks_in_use: AtomicI64,
    max_blocks: AtomicI64,
    total_blocks: AtomicI64,
    bytes_in_use: AtomicI64,
    max_bytes: AtomicI64,
    total_bytes: AtomicI64,

    last_allocated_address: std::sync::atomic::AtomicUsize,
    last_allocated_num_bytes: std::sync::atomic::AtomicUsize,
    last_allocated_alignment: std::sync::atomic::AtomicUsize,
    last_deallocated_address: std::sync::atomic::AtomicUsize,
    last_deallocated_num_bytes: std::sync::atomic::AtomicUsize,
    last_deallocated_alignment: std::sync::atomic::AtomicUsize,

    /// Guards the intrusive list *and* serializes the mutation path
    /// (allocate, deallocate, print, destructor cleanup) as a unit, exactly
    /// as the single `std::mutex m_lock` does in the source.
    list: Mutex<List>,
}

impl Default for TestResource {
    fn default() -> Self {
        Self::new()
    }
}

impl TestResource {
    /// A new, unnamed, non-verbose resource backed by [`SYSTEM_RESOURCE`].
    pub fn new() -> Self {
        Self::with_name_and_upstream(String::new(), &SYSTEM_RESOURCE)
    }

    /// A new resource named `name`, backed by [`SYSTEM_RESOURCE`].
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::with_name_and_upstream(name.into(), &SYSTEM_RESOURCE)
    }

    /// A new, unnamed resource backed by `upstream`.
    pub fn with_upstream(upstream: &'static dyn MemoryResource) -> Self {
        Self::with_name_and_upstream(String::new(), upstream)
    }

    fn with_name_and_upstream(name: String, upstream: &'static dyn MemoryResource) -> Self {
        tracing::debug!(resource = %name, "constructing test_resource");
        Self {
            name,
            upstream,
            verbose: AtomicBool::new(false),
            quiet: AtomicBool::new(false),
            no_abort: AtomicBool::new(false),
            allocation_limit: AtomicI64::new(-1),
            allocate_calls: AtomicI64::new(0),
            deallocate_calls: AtomicI64::new(0),
            allocations: AtomicI64::new(0),
            deallocations: AtomicI64::new(0),
            mismatches: AtomicI64::new(0),
            bounds_errors: AtomicI64::new(0),
            bad_deallocate_params: AtomicI64::new(0),
            blocks_in_use: AtomicI64::new(0),
            max_blocks: AtomicI64::new(0),
            total_blocks: AtomicI64::new(0),
            bytes_in_use: AtomicI64::new(0),
            max_bytes: AtomicI64::new(0),
            total_bytes: AtomicI64::new(0),
            last_allocated_address: Default::default(),
            last_allocated_num_bytes: Default::default(),
            last_allocated_alignment: Default::default(),
            last_deallocated_address: Default::default(),
            last_deallocated_num_bytes: Default::default(),
            last_deallocated_alignment: Default::default(),
            list: Mutex::new(List::new()),
        }
    }

    /// Builder-style setter, for `let r = TestResource::new().with_verbose(true);`.
    pub fn with_verbose(self, verbose: bool) -> Self {
        self.set_verbose(verbose);
        self
    }

    /// Builder-style setter for `quiet` mode (suppresses the leak report and
    /// corruption diagnostics, but never the counters they'd otherwise
    /// explain).
    pub fn with_quiet(self, quiet: bool) -> Self {
        self.set_quiet(quiet);
        self
    }

    /// Builder-style setter for `no_abort` mode.
    pub fn with_no_abort(self, no_abort: bool) -> Self {
        self.set_no_abort(no_abort);
        self
    }

    // -- configuration ----------------------------------------------------

    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, RELAXED);
    }

    pub fn set_quiet(&self, quiet: bool) {
        self.quiet.store(quiet, RELAXED);
    }

    pub fn set_no_abort(&self, no_abort: bool) {
        self.no_abort.store(no_abort, RELAXED);
    }

    pub fn set_allocation_limit(&self, limit: i64) {
        self.allocation_limit.store(limit, RELAXED);
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(RELAXED)
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet.load(RELAXED)
    }

    pub fn is_no_abort(&self) -> bool {
        self.no_abort.load(RELAXED)
    }

    pub fn allocation_limit(&self) -> i64 {
        self.allocation_limit.load(RELAXED)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upstream_resource(&self) -> &'static dyn MemoryResource {
        self.upstream
    }

    /// A stable, opaque address identifying this resource, usable to
    /// compare with [`TestResourceError::InjectedOom::originating`].
    pub fn identity(&self) -> usize {
        (self as *const TestResource) as usize
    }

    // -- counters -----------------------------------------------------------

    pub fn allocations(&self) -> i64 {
        self.allocations.load(RELAXED)
    }

    pub fn deallocations(&self) -> i64 {
        self.deallocations.load(RELAXED)
    }

    pub fn blocks_in_use(&self) -> i64 {
        self.blocks_in_use.load(RELAXED)
    }

    pub fn max_blocks(&self) -> i64 {
        self.max_blocks.load(RELAXED)
    }

    pub fn total_blocks(&self) -> i64 {
        self.total_blocks.load(RELAXED)
    }

    pub fn bytes_in_use(&self) -> i64 {
        self.bytes_in_use.load(RELAXED)
    }

    pub fn max_bytes(&self) -> i64 {
        self.max_bytes.load(RELAXED)
    }

    pub fn total_bytes(&self) -> i64 {
        self.total_bytes.load(RELAXED)
    }

    pub fn mismatches(&self) -> i64 {
        self.mismatches.load(RELAXED)
    }

    pub fn bounds_errors(&self) -> i64 {
        self.bounds_errors.load(RELAXED)
    }

    pub fn bad_deallocate_params(&self) -> i64 {
        self.bad_deallocate_params.load(RELAXED)
    }

    pub fn last_allocated_address(&self) -> *const () {
        self.last_allocated_address.load(RELAXED) as *const ()
    }

    pub fn last_allocated_num_bytes(&self) -> usize {
        self.last_allocated_num_bytes.load(RELAXED)
    }

    pub fn last_allocated_alignment(&self) -> usize {
        self.last_allocated_alignment.load(RELAXED)
    }

    pub fn last_deallocated_address(&self) -> *const () {
        self.last_deallocated_address.load(RELAXED) as *const ()
    }

    pub fn last_deallocated_num_bytes(&self) -> usize {
        self.last_deallocated_num_bytes.load(RELAXED)
    }

    pub fn last_deallocated_alignment(&self) -> usize {
        self.last_deallocated_alignment.load(RELAXED)
    }

    pub fn has_errors(&self) -> bool {
        self.mismatches() != 0 || self.bounds_errors() != 0 || self.bad_deallocate_params() != 0
    }

    pub fn has_allocations(&self) -> bool {
        self.blocks_in_use() > 0 || self.bytes_in_use() > 0
    }

    /// `0` if clean, the positive error count if any errors were recorded,
    /// `-1` if no errors were recorded but blocks or bytes are still
    /// outstanding.
    pub fn status(&self) -> i64 {
        let _guard = self.list.lock().unwrap();
        let errors = self.mismatches() + self.bounds_errors() + self.bad_deallocate_params();
        if errors > 0 {
            errors
        } else if self.has_allocations() {
            -1
        } else {
            0
        }
    }

    // -- allocation ---------------------------------------------------------

    /// Requests `bytes` bytes aligned to `alignment`.
    pub fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, TestResourceError> {
        self.allocate_calls.fetch_add(1, RELAXED);

        if !align::is_valid_alignment(alignment) {
            return Err(TestResourceError::BadAlignment { alignment });
        }

        let mut list = self.list.lock().unwrap();

        let limit = self.allocation_limit.load(RELAXED);
        if limit >= 0 {
            let remaining = self.allocation_limit.fetch_add(-1, RELAXED) - 1;
            if remaining < 0 {
                return Err(TestResourceError::InjectedOom {
                    originating: self.identity(),
                    bytes,
                    alignment,
                });
            }
        }

        let total = Header::total_size(bytes);
        let request_layout =
            Layout::from_size_align(total, Header::layout().align()).expect("header size/align are always valid");
        let raw = self.upstream.allocate(request_layout).map_err(TestResourceError::Upstream)?;
        let header = raw.cast::<Header>();

        // Tentative only: not committed with `fetch_add` until `push_back`
        // below actually succeeds, so a failed list-node allocation never
        // burns an index or perturbs `allocations`.
        let index = self.allocations.load(RELAXED);

        let node = match list.push_back(self.upstream, index) {
            Ok(node) => node,
            Err(AllocError) => {
                unsafe { self.upstream.deallocate(header.cast(), request_layout) };
                return Err(TestResourceError::Upstream(AllocError));
            }
        };
        self.allocations.fetch_add(1, RELAXED);

        self.last_allocated_num_bytes.store(bytes, RELAXED);
        self.last_allocated_alignment.store(alignment, RELAXED);

        unsafe {
            header.as_ptr().write(Header::new(
                bytes,
                alignment,
                index,
                node,
                self as *const TestResource as *const (),
            ));
        }

        // Written only after the header struct itself, since the header's
        // trailing padding field occupies the same bytes as the leading
        // redzone; writing the redzones first would be clobbered by this
        // header write. The upstream block is otherwise not pre-zeroed, so
        // only the redzones and the header fields are ever initialized.
        let payload = unsafe { Header::payload(header) };
        unsafe { Header::write_redzones(payload, bytes) };

        self.blocks_in_use.fetch_add(1, RELAXED);
        self.max_blocks.fetch_max(self.blocks_in_use.load(RELAXED), RELAXED);
        self.total_blocks.fetch_add(1, RELAXED);

        self.bytes_in_use.fetch_add(bytes as i64, RELAXED);
        self.max_bytes.fetch_max(self.bytes_in_use.load(RELAXED), RELAXED);
        self.total_bytes.fetch_add(bytes as i64, RELAXED);

        self.last_allocated_address.store(payload.as_ptr() as usize, RELAXED);

        if self.is_verbose() {
            let noun = if bytes == 1 { "byte " } else { "bytes " };
            if self.name.is_empty() {
                println!("test_resource [{index}]: Allocated {bytes} {noun}(aligned {alignment}) at {payload:p}.");
            } else {
                println!(
                    "test_resource {} [{index}]: Allocated {bytes} {noun}(aligned {alignment}) at {payload:p}.",
                    self.name
                );
            }
        }

        Ok(payload)
    }

    /// Returns `ptr` (a pointer previously returned by
    /// [`TestResource::allocate`] with the same `bytes`/`alignment`) to the
    /// upstream resource.
    ///
    /// `ptr` may be null, matching `void*` deallocate semantics: null with
    /// `bytes == 0` is a no-op (aside from recording the last-deallocated
    /// trio); null with `bytes != 0` is itself a malformed-parameter error,
    /// reported the same way a corrupted non-null block would be.
    ///
    /// Never panics or raises; a mismatched, corrupted, or foreign pointer
    /// is recorded in the mismatch/bounds/param-error counters, reported on
    /// `stdout`, and the process aborts unless this resource is configured
    /// `no_abort` (or `quiet`, which additionally silences the report).
    ///
    /// # Safety
    ///
    /// If `ptr` is null, this call is always safe. If `ptr` genuinely was
    /// produced by a prior `allocate` call on *some* `TestResource` with a
    /// still-live allocation, this call is safe regardless of which
    /// resource or parameters are passed — that mismatch is exactly what
    /// this method detects. If `ptr` is non-null and not a pointer this
    /// crate ever handed out at all (never allocated by any `TestResource`),
    /// behavior is undefined, since the header lookup reads memory that was
    /// never guaranteed to exist.
    pub unsafe fn deallocate(&self, ptr: *mut u8, bytes: usize, alignment: usize) {
        self.deallocate_calls.fetch_add(1, RELAXED);
        self.last_deallocated_address.store(ptr as usize, RELAXED);

        let Some(ptr) = NonNull::new(ptr) else {
            if bytes != 0 {
                self.bad_deallocate_params.fetch_add(1, RELAXED);
                if !self.is_quiet() {
                    format_bad_bytes_for_nullptr(bytes, alignment);
                    if !self.is_no_abort() {
                        std::process::abort();
                    }
                }
            } else {
                self.last_deallocated_num_bytes.store(0, RELAXED);
                self.last_deallocated_alignment.store(alignment, RELAXED);
            }
            return;
        };

        let mut list = self.list.lock().unwrap();
        self.deallocate_locked(&mut list, ptr, bytes, alignment);
    }

    fn deallocate_locked(&self, list: &mut List, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        let header = unsafe { Header::from_payload(ptr) };
        let header_ref = unsafe { header.as_ref() };

        let owner = self as *const TestResource as *const ();

        let magic = header_ref.magic;
        let mut misc_error = false;
        let mut size = 0usize;

        if magic != MAGIC_ALLOCATED {
            misc_error = true;
        } else if header_ref.owner != owner {
            misc_error = true;
        } else {
            size = header_ref.bytes;
        }

        let (underrun_by, overrun_by, param_error) = if !misc_error {
            let underrun_by = unsafe { Header::check_underrun(ptr) };
            let overrun_by = if underrun_by.is_none() {
                unsafe { Header::check_overrun(ptr, size) }
            } else {
                None
            };
            let param_error = bytes != size || alignment != header_ref.alignment;
            (underrun_by, overrun_by, param_error)
        } else {
            (None, None, false)
        };

        if !misc_error && underrun_by.is_none() && overrun_by.is_none() && !param_error {
            unsafe { list.remove(header_ref.node) };
            let node_layout = Layout::new::<crate::list::ListNode>();
            unsafe { self.upstream.deallocate(header_ref.node.cast(), node_layout) };

            self.last_deallocated_num_bytes.store(size, RELAXED);
            self.last_deallocated_alignment.store(alignment, RELAXED);

            self.blocks_in_use.fetch_add(-1, RELAXED);
            self.bytes_in_use.fetch_add(-(size as i64), RELAXED);

            unsafe {
                (*header.as_ptr()).magic = MAGIC_DEALLOCATED;
                Header::scribble(ptr, size);
            }

            let index = header_ref.index;
            if self.is_verbose() {
                let noun = if size == 1 { "byte " } else { "bytes " };
                if self.name.is_empty() {
                    println!("test_resource [{index}]: Deallocated {size} {noun}(aligned {alignment}) at {ptr:p}.");
                } else {
                    println!(
                        "test_resource {} [{index}]: Deallocated {size} {noun}(aligned {alignment}) at {ptr:p}.",
                        self.name
                    );
                }
            }

            self.deallocations.fetch_add(1, RELAXED);

            let total_layout = Layout::from_size_align(Header::total_size(size), Header::layout().align())
                .expect("header size/align are always valid");
            unsafe { self.upstream.deallocate(header.cast(), total_layout) };
        } else {
            if misc_error {
                self.mismatches.fetch_add(1, RELAXED);
            }
            if param_error {
                self.bad_deallocate_params.fetch_add(1, RELAXED);
            }
            if underrun_by.is_some() || overrun_by.is_some() {
                self.bounds_errors.fetch_add(1, RELAXED);
            }

            if !self.is_quiet() {
                let diagnosis = Diagnosis {
                    deallocated_bytes: bytes,
                    deallocated_alignment: alignment,
                    underrun_by,
                    overrun_by,
                };
                unsafe { format_invalid_block(header, owner, &diagnosis) };
                if !self.is_no_abort() {
                    std::process::abort();
                }
            }
        }
    }

    /// Prints the fixed 11-line state table, followed by the indices of any
    /// outstanding allocations, 8 per line.
    pub fn print(&self) {
        let list = self.list.lock().unwrap();

        if self.name.is_empty() {
            println!(
                "\n==================================================\n                TEST RESOURCE STATE\n--------------------------------------------------"
            );
        } else {
            println!(
                "\n==================================================\n                TEST RESOURCE {} STATE\n--------------------------------------------------",
                self.name
            );
        }

        println!(
            "        Category\tBlocks\tBytes\n        --------\t------\t-----\n          IN USE\t{}\t{}\n             MAX\t{}\t{}\n           TOTAL\t{}\t{}\n      MISMATCHES\t{}\n   BOUNDS ERRORS\t{}\n   PARAM. ERRORS\t{}\n--------------------------------------------------",
            self.blocks_in_use(),
            self.bytes_in_use(),
            self.max_blocks(),
            self.max_bytes(),
            self.total_blocks(),
            self.total_bytes(),
            self.mismatches(),
            self.bounds_errors(),
            self.bad_deallocate_params(),
        );

        if !list.is_empty() {
            println!(" Indices of Outstanding Memory Allocations:");
            let indices = list.indices();
            for chunk in indices.chunks(8) {
                let line: String = chunk.iter().map(|i| format!("{i}\t")).collect();
                println!(" {line}");
            }
        }
    }
}

impl MemoryResource for TestResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        match TestResource::allocate(self, layout.size(), layout.align()) {
            Ok(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, layout.size())),
            Err(_) => Err(AllocError),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { TestResource::deallocate(self, ptr.as_ptr(), layout.size(), layout.align()) }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        std::ptr::eq(
            (self as *const TestResource).cast::<()>(),
            (other as *const dyn MemoryResource).cast::<()>(),
        )
    }
}

impl Drop for TestResource {
    fn drop(&mut self) {
        if self.is_verbose() {
            self.print();
        }

        for index in self.list.lock().unwrap().indices() {
            tracing::warn!(resource = %self.name, index, "block still outstanding at resource teardown");
        }

        if !self.is_quiet() && self.has_allocations() {
            if self.name.is_empty() {
                println!(
                    "MEMORY_LEAK:\n  Number of blocks in use = {}\n   Number of bytes in use = {}",
                    self.blocks_in_use(),
                    self.bytes_in_use()
                );
            } else {
                println!(
                    "MEMORY_LEAK from {}:\n  Number of blocks in use = {}\n   Number of bytes in use = {}",
                    self.name,
                    self.blocks_in_use(),
                    self.bytes_in_use()
                );
            }
            tracing::warn!(resource = %self.name, blocks = self.blocks_in_use(), bytes = self.bytes_in_use(), "memory leak detected");
            if !self.is_no_abort() {
                std::process::abort();
            }
        }
    }
}

// SAFETY: all mutable state is behind atomics or the `list` mutex.
unsafe impl Send for TestResource {}
unsafe impl Sync for TestResource {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::MAX_ALIGN;

    #[test]
    fn basic_accounting_round_trips() {
        let r = TestResource::new().with_quiet(true);
        let a = r.allocate(64, 8).unwrap();
        let b = r.allocate(64, 8).unwrap();

        assert_eq!(r.blocks_in_use(), 2);
        assert_eq!(r.bytes_in_use(), 128);
        assert_eq!(r.allocations(), 2);
        assert_eq!(r.max_blocks(), 2);
        assert_eq!(r.total_blocks(), 2);

        unsafe {
            r.deallocate(a.as_ptr(), 64, 8);
            r.deallocate(b.as_ptr(), 64, 8);
        }

        assert_eq!(r.blocks_in_use(), 0);
        assert_eq!(r.bytes_in_use(), 0);
        assert_eq!(r.deallocations(), 2);
        assert_eq!(r.total_blocks(), 2);
        assert_eq!(r.status(), 0);
    }

    #[test]
    fn injection_limit_fails_allocation() {
        let r = TestResource::new().with_quiet(true);
        r.set_allocation_limit(0);
        let err = r.allocate(16, 8).unwrap_err();
        assert!(matches!(err, TestResourceError::InjectedOom { .. }));
    }

    #[test]
    fn bad_alignment_is_rejected() {
        let r = TestResource::new().with_quiet(true);
        let err = r.allocate(16, 3).unwrap_err();
        assert!(matches!(err, TestResourceError::BadAlignment { alignment: 3 }));

        let err = r.allocate(16, MAX_ALIGN * 2).unwrap_err();
        assert!(matches!(err, TestResourceError::BadAlignment { .. }));
    }

    #[test]
    fn redzone_overrun_is_detected_and_counted() {
        let r = TestResource::new().with_quiet(true).with_no_abort(true);
        let ptr = r.allocate(32, 8).unwrap();
        unsafe {
            *ptr.as_ptr().add(32) = 0x00;
            r.deallocate(ptr.as_ptr(), 32, 8);
        }
        assert_eq!(r.bounds_errors(), 1);
    }

    #[test]
    fn cross_resource_deallocate_is_a_mismatch() {
        let r1 = TestResource::new().with_quiet(true);
        let r2 = TestResource::new().with_quiet(true).with_no_abort(true);

        let ptr = r1.allocate(16, 8).unwrap();
        unsafe { r2.deallocate(ptr.as_ptr(), 16, 8) };

        assert_eq!(r2.mismatches(), 1);
        assert_eq!(r1.mismatches(), 0);
        assert_eq!(r1.blocks_in_use(), 1);

        unsafe { r1.deallocate(ptr.as_ptr(), 16, 8) };
        assert_eq!(r1.blocks_in_use(), 0);
    }

    #[test]
    fn zero_byte_allocation_is_not_special_cased() {
        let r = TestResource::new().with_quiet(true);
        let ptr = r.allocate(0, 8).unwrap();
        assert_eq!(r.blocks_in_use(), 1);
        unsafe { r.deallocate(ptr.as_ptr(), 0, 8) };
        assert_eq!(r.blocks_in_use(), 0);
        assert_eq!(r.status(), 0);
    }

    #[test]
    fn wrong_size_on_deallocate_is_a_param_error() {
        let r = TestResource::new().with_quiet(true).with_no_abort(true);
        let ptr = r.allocate(16, 8).unwrap();
        unsafe { r.deallocate(ptr.as_ptr(), 32, 8) };
        assert_eq!(r.bad_deallocate_params(), 1);
    }

    #[test]
    fn status_reports_leak_when_no_errors_recorded() {
        let r = TestResource::new().with_quiet(true);
        let _leaked = r.allocate(8, 8).unwrap();
        assert_eq!(r.status(), -1);
    }

    #[test]
    fn allocations_are_linearizable_across_threads() {
        let r = TestResource::new().with_quiet(true);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..64 {
                        let ptr = r.allocate(16, 8).unwrap();
                        unsafe { r.deallocate(ptr.as_ptr(), 16, 8) };
                    }
                });
            }
        });
        assert_eq!(r.allocations(), 8 * 64);
        assert_eq!(r.deallocations(), 8 * 64);
        assert_eq!(r.blocks_in_use(), 0);
        assert_eq!(r.status(), 0);
    }

    #[test]
    fn failed_list_node_insertion_does_not_perturb_allocations() {
        // `allocate` only commits the `allocations` counter and the index
        // it handed out after `list.push_back` succeeds, so a resource that
        // never gets past the upstream block allocation leaves no trace in
        // the totals. This can't be forced without a failing upstream, so
        // this test only pins the ordering the other tests assume: the
        // index handed to a verbose trace is the post-commit value.
        let r = TestResource::new().with_quiet(true);
        let a = r.allocate(8, 8).unwrap();
        assert_eq!(r.allocations(), 1);
        unsafe { r.deallocate(a.as_ptr(), 8, 8) };
    }

    #[test]
    fn deallocating_a_null_pointer_with_zero_bytes_is_a_noop() {
        let r = TestResource::new().with_quiet(true);
        unsafe { r.deallocate(std::ptr::null_mut(), 0, 8) };
        assert_eq!(r.bad_deallocate_params(), 0);
        assert_eq!(r.last_deallocated_num_bytes(), 0);
        assert_eq!(r.last_deallocated_alignment(), 8);
    }

    #[test]
    fn deallocating_a_null_pointer_with_nonzero_bytes_is_a_param_error() {
        let r = TestResource::new().with_quiet(true).with_no_abort(true);
        unsafe { r.deallocate(std::ptr::null_mut(), 16, 8) };
        assert_eq!(r.bad_deallocate_params(), 1);
    }

    #[test]
    fn is_equal_distinguishes_resources_through_a_trait_object() {
        let r1 = TestResource::new().with_quiet(true);
        let r2 = TestResource::new().with_quiet(true);

        let d1: &dyn MemoryResource = &r1;
        let d2: &dyn MemoryResource = &r2;
        assert!(d1.is_equal(d1));
        assert!(!d1.is_equal(d2));
    }

    #[test]
    fn tracing_output_is_visible_under_a_subscriber() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let r = TestResource::new().with_quiet(true);
        let leaked = r.allocate(8, 8).unwrap();
        unsafe { r.deallocate(leaked.as_ptr(), 8, 8) };
    }
}
