//! The intrusive doubly-linked list of outstanding allocations.
//!
//! Nodes are allocated from the upstream resource (never from the resource
//! being instrumented,
//! to avoid the list bookkeeping itself showing up in the statistics it
//! maintains) and linked with raw pointers, but all traversal is confined to
//! this module and only ever runs while the owning resource's mutex is
//! held — the unsafe surface does not leak past `TestResource`.

use std::ptr::NonNull;

use crate::resource::MemoryResource;

/// One outstanding allocation's position in the list.
pub(crate) struct ListNode {
    pub index: i64,
    next: Option<NonNull<ListNode>>,
    prev: Option<NonNull<ListNode>>,
}

/// Head/tail pair for the list of a single resource's outstanding blocks.
///
/// `head == None` iff `tail == None` iff the list is empty, maintained as
/// an invariant by [`List::push_back`] and [`List::remove`].
pub(crate) struct List {
    head: Option<NonNull<ListNode>>,
    tail: Option<NonNull<ListNode>>,
}

impl List {
    pub(crate) const fn new() -> Self {
        Self { head: None, tail: None }
    }

    pub(crate) fn is_empty(&self) -> bool {
        debug_assert_eq!(self.head.is_none(), self.tail.is_none());
        self.head.is_none()
    }

    /// Allocates a new node from `upstream`, links it at the tail, and
    /// returns it.
    pub(crate) fn push_back(
        &mut self,
        upstream: &dyn MemoryResource,
        index: i64,
    ) -> Result<NonNull<ListNode>, crate::resource::AllocError> {
        let layout = std::alloc::Layout::new::<ListNode>();
        let raw = upstream.allocate(layout)?.cast::<ListNode>();
        unsafe {
            raw.as_ptr().write(ListNode { index, next: None, prev: self.tail });
        }

        match self.tail {
            Some(mut tail) => unsafe {
                tail.as_mut().next = Some(raw);
            },
            None => self.head = Some(raw),
        }
        self.tail = Some(raw);

        Ok(raw)
    }

    /// Unlinks `node` from the list. Does not free it; the caller owns
    /// returning it to `upstream`.
    ///
    /// # Safety
    ///
    /// `node` must currently be linked into this list.
    pub(crate) unsafe fn remove(&mut self, node: NonNull<ListNode>) {
        unsafe {
            match node.as_ref().prev {
                Some(mut prev) => prev.as_mut().next = node.as_ref().next,
                None => self.head = node.as_ref().next,
            }
            match node.as_ref().next {
                Some(mut next) => next.as_mut().prev = node.as_ref().prev,
                None => self.tail = node.as_ref().prev,
            }
        }
    }

    /// The indices of every node currently linked, head to tail.
    pub(crate) fn indices(&self) -> Vec<i64> {
        let mut out = Vec::new();
        let mut cursor = self.head;
        while let Some(node) = cursor {
            let node_ref = unsafe { node.as_ref() };
            out.push(node_ref.index);
            cursor = node_ref.next;
        }
        out
    }
}

// SAFETY: a `List` is only ever touched while the owning resource's mutex
// is held, so exclusive access is already serialized by the caller.
unsafe impl Send for List {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::SYSTEM_RESOURCE;

    #[test]
    fn push_and_remove_maintain_order() {
        let mut list = List::new();
        assert!(list.is_empty());

        let a = list.push_back(&SYSTEM_RESOURCE, 0).unwrap();
        let b = list.push_back(&SYSTEM_RESOURCE, 1).unwrap();
        let c = list.push_back(&SYSTEM_RESOURCE, 2).unwrap();

        assert_eq!(list.indices(), vec![0, 1, 2]);

        unsafe { list.remove(b) };
        assert_eq!(list.indices(), vec![0, 2]);

        unsafe { list.remove(a) };
        assert_eq!(list.indices(), vec![2]);

        unsafe { list.remove(c) };
        assert!(list.is_empty());

        let layout = std::alloc::Layout::new::<ListNode>();
        unsafe {
            SYSTEM_RESOURCE.deallocate(a.cast(), layout);
            SYSTEM_RESOURCE.deallocate(b.cast(), layout);
            SYSTEM_RESOURCE.deallocate(c.cast(), layout);
        }
    }
}
