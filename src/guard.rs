//! Scoped installer of the process-wide default memory resource.

use std::sync::Mutex;

use crate::resource::{MemoryResource, SYSTEM_RESOURCE};

static DEFAULT_RESOURCE: Mutex<Option<&'static dyn MemoryResource>> = Mutex::new(None);

/// The current process-wide default resource, or [`SYSTEM_RESOURCE`] if
/// none has been installed.
pub fn default_resource() -> &'static dyn MemoryResource {
    DEFAULT_RESOURCE.lock().unwrap().unwrap_or(&SYSTEM_RESOURCE)
}

fn set_default_resource(new_default: &'static dyn MemoryResource) -> &'static dyn MemoryResource {
    let mut slot = DEFAULT_RESOURCE.lock().unwrap();
    let old = slot.unwrap_or(&SYSTEM_RESOURCE);
    *slot = Some(new_default);
    old
}

fn restore_default_resource(old: &'static dyn MemoryResource) {
    let mut slot = DEFAULT_RESOURCE.lock().unwrap();
    *slot = Some(old);
}

/// Installs `new_default` as the process-wide default resource for the
/// guard's lifetime, restoring whatever was installed before on drop.
///
/// Neither copyable nor movable, matching the source's deleted copy
/// constructor (there's no copy trait to implement in the first place, and
/// moving the guard out from under an active installation would break the
/// LIFO discipline below, so `Drop` is what enforces the "scoped" part of
/// scoped installer).
///
/// This implementation additionally checks that the slot still holds what
/// this guard installed when it goes to restore the old value. A `drop`
/// that finds the slot was changed out from under it panics in
/// non-release builds and otherwise still restores the caller's `old`
/// value, since a corrupted stack of installers cannot be made consistent
/// by any other rule.
pub struct DefaultResourceGuard {
    installed: *const dyn MemoryResource,
    old: &'static dyn MemoryResource,
}

impl DefaultResourceGuard {
    /// Installs `new_default` as the process-wide default.
    pub fn new(new_default: &'static dyn MemoryResource) -> Self {
        let old = set_default_resource(new_default);
        Self {
            installed: new_default as *const dyn MemoryResource,
            old,
        }
    }
}

impl Drop for DefaultResourceGuard {
    fn drop(&mut self) {
        let current = DEFAULT_RESOURCE.lock().unwrap().map(|r| r as *const dyn MemoryResource);
        let still_current = current == Some(self.installed);
        debug_assert!(
            still_current,
            "default_resource_guard dropped out of LIFO order: \
             another guard installed a different resource since this one ran"
        );
        restore_default_resource(self.old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_guards_restore_lifo() {
        static A: crate::resource::SystemResource = crate::resource::SystemResource;
        static B: crate::resource::SystemResource = crate::resource::SystemResource;

        let before = default_resource() as *const dyn MemoryResource;
        {
            let _outer = DefaultResourceGuard::new(&A);
            {
                let _inner = DefaultResourceGuard::new(&B);
                assert!(std::ptr::eq(default_resource(), &B as &dyn MemoryResource));
            }
            assert!(std::ptr::eq(default_resource(), &A as &dyn MemoryResource));
        }
        assert_eq!(default_resource() as *const dyn MemoryResource, before);
    }
}
