//! A cheap snapshot/delta observer bound to one [`TestResource`].

use crate::TestResource;

/// Snapshots a resource's block counters and reports how they've moved
/// since. Never mutates or allocates.
///
/// Binding to a temporary resource is refused at compile time: the
/// constructor borrows `resource` for the monitor's own lifetime, so a
/// `TestResourceMonitor::new(&TestResource::new())` expression fails to
/// borrow-check rather than dangling at runtime as the deleted rvalue
/// overload in the source material would otherwise only catch in the one
/// case it special-cased.
pub struct TestResourceMonitor<'a> {
    resource: &'a TestResource,
    initial_in_use: i64,
    initial_max: i64,
    initial_total: i64,
}

impl<'a> TestResourceMonitor<'a> {
    /// Takes a snapshot of `resource`'s block counters.
    pub fn new(resource: &'a TestResource) -> Self {
        let mut monitor = Self {
            resource,
            initial_in_use: 0,
            initial_max: 0,
            initial_total: 0,
        };
        monitor.reset();
        monitor
    }

    /// Re-reads the snapshot from the current counter values.
    pub fn reset(&mut self) {
        self.initial_in_use = self.resource.blocks_in_use();
        self.initial_max = self.resource.max_blocks();
        self.initial_total = self.resource.total_blocks();
    }

    pub fn is_in_use_down(&self) -> bool {
        self.resource.blocks_in_use() < self.initial_in_use
    }

    pub fn is_in_use_same(&self) -> bool {
        self.resource.blocks_in_use() == self.initial_in_use
    }

    pub fn is_in_use_up(&self) -> bool {
        self.resource.blocks_in_use() > self.initial_in_use
    }

    pub fn is_max_same(&self) -> bool {
        self.resource.max_blocks() == self.initial_max
    }

    pub fn is_max_up(&self) -> bool {
        self.resource.max_blocks() != self.initial_max
    }

    pub fn is_total_same(&self) -> bool {
        self.resource.total_blocks() == self.initial_total
    }

    pub fn is_total_up(&self) -> bool {
        self.resource.total_blocks() != self.initial_total
    }

    pub fn delta_blocks_in_use(&self) -> i64 {
        self.resource.blocks_in_use() - self.initial_in_use
    }

    pub fn delta_max_blocks(&self) -> i64 {
        self.resource.max_blocks() - self.initial_max
    }

    pub fn delta_total_blocks(&self) -> i64 {
        self.resource.total_blocks() - self.initial_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_with_no_mutation_leaves_deltas_at_zero() {
        let resource = TestResource::new().with_quiet(true);
        let mut monitor = TestResourceMonitor::new(&resource);
        monitor.reset();
        assert_eq!(monitor.delta_blocks_in_use(), 0);
        assert_eq!(monitor.delta_max_blocks(), 0);
        assert_eq!(monitor.delta_total_blocks(), 0);
        assert!(monitor.is_in_use_same());
        assert!(monitor.is_total_same());
    }

    #[test]
    fn monitor_observes_allocation() {
        let resource = TestResource::new().with_quiet(true);
        let first = resource.allocate(8, 8).unwrap();
        let monitor = TestResourceMonitor::new(&resource);
        let second = resource.allocate(8, 8).unwrap();

        assert!(monitor.is_in_use_up());
        assert_eq!(monitor.delta_blocks_in_use(), 1);
        assert!(monitor.is_total_up());

        unsafe {
            resource.deallocate(first.as_ptr(), 8, 8);
            resource.deallocate(second.as_ptr(), 8, 8);
        }
    }
}
