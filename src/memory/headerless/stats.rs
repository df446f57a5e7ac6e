//! Allocation statistics for the headerless allocator.

use serde::Serialize;

/// Point-in-time counters. `free_*` mirror the free-block index;
/// `total_*` are lifetime counts since construction or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub total_allocs: u64,
    pub total_deallocs: u64,
}

impl AllocatorStats {
    pub(super) fn on_allocate(&mut self, size: usize) {
        self.allocated_blocks += 1;
        self.allocated_bytes += size;
        self.total_allocs += 1;
    }

    pub(super) fn on_deallocate(&mut self, size: usize) {
        debug_assert!(self.allocated_blocks > 0 && self.allocated_bytes >= size);
        self.allocated_blocks -= 1;
        self.allocated_bytes -= size;
        self.total_deallocs += 1;
    }

    pub(super) fn on_add_free(&mut self, size: usize) {
        self.free_blocks += 1;
        self.free_bytes += size;
    }

    pub(super) fn on_remove_free(&mut self, size: usize) {
        self.free_blocks -= 1;
        self.free_bytes -= size;
    }
}
