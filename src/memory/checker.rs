//! Bookkeeping of live allocations for catching overlaps and bad frees.

use std::collections::BTreeMap;

/// Tracks live `(address, size)` ranges. Each notification asserts the
/// allocator kept its contract: new ranges never overlap live ones, and
/// frees name exactly a live range.
#[derive(Debug, Default)]
pub struct AllocationChecker {
    live: BTreeMap<usize, usize>,
    live_bytes: usize,
}

impl AllocationChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh allocation. Panics if it overlaps a live range.
    pub fn notify_alloc(&mut self, addr: usize, size: usize) {
        assert!(size > 0, "zero-size allocation at {addr:#x}");
        if let Some((&prev, &prev_size)) = self.live.range(..=addr).next_back() {
            assert!(
                prev + prev_size <= addr,
                "allocation {addr:#x}+{size:#x} overlaps live {prev:#x}+{prev_size:#x}"
            );
        }
        if let Some((&next, &next_size)) = self.live.range(addr..).next() {
            assert!(
                addr + size <= next,
                "allocation {addr:#x}+{size:#x} overlaps live {next:#x}+{next_size:#x}"
            );
        }
        self.live.insert(addr, size);
        self.live_bytes += size;
    }

    /// Record a free. Panics unless `(addr, size)` is a live allocation.
    pub fn notify_free(&mut self, addr: usize, size: usize) {
        match self.live.remove(&addr) {
            Some(recorded) => {
                assert_eq!(
                    recorded, size,
                    "free of {addr:#x} with size {size:#x}, allocated as {recorded:#x}"
                );
                self.live_bytes -= size;
            }
            None => panic!("double free or unknown pointer {addr:#x}"),
        }
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.live_bytes = 0;
    }

    /// Number of live allocations.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }
}
