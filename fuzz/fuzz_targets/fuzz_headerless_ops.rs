//! Fuzz target for headerless allocator operation sequences.
//!
//! Arbitrary allocate/deallocate/reset sequences must never hand out
//! overlapping blocks or leave the free lists inconsistent.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use zcio::memory::{HeaderlessAllocator, ALLOCATION_ALIGNMENT, MIN_ALLOCATION_SIZE};

const POOL_SIZE: usize = 0x10_0000;

#[derive(Debug, Arbitrary)]
enum Op {
    Allocate(u16),
    Deallocate(u8),
    Reset,
}

fuzz_target!(|ops: Vec<Op>| {
    let Ok(mut allocator) = HeaderlessAllocator::new(POOL_SIZE) else {
        return;
    };
    let mut live: Vec<(std::ptr::NonNull<u8>, usize)> = Vec::new();

    for op in ops {
        match op {
            Op::Allocate(units) => {
                let size = MIN_ALLOCATION_SIZE + units as usize * ALLOCATION_ALIGNMENT;
                if let Some(p) = allocator.allocate(size) {
                    let start = p.as_ptr() as usize;
                    for &(q, s) in &live {
                        let other = q.as_ptr() as usize;
                        assert!(start + size <= other || other + s <= start, "overlap");
                    }
                    unsafe { p.as_ptr().write_bytes(0xAB, size) };
                    live.push((p, size));
                }
            }
            Op::Deallocate(index) => {
                if !live.is_empty() {
                    let (p, size) = live.swap_remove(index as usize % live.len());
                    unsafe { allocator.deallocate(p, size) };
                }
            }
            Op::Reset => {
                allocator.reset();
                live.clear();
            }
        }
    }
    assert_eq!(allocator.validate(), Ok(()));
    assert_eq!(allocator.stats().allocated_blocks, live.len());
});
