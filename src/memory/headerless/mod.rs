//! Headerless heap allocator.
//!
//! Allocated bytes carry no header: the caller passes the exact size back to
//! [`HeaderlessAllocator::deallocate`]. Free blocks are described by boundary
//! tags written into their own first and last bytes, indexed by segregated,
//! address-ordered free lists. Freeing coalesces with free neighbours found
//! by validating would-be tags at the adjacent addresses.

mod boundary;
mod freed_block;
mod segregated;
mod stats;

use std::ptr::NonNull;

use thiserror::Error;
use tracing::trace;

use super::pool::{Pool, POOL_VARIABLE_ALLOCS};
use super::vm::VmError;
use super::{ALLOCATION_ALIGNMENT, MIN_ALLOCATION_SIZE};
#[cfg(debug_assertions)]
use super::AllocationChecker;

use boundary::BoundaryTagManager;
use freed_block::{FreedBlock, HEADER_ID};
use segregated::{size_class, SegregatedRangeLists};
pub use stats::AllocatorStats;

/// Inconsistencies found by [`HeaderlessAllocator::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Corrupt boundary tag at {addr:#x}")]
    CorruptTag { addr: usize },

    #[error("Free block at {addr:#x} of size {size:#x} filed under class {class}")]
    WrongClass { addr: usize, size: usize, class: usize },

    #[error("Free list for class {class} not in address order at {addr:#x}")]
    Unordered { class: usize, addr: usize },

    #[error("Free block at {addr:#x} lies outside the pool")]
    OutOfBounds { addr: usize },

    #[error("Bitmap bit for class {class} disagrees with its list")]
    BitmapMismatch { class: usize },

    #[error("{what} mismatch: expected {expected}, found {actual}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Accounted bytes {accounted} exceed pool usage {used}")]
    Overcommitted { accounted: usize, used: usize },
}

/// Variable-size allocator over a reserved region. Sizes must be multiples
/// of [`ALLOCATION_ALIGNMENT`] and at least [`MIN_ALLOCATION_SIZE`].
pub struct HeaderlessAllocator {
    pool: Pool,
    segregated: SegregatedRangeLists,
    tags: BoundaryTagManager,
    stats: AllocatorStats,
    #[cfg(debug_assertions)]
    checker: AllocationChecker,
}

impl HeaderlessAllocator {
    /// Reserve `pool_size` bytes of address space to allocate from.
    pub fn new(pool_size: usize) -> Result<Self, VmError> {
        Ok(Self {
            pool: Pool::new(pool_size, POOL_VARIABLE_ALLOCS)?,
            segregated: SegregatedRangeLists::new(),
            tags: BoundaryTagManager::default(),
            stats: AllocatorStats::default(),
            #[cfg(debug_assertions)]
            checker: AllocationChecker::new(),
        })
    }

    /// Returns true if `size` satisfies the allocator's size contract.
    pub fn is_valid_size(size: usize) -> bool {
        size >= MIN_ALLOCATION_SIZE && size % ALLOCATION_ALIGNMENT == 0
    }

    fn normalize(size: usize) -> usize {
        debug_assert!(Self::is_valid_size(size), "invalid allocation size {size:#x}");
        size.max(MIN_ALLOCATION_SIZE).next_multiple_of(ALLOCATION_ALIGNMENT)
    }

    /// Allocate `size` bytes. Returns None when neither a free block nor the
    /// remaining pool can satisfy the request.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > self.pool.capacity() {
            return None;
        }
        let size = Self::normalize(size);
        let p = match self.take_and_split_free_block(size) {
            Some(p) => p,
            None => self.pool.alloc(size)?,
        };

        self.stats.on_allocate(size);
        #[cfg(debug_assertions)]
        self.checker.notify_alloc(p.as_ptr() as usize, size);
        trace!(addr = p.as_ptr() as usize, size, "allocate");
        self.debug_validate();
        Some(p)
    }

    /// Return `[ptr, ptr + size)` to the allocator, merging it with any free
    /// neighbours.
    ///
    /// # Safety
    /// `ptr` must come from [`Self::allocate`] on this allocator with the
    /// same `size`, must not have been freed since, and the range must be
    /// writable.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        let size = Self::normalize(size);
        let p = ptr.as_ptr();
        debug_assert!(self.pool.contains(p), "pointer {:#x} not from this allocator", p as usize);

        #[cfg(debug_assertions)]
        self.checker.notify_free(p as usize, size);
        self.stats.on_deallocate(size);

        let mut start = p;
        let mut total = size;
        if let Some(prev) = self.tags.preceding_block(p, self.pool.base().as_ptr()) {
            start = prev.cast();
            total += (*prev).size();
            self.remove_free(prev);
        }
        if let Some(next) = self.tags.following_block(p, size, self.pool.end()) {
            total += (*next).size();
            self.remove_free(next);
        }
        self.add_free(start, total);

        trace!(addr = p as usize, size, merged = total, "deallocate");
        self.debug_validate();
    }

    /// Drop every allocation and free block and decommit the pool.
    pub fn reset(&mut self) {
        self.pool.free_all();
        self.segregated.clear();
        self.tags.reset();
        self.stats = AllocatorStats::default();
        #[cfg(debug_assertions)]
        self.checker.clear();
        trace!("reset");
    }

    fn take_and_split_free_block(&mut self, size: usize) -> Option<NonNull<u8>> {
        let block = self.segregated.find(size)?;
        // SAFETY: blocks in the index are live headers inside the pool.
        unsafe {
            let block_size = (*block).size();
            self.remove_free(block);
            let p = block.cast::<u8>();
            let leftover = block_size - size;
            // A remainder too small to tag stays attached to no one until a
            // reset.
            if leftover >= MIN_ALLOCATION_SIZE {
                self.add_free(p.add(size), leftover);
            }
            Some(NonNull::new_unchecked(p))
        }
    }

    unsafe fn add_free(&mut self, p: *mut u8, size: usize) {
        let block = self.tags.mark_free(p, size);
        self.segregated.insert(block);
        self.stats.on_add_free(size);
    }

    unsafe fn remove_free(&mut self, block: *mut FreedBlock) {
        let size = (*block).size();
        self.segregated.remove(block);
        self.tags.clear(block);
        self.stats.on_remove_free(size);
    }

    /// Cross-check the free lists, the boundary tags and the statistics.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let base = self.pool.base().as_ptr() as usize;
        let end = self.pool.end() as usize;
        let mut blocks = 0;
        let mut bytes = 0;

        for (class, list) in self.segregated.lists() {
            if list.is_empty() == self.segregated.is_class_marked(class) {
                return Err(ValidationError::BitmapMismatch { class });
            }
            let mut last = 0usize;
            for block in list.iter() {
                let addr = block as usize;
                // SAFETY: linked nodes are headers inside the pool; bounds are
                // checked before the footer is read.
                let size = unsafe {
                    if !(*block).is_valid(HEADER_ID) {
                        return Err(ValidationError::CorruptTag { addr });
                    }
                    (*block).size()
                };
                if addr < base || addr + size > end {
                    return Err(ValidationError::OutOfBounds { addr });
                }
                if !unsafe { FreedBlock::has_valid_footer(block) } {
                    return Err(ValidationError::CorruptTag { addr });
                }
                if size_class(size) != class {
                    return Err(ValidationError::WrongClass { addr, size, class });
                }
                if addr <= last {
                    return Err(ValidationError::Unordered { class, addr });
                }
                last = addr;
                blocks += 1;
                bytes += size;
            }
        }

        let counts = [
            ("segregated free blocks", blocks, self.segregated.free_blocks()),
            ("segregated free bytes", bytes, self.segregated.free_bytes()),
            ("tagged free blocks", blocks, self.tags.free_blocks()),
            ("tagged free bytes", bytes, self.tags.free_bytes()),
            ("stats free blocks", blocks, self.stats.free_blocks),
            ("stats free bytes", bytes, self.stats.free_bytes),
        ];
        for (what, expected, actual) in counts {
            if expected != actual {
                return Err(ValidationError::CountMismatch { what, expected, actual });
            }
        }
        #[cfg(debug_assertions)]
        if self.checker.live_count() != self.stats.allocated_blocks {
            return Err(ValidationError::CountMismatch {
                what: "live allocations",
                expected: self.checker.live_count(),
                actual: self.stats.allocated_blocks,
            });
        }

        let accounted = self.stats.allocated_bytes + bytes;
        if accounted > self.pool.used() {
            return Err(ValidationError::Overcommitted {
                accounted,
                used: self.pool.used(),
            });
        }
        Ok(())
    }

    #[inline]
    fn debug_validate(&self) {
        #[cfg(debug_assertions)]
        if let Err(e) = self.validate() {
            panic!("headerless allocator corrupted: {e}");
        }
    }

    pub fn stats(&self) -> AllocatorStats {
        self.stats
    }

    /// Bytes bump-allocated from the pool so far.
    pub fn pool_used(&self) -> usize {
        self.pool.used()
    }

    /// Reserved size of the pool.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Returns true if `ptr` lies in memory this allocator has handed out.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.pool.contains(ptr)
    }

    pub fn base(&self) -> NonNull<u8> {
        self.pool.base()
    }
}

#[cfg(test)]
#[path = "headerless_tests.rs"]
mod tests;
