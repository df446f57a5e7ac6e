//! Bump allocation of fixed- or variable-size blocks from a [`DynArray`].
//!
//! Fixed-size pools keep an intrusive freelist for reuse. Variable-size
//! pools only support bulk release via [`Pool::free_all`]; the headerless
//! allocator layers its own free-block management on top of one.

use std::ptr::NonNull;

use tracing::{trace, warn};

use super::arena::DynArray;
use super::vm::VmError;
use super::ALLOCATION_ALIGNMENT;

/// Element size that marks a pool as variable-size.
pub const POOL_VARIABLE_ALLOCS: usize = 0;

/// Bump allocator over a growable arena.
pub struct Pool {
    da: DynArray,
    el_size: usize,
    freelist: Option<NonNull<u8>>,
}

impl Pool {
    /// Create a pool able to hand out `max_size` bytes. `el_size` is the
    /// element size for fixed-size pools, or [`POOL_VARIABLE_ALLOCS`].
    pub fn new(max_size: usize, el_size: usize) -> Result<Self, VmError> {
        let el_size = if el_size == POOL_VARIABLE_ALLOCS {
            POOL_VARIABLE_ALLOCS
        } else {
            // Freed elements hold the freelist link.
            el_size
                .max(std::mem::size_of::<*mut u8>())
                .next_multiple_of(ALLOCATION_ALIGNMENT)
        };
        Ok(Self {
            da: DynArray::new(max_size)?,
            el_size,
            freelist: None,
        })
    }

    /// Returns true if this pool hands out blocks of differing sizes.
    pub fn is_variable(&self) -> bool {
        self.el_size == POOL_VARIABLE_ALLOCS
    }

    /// Allocate `size` bytes, rounded up to [`ALLOCATION_ALIGNMENT`].
    /// Returns None when the reserved region is exhausted.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let size = if self.is_variable() {
            size.next_multiple_of(ALLOCATION_ALIGNMENT)
        } else {
            debug_assert!(size <= self.el_size, "request exceeds pool element size");
            if let Some(head) = self.freelist {
                // SAFETY: freelist nodes are freed elements of this pool whose
                // first word holds the next link.
                self.freelist = NonNull::new(unsafe { head.as_ptr().cast::<*mut u8>().read() });
                return Some(head);
            }
            self.el_size
        };

        let pos = self.da.pos();
        let new_pos = pos.checked_add(size)?;
        if new_pos > self.da.max_size() {
            trace!(size, pos, "Pool exhausted");
            return None;
        }
        if new_pos > self.da.committed() {
            if let Err(e) = self.da.set_size(new_pos) {
                warn!(error = %e, "Pool failed to grow");
                return None;
            }
        }
        self.da.set_pos(new_pos);
        // SAFETY: pos < new_pos <= committed, inside the region.
        Some(unsafe { NonNull::new_unchecked(self.da.base().as_ptr().add(pos)) })
    }

    /// Return one element to a fixed-size pool.
    ///
    /// # Safety
    /// `ptr` must come from [`Pool::alloc`] on this pool and not be used
    /// afterwards.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        debug_assert!(!self.is_variable(), "free on a variable-size pool");
        debug_assert!(self.contains(ptr.as_ptr()), "pointer not from this pool");
        if self.is_variable() {
            return;
        }
        let next = self.freelist.map_or(std::ptr::null_mut(), NonNull::as_ptr);
        ptr.as_ptr().cast::<*mut u8>().write(next);
        self.freelist = Some(ptr);
    }

    /// Rewind to empty and return the committed pages to the system.
    pub fn free_all(&mut self) {
        self.freelist = None;
        self.da.set_pos(0);
        if let Err(e) = self.da.set_size(0) {
            warn!(error = %e, "Pool failed to decommit on free_all");
        }
    }

    /// Returns true if `ptr` lies inside the allocated part of the pool.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.base().as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr < start + self.da.pos()
    }

    pub fn base(&self) -> NonNull<u8> {
        self.da.base()
    }

    /// One past the last byte handed out so far.
    pub fn end(&self) -> *mut u8 {
        // SAFETY: pos never exceeds the reservation.
        unsafe { self.da.base().as_ptr().add(self.da.pos()) }
    }

    /// Bytes handed out by bump allocation.
    pub fn used(&self) -> usize {
        self.da.pos()
    }

    /// Bytes still available for bump allocation.
    pub fn remaining(&self) -> usize {
        self.da.max_size() - self.da.pos()
    }

    /// Reserved ceiling in bytes.
    pub fn capacity(&self) -> usize {
        self.da.max_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::vm;

    #[test]
    fn variable_pool_bumps_contiguously() {
        let mut pool = Pool::new(vm::page_size(), POOL_VARIABLE_ALLOCS).unwrap();
        let a = pool.alloc(100).unwrap();
        let b = pool.alloc(32).unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 112);
        assert_eq!(pool.used(), 144);
        assert!(pool.contains(b.as_ptr()));
        assert_eq!(pool.end() as usize, b.as_ptr() as usize + 32);
    }

    #[test]
    fn pool_exhaustion_returns_none() {
        let page = vm::page_size();
        let mut pool = Pool::new(page, POOL_VARIABLE_ALLOCS).unwrap();
        assert!(pool.alloc(page).is_some());
        assert_eq!(pool.remaining(), 0);
        assert!(pool.alloc(16).is_none());
    }

    #[test]
    fn fixed_pool_reuses_freed_elements() {
        let mut pool = Pool::new(vm::page_size(), 48).unwrap();
        let a = pool.alloc(48).unwrap();
        let b = pool.alloc(10).unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 48);

        unsafe { pool.free(a) };
        let c = pool.alloc(48).unwrap();
        assert_eq!(c, a);
        assert_eq!(pool.used(), 96);
    }

    #[test]
    fn free_all_rewinds() {
        let mut pool = Pool::new(vm::page_size() * 4, POOL_VARIABLE_ALLOCS).unwrap();
        let first = pool.alloc(256).unwrap();
        unsafe { first.as_ptr().write(1) };
        pool.alloc(vm::page_size()).unwrap();

        pool.free_all();
        assert_eq!(pool.used(), 0);
        assert!(!pool.contains(first.as_ptr()));

        let again = pool.alloc(256).unwrap();
        assert_eq!(again, first);
        assert_eq!(unsafe { again.as_ptr().read() }, 0);
    }
}
