//! Single-instance allocator: one in-place slot, heap fallback.
//!
//! Suited to objects that almost always exist at most once at a time. The
//! slot is claimed with a compare-and-swap, so contention from another
//! thread degrades to a heap allocation instead of blocking.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Storage for at most one in-place `T`.
pub struct SingleAllocator<T> {
    in_use: AtomicBool,
    slot: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: the slot is only touched by the holder of the in_use flag, so
// sharing the allocator hands a T to at most one thread at a time.
unsafe impl<T: Send> Sync for SingleAllocator<T> {}

impl<T> SingleAllocator<T> {
    pub const fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            slot: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Place `value` in the slot if it is free, otherwise on the heap.
    pub fn allocate(&self, value: T) -> SingleBox<'_, T> {
        let storage = if self
            .in_use
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            // SAFETY: winning the CAS grants exclusive access to the slot.
            unsafe { (*self.slot.get()).write(value) };
            Storage::InPlace(self)
        } else {
            Storage::Heap(Box::new(value))
        };
        SingleBox {
            storage,
            _marker: PhantomData,
        }
    }

    /// Returns true while the in-place slot is occupied.
    pub fn is_occupied(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

impl<T> Default for SingleAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

enum Storage<'a, T> {
    InPlace(&'a SingleAllocator<T>),
    Heap(Box<T>),
}

/// Owning handle returned by [`SingleAllocator::allocate`]. Frees the slot
/// (or the heap box) on drop.
#[must_use]
pub struct SingleBox<'a, T> {
    storage: Storage<'a, T>,
    _marker: PhantomData<T>,
}

impl<T> SingleBox<'_, T> {
    /// Returns true if the value lives in the allocator's slot.
    pub fn is_in_place(&self) -> bool {
        matches!(self.storage, Storage::InPlace(_))
    }
}

impl<T> Deref for SingleBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.storage {
            // SAFETY: the slot was initialised in allocate() and stays so
            // until this box drops.
            Storage::InPlace(alloc) => unsafe { (*alloc.slot.get()).assume_init_ref() },
            Storage::Heap(b) => b,
        }
    }
}

impl<T> DerefMut for SingleBox<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.storage {
            // SAFETY: as in deref; this box is the slot's only owner.
            Storage::InPlace(alloc) => unsafe { (*alloc.slot.get()).assume_init_mut() },
            Storage::Heap(b) => b,
        }
    }
}

impl<T> Drop for SingleBox<'_, T> {
    fn drop(&mut self) {
        if let Storage::InPlace(alloc) = &self.storage {
            // SAFETY: initialised in allocate(); nothing reads it after this.
            unsafe { (*alloc.slot.get()).assume_init_drop() };
            alloc.in_use.store(false, Ordering::Release);
        }
    }
}
