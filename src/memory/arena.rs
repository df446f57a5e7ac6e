//! Growable byte arena over a reserved virtual memory region.
//!
//! The full ceiling is reserved up front; pages are committed as the used
//! extent grows, so the base address never moves.

use std::ptr::NonNull;

use tracing::{trace, warn};

use super::vm::{self, Protection, VmError};

/// Contiguous region with a fixed reserved ceiling and a growing committed
/// extent. `pos` is the high-water mark maintained by the owner.
pub struct DynArray {
    base: NonNull<u8>,
    max_size: usize,
    committed: usize,
    pos: usize,
}

// SAFETY: DynArray exclusively owns its reservation; moving it between
// threads moves that ownership.
unsafe impl Send for DynArray {}

impl DynArray {
    /// Reserve `max_size` bytes (rounded up to pages). Nothing is committed.
    pub fn new(max_size: usize) -> Result<Self, VmError> {
        let max_size = vm::round_up_to_page(max_size.max(1));
        let base = vm::reserve(max_size)?;
        trace!(base = base.as_ptr() as usize, max_size, "Reserved arena");
        Ok(Self {
            base,
            max_size,
            committed: 0,
            pos: 0,
        })
    }

    /// Commit or decommit pages so that exactly `[0, round_up(size))` is
    /// committed read/write.
    pub fn set_size(&mut self, size: usize) -> Result<(), VmError> {
        if size > self.max_size {
            return Err(VmError::CapacityExceeded {
                requested: size,
                capacity: self.max_size,
            });
        }
        let target = vm::round_up_to_page(size);
        if target > self.committed {
            // SAFETY: [committed, target) lies inside our reservation.
            unsafe {
                let start = NonNull::new_unchecked(self.base.as_ptr().add(self.committed));
                vm::commit(start, target - self.committed, Protection::READ_WRITE)?;
            }
        } else if target < self.committed {
            // SAFETY: [target, committed) lies inside our reservation and the
            // owner has shrunk below it.
            unsafe {
                let start = NonNull::new_unchecked(self.base.as_ptr().add(target));
                vm::decommit(start, self.committed - target)?;
            }
        }
        self.committed = target;
        Ok(())
    }

    /// Base address of the region.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// High-water mark in bytes.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        debug_assert!(pos <= self.committed, "position beyond committed extent");
        self.pos = pos;
    }

    /// Bytes currently committed.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Reserved ceiling in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns true if `ptr` lies inside the committed part of the region.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr < start + self.committed
    }

    /// Change access rights of everything committed so far.
    pub fn protect(&mut self, prot: Protection) -> Result<(), VmError> {
        if self.committed == 0 {
            return Ok(());
        }
        // SAFETY: [base, committed) is committed.
        unsafe { vm::protect(self.base, self.committed, prot) }
    }
}

impl Drop for DynArray {
    fn drop(&mut self) {
        // SAFETY: base/max_size describe exactly the reservation made in new().
        if let Err(e) = unsafe { vm::release(self.base, self.max_size) } {
            warn!(error = %e, "Failed to release arena");
        }
    }
}
