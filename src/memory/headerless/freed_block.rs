//! Boundary tags written into the first and last bytes of a free block.

use std::ptr;

use crate::memory::{ALLOCATION_ALIGNMENT, MIN_ALLOCATION_SIZE};

const FREED_MAGIC: u64 = 0xFEED_B10C_DEAD_BEEF;
pub(super) const HEADER_ID: u32 = 0x4844_5221;
pub(super) const FOOTER_ID: u32 = 0x4654_5221;

/// Size in bytes of one tag. A free block carries two.
pub(super) const TAG_SIZE: usize = std::mem::size_of::<FreedBlock>();

const _: () = assert!(2 * TAG_SIZE <= MIN_ALLOCATION_SIZE);

/// Header or footer of a free block. Links are only meaningful in the
/// header; the footer exists so the following block can find its
/// predecessor.
#[repr(C)]
pub(super) struct FreedBlock {
    magic: u64,
    size: usize,
    id: u32,
    pub(super) prev: *mut FreedBlock,
    pub(super) next: *mut FreedBlock,
}

impl FreedBlock {
    /// A tag that never validates; used as list sentinel.
    pub(super) fn sentinel() -> Self {
        Self {
            magic: 0,
            size: 0,
            id: 0,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    fn new(size: usize, id: u32) -> Self {
        Self {
            magic: FREED_MAGIC,
            size,
            id,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    pub(super) fn size(&self) -> usize {
        self.size
    }

    /// Checks magic, role and that the size is one the allocator could have
    /// produced.
    pub(super) fn is_valid(&self, id: u32) -> bool {
        self.magic == FREED_MAGIC
            && self.id == id
            && self.size >= MIN_ALLOCATION_SIZE
            && self.size % ALLOCATION_ALIGNMENT == 0
    }

    /// Write header and footer for a free block at `p` and return the header.
    ///
    /// # Safety
    /// `[p, p + size)` must be writable memory owned by the allocator, with
    /// `size >= MIN_ALLOCATION_SIZE`.
    pub(super) unsafe fn write(p: *mut u8, size: usize) -> *mut FreedBlock {
        let header = p.cast::<FreedBlock>();
        header.write(Self::new(size, HEADER_ID));
        footer_of(p, size).write(Self::new(size, FOOTER_ID));
        header
    }

    /// Zero both tags of a block so stale tags can never be mistaken for a
    /// free neighbour.
    ///
    /// # Safety
    /// `block` must be a header written by [`FreedBlock::write`].
    pub(super) unsafe fn clear(block: *mut FreedBlock) {
        let size = (*block).size;
        let p = block.cast::<u8>();
        ptr::write_bytes(footer_of(p, size).cast::<u8>(), 0, TAG_SIZE);
        ptr::write_bytes(p, 0, TAG_SIZE);
    }

    /// The footer matching `block`, if both tags are intact.
    ///
    /// # Safety
    /// `block` must point to `size` readable bytes.
    pub(super) unsafe fn has_valid_footer(block: *const FreedBlock) -> bool {
        let size = (*block).size;
        let footer = footer_of(block.cast_mut().cast(), size);
        (*footer).is_valid(FOOTER_ID) && (*footer).size == size
    }
}

/// Address of the footer of a block of `size` bytes at `p`.
pub(super) unsafe fn footer_of(p: *mut u8, size: usize) -> *mut FreedBlock {
    p.add(size - TAG_SIZE).cast()
}
