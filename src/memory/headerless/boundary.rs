//! Boundary-tag bookkeeping: writing tags and finding free neighbours.

use super::freed_block::{FreedBlock, FOOTER_ID, HEADER_ID, TAG_SIZE};

/// Writes and clears boundary tags and detects free blocks adjacent to a
/// given range. Keeps its own count of tagged blocks for validation.
#[derive(Debug, Default)]
pub(super) struct BoundaryTagManager {
    free_blocks: usize,
    free_bytes: usize,
}

impl BoundaryTagManager {
    /// # Safety
    /// `[p, p + size)` must be writable allocator memory that is not in use.
    pub(super) unsafe fn mark_free(&mut self, p: *mut u8, size: usize) -> *mut FreedBlock {
        self.free_blocks += 1;
        self.free_bytes += size;
        FreedBlock::write(p, size)
    }

    /// # Safety
    /// `block` must be a header produced by [`Self::mark_free`].
    pub(super) unsafe fn clear(&mut self, block: *mut FreedBlock) {
        self.free_blocks -= 1;
        self.free_bytes -= (*block).size();
        FreedBlock::clear(block);
    }

    /// The free block ending exactly at `p`, if any. Only memory in
    /// `[base, p)` is inspected.
    ///
    /// # Safety
    /// `[base, p)` must be readable.
    pub(super) unsafe fn preceding_block(&self, p: *mut u8, base: *mut u8) -> Option<*mut FreedBlock> {
        let room = p as usize - base as usize;
        if room < TAG_SIZE {
            return None;
        }
        let footer = p.sub(TAG_SIZE).cast::<FreedBlock>();
        if !(*footer).is_valid(FOOTER_ID) {
            return None;
        }
        let size = (*footer).size();
        if size > room {
            return None;
        }
        let header = p.sub(size).cast::<FreedBlock>();
        ((*header).is_valid(HEADER_ID) && (*header).size() == size).then_some(header)
    }

    /// The free block starting exactly at `p + size`, if any. Only memory in
    /// `[p + size, end)` is inspected.
    ///
    /// # Safety
    /// `[p + size, end)` must be readable.
    pub(super) unsafe fn following_block(
        &self,
        p: *mut u8,
        size: usize,
        end: *mut u8,
    ) -> Option<*mut FreedBlock> {
        let start = p.add(size);
        let room = (end as usize).saturating_sub(start as usize);
        if room < TAG_SIZE {
            return None;
        }
        let header = start.cast::<FreedBlock>();
        if !(*header).is_valid(HEADER_ID) || (*header).size() > room {
            return None;
        }
        FreedBlock::has_valid_footer(header).then_some(header)
    }

    pub(super) fn reset(&mut self) {
        self.free_blocks = 0;
        self.free_bytes = 0;
    }

    pub(super) fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    pub(super) fn free_bytes(&self) -> usize {
        self.free_bytes
    }
}
