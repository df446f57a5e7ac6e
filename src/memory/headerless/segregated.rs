//! Segregated free lists: one address-ordered list per power-of-two size
//! class, plus a bitmap of non-empty classes.

use super::freed_block::FreedBlock;

/// Number of size classes: one per bit of the address width.
pub(super) const NUM_CLASSES: usize = usize::BITS as usize;

/// Class `i` holds sizes in `(2^(i-1), 2^i]`.
pub(super) fn size_class(size: usize) -> usize {
    debug_assert!(size > 1);
    (usize::BITS - (size - 1).leading_zeros()) as usize
}

/// Circular, sentinel-terminated doubly linked list of free blocks ordered
/// by ascending address.
pub(super) struct RangeList {
    sentinel: *mut FreedBlock,
}

impl RangeList {
    fn new() -> Self {
        let sentinel = Box::into_raw(Box::new(FreedBlock::sentinel()));
        // SAFETY: freshly allocated, exclusively owned.
        unsafe {
            (*sentinel).prev = sentinel;
            (*sentinel).next = sentinel;
        }
        Self { sentinel }
    }

    pub(super) fn is_empty(&self) -> bool {
        // SAFETY: the sentinel lives as long as the list.
        unsafe { (*self.sentinel).next == self.sentinel }
    }

    /// Link `block` in address order.
    unsafe fn insert(&mut self, block: *mut FreedBlock) {
        let mut cur = (*self.sentinel).next;
        while cur != self.sentinel && cur < block {
            cur = (*cur).next;
        }
        debug_assert!(cur != block, "block inserted twice");
        let prev = (*cur).prev;
        (*block).prev = prev;
        (*block).next = cur;
        (*prev).next = block;
        (*cur).prev = block;
    }

    unsafe fn unlink(block: *mut FreedBlock) {
        let prev = (*block).prev;
        let next = (*block).next;
        (*prev).next = next;
        (*next).prev = prev;
    }

    /// Lowest-addressed block of at least `size` bytes.
    unsafe fn find(&self, size: usize) -> Option<*mut FreedBlock> {
        let mut cur = (*self.sentinel).next;
        while cur != self.sentinel {
            if (*cur).size() >= size {
                return Some(cur);
            }
            cur = (*cur).next;
        }
        None
    }

    fn clear(&mut self) {
        // SAFETY: the sentinel lives as long as the list.
        unsafe {
            (*self.sentinel).prev = self.sentinel;
            (*self.sentinel).next = self.sentinel;
        }
    }

    /// Iterate headers in address order. The list must not change while
    /// iterating.
    pub(super) fn iter(&self) -> RangeIter<'_> {
        RangeIter {
            // SAFETY: the sentinel lives as long as the list.
            cur: unsafe { (*self.sentinel).next },
            list: self,
        }
    }
}

impl Drop for RangeList {
    fn drop(&mut self) {
        // SAFETY: created by Box::into_raw in new() and never freed elsewhere.
        drop(unsafe { Box::from_raw(self.sentinel) });
    }
}

pub(super) struct RangeIter<'a> {
    cur: *mut FreedBlock,
    list: &'a RangeList,
}

impl Iterator for RangeIter<'_> {
    type Item = *mut FreedBlock;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur == self.list.sentinel {
            return None;
        }
        let block = self.cur;
        // SAFETY: every linked node is a live header or the sentinel.
        self.cur = unsafe { (*block).next };
        Some(block)
    }
}

/// Index of all free blocks, segregated by size class.
pub(super) struct SegregatedRangeLists {
    lists: [RangeList; NUM_CLASSES],
    bitmap: usize,
    free_blocks: usize,
    free_bytes: usize,
}

impl SegregatedRangeLists {
    pub(super) fn new() -> Self {
        Self {
            lists: std::array::from_fn(|_| RangeList::new()),
            bitmap: 0,
            free_blocks: 0,
            free_bytes: 0,
        }
    }

    /// # Safety
    /// `block` must be a valid header not currently linked anywhere.
    pub(super) unsafe fn insert(&mut self, block: *mut FreedBlock) {
        let size = (*block).size();
        let class = size_class(size);
        self.lists[class].insert(block);
        self.bitmap |= 1 << class;
        self.free_blocks += 1;
        self.free_bytes += size;
    }

    /// # Safety
    /// `block` must be a header currently linked in this index.
    pub(super) unsafe fn remove(&mut self, block: *mut FreedBlock) {
        let size = (*block).size();
        let class = size_class(size);
        RangeList::unlink(block);
        if self.lists[class].is_empty() {
            self.bitmap &= !(1 << class);
        }
        self.free_blocks -= 1;
        self.free_bytes -= size;
    }

    /// Address-ordered good fit: the lowest-addressed block that fits in the
    /// request's own class, else in the next non-empty larger class.
    pub(super) fn find(&self, size: usize) -> Option<*mut FreedBlock> {
        let class = size_class(size);
        let mut candidates = self.bitmap & usize::MAX.checked_shl(class as u32).unwrap_or(0);
        while candidates != 0 {
            let i = candidates.trailing_zeros() as usize;
            // SAFETY: linked nodes are live headers.
            if let Some(block) = unsafe { self.lists[i].find(size) } {
                return Some(block);
            }
            candidates &= candidates - 1;
        }
        None
    }

    /// Forget every block. Only valid when the underlying memory is being
    /// discarded as well.
    pub(super) fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
        self.bitmap = 0;
        self.free_blocks = 0;
        self.free_bytes = 0;
    }

    pub(super) fn lists(&self) -> impl Iterator<Item = (usize, &RangeList)> {
        self.lists.iter().enumerate()
    }

    pub(super) fn is_class_marked(&self, class: usize) -> bool {
        self.bitmap & (1 << class) != 0
    }

    pub(super) fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    pub(super) fn free_bytes(&self) -> usize {
        self.free_bytes
    }
}
