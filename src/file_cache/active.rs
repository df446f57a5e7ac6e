//! Buffers currently referenced by readers or being filled by I/O.

use std::collections::HashMap;

use super::{FileBuf, PathKey};

#[derive(Debug)]
pub(super) struct ActiveEntry {
    pub(super) buf: FileBuf,
    pub(super) refs: u32,
    /// Held by the reserver until the fill completes.
    pub(super) exclusive: bool,
}

/// Active entries by key, with a reverse index by buffer address so
/// eviction can tell whether a victim is still in use.
#[derive(Debug, Default)]
pub(super) struct ActiveList {
    entries: HashMap<PathKey, ActiveEntry>,
    by_addr: HashMap<usize, PathKey>,
    bytes: usize,
}

impl ActiveList {
    pub(super) fn insert(&mut self, key: PathKey, buf: FileBuf, exclusive: bool) {
        debug_assert!(!self.entries.contains_key(&key), "{key} already active");
        self.by_addr.insert(buf.addr(), key.clone());
        self.bytes += buf.capacity();
        self.entries.insert(
            key,
            ActiveEntry {
                buf,
                refs: 1,
                exclusive,
            },
        );
    }

    pub(super) fn get(&self, key: &PathKey) -> Option<&ActiveEntry> {
        self.entries.get(key)
    }

    pub(super) fn get_mut(&mut self, key: &PathKey) -> Option<&mut ActiveEntry> {
        self.entries.get_mut(key)
    }

    pub(super) fn remove(&mut self, key: &PathKey) -> Option<ActiveEntry> {
        let entry = self.entries.remove(key)?;
        self.by_addr.remove(&entry.buf.addr());
        self.bytes -= entry.buf.capacity();
        Some(entry)
    }

    pub(super) fn contains(&self, key: &PathKey) -> bool {
        self.entries.contains_key(key)
    }

    pub(super) fn contains_addr(&self, addr: usize) -> bool {
        self.by_addr.contains_key(&addr)
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn bytes(&self) -> usize {
        self.bytes
    }
}
