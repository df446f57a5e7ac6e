//! Zero-copy file cache.
//!
//! File contents live in buffers from a [`HeaderlessAllocator`]. A buffer is
//! reserved and filled by one writer, then published with
//! [`FileCache::mark_complete`], which write-protects it and hands it to the
//! eviction policy. Readers take counted references with
//! [`FileCache::retrieve`] and drop them with [`FileCache::release`].
//!
//! A buffer is freed exactly once, when it is both out of the cache and
//! unreferenced. Eviction of a referenced buffer only drops the cache's
//! bookkeeping; the last release frees it.

mod active;
mod intern;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::cache::{Cache, LandlordCached, Manager};
use crate::memory::vm::{self, Protection, VmError};
use crate::memory::{AllocatorStats, HeaderlessAllocator};
use crate::telemetry;

use active::ActiveList;
pub use intern::{PathInterner, PathKey};

/// Default bytes of address space reserved for buffers.
pub const DEFAULT_CAPACITY: usize = 256 * 1024 * 1024;

/// Default number of evictions within one reserve before a warning.
pub const DEFAULT_EVICTION_WARN_THRESHOLD: usize = 100;

#[derive(Debug, Error)]
pub enum FileCacheError {
    #[error("{path} is in use, retry later")]
    Busy { path: String },

    #[error("Out of buffer memory: requested {requested} bytes, capacity {capacity} bytes")]
    OutOfMemory { requested: usize, capacity: usize },

    #[error("{path} was not reserved")]
    NotReserved { path: String },

    #[error("{path} is already complete")]
    AlreadyComplete { path: String },

    #[error("{path} is not referenced")]
    NotActive { path: String },

    #[error("Buffer memory error: {0}")]
    Memory(#[from] VmError),

    #[error("Failed to read {path}: {source}")]
    Io { path: String, source: io::Error },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileCacheConfig {
    /// Bytes of address space reserved for buffers.
    pub capacity: usize,
    /// Evictions within one reserve after which a warning is logged.
    pub eviction_warn_threshold: usize,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            eviction_warn_threshold: DEFAULT_EVICTION_WARN_THRESHOLD,
        }
    }
}

/// Handle to a page-aligned buffer. Copying the handle does not take a
/// reference; use [`FileCache::contents`] for a checked view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileBuf {
    ptr: NonNull<u8>,
    len: usize,
    capacity: usize,
}

impl FileBuf {
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Bytes of file content.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes allocated, a whole number of pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

/// Counters since construction.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FileStats {
    pub reserves: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Evicted while referenced; freed on last release.
    pub deferred_frees: u64,
    pub busy_invalidations: u64,
    pub bytes_cached: usize,
    pub bytes_active: usize,
    pub allocator: AllocatorStats,
}

/// File content cache over a Landlord (by default) eviction policy.
pub struct FileCache<M = LandlordCached<PathKey, FileBuf>> {
    allocator: HeaderlessAllocator,
    cache: Cache<PathKey, FileBuf, M>,
    active: ActiveList,
    config: FileCacheConfig,
    stats: FileStats,
}

impl<M: Manager<PathKey, FileBuf> + Default> FileCache<M> {
    pub fn new(config: FileCacheConfig) -> Result<Self, FileCacheError> {
        Self::with_manager(config, M::default())
    }
}

impl<M: Manager<PathKey, FileBuf>> FileCache<M> {
    pub fn with_manager(config: FileCacheConfig, manager: M) -> Result<Self, FileCacheError> {
        let allocator = HeaderlessAllocator::new(config.capacity)?;
        debug!(capacity = allocator.capacity(), "File cache created");
        Ok(Self {
            allocator,
            cache: Cache::with_manager(manager),
            active: ActiveList::default(),
            config,
            stats: FileStats::default(),
        })
    }

    /// Allocate a writable buffer of `size` bytes for `key`, evicting as
    /// needed. The caller holds the only reference until
    /// [`FileCache::mark_complete`] or [`FileCache::release`].
    pub fn reserve(&mut self, key: &PathKey, size: usize) -> Result<FileBuf, FileCacheError> {
        if self.active.contains(key) {
            return Err(FileCacheError::Busy {
                path: key.to_string(),
            });
        }
        if let Some((stale, size)) = self.cache.remove(key) {
            trace!(path = %key, "Discarding stale cached copy");
            self.stats.bytes_cached -= size;
            self.free_buffer(stale);
        }
        self.stats.reserves += 1;

        let capacity = match size.max(1).checked_next_multiple_of(vm::page_size()) {
            Some(capacity) if capacity <= self.allocator.capacity() => capacity,
            _ => return Err(self.out_of_memory(size)),
        };

        let mut evictions = 0usize;
        let ptr = loop {
            if let Some(ptr) = self.allocator.allocate(capacity) {
                break ptr;
            }
            let Some(victim) = self.cache.remove_least_valuable_entry() else {
                return Err(self.out_of_memory(capacity));
            };
            evictions += 1;
            if evictions == self.config.eviction_warn_threshold {
                warn!(path = %key, evictions, capacity, "Reserve is evicting heavily");
            }
            self.stats.evictions += 1;
            self.stats.bytes_cached -= victim.size;
            telemetry::record_cache_eviction(victim.size);

            if self.active.contains_addr(victim.item.addr()) {
                self.stats.deferred_frees += 1;
                debug!(path = %victim.key, "Evicted buffer still referenced, deferring free");
            } else {
                debug!(path = %victim.key, size = victim.size, "Evicted buffer");
                self.free_buffer(victim.item);
            }
        };

        let buf = FileBuf {
            ptr,
            len: size,
            capacity,
        };
        self.active.insert(key.clone(), buf, true);
        telemetry::record_buffer_alloc(capacity);
        self.record_usage();
        trace!(path = %key, size, capacity, evictions, "Reserved buffer");
        Ok(buf)
    }

    /// Publish a filled buffer: write-protect it and make it evictable. The
    /// reserver keeps its reference.
    pub fn mark_complete(&mut self, key: &PathKey, cost: f32) -> Result<(), FileCacheError> {
        let entry = self
            .active
            .get_mut(key)
            .ok_or_else(|| FileCacheError::NotReserved {
                path: key.to_string(),
            })?;
        if !entry.exclusive {
            return Err(FileCacheError::AlreadyComplete {
                path: key.to_string(),
            });
        }
        let buf = entry.buf;
        // SAFETY: buf is a live allocation of `capacity` committed bytes and
        // no &mut view outlives fill().
        unsafe { vm::protect(buf.ptr, buf.capacity, Protection::READ)? };
        entry.exclusive = false;

        self.cache.add(key.clone(), buf, buf.capacity, cost);
        self.stats.bytes_cached += buf.capacity;
        trace!(path = %key, cost, "Buffer complete");
        Ok(())
    }

    /// Take a reference to the buffer for `key`. Returns None on a miss or
    /// while the buffer is still being filled.
    pub fn retrieve(&mut self, key: &PathKey) -> Option<FileBuf> {
        if let Some(entry) = self.active.get_mut(key) {
            if entry.exclusive {
                return None;
            }
            entry.refs += 1;
            let buf = entry.buf;
            self.cache.retrieve(key);
            self.stats.hits += 1;
            telemetry::record_buffer_ref(true);
            return Some(buf);
        }

        match self.cache.retrieve(key).copied() {
            Some(buf) => {
                self.active.insert(key.clone(), buf, false);
                self.stats.hits += 1;
                telemetry::record_buffer_ref(true);
                Some(buf)
            }
            None => {
                self.stats.misses += 1;
                telemetry::record_buffer_ref(false);
                None
            }
        }
    }

    /// Drop one reference. The last release frees the buffer unless the
    /// cache still holds it. Releasing an unfinished reservation abandons it.
    pub fn release(&mut self, key: &PathKey) -> Result<(), FileCacheError> {
        let entry = self
            .active
            .get_mut(key)
            .ok_or_else(|| FileCacheError::NotActive {
                path: key.to_string(),
            })?;
        entry.refs -= 1;
        if entry.refs > 0 {
            return Ok(());
        }

        let Some(entry) = self.active.remove(key) else {
            return Ok(());
        };
        if entry.exclusive {
            trace!(path = %key, "Abandoned reservation");
            self.free_buffer(entry.buf);
        } else if self.cache_owns(key, &entry.buf) {
            trace!(path = %key, "Last reference released, buffer stays cached");
        } else {
            trace!(path = %key, "Last reference released, freeing evicted buffer");
            self.free_buffer(entry.buf);
        }
        Ok(())
    }

    /// Drop the cached copy of `key`. Returns whether one existed. Fails
    /// with [`FileCacheError::Busy`] while the key is referenced.
    pub fn invalidate(&mut self, key: &PathKey) -> Result<bool, FileCacheError> {
        if self.active.contains(key) {
            self.stats.busy_invalidations += 1;
            debug!(path = %key, "Invalidate refused, buffer in use");
            return Err(FileCacheError::Busy {
                path: key.to_string(),
            });
        }
        match self.cache.remove(key) {
            Some((buf, size)) => {
                self.stats.bytes_cached -= size;
                self.free_buffer(buf);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Load `path` through the cache: a hit takes a reference to the cached
    /// buffer, a miss reads the file straight into a new buffer. The caller
    /// releases the returned key when done.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(PathKey, FileBuf), FileCacheError> {
        let path = path.as_ref();
        let key = PathInterner::global().intern(path);
        if let Some(buf) = self.retrieve(&key) {
            return Ok((key, buf));
        }

        let io_err = |source| FileCacheError::Io {
            path: path.display().to_string(),
            source,
        };
        let mut file = File::open(path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len() as usize;
        let buf = self.reserve(&key, size)?;

        let filled = match self.fill(&key) {
            Some(dst) => file.read_exact(dst),
            None => Ok(()),
        };
        if let Err(source) = filled {
            self.release(&key)?;
            return Err(io_err(source));
        }
        self.mark_complete(&key, size as f32)?;
        Ok((key, buf))
    }

    /// Read view of a referenced, complete buffer.
    pub fn contents(&self, key: &PathKey) -> Option<&[u8]> {
        let entry = self.active.get(key).filter(|e| !e.exclusive)?;
        // SAFETY: the buffer is allocated and initialized for `len` bytes
        // while it stays active, and is read-only once complete.
        Some(unsafe { std::slice::from_raw_parts(entry.buf.ptr.as_ptr(), entry.buf.len) })
    }

    /// Write view of a reserved buffer that is not yet complete.
    pub fn fill(&mut self, key: &PathKey) -> Option<&mut [u8]> {
        let entry = self.active.get(key).filter(|e| e.exclusive)?;
        // SAFETY: the reserver has exclusive use of the writable buffer
        // until mark_complete, which needs &mut self.
        Some(unsafe { std::slice::from_raw_parts_mut(entry.buf.ptr.as_ptr(), entry.buf.len) })
    }

    pub fn is_cached(&self, key: &PathKey) -> bool {
        self.cache.contains(key)
    }

    /// Outstanding references to `key`, 0 when inactive.
    pub fn ref_count(&self, key: &PathKey) -> u32 {
        self.active.get(key).map_or(0, |e| e.refs)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn config(&self) -> &FileCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> FileStats {
        FileStats {
            bytes_active: self.active.bytes(),
            allocator: self.allocator.stats(),
            ..self.stats.clone()
        }
    }

    /// True if the cache map or the pending victims still hold `buf`.
    fn cache_owns(&self, key: &PathKey, buf: &FileBuf) -> bool {
        self.cache.peek(key).is_some_and(|b| b.ptr == buf.ptr)
            || self.cache.pending().any(|b| b.ptr == buf.ptr)
    }

    fn free_buffer(&mut self, buf: FileBuf) {
        // SAFETY: buf is a live allocation of `capacity` committed bytes.
        if let Err(e) = unsafe { vm::protect(buf.ptr, buf.capacity, Protection::READ_WRITE) } {
            error!(error = %e, addr = buf.addr(), "Cannot unprotect buffer, leaking it");
            return;
        }
        // SAFETY: allocated with this capacity, now writable, and no longer
        // referenced by the cache or the active list.
        unsafe { self.allocator.deallocate(buf.ptr, buf.capacity) };
        telemetry::record_buffer_free(buf.capacity);
        self.record_usage();
    }

    fn out_of_memory(&self, requested: usize) -> FileCacheError {
        warn!(requested, capacity = self.allocator.capacity(), "File cache out of memory");
        FileCacheError::OutOfMemory {
            requested,
            capacity: self.allocator.capacity(),
        }
    }

    fn record_usage(&self) {
        let stats = self.allocator.stats();
        telemetry::record_allocator_usage(stats.allocated_bytes, stats.free_bytes);
    }
}

#[cfg(test)]
#[path = "file_cache_tests.rs"]
mod tests;
