//! zcio: zero-copy file content caching.
//!
//! File contents are loaded once into page-aligned buffers and handed to
//! readers by reference, never copied again.
//!
//! # Layers
//!
//! - [`memory`]: virtual memory primitives and a headerless allocator
//!   (segregated free lists, bitmap good-fit search, boundary-tag coalescing)
//! - [`cache`]: size- and cost-aware eviction (Landlord variants and LRU)
//! - [`file_cache`]: reference-counted, write-protected file buffers with
//!   deferred frees for evicted buffers that are still in use
//!
//! # Example
//!
//! ```no_run
//! use zcio::file_cache::{FileCache, FileCacheConfig};
//!
//! let mut cache: FileCache = FileCache::new(FileCacheConfig::default())?;
//! let (key, _buf) = cache.load("assets/terrain.bin")?;
//! let bytes = cache.contents(&key).unwrap_or_default();
//! println!("{} bytes", bytes.len());
//! cache.release(&key)?;
//! # Ok::<(), zcio::file_cache::FileCacheError>(())
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod file_cache;
pub mod memory;
pub mod telemetry;

pub use cache::{Cache, LandlordCached, LandlordLazy, LandlordNaive, Lru, Manager};
pub use config::{EffectiveConfig, EnvConfig, ManagerKind};
pub use file_cache::{FileBuf, FileCache, FileCacheConfig, FileCacheError, FileStats, PathInterner, PathKey};
pub use memory::{AllocatorStats, HeaderlessAllocator};
