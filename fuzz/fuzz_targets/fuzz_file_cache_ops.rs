//! Fuzz target for file cache reference counting.
//!
//! Any sequence of reserve/complete/retrieve/release/invalidate calls must
//! keep referenced contents intact and free every buffer exactly once.

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use zcio::file_cache::{FileCache, FileCacheConfig, PathInterner, PathKey};
use zcio::memory::vm;

#[derive(Debug, Arbitrary)]
enum Op {
    /// Key, size in pages (1..=4).
    Reserve(u8, u8),
    Complete(u8, u8),
    Retrieve(u8),
    Release(u8),
    Invalidate(u8),
}

fuzz_target!(|ops: Vec<Op>| {
    let page = vm::page_size();
    let Ok(mut cache): Result<FileCache, _> = FileCache::new(FileCacheConfig {
        capacity: 16 * page,
        eviction_warn_threshold: 64,
    }) else {
        return;
    };
    let interner = PathInterner::new();
    let keys: Vec<PathKey> = (0..8).map(|i| interner.intern(&format!("fuzz/{i}"))).collect();
    // Byte each key was filled with, for every live reference.
    let mut refs: HashMap<usize, (u32, u8)> = HashMap::new();

    for op in ops {
        match op {
            Op::Reserve(k, pages) => {
                let i = k as usize % keys.len();
                let size = (pages as usize % 4 + 1) * page;
                if cache.reserve(&keys[i], size).is_ok() {
                    if let Some(dst) = cache.fill(&keys[i]) {
                        dst.fill(k);
                    }
                    refs.insert(i, (1, k));
                }
            }
            Op::Complete(k, cost) => {
                let i = k as usize % keys.len();
                let _ = cache.mark_complete(&keys[i], f32::from(cost) + 1.0);
            }
            Op::Retrieve(k) => {
                let i = k as usize % keys.len();
                if cache.retrieve(&keys[i]).is_some() {
                    let byte = cache.contents(&keys[i]).map_or(0, |c| c[0]);
                    let entry = refs.entry(i).or_insert((0, byte));
                    entry.0 += 1;
                    entry.1 = byte;
                }
            }
            Op::Release(k) => {
                let i = k as usize % keys.len();
                if cache.release(&keys[i]).is_ok() {
                    if let Some(entry) = refs.get_mut(&i) {
                        entry.0 -= 1;
                        if entry.0 == 0 {
                            refs.remove(&i);
                        }
                    }
                }
            }
            Op::Invalidate(k) => {
                let i = k as usize % keys.len();
                let _ = cache.invalidate(&keys[i]);
            }
        }

        for (&i, &(count, byte)) in &refs {
            assert_eq!(cache.ref_count(&keys[i]), count);
            if let Some(contents) = cache.contents(&keys[i]) {
                assert!(contents.iter().all(|&b| b == byte));
            }
        }
    }

    for (i, (count, _)) in refs.drain() {
        for _ in 0..count {
            cache.release(&keys[i]).unwrap();
        }
    }
    let stats = cache.stats();
    assert_eq!(cache.active_len(), 0);
    assert_eq!(stats.allocator.allocated_bytes, stats.bytes_cached);
});
