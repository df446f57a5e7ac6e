use std::io::Write;

use super::*;
use crate::cache::LandlordLazy;

fn page() -> usize {
    vm::page_size()
}

fn cache_with_pages(pages: usize) -> FileCache {
    FileCache::new(FileCacheConfig {
        capacity: pages * page(),
        eviction_warn_threshold: 8,
    })
    .unwrap()
}

/// Reserve, fill with `byte`, complete.
fn publish<M: Manager<PathKey, FileBuf>>(
    fc: &mut FileCache<M>,
    key: &PathKey,
    size: usize,
    byte: u8,
    cost: f32,
) -> FileBuf {
    let buf = fc.reserve(key, size).unwrap();
    fc.fill(key).unwrap().fill(byte);
    fc.mark_complete(key, cost).unwrap();
    buf
}

#[test]
fn publish_retrieve_release() {
    let interner = PathInterner::new();
    let key = interner.intern("data/a.bin");
    let mut fc = cache_with_pages(16);

    let buf = publish(&mut fc, &key, 1000, 0xAA, 1.0);
    assert_eq!(buf.len(), 1000);
    assert_eq!(buf.capacity(), page());
    assert!(vm::is_page_aligned(buf.as_ptr() as usize));
    assert!(fc.is_cached(&key));
    assert_eq!(fc.ref_count(&key), 1);

    let again = fc.retrieve(&key).unwrap();
    assert_eq!(again, buf);
    assert_eq!(fc.ref_count(&key), 2);
    assert!(fc.contents(&key).unwrap().iter().all(|&b| b == 0xAA));

    fc.release(&key).unwrap();
    fc.release(&key).unwrap();
    assert_eq!(fc.ref_count(&key), 0);
    assert_eq!(fc.active_len(), 0);
    assert!(fc.is_cached(&key));
    assert!(fc.contents(&key).is_none());

    // Cached but inactive: retrieve reactivates without copying.
    assert_eq!(fc.retrieve(&key), Some(buf));
    assert_eq!(fc.stats().hits, 2);
}

#[test]
fn miss_is_counted() {
    let interner = PathInterner::new();
    let mut fc = cache_with_pages(4);
    assert!(fc.retrieve(&interner.intern("nope")).is_none());
    assert_eq!(fc.stats().misses, 1);
}

#[test]
fn buffer_in_progress_is_exclusive() {
    let interner = PathInterner::new();
    let key = interner.intern("data/in-progress");
    let mut fc = cache_with_pages(4);

    fc.reserve(&key, 64).unwrap();
    assert!(fc.retrieve(&key).is_none());
    assert!(fc.contents(&key).is_none());
    assert!(matches!(fc.reserve(&key, 64), Err(FileCacheError::Busy { .. })));
    assert!(!fc.is_cached(&key));

    fc.mark_complete(&key, 1.0).unwrap();
    assert!(matches!(
        fc.mark_complete(&key, 1.0),
        Err(FileCacheError::AlreadyComplete { .. })
    ));
    assert!(fc.fill(&key).is_none());
}

#[test]
fn unknown_keys_are_errors() {
    let interner = PathInterner::new();
    let key = interner.intern("ghost");
    let mut fc = cache_with_pages(4);
    assert!(matches!(
        fc.mark_complete(&key, 1.0),
        Err(FileCacheError::NotReserved { .. })
    ));
    assert!(matches!(fc.release(&key), Err(FileCacheError::NotActive { .. })));
    assert_eq!(fc.invalidate(&key).unwrap(), false);
}

#[test]
fn invalidate_referenced_key_is_busy() {
    let interner = PathInterner::new();
    let key = interner.intern("data/busy");
    let mut fc = cache_with_pages(4);
    publish(&mut fc, &key, 100, 1, 1.0);

    let before = fc.stats();
    assert!(matches!(fc.invalidate(&key), Err(FileCacheError::Busy { .. })));
    assert!(fc.is_cached(&key));
    assert_eq!(fc.ref_count(&key), 1);
    let after = fc.stats();
    assert_eq!(after.busy_invalidations, 1);
    assert_eq!(after.allocator, before.allocator);
    assert_eq!(after.bytes_cached, before.bytes_cached);

    fc.release(&key).unwrap();
    assert_eq!(fc.invalidate(&key).unwrap(), true);
    assert!(!fc.is_cached(&key));
    assert_eq!(fc.stats().allocator.allocated_blocks, 0);
    assert_eq!(fc.invalidate(&key).unwrap(), false);
}

#[test]
fn evicted_buffer_survives_until_last_release() {
    let interner = PathInterner::new();
    let a = interner.intern("data/a");
    let b = interner.intern("data/b");
    let c = interner.intern("data/c");
    let mut fc = cache_with_pages(4);

    let buf_a = publish(&mut fc, &a, 2 * page(), 0x11, 1.0);
    fc.retrieve(&a).unwrap();
    fc.release(&a).unwrap();
    assert_eq!(fc.ref_count(&a), 1);

    publish(&mut fc, &b, 2 * page(), 0x22, 100.0);
    fc.release(&b).unwrap();

    // Full: a is cheapest and goes first but is still referenced, so b is
    // freed to make room.
    let buf_c = fc.reserve(&c, 2 * page()).unwrap();
    let stats = fc.stats();
    assert_eq!(stats.evictions, 2);
    assert_eq!(stats.deferred_frees, 1);
    assert!(!fc.is_cached(&a));
    assert!(!fc.is_cached(&b));
    assert_ne!(buf_c.as_ptr(), buf_a.as_ptr());

    assert!(fc.contents(&a).unwrap().iter().all(|&x| x == 0x11));
    assert_eq!(stats.allocator.allocated_blocks, 2);

    fc.release(&a).unwrap();
    assert_eq!(fc.stats().allocator.allocated_blocks, 1);
    fc.release(&c).unwrap();
    assert_eq!(fc.stats().allocator.allocated_blocks, 0);
}

#[test]
fn out_of_memory_when_everything_is_referenced() {
    let interner = PathInterner::new();
    let a = interner.intern("data/huge");
    let b = interner.intern("data/small");
    let mut fc = cache_with_pages(4);

    publish(&mut fc, &a, 4 * page(), 0, 1.0);
    assert!(matches!(
        fc.reserve(&b, 1),
        Err(FileCacheError::OutOfMemory { .. })
    ));
    assert!(matches!(
        fc.reserve(&b, 5 * page()),
        Err(FileCacheError::OutOfMemory { .. })
    ));
    assert_eq!(fc.active_len(), 1);
}

#[test]
fn abandoned_reservation_is_freed() {
    let interner = PathInterner::new();
    let key = interner.intern("data/abandoned");
    let mut fc = cache_with_pages(4);

    fc.reserve(&key, 10).unwrap();
    assert_eq!(fc.stats().allocator.allocated_blocks, 1);
    fc.release(&key).unwrap();
    assert_eq!(fc.stats().allocator.allocated_blocks, 0);
    assert!(!fc.is_cached(&key));
}

#[test]
fn reserve_replaces_stale_copy() {
    let interner = PathInterner::new();
    let key = interner.intern("data/stale");
    let mut fc = cache_with_pages(4);

    publish(&mut fc, &key, 100, 1, 1.0);
    fc.release(&key).unwrap();

    fc.reserve(&key, 200).unwrap();
    assert!(!fc.is_cached(&key));
    assert_eq!(fc.stats().allocator.allocated_blocks, 1);
    fc.fill(&key).unwrap().fill(2);
    fc.mark_complete(&key, 1.0).unwrap();
    assert_eq!(fc.contents(&key).unwrap(), &[2u8; 200][..]);
}

#[test]
fn lazy_manager_file_cache() {
    let interner = PathInterner::new();
    let keys: Vec<_> = (0..6).map(|i| interner.intern(&format!("lazy/{i}"))).collect();
    let mut fc: FileCache<LandlordLazy<PathKey, FileBuf>> = FileCache::new(FileCacheConfig {
        capacity: 4 * page(),
        eviction_warn_threshold: 8,
    })
    .unwrap();

    for (i, key) in keys.iter().enumerate() {
        publish(&mut fc, key, page(), i as u8, (i + 1) as f32);
        fc.release(key).unwrap();
    }
    // Six one-page files through four pages: the two cheapest are gone.
    assert_eq!(fc.cached_len(), 4);
    assert!(!fc.is_cached(&keys[0]));
    assert!(!fc.is_cached(&keys[1]));
    assert!(fc.is_cached(&keys[5]));
}

#[test]
fn load_reads_file_once() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"zero-copy contents").unwrap();
    let mut fc = cache_with_pages(8);

    let (key, buf) = fc.load(file.path()).unwrap();
    assert_eq!(buf.len(), 18);
    assert_eq!(fc.contents(&key).unwrap(), b"zero-copy contents");
    assert_eq!(fc.stats().misses, 1);

    let (again, buf2) = fc.load(file.path()).unwrap();
    assert_eq!(again, key);
    assert_eq!(buf2, buf);
    assert_eq!(fc.ref_count(&key), 2);
    assert_eq!(fc.stats().hits, 1);

    fc.release(&key).unwrap();
    fc.release(&key).unwrap();
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut fc = cache_with_pages(4);
    let err = fc.load(dir.path().join("missing.bin")).unwrap_err();
    assert!(matches!(err, FileCacheError::Io { .. }));
    assert_eq!(fc.active_len(), 0);
}

#[test]
fn reserve_rejects_sizes_that_cannot_be_page_rounded() {
    let interner = PathInterner::new();
    let key = interner.intern("data/overflow");
    let mut fc = cache_with_pages(4);

    for size in [usize::MAX - 10, usize::MAX, usize::MAX - page() + 2] {
        assert!(matches!(
            fc.reserve(&key, size),
            Err(FileCacheError::OutOfMemory { requested, .. }) if requested == size
        ));
    }
    assert_eq!(fc.active_len(), 0);
    assert!(fc.fill(&key).is_none());
    assert_eq!(fc.stats().allocator.allocated_blocks, 0);
}

#[cfg(unix)]
#[test]
fn load_keeps_non_utf8_names_apart() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join(OsStr::from_bytes(b"asset\xff.bin"));
    let second = dir.path().join(OsStr::from_bytes(b"asset\xfe.bin"));
    std::fs::write(&first, b"AAAA").unwrap();
    std::fs::write(&second, b"BBBB").unwrap();
    let mut fc = cache_with_pages(8);

    let (a, _) = fc.load(&first).unwrap();
    let (b, _) = fc.load(&second).unwrap();
    assert_ne!(a, b);
    assert_eq!(fc.contents(&a).unwrap(), b"AAAA");
    assert_eq!(fc.contents(&b).unwrap(), b"BBBB");
    assert_eq!(fc.stats().misses, 2);
}

#[cfg(unix)]
#[test]
fn load_treats_backslash_as_part_of_the_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("a")).unwrap();
    let nested = dir.path().join("a").join("b");
    let flat = dir.path().join("a\\b");
    std::fs::write(&nested, b"nested").unwrap();
    std::fs::write(&flat, b"flat").unwrap();
    let mut fc = cache_with_pages(8);

    let (n, _) = fc.load(&nested).unwrap();
    let (f, _) = fc.load(&flat).unwrap();
    assert_ne!(n, f);
    assert_eq!(fc.contents(&n).unwrap(), b"nested");
    assert_eq!(fc.contents(&f).unwrap(), b"flat");
}

/// Whether the mapping containing `addr` allows writes, per /proc/self/maps.
#[cfg(target_os = "linux")]
fn is_writable(addr: usize) -> bool {
    let maps = std::fs::read_to_string("/proc/self/maps").unwrap();
    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let (Some(range), Some(perms)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let start = usize::from_str_radix(start, 16).unwrap();
        let end = usize::from_str_radix(end, 16).unwrap();
        if (start..end).contains(&addr) {
            return perms.as_bytes()[1] == b'w';
        }
    }
    panic!("address {addr:#x} is not mapped");
}

#[cfg(target_os = "linux")]
#[test]
fn completed_buffers_are_read_only_until_freed() {
    let interner = PathInterner::new();
    let key = interner.intern("data/protected");
    let mut fc = cache_with_pages(4);

    let buf = fc.reserve(&key, 3 * page()).unwrap();
    let last_page = buf.as_ptr() as usize + 2 * page();
    assert!(is_writable(buf.as_ptr() as usize));
    fc.fill(&key).unwrap().fill(7);

    fc.mark_complete(&key, 1.0).unwrap();
    assert!(!is_writable(buf.as_ptr() as usize));
    assert!(!is_writable(last_page));

    fc.release(&key).unwrap();
    assert!(!is_writable(buf.as_ptr() as usize));

    assert!(fc.invalidate(&key).unwrap());
    assert!(is_writable(buf.as_ptr() as usize));
    assert!(is_writable(last_page));
}
