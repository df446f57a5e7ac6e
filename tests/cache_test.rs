//! Eviction policy tests through the public cache API.

use zcio::cache::{
    Cache, DividerNaive, LandlordCached, LandlordLazy, LandlordNaive, Lru, Manager,
};

const SIZE: usize = 16;
const COSTS: [f32; 8] = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];

/// Fill, evict, refresh, add and evict the rest; return the eviction order.
fn run_script<M: Manager<u32, u32> + Default>() -> Vec<u32> {
    let mut cache: Cache<u32, u32, M> = Cache::new();
    for (key, cost) in COSTS.iter().enumerate() {
        cache.add(key as u32, key as u32, SIZE, *cost);
    }

    let mut order = Vec::new();
    order.extend(cache.remove_least_valuable_entry().map(|v| v.key));
    assert!(cache.retrieve(&6).is_some());
    cache.add(8, 8, SIZE, 1.0);
    while let Some(victim) = cache.remove_least_valuable_entry() {
        assert_eq!(victim.key, victim.item);
        assert_eq!(victim.size, SIZE);
        order.push(victim.key);
    }
    assert!(cache.is_empty());
    order
}

// Credits stay multiples of 1/4 with equal sizes, so every variant computes
// exactly the same values.
const EXPECTED: [u32; 9] = [1, 3, 8, 6, 0, 2, 4, 7, 5];

#[test]
fn landlord_naive_order() {
    assert_eq!(run_script::<LandlordNaive<u32, u32>>(), EXPECTED);
}

#[test]
fn landlord_cached_order() {
    assert_eq!(run_script::<LandlordCached<u32, u32>>(), EXPECTED);
}

#[test]
fn landlord_lazy_order() {
    assert_eq!(run_script::<LandlordLazy<u32, u32>>(), EXPECTED);
}

#[test]
fn dividers_agree_on_power_of_two_sizes() {
    assert_eq!(
        run_script::<LandlordCached<u32, u32, DividerNaive>>(),
        run_script::<LandlordCached<u32, u32>>()
    );
    assert_eq!(
        run_script::<LandlordLazy<u32, u32, DividerNaive>>(),
        run_script::<LandlordLazy<u32, u32>>()
    );
}

#[test]
fn lru_evicts_least_recently_used() {
    let mut cache: Cache<&str, u8, Lru<&str, u8>> = Cache::new();
    cache.add("a", 1, 10, 100.0);
    cache.add("b", 2, 10, 1.0);
    cache.add("c", 3, 10, 1.0);
    cache.retrieve(&"a");
    cache.peek(&"b");

    assert_eq!(cache.remove_least_valuable(), Some((2, 10)));
    assert_eq!(cache.remove_least_valuable(), Some((3, 10)));
    assert_eq!(cache.remove_least_valuable(), Some((1, 10)));
    assert_eq!(cache.remove_least_valuable(), None);
}

#[test]
fn access_never_lowers_credit() {
    let mut naive = Cache::with_manager(LandlordNaive::<u32, u32>::new());
    let mut lazy = Cache::with_manager(LandlordLazy::<u32, u32>::new());
    for key in 0..4u32 {
        let size = 64 << key;
        naive.add(key, key, size, 8.0);
        lazy.add(key, key, size, 8.0);
    }
    // Drain the first pass so every survivor carries a charge.
    assert_eq!(naive.remove_least_valuable_entry().map(|v| v.key), Some(3));
    assert_eq!(lazy.remove_least_valuable_entry().map(|v| v.key), Some(3));

    for key in 0..3u32 {
        let before = naive.manager().credit(&key).unwrap();
        naive.retrieve(&key);
        let after = naive.manager().credit(&key).unwrap();
        assert!(after >= before, "naive key {key}: {before} -> {after}");
        assert!(after <= 8.0);

        let before = lazy.manager().credit(&key).unwrap();
        lazy.retrieve(&key);
        let after = lazy.manager().credit(&key).unwrap();
        assert!(after >= before, "lazy key {key}: {before} -> {after}");
        assert!(after <= 8.0);
    }
}

#[test]
fn removed_keys_are_not_evicted() {
    let mut cache: Cache<u32, u32, LandlordCached<u32, u32>> = Cache::new();
    cache.add(1, 1, SIZE, 1.0);
    cache.add(2, 2, SIZE, 2.0);
    assert_eq!(cache.remove(&1), Some((1, SIZE)));
    assert!(!cache.contains(&1));
    assert_eq!(cache.remove_least_valuable_entry().map(|v| v.key), Some(2));
    assert!(cache.remove_least_valuable_entry().is_none());
}
