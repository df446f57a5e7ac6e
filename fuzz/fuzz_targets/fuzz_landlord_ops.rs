//! Fuzz target for Landlord eviction.
//!
//! Naive, cached and lazy Landlord must evict in the same order for the
//! same operations when sizes and costs keep the arithmetic exact.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use zcio::cache::{Cache, LandlordCached, LandlordLazy, LandlordNaive, Manager};

#[derive(Debug, Arbitrary)]
enum Op {
    /// Key, cost in whole units (1..=16).
    Add(u8, u8),
    Retrieve(u8),
    Remove(u8),
    Evict,
}

const SIZE: usize = 64;

fn run<M: Manager<u8, u8> + Default>(ops: &[Op]) -> Vec<Option<u8>> {
    let mut cache: Cache<u8, u8, M> = Cache::new();
    let mut trace = Vec::new();
    for op in ops {
        match *op {
            Op::Add(key, cost) => {
                if !cache.contains(&key) {
                    cache.add(key, key, SIZE, f32::from(cost % 16 + 1));
                }
            }
            Op::Retrieve(key) => trace.push(cache.retrieve(&key).copied()),
            Op::Remove(key) => trace.push(cache.remove(&key).map(|(item, _)| item)),
            Op::Evict => trace.push(cache.remove_least_valuable_entry().map(|v| v.key)),
        }
    }
    while let Some(victim) = cache.remove_least_valuable_entry() {
        trace.push(Some(victim.key));
    }
    trace
}

fuzz_target!(|ops: Vec<Op>| {
    // Refreshes add quarter fractions; long runs would exhaust f32 precision.
    if ops.len() > 64 {
        return;
    }
    let naive = run::<LandlordNaive<u8, u8>>(&ops);
    assert_eq!(naive, run::<LandlordCached<u8, u8>>(&ops));
    assert_eq!(naive, run::<LandlordLazy<u8, u8>>(&ops));
});
