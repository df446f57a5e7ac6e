//! Landlord eviction with eager charging.
//!
//! Every pass charges each entry `MCD * size`, where MCD is the minimum
//! credit density over all entries. How MCD is obtained is pluggable:
//! [`NaiveMcd`] scans every pass, [`CachedMcd`] keeps a running minimum
//! that is only recomputed after the minimum entry is raised or removed.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use tracing::trace;

use super::divider::{Divider, DividerRecip};
use super::entry::Entry;
use super::{Manager, Victim, EVICTION_EPSILON};

/// Source of the minimum credit density for the next pass.
///
/// The Landlord reports every density change through the `notify_*`
/// hooks; implementations that cannot answer return None from
/// [`McdCalc::cached`] and the Landlord scans instead.
pub trait McdCalc: Default {
    fn cached(&self) -> Option<f32>;
    /// Survivors of the pass about to be reported follow.
    fn begin_pass(&mut self);
    /// An entry now has `density`, no higher than its previous value.
    fn notify_decreased(&mut self, density: f32);
    /// An entry currently at `density` is about to be raised.
    fn notify_impending_increase(&mut self, density: f32);
    /// An entry at `density` left the map.
    fn notify_removed(&mut self, density: f32);
}

/// Always rescans.
#[derive(Debug, Default)]
pub struct NaiveMcd;

impl McdCalc for NaiveMcd {
    fn cached(&self) -> Option<f32> {
        None
    }
    fn begin_pass(&mut self) {}
    fn notify_decreased(&mut self, _density: f32) {}
    fn notify_impending_increase(&mut self, _density: f32) {}
    fn notify_removed(&mut self, _density: f32) {}
}

/// Running minimum with a validity flag.
#[derive(Debug)]
pub struct CachedMcd {
    min: f32,
    valid: bool,
}

impl Default for CachedMcd {
    fn default() -> Self {
        // An empty map has no minimum; the first add establishes one.
        Self {
            min: f32::INFINITY,
            valid: true,
        }
    }
}

impl McdCalc for CachedMcd {
    fn cached(&self) -> Option<f32> {
        (self.valid && self.min.is_finite()).then_some(self.min)
    }

    fn begin_pass(&mut self) {
        self.min = f32::INFINITY;
        self.valid = true;
    }

    fn notify_decreased(&mut self, density: f32) {
        if density < self.min {
            self.min = density;
        }
    }

    fn notify_impending_increase(&mut self, density: f32) {
        if density <= self.min {
            self.valid = false;
        }
    }

    fn notify_removed(&mut self, density: f32) {
        if density <= self.min {
            self.valid = false;
        }
    }
}

/// Landlord manager parameterized by divider and MCD strategy.
#[derive(Debug)]
pub struct Landlord<K, T, D = DividerRecip, C = CachedMcd> {
    entries: HashMap<K, Entry<T, D>>,
    mcd: C,
    next_seq: u64,
}

/// Scans for the minimum credit density on every pass.
pub type LandlordNaive<K, T, D = DividerRecip> = Landlord<K, T, D, NaiveMcd>;

/// Reuses the minimum found while charging the previous pass.
pub type LandlordCached<K, T, D = DividerRecip> = Landlord<K, T, D, CachedMcd>;

impl<K, T, D, C: McdCalc> Default for Landlord<K, T, D, C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            mcd: C::default(),
            next_seq: 0,
        }
    }
}

impl<K, T, D, C> Landlord<K, T, D, C>
where
    K: Clone + Eq + Hash,
    D: Divider,
    C: McdCalc,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining credit of `key`, if present.
    pub fn credit(&self, key: &K) -> Option<f32> {
        self.entries.get(key).map(|e| e.credit)
    }

    fn min_density(&self) -> f32 {
        self.entries
            .values()
            .map(Entry::density)
            .fold(f32::INFINITY, f32::min)
    }
}

impl<K, T, D, C> Manager<K, T> for Landlord<K, T, D, C>
where
    K: Clone + Eq + Hash,
    D: Divider,
    C: McdCalc,
{
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn add(&mut self, key: K, item: T, size: usize, cost: f32) {
        let replaced = self.remove(&key).is_some();
        debug_assert!(!replaced, "key added to the cache twice");

        let entry = Entry::new(item, size, cost, self.next_seq);
        self.next_seq += 1;
        self.mcd.notify_decreased(entry.density());
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &K) -> Option<(T, usize)> {
        let entry = self.entries.remove(key)?;
        self.mcd.notify_removed(entry.density());
        Some((entry.item, entry.size))
    }

    fn retrieve(&mut self, key: &K) -> Option<&T> {
        let entry = self.entries.get_mut(key)?;
        self.mcd.notify_impending_increase(entry.density());
        entry.credit = entry.refreshed(entry.credit);
        Some(&entry.item)
    }

    fn peek(&self, key: &K) -> Option<&T> {
        self.entries.get(key).map(|e| &e.item)
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn evict_pass(&mut self, victims: &mut VecDeque<Victim<K, T>>) {
        if self.entries.is_empty() {
            return;
        }
        let mcd = match self.mcd.cached() {
            Some(mcd) => mcd,
            None => self.min_density(),
        };

        // Entries that fell below epsilon, and the first entry (by pre-charge
        // density, then age) that did not; only crossers ahead of it go.
        let mut crossed: Vec<(f32, u64, K)> = Vec::new();
        let mut stop: Option<(f32, u64)> = None;
        self.mcd.begin_pass();
        for (key, entry) in self.entries.iter_mut() {
            let before = entry.density();
            entry.charge(mcd);
            if entry.credit < EVICTION_EPSILON {
                crossed.push((before, entry.seq, key.clone()));
            } else {
                self.mcd.notify_decreased(entry.density());
                if stop.map_or(true, |s| precedes((before, entry.seq), s)) {
                    stop = Some((before, entry.seq));
                }
            }
        }

        crossed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut evicted = 0;
        for (density, seq, key) in crossed {
            if stop.map_or(true, |s| precedes((density, seq), s)) {
                if let Some(entry) = self.entries.remove(&key) {
                    victims.push_back(Victim {
                        key,
                        item: entry.item,
                        size: entry.size,
                    });
                    evicted += 1;
                }
            } else if let Some(entry) = self.entries.get(&key) {
                self.mcd.notify_decreased(entry.density());
            }
        }
        trace!(mcd, evicted, remaining = self.entries.len(), "landlord pass");
    }
}

/// Strict ordering on (density, insertion sequence).
#[inline]
pub(super) fn precedes(a: (f32, u64), b: (f32, u64)) -> bool {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).is_lt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;

    #[test]
    fn credit_starts_at_cost() {
        let mut ll: LandlordCached<u32, &str> = Landlord::new();
        ll.add(1, "a", 64, 8.0);
        assert_eq!(ll.credit(&1), Some(8.0));
    }

    #[test]
    fn pass_charges_survivors() {
        let mut ll: LandlordNaive<u32, &str> = Landlord::new();
        ll.add(1, "cheap", 64, 4.0);
        ll.add(2, "dear", 64, 16.0);

        let mut victims = VecDeque::new();
        ll.evict_pass(&mut victims);
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].key, 1);
        // MCD = 4/64, so "dear" pays 4.
        assert_eq!(ll.credit(&2), Some(12.0));
    }

    #[test]
    fn retrieve_refreshes_toward_cost() {
        let mut ll: LandlordCached<u32, &str> = Landlord::new();
        ll.add(1, "a", 64, 4.0);
        ll.add(2, "b", 64, 16.0);
        let mut victims = VecDeque::new();
        ll.evict_pass(&mut victims);
        assert_eq!(ll.credit(&2), Some(12.0));

        assert_eq!(ll.retrieve(&2), Some(&"b"));
        assert_eq!(ll.credit(&2), Some(0.75 * 16.0 + 0.25 * 12.0));
        // peek leaves credit alone
        assert_eq!(ll.peek(&2), Some(&"b"));
        assert_eq!(ll.credit(&2), Some(15.0));
    }

    #[test]
    fn cached_mcd_invalidated_by_refresh_of_minimum() {
        let mut mcd = CachedMcd::default();
        mcd.notify_decreased(0.5);
        mcd.notify_decreased(0.25);
        assert_eq!(mcd.cached(), Some(0.25));
        mcd.notify_impending_increase(0.5);
        assert_eq!(mcd.cached(), Some(0.25));
        mcd.notify_impending_increase(0.25);
        assert_eq!(mcd.cached(), None);
        mcd.begin_pass();
        mcd.notify_decreased(1.0);
        assert_eq!(mcd.cached(), Some(1.0));
        mcd.notify_removed(1.0);
        assert_eq!(mcd.cached(), None);
    }

    #[test]
    fn zero_cost_entries_go_first() {
        let mut cache: Cache<u32, &str, LandlordCached<u32, &str>> = Cache::new();
        cache.add(1, "kept", 64, 8.0);
        cache.add(2, "free", 64, 0.0);
        assert_eq!(cache.remove_least_valuable(), Some(("free", 64)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn crossers_behind_a_survivor_wait_for_next_pass() {
        let mut ll: LandlordNaive<u32, &str> = Landlord::new();
        // Densities a < b < c. After charging, a and c are below epsilon
        // but b, which is large, is not.
        ll.add(1, "a", 1024, 1.0);
        ll.add(2, "b", 1024, 1.0 + 2f32.powi(-11));
        ll.add(3, "c", 16, 2f32.powi(-6) + 2f32.powi(-16));

        let mut victims = VecDeque::new();
        ll.evict_pass(&mut victims);
        let keys: Vec<_> = victims.iter().map(|v| v.key).collect();
        assert_eq!(keys, vec![1]);
        assert_eq!(ll.credit(&3), Some(2f32.powi(-16)));

        victims.clear();
        ll.evict_pass(&mut victims);
        let keys: Vec<_> = victims.iter().map(|v| v.key).collect();
        assert_eq!(keys, vec![2, 3]);
    }
}
