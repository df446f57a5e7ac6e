//! Least-recently-used manager, for comparison with Landlord.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;

use super::{Manager, Victim};

#[derive(Debug)]
struct LruEntry<T> {
    item: T,
    size: usize,
    last_used: u64,
}

/// Evicts the entry whose last add or retrieve is oldest. Size and cost
/// are ignored for ordering.
#[derive(Debug)]
pub struct Lru<K, T> {
    entries: HashMap<K, LruEntry<T>>,
    recency: BTreeMap<u64, K>,
    access_counter: u64,
}

impl<K, T> Default for Lru<K, T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            access_counter: 0,
        }
    }
}

impl<K: Clone + Eq + Hash, T> Lru<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }
}

impl<K: Clone + Eq + Hash, T> Manager<K, T> for Lru<K, T> {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn add(&mut self, key: K, item: T, size: usize, _cost: f32) {
        let replaced = self.remove(&key).is_some();
        debug_assert!(!replaced, "key added to the cache twice");

        let last_used = self.tick();
        self.recency.insert(last_used, key.clone());
        self.entries.insert(key, LruEntry { item, size, last_used });
    }

    fn remove(&mut self, key: &K) -> Option<(T, usize)> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_used);
        Some((entry.item, entry.size))
    }

    fn retrieve(&mut self, key: &K) -> Option<&T> {
        let counter = self.tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_used);
        entry.last_used = counter;
        self.recency.insert(counter, key.clone());
        Some(&entry.item)
    }

    fn peek(&self, key: &K) -> Option<&T> {
        self.entries.get(key).map(|e| &e.item)
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn evict_pass(&mut self, victims: &mut VecDeque<Victim<K, T>>) {
        let Some((_, key)) = self.recency.pop_first() else {
            return;
        };
        if let Some(entry) = self.entries.remove(&key) {
            victims.push_back(Victim {
                key,
                item: entry.item,
                size: entry.size,
            });
        }
    }
}
