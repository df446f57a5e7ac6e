//! Landlord with deferred charging.
//!
//! A pass only advances a shared `pending` density; each entry's effective
//! credit is `stored - pending * size`. Since every entry is charged the
//! same density, heap order by stored density equals order by effective
//! density, so passes cost O(victims * log n). Adding an entry commits the
//! pending charge to everyone first.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use tracing::trace;

use super::divider::{Divider, DividerRecip};
use super::entry::Entry;
use super::heap::DensityHeap;
use super::{Manager, Victim, EVICTION_EPSILON};

#[derive(Debug)]
pub struct LandlordLazy<K, T, D = DividerRecip> {
    entries: HashMap<K, Entry<T, D>>,
    heap: DensityHeap<K>,
    pending: f32,
    next_seq: u64,
}

impl<K, T, D> Default for LandlordLazy<K, T, D>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            heap: DensityHeap::new(),
            pending: 0.0,
            next_seq: 0,
        }
    }
}

impl<K, T, D> LandlordLazy<K, T, D>
where
    K: Clone + Eq + Hash,
    D: Divider,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective remaining credit of `key`, pending charges included.
    pub fn credit(&self, key: &K) -> Option<f32> {
        self.entries.get(key).map(|e| self.effective(e))
    }

    #[inline]
    fn effective(&self, entry: &Entry<T, D>) -> f32 {
        (entry.credit - self.pending * entry.size as f32).max(0.0)
    }

    /// Fold the pending charge into every stored credit.
    fn commit_pending(&mut self) {
        if self.pending == 0.0 {
            return;
        }
        let pending = self.pending;
        for entry in self.entries.values_mut() {
            entry.charge(pending);
        }
        self.pending = 0.0;
        let entries = &self.entries;
        self.heap
            .rebuild(|key| entries.get(key).map_or(f32::INFINITY, Entry::density));
    }
}

impl<K, T, D> Manager<K, T> for LandlordLazy<K, T, D>
where
    K: Clone + Eq + Hash,
    D: Divider,
{
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn add(&mut self, key: K, item: T, size: usize, cost: f32) {
        let replaced = self.remove(&key).is_some();
        debug_assert!(!replaced, "key added to the cache twice");

        self.commit_pending();
        let entry = Entry::new(item, size, cost, self.next_seq);
        self.next_seq += 1;
        self.heap.push(key.clone(), entry.density(), entry.seq);
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &K) -> Option<(T, usize)> {
        let entry = self.entries.remove(key)?;
        self.heap.remove(key);
        if self.entries.is_empty() {
            self.pending = 0.0;
        }
        Some((entry.item, entry.size))
    }

    fn retrieve(&mut self, key: &K) -> Option<&T> {
        let pending = self.pending;
        let entry = self.entries.get_mut(key)?;
        let charge = pending * entry.size as f32;
        let effective = (entry.credit - charge).max(0.0);
        entry.credit = entry.refreshed(effective) + charge;
        self.heap.update(key, entry.density());
        Some(&entry.item)
    }

    fn peek(&self, key: &K) -> Option<&T> {
        self.entries.get(key).map(|e| &e.item)
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn evict_pass(&mut self, victims: &mut VecDeque<Victim<K, T>>) {
        let Some(entry) = self.heap.peek().and_then(|k| self.entries.get(k)) else {
            return;
        };
        let mcd = entry.density_at(self.effective(entry));
        let before = self.pending;
        self.pending += mcd;

        // Heap order follows stored credit, which keeps falling below zero
        // for entries already at zero; report by clamped pre-charge density.
        let mut batch: Vec<(f32, u64, K, Entry<T, D>)> = Vec::new();
        while let Some(key) = self.heap.peek() {
            let crossed = self
                .entries
                .get(key)
                .map_or(true, |e| self.effective(e) < EVICTION_EPSILON);
            if !crossed {
                break;
            }
            let Some(key) = self.heap.pop() else { break };
            if let Some(entry) = self.entries.remove(&key) {
                let prior = (entry.credit - before * entry.size as f32).max(0.0);
                batch.push((entry.density_at(prior), entry.seq, key, entry));
            }
        }
        batch.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let evicted = batch.len();
        victims.extend(batch.into_iter().map(|(_, _, key, entry)| Victim {
            key,
            item: entry.item,
            size: entry.size,
        }));
        if self.entries.is_empty() {
            self.pending = 0.0;
            self.heap.clear();
        }
        trace!(mcd, pending = self.pending, evicted, remaining = self.entries.len(), "lazy landlord pass");
    }
}
