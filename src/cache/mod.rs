//! Size- and cost-aware cache container with pluggable eviction policy.
//!
//! [`Cache`] tracks which items are eligible for eviction; it never owns the
//! memory an item describes. Policies implement [`Manager`]:
//!
//! - [`LandlordNaive`]: Landlord, minimum credit density rescanned each pass
//! - [`LandlordCached`]: Landlord, running minimum kept between passes
//! - [`LandlordLazy`]: Landlord, charges deferred and victims taken from a heap
//! - [`Lru`]: plain recency order

mod divider;
mod entry;
mod heap;
mod landlord;
mod lazy;
mod lru;

use std::collections::VecDeque;
use std::marker::PhantomData;

pub use divider::{Divider, DividerNaive, DividerRecip};
pub use landlord::{CachedMcd, Landlord, LandlordCached, LandlordNaive, McdCalc, NaiveMcd};
pub use lazy::LandlordLazy;
pub use lru::Lru;

/// Credit below which an entry is evicted.
pub const EVICTION_EPSILON: f32 = 1e-4;

/// Weight of the cost when refreshing credit on access:
/// `credit = GAIN * cost + (1 - GAIN) * credit`.
pub const CREDIT_REFRESH_GAIN: f32 = 0.75;

/// An item removed by an eviction pass.
#[derive(Debug)]
pub struct Victim<K, T> {
    pub key: K,
    pub item: T,
    pub size: usize,
}

/// Eviction policy over a keyed set of items.
pub trait Manager<K, T> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Track a new item. `size` must be non-zero.
    fn add(&mut self, key: K, item: T, size: usize, cost: f32);

    fn remove(&mut self, key: &K) -> Option<(T, usize)>;

    /// Look up an item and record the access.
    fn retrieve(&mut self, key: &K) -> Option<&T>;

    /// Look up an item without recording the access.
    fn peek(&self, key: &K) -> Option<&T>;

    fn contains(&self, key: &K) -> bool;

    /// Run one eviction pass, appending victims in eviction order. May
    /// append nothing; callers retry until something is evicted.
    fn evict_pass(&mut self, victims: &mut VecDeque<Victim<K, T>>);
}

/// Cache container over a [`Manager`]. Victims of one pass are handed out
/// one per [`Cache::remove_least_valuable`] call; the rest wait in order.
#[derive(Debug)]
pub struct Cache<K, T, M> {
    manager: M,
    victims: VecDeque<Victim<K, T>>,
    _marker: PhantomData<fn(K) -> T>,
}

impl<K, T, M: Manager<K, T> + Default> Cache<K, T, M> {
    pub fn new() -> Self {
        Self::with_manager(M::default())
    }
}

impl<K, T, M: Manager<K, T> + Default> Default for Cache<K, T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, M: Manager<K, T>> Cache<K, T, M> {
    pub fn with_manager(manager: M) -> Self {
        Self {
            manager,
            victims: VecDeque::new(),
            _marker: PhantomData,
        }
    }

    /// True when [`Cache::remove_least_valuable`] would return None.
    pub fn is_empty(&self) -> bool {
        self.manager.is_empty() && self.victims.is_empty()
    }

    /// Number of retrievable items. Victims not yet handed out are not
    /// counted.
    pub fn len(&self) -> usize {
        self.manager.len()
    }

    /// Victims already chosen but not yet returned.
    pub fn pending_len(&self) -> usize {
        self.victims.len()
    }

    pub fn add(&mut self, key: K, item: T, size: usize, cost: f32) {
        self.manager.add(key, item, size, cost);
    }

    /// Stop tracking `key`. Absent keys are ignored.
    pub fn remove(&mut self, key: &K) -> Option<(T, usize)> {
        self.manager.remove(key)
    }

    pub fn retrieve(&mut self, key: &K) -> Option<&T> {
        self.manager.retrieve(key)
    }

    pub fn peek(&self, key: &K) -> Option<&T> {
        self.manager.peek(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.manager.contains(key)
    }

    /// Evict the least valuable item and return it with its size.
    pub fn remove_least_valuable(&mut self) -> Option<(T, usize)> {
        self.remove_least_valuable_entry().map(|v| (v.item, v.size))
    }

    /// As [`Cache::remove_least_valuable`], keeping the key.
    pub fn remove_least_valuable_entry(&mut self) -> Option<Victim<K, T>> {
        while self.victims.is_empty() && !self.manager.is_empty() {
            self.manager.evict_pass(&mut self.victims);
        }
        self.victims.pop_front()
    }

    /// Items evicted by the last pass but not yet handed out.
    pub fn pending(&self) -> impl Iterator<Item = &T> {
        self.victims.iter().map(|v| &v.item)
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }
}
