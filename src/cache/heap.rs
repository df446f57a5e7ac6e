//! Indexed binary min-heap keyed by (credit density, insertion sequence).
//!
//! Unlike `std::collections::BinaryHeap` it supports removing and
//! re-prioritising arbitrary keys in place, which the lazy Landlord needs
//! after every credit refresh.

use std::collections::HashMap;
use std::hash::Hash;

use super::landlord::precedes;

#[derive(Debug)]
struct Node<K> {
    density: f32,
    seq: u64,
    key: K,
}

impl<K> Node<K> {
    fn rank(&self) -> (f32, u64) {
        (self.density, self.seq)
    }
}

#[derive(Debug)]
pub(super) struct DensityHeap<K> {
    nodes: Vec<Node<K>>,
    positions: HashMap<K, usize>,
}

impl<K: Clone + Eq + Hash> DensityHeap<K> {
    pub(super) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(super) fn push(&mut self, key: K, density: f32, seq: u64) {
        debug_assert!(!self.positions.contains_key(&key), "key pushed twice");
        let idx = self.nodes.len();
        self.positions.insert(key.clone(), idx);
        self.nodes.push(Node { density, seq, key });
        self.sift_up(idx);
    }

    /// Key with the lowest (density, sequence).
    pub(super) fn peek(&self) -> Option<&K> {
        self.nodes.first().map(|n| &n.key)
    }

    pub(super) fn pop(&mut self) -> Option<K> {
        self.remove_at(0)
    }

    pub(super) fn remove(&mut self, key: &K) -> bool {
        match self.positions.get(key) {
            Some(&idx) => self.remove_at(idx).is_some(),
            None => false,
        }
    }

    /// Change the density of `key` and restore heap order around it.
    pub(super) fn update(&mut self, key: &K, density: f32) {
        let Some(&idx) = self.positions.get(key) else {
            return;
        };
        let old = self.nodes[idx].density;
        self.nodes[idx].density = density;
        if density < old {
            self.sift_up(idx);
        } else {
            self.sift_down(idx);
        }
    }

    /// Recompute every density and re-heapify.
    pub(super) fn rebuild(&mut self, mut density_of: impl FnMut(&K) -> f32) {
        for node in &mut self.nodes {
            node.density = density_of(&node.key);
        }
        for idx in (0..self.nodes.len() / 2).rev() {
            self.sift_down(idx);
        }
    }

    pub(super) fn clear(&mut self) {
        self.nodes.clear();
        self.positions.clear();
    }

    fn remove_at(&mut self, idx: usize) -> Option<K> {
        let last = self.nodes.len().checked_sub(1)?;
        self.swap(idx, last);
        let key = self.nodes.pop()?.key;
        self.positions.remove(&key);
        if idx < self.nodes.len() {
            self.sift_down(idx);
            self.sift_up(idx);
        }
        Some(key)
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !precedes(self.nodes[idx].rank(), self.nodes[parent].rank()) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;
            if left < len && precedes(self.nodes[left].rank(), self.nodes[smallest].rank()) {
                smallest = left;
            }
            if right < len && precedes(self.nodes[right].rank(), self.nodes[smallest].rank()) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.nodes.swap(a, b);
        if let Some(p) = self.positions.get_mut(&self.nodes[a].key) {
            *p = a;
        }
        if let Some(p) = self.positions.get_mut(&self.nodes[b].key) {
            *p = b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_density_then_sequence_order() {
        let mut heap = DensityHeap::new();
        heap.push("c", 0.5, 0);
        heap.push("a", 0.25, 1);
        heap.push("d", 0.5, 2);
        heap.push("b", 0.25, 3);

        let order: Vec<_> = std::iter::from_fn(|| heap.pop()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn update_and_remove_keep_order() {
        let mut heap = DensityHeap::new();
        for (i, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            heap.push(key, i as f32, i as u64);
        }
        heap.update(&"e", -1.0);
        heap.update(&"a", 10.0);
        assert!(heap.remove(&"c"));
        assert!(!heap.remove(&"c"));
        assert_eq!(heap.len(), 4);

        let order: Vec<_> = std::iter::from_fn(|| heap.pop()).collect();
        assert_eq!(order, vec!["e", "b", "d", "a"]);
    }

    #[test]
    fn rebuild_reorders() {
        let mut heap = DensityHeap::new();
        heap.push(1u32, 1.0, 0);
        heap.push(2, 2.0, 1);
        heap.push(3, 3.0, 2);
        heap.rebuild(|k| 10.0 - *k as f32);
        assert_eq!(heap.peek(), Some(&3));
    }
}
