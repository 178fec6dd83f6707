//! Weight-balanced tree engine, BB[α] with α = 1 − √2/2.
//!
//! Weights use external-node accounting (Nievergelt–Reingold): a null child
//! counts 1 and an internal node's weight is the sum of its children's, so a
//! leaf weighs 2. Every node must keep α ≤ weight(left)/weight ≤ 1 − α. The
//! irrational α is approximated from inside the valid [2/11, 1 − √2/2] range
//! by 2928/10000, so one single or double rotation per level always restores
//! the bound; the single-versus-double choice uses the classical
//! (1 − 2α)/(1 − α) threshold.

use std::mem;

use crate::tree::{self, Node, TreeCore};
use crate::Map;

type WbtNode<K, V> = Node<K, V, u32>;

const NUM_LO: u64 = 2928;
const NUM_HI: u64 = 7072;
const NUM_SINGLE: u64 = 5860;
const DEN: u64 = 10000;

pub struct WbtTreeMap<K: Ord, V> {
    core: TreeCore<K, V, u32>,
}

tree::tree_map_shared!(WbtTreeMap, u32);

impl<K: Ord, V> WbtTreeMap<K, V> {
    pub fn new() -> Self {
        Self {
            core: TreeCore::new(),
        }
    }

    fn weight(node: *const WbtNode<K, V>) -> u32 {
        if node.is_null() {
            1
        } else {
            unsafe { (*node).meta }
        }
    }

    unsafe fn recalc(node: *mut WbtNode<K, V>) {
        unsafe {
            (*node).meta = Self::weight((*node).left) + Self::weight((*node).right);
        }
    }

    unsafe fn rotate_left(&mut self, node: *mut WbtNode<K, V>) {
        unsafe {
            let pivot = (*node).right;
            self.core.rotate_left(node);
            Self::recalc(node);
            Self::recalc(pivot);
        }
    }

    unsafe fn rotate_right(&mut self, node: *mut WbtNode<K, V>) {
        unsafe {
            let pivot = (*node).left;
            self.core.rotate_right(node);
            Self::recalc(node);
            Self::recalc(pivot);
        }
    }

    /// Restores the α bound at `node` if the last insert or splice pushed it
    /// out. The heavy child is pre-rotated when its inner subtree crosses the
    /// (1−2α)/(1−α) share of its weight.
    unsafe fn rebalance(&mut self, node: *mut WbtNode<K, V>) {
        unsafe {
            let weight = (*node).meta as u64;
            let left = Self::weight((*node).left) as u64;
            if left * DEN < weight * NUM_LO {
                let pivot = (*node).right;
                if Self::weight((*pivot).left) as u64 * DEN
                    > (*pivot).meta as u64 * NUM_SINGLE
                {
                    self.rotate_right(pivot);
                }
                self.rotate_left(node);
            } else if left * DEN > weight * NUM_HI {
                let pivot = (*node).left;
                if Self::weight((*pivot).right) as u64 * DEN
                    > (*pivot).meta as u64 * NUM_SINGLE
                {
                    self.rotate_left(pivot);
                }
                self.rotate_right(node);
            }
        }
    }

    /// Walks to the root applying `delta` to each ancestor's weight and
    /// rebalancing it. A rotation drops the current node a level; the climb
    /// resumes from the position's old parent either way.
    unsafe fn fixup_path(&mut self, mut node: *mut WbtNode<K, V>, delta: i32) {
        unsafe {
            while !node.is_null() {
                let next = (*node).parent;
                (*node).meta = (*node).meta.wrapping_add_signed(delta);
                self.rebalance(node);
                node = next;
            }
        }
    }

    fn probe_insert(&mut self, key: K, value: V) -> (*mut WbtNode<K, V>, bool, Option<V>) {
        match self.core.descend(&key) {
            Ok(node) => (node, false, Some(value)),
            Err((parent, left)) => unsafe {
                let node = Node::alloc(key, value, 2u32, parent);
                self.core.attach(parent, left, node);
                self.fixup_path(parent, 1);
                (node, true, None)
            },
        }
    }

    unsafe fn remove_node(&mut self, mut node: *mut WbtNode<K, V>) -> (K, V) {
        unsafe {
            if !(*node).left.is_null() && !(*node).right.is_null() {
                let successor = TreeCore::leftmost((*node).right);
                mem::swap(&mut (*node).key, &mut (*successor).key);
                mem::swap(&mut (*node).value, &mut (*successor).value);
                node = successor;
            }
            let child = if (*node).left.is_null() {
                (*node).right
            } else {
                (*node).left
            };
            let parent = (*node).parent;
            self.core.replace_child(parent, node, child);
            self.core.len -= 1;
            self.fixup_path(parent, -1);
            Node::free(node)
        }
    }

    fn check_weights(node: *const WbtNode<K, V>) -> Option<u64> {
        if node.is_null() {
            return Some(1);
        }
        unsafe {
            let left = Self::check_weights((*node).left)?;
            let right = Self::check_weights((*node).right)?;
            let weight = left + right;
            if (*node).meta as u64 != weight
                || left * DEN < weight * NUM_LO
                || left * DEN > weight * NUM_HI
            {
                None
            } else {
                Some(weight)
            }
        }
    }
}

impl<K: Ord, V> Default for WbtTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> Map for WbtTreeMap<K, V> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        self.core.len
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        tree::entry_ref(self.core.find(key)).map(|(_, value)| value)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let node = self.core.find(key);
        if node.is_null() {
            None
        } else {
            unsafe { Some(&mut (*node).value) }
        }
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (node, inserted, unused) = self.probe_insert(key, value);
        if inserted {
            None
        } else {
            let value = unused.expect("hit returns the value");
            unsafe { Some(mem::replace(&mut (*node).value, value)) }
        }
    }

    fn try_insert(&mut self, key: K, value: V) -> (&mut V, bool) {
        let (node, inserted, _) = self.probe_insert(key, value);
        (unsafe { &mut (*node).value }, inserted)
    }

    fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let node = self.core.find(key);
        if node.is_null() {
            None
        } else {
            unsafe { Some(self.remove_node(node)) }
        }
    }

    fn clear(&mut self) {
        self.core.clear_with(|_, _| ());
    }

    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> usize {
        self.core.traverse(visit)
    }

    fn verify(&self) -> bool {
        self.core.verify_structure(|_| true) && Self::check_weights(self.core.root).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::WbtTreeMap;
    use crate::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn alpha_bound_holds_through_sorted_churn() {
        let mut map = WbtTreeMap::new();
        for key in 0..500u32 {
            map.insert(key, key);
            assert!(map.verify());
        }
        for key in (0..500u32).rev().step_by(2) {
            assert!(map.remove(&key).is_some());
            assert!(map.verify());
        }
        assert_eq!(map.len(), 250);
    }

    #[test]
    fn random_operations_match_oracle() {
        let mut rng = StdRng::seed_from_u64(0x5EED_3B7);
        let mut map = WbtTreeMap::new();
        let mut oracle = BTreeMap::new();

        for round in 0..20_000 {
            let key: u16 = rng.random();
            if rng.random_bool(0.6) {
                let value: u32 = rng.random();
                assert_eq!(map.insert(key, value), oracle.insert(key, value));
            } else {
                assert_eq!(map.remove(&key), oracle.remove_entry(&key));
            }
            if round % 512 == 0 {
                assert!(map.verify());
            }
        }
        assert_eq!(map.len(), oracle.len());
        assert!(map.verify());
    }
}
