//! Height-balanced (AVL) tree engine.
//!
//! Each node stores its balance factor, height(right) − height(left), as a
//! signed byte constrained to {−1, 0, +1}. Insertion adjusts balances up the
//! spine and performs at most one single or double rotation at the first
//! ancestor that was already leaning; deletion may rotate at every level of
//! the up-walk, each rotation O(1).

use std::mem;

use crate::tree::{self, Node, TreeCore};
use crate::Map;

type AvlNode<K, V> = Node<K, V, i8>;

pub struct AvlTreeMap<K: Ord, V> {
    core: TreeCore<K, V, i8>,
}

tree::tree_map_shared!(AvlTreeMap, i8);

impl<K: Ord, V> AvlTreeMap<K, V> {
    pub fn new() -> Self {
        Self {
            core: TreeCore::new(),
        }
    }

    /// Finds or creates the node for `key`. On a hit the unused `value` rides
    /// back in the third slot so the caller decides between replace and drop.
    fn probe_insert(&mut self, key: K, value: V) -> (*mut AvlNode<K, V>, bool, Option<V>) {
        match self.core.descend(&key) {
            Ok(node) => (node, false, Some(value)),
            Err((parent, left)) => unsafe {
                let node = Node::alloc(key, value, 0i8, parent);
                self.core.attach(parent, left, node);
                self.insert_fixup(node);
                (node, true, None)
            },
        }
    }

    /// Walks up from a freshly attached node adjusting balances. Stops where
    /// a subtree keeps its prior height: a balance that becomes 0, or a
    /// rotation (which restores the pre-insert height).
    unsafe fn insert_fixup(&mut self, mut node: *mut AvlNode<K, V>) {
        unsafe {
            let mut parent = (*node).parent;
            while !parent.is_null() {
                if (*parent).left == node {
                    (*parent).meta -= 1;
                } else {
                    (*parent).meta += 1;
                }
                match (*parent).meta {
                    0 => break,
                    -1 | 1 => {
                        node = parent;
                        parent = (*node).parent;
                    }
                    _ => {
                        self.rebalance(parent);
                        break;
                    }
                }
            }
        }
    }

    /// Restores a ±2 node with one single or double rotation, updating the
    /// bookkeeping balances from the pivot's prior lean (Knuth/Wirth case
    /// table). Returns the subtree's new root and whether the subtree ended
    /// up shorter than before the triggering deletion.
    unsafe fn rebalance(&mut self, node: *mut AvlNode<K, V>) -> (*mut AvlNode<K, V>, bool) {
        unsafe {
            if (*node).meta > 0 {
                let pivot = (*node).right;
                if (*pivot).meta >= 0 {
                    self.core.rotate_left(node);
                    if (*pivot).meta == 0 {
                        // Only reachable from deletion: sibling was even.
                        (*node).meta = 1;
                        (*pivot).meta = -1;
                        (pivot, false)
                    } else {
                        (*node).meta = 0;
                        (*pivot).meta = 0;
                        (pivot, true)
                    }
                } else {
                    let grand = (*pivot).left;
                    let lean = (*grand).meta;
                    self.core.rotate_right(pivot);
                    self.core.rotate_left(node);
                    (*node).meta = if lean > 0 { -1 } else { 0 };
                    (*pivot).meta = if lean < 0 { 1 } else { 0 };
                    (*grand).meta = 0;
                    (grand, true)
                }
            } else {
                let pivot = (*node).left;
                if (*pivot).meta <= 0 {
                    self.core.rotate_right(node);
                    if (*pivot).meta == 0 {
                        (*node).meta = -1;
                        (*pivot).meta = 1;
                        (pivot, false)
                    } else {
                        (*node).meta = 0;
                        (*pivot).meta = 0;
                        (pivot, true)
                    }
                } else {
                    let grand = (*pivot).right;
                    let lean = (*grand).meta;
                    self.core.rotate_left(pivot);
                    self.core.rotate_right(node);
                    (*node).meta = if lean < 0 { 1 } else { 0 };
                    (*pivot).meta = if lean > 0 { -1 } else { 0 };
                    (*grand).meta = 0;
                    (grand, true)
                }
            }
        }
    }

    unsafe fn remove_node(&mut self, mut node: *mut AvlNode<K, V>) -> (K, V) {
        unsafe {
            if !(*node).left.is_null() && !(*node).right.is_null() {
                // Swap with the in-order neighbor on the deeper side so the
                // splice tends to come off the taller subtree.
                let neighbor = if (*node).meta > 0 {
                    TreeCore::leftmost((*node).right)
                } else {
                    TreeCore::rightmost((*node).left)
                };
                mem::swap(&mut (*node).key, &mut (*neighbor).key);
                mem::swap(&mut (*node).value, &mut (*neighbor).value);
                node = neighbor;
            }
            let child = if (*node).left.is_null() {
                (*node).right
            } else {
                (*node).left
            };
            let parent = (*node).parent;
            let was_left = !parent.is_null() && (*parent).left == node;
            self.core.replace_child(parent, node, child);
            self.core.len -= 1;
            self.remove_fixup(parent, was_left);
            Node::free(node)
        }
    }

    /// Propagates "subtree got shorter" up the spine: rebalancing stops once
    /// some ancestor's height is unchanged.
    unsafe fn remove_fixup(&mut self, mut parent: *mut AvlNode<K, V>, mut was_left: bool) {
        unsafe {
            while !parent.is_null() {
                if was_left {
                    (*parent).meta += 1;
                } else {
                    (*parent).meta -= 1;
                }
                let subtree = match (*parent).meta {
                    -1 | 1 => break,
                    0 => parent,
                    _ => {
                        let (new_root, shorter) = self.rebalance(parent);
                        if !shorter {
                            break;
                        }
                        new_root
                    }
                };
                let grand = (*subtree).parent;
                if grand.is_null() {
                    break;
                }
                was_left = (*grand).left == subtree;
                parent = grand;
            }
        }
    }

    fn check_heights(node: *const AvlNode<K, V>) -> Option<i32> {
        if node.is_null() {
            return Some(0);
        }
        unsafe {
            let left = Self::check_heights((*node).left)?;
            let right = Self::check_heights((*node).right)?;
            let balance = right - left;
            if balance.unsigned_abs() > 1 || balance != (*node).meta as i32 {
                None
            } else {
                Some(1 + left.max(right))
            }
        }
    }
}

impl<K: Ord, V> Default for AvlTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> Map for AvlTreeMap<K, V> {
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
        self.core.verify_structure(|_| true) && Self::check_heights(self.core.root).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::AvlTreeMap;
    use crate::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    fn height<K: Ord, V>(map: &AvlTreeMap<K, V>) -> usize {
        fn walk<K, V>(node: *const super::AvlNode<K, V>) -> usize {
            if node.is_null() {
                return 0;
            }
            unsafe { 1 + walk((*node).left).max(walk((*node).right)) }
        }
        walk(map.core.root)
    }

    #[test]
    fn sorted_inserts_stay_logarithmic() {
        let mut map = AvlTreeMap::new();
        for key in 0..1000u32 {
            map.insert(key, key);
            assert!(map.verify());
        }
        let bound = 1.4405 * ((map.len() + 2) as f64).log2();
        assert!((height(&map) as f64) <= bound);
    }

    #[test]
    fn random_operations_match_oracle() {
        let mut rng = StdRng::seed_from_u64(0x5EED_A71);
        let mut map = AvlTreeMap::new();
        let mut oracle = BTreeMap::new();

        for round in 0..20_000 {
            let key: u16 = rng.random();
            if rng.random_bool(0.6) {
                let value: u64 = rng.random();
                assert_eq!(map.insert(key, value), oracle.insert(key, value));
            } else {
                assert_eq!(map.remove(&key), oracle.remove_entry(&key));
            }
            assert_eq!(map.len(), oracle.len());
            if round % 512 == 0 {
                assert!(map.verify());
            }
        }
        assert!(map.verify());
    }

    #[test]
    fn removal_picks_the_deeper_side() {
        // Two-children removals across a spread of shapes.
        let mut map = AvlTreeMap::new();
        for key in [50, 25, 75, 12, 37, 62, 87, 6, 18, 31, 43] {
            map.insert(key, ());
        }
        for key in [50, 25, 37, 75] {
            assert!(map.remove(&key).is_some());
            assert!(map.verify());
        }
        assert_eq!(map.len(), 7);
    }
}
