//! Path-reduction tree engine.
//!
//! A weight-carrying BST that rotates only when the rotation strictly
//! decreases the total internal path length. With external-node weights
//! (null = 1), rotating a node left reduces path length exactly when the
//! right subtree outweighs the left one and the right-right grandchild alone
//! still outweighs the left subtree; the three remaining cases mirror and
//! zig-zag. After each rotation the fixup re-reduces the demoted subtrees
//! and re-examines the promoted root until no profitable rotation remains.

use std::mem;

use crate::tree::{self, Node, TreeCore};
use crate::Map;

type PrNode<K, V> = Node<K, V, u32>;

pub struct PathTreeMap<K: Ord, V> {
    core: TreeCore<K, V, u32>,
}

tree::tree_map_shared!(PathTreeMap, u32);

impl<K: Ord, V> PathTreeMap<K, V> {
    pub fn new() -> Self {
        Self {
            core: TreeCore::new(),
        }
    }

    fn weight(node: *const PrNode<K, V>) -> u32 {
        if node.is_null() {
            1
        } else {
            unsafe { (*node).meta }
        }
    }

    unsafe fn recalc(node: *mut PrNode<K, V>) {
        unsafe {
            (*node).meta = Self::weight((*node).left) + Self::weight((*node).right);
        }
    }

    unsafe fn rotate_left(&mut self, node: *mut PrNode<K, V>) {
        unsafe {
            let pivot = (*node).right;
            self.core.rotate_left(node);
            Self::recalc(node);
            Self::recalc(pivot);
        }
    }

    unsafe fn rotate_right(&mut self, node: *mut PrNode<K, V>) {
        unsafe {
            let pivot = (*node).left;
            self.core.rotate_right(node);
            Self::recalc(node);
            Self::recalc(pivot);
        }
    }

    /// Applies every path-shortening rotation in the subtree at `node`,
    /// assuming both child subtrees are already fully reduced. A rotation
    /// demotes `node` under the promoted pivot; the demoted subtrees are
    /// re-reduced and the loop resumes at the new subtree root, whose
    /// children just changed. Every rotation strictly shrinks the total
    /// internal path length, so the recursion terminates.
    unsafe fn reduce(&mut self, mut node: *mut PrNode<K, V>) {
        unsafe {
            loop {
                let left = Self::weight((*node).left);
                let right = Self::weight((*node).right);
                if right > left {
                    let pivot = (*node).right;
                    if Self::weight((*pivot).right) > left {
                        self.rotate_left(node);
                        self.reduce(node);
                        node = pivot;
                        continue;
                    }
                    if Self::weight((*pivot).left) > left {
                        let grand = (*pivot).left;
                        self.rotate_right(pivot);
                        self.rotate_left(node);
                        self.reduce(node);
                        self.reduce(pivot);
                        node = grand;
                        continue;
                    }
                } else if left > right {
                    let pivot = (*node).left;
                    if Self::weight((*pivot).left) > right {
                        self.rotate_right(node);
                        self.reduce(node);
                        node = pivot;
                        continue;
                    }
                    if Self::weight((*pivot).right) > right {
                        let grand = (*pivot).right;
                        self.rotate_left(pivot);
                        self.rotate_right(node);
                        self.reduce(node);
                        self.reduce(pivot);
                        node = grand;
                        continue;
                    }
                }
                break;
            }
        }
    }

    /// One climb to the root per mutation: adjust each ancestor's weight by
    /// `delta`, then let it shed any now-profitable rotations.
    unsafe fn fixup_path(&mut self, mut node: *mut PrNode<K, V>, delta: i32) {
        unsafe {
            while !node.is_null() {
                let next = (*node).parent;
                (*node).meta = (*node).meta.wrapping_add_signed(delta);
                self.reduce(node);
                node = next;
            }
        }
    }

    fn probe_insert(&mut self, key: K, value: V) -> (*mut PrNode<K, V>, bool, Option<V>) {
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

    unsafe fn remove_node(&mut self, mut node: *mut PrNode<K, V>) -> (K, V) {
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

    /// Weights consistent and no rotation applicable that would shorten the
    /// total path.
    fn check_reduced(node: *const PrNode<K, V>) -> Option<u64> {
        if node.is_null() {
            return Some(1);
        }
        unsafe {
            let left = Self::check_reduced((*node).left)?;
            let right = Self::check_reduced((*node).right)?;
            if (*node).meta as u64 != left + right {
                return None;
            }
            if right > left {
                let pivot = (*node).right;
                if Self::weight((*pivot).right) as u64 > left
                    || Self::weight((*pivot).left) as u64 > left
                {
                    return None;
                }
            } else if left > right {
                let pivot = (*node).left;
                if Self::weight((*pivot).left) as u64 > right
                    || Self::weight((*pivot).right) as u64 > right
                {
                    return None;
                }
            }
            Some(left + right)
        }
    }
}

impl<K: Ord, V> Default for PathTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> Map for PathTreeMap<K, V> {
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
        self.core.verify_structure(|_| true) && Self::check_reduced(self.core.root).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::PathTreeMap;
    use crate::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn sorted_inserts_keep_paths_reduced() {
        let mut map = PathTreeMap::new();
        for key in 0..500u32 {
            map.insert(key, key);
            assert!(map.verify());
        }
        assert_eq!(map.len(), 500);
    }

    #[test]
    fn reduction_holds_after_every_operation() {
        let mut rng = StdRng::seed_from_u64(0x5EED_9127);
        let mut map = PathTreeMap::new();
        let mut oracle = BTreeMap::new();

        for _ in 0..6000 {
            let key: u16 = rng.random();
            if rng.random_bool(0.6) {
                let value: u32 = rng.random();
                assert_eq!(map.insert(key, value), oracle.insert(key, value));
            } else {
                assert_eq!(map.remove(&key), oracle.remove_entry(&key));
            }
            assert!(map.verify(), "reduction broken at len {}", map.len());
        }
        assert_eq!(map.len(), oracle.len());
    }

    #[test]
    fn random_operations_match_oracle() {
        let mut rng = StdRng::seed_from_u64(0x5EED_9127);
        let mut map = PathTreeMap::new();
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
