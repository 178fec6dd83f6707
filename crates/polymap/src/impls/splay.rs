//! Splay tree engine.
//!
//! Bottom-up move-to-root splaying after every `get`, `insert`, and `remove`
//! location, in the usual three steps: zig when the parent is the root,
//! zig-zig when parent and grandparent lean the same way, zig-zag otherwise.
//! A missed lookup splays the last node inspected, so near-misses still pull
//! their neighborhood toward the root. Removal splays the target, detaches
//! its subtrees, then splays the left-subtree maximum up to become the join
//! point. Bounded finds and iteration leave the tree alone.
//!
//! Individual operations may cost O(n); any m operations on n keys run in
//! O((n + m) log(n + m)).

use std::cmp::Ordering;
use std::mem;
use std::ptr;

use crate::tree::{self, Node, TreeCore};
use crate::Map;

type SplayNode<K, V> = Node<K, V, ()>;

pub struct SplayTreeMap<K: Ord, V> {
    core: TreeCore<K, V, ()>,
}

tree::tree_map_shared!(SplayTreeMap, ());

impl<K: Ord, V> SplayTreeMap<K, V> {
    pub fn new() -> Self {
        Self {
            core: TreeCore::new(),
        }
    }

    unsafe fn splay(&mut self, node: *mut SplayNode<K, V>) {
        unsafe {
            while !(*node).parent.is_null() {
                let parent = (*node).parent;
                let grand = (*parent).parent;
                let node_is_left = (*parent).left == node;
                if grand.is_null() {
                    // zig
                    if node_is_left {
                        self.core.rotate_right(parent);
                    } else {
                        self.core.rotate_left(parent);
                    }
                } else if ((*grand).left == parent) == node_is_left {
                    // zig-zig: rotate the grandparent first
                    if node_is_left {
                        self.core.rotate_right(grand);
                        self.core.rotate_right(parent);
                    } else {
                        self.core.rotate_left(grand);
                        self.core.rotate_left(parent);
                    }
                } else {
                    // zig-zag
                    if node_is_left {
                        self.core.rotate_right(parent);
                        self.core.rotate_left(grand);
                    } else {
                        self.core.rotate_left(parent);
                        self.core.rotate_right(grand);
                    }
                }
            }
        }
    }

    /// Descends to `key`, recording the last node inspected. Splays the match
    /// if there is one, the last inspected node otherwise.
    fn splay_to(&mut self, key: &K) -> Option<*mut SplayNode<K, V>> {
        let mut node = self.core.root;
        let mut last = ptr::null_mut();
        unsafe {
            while !node.is_null() {
                last = node;
                match key.cmp(&(*node).key) {
                    Ordering::Less => node = (*node).left,
                    Ordering::Greater => node = (*node).right,
                    Ordering::Equal => {
                        self.splay(node);
                        return Some(node);
                    }
                }
            }
            if !last.is_null() {
                self.splay(last);
            }
        }
        None
    }

    fn probe_insert(&mut self, key: K, value: V) -> (*mut SplayNode<K, V>, bool, Option<V>) {
        match self.core.descend(&key) {
            Ok(node) => {
                unsafe { self.splay(node) };
                (node, false, Some(value))
            }
            Err((parent, left)) => unsafe {
                let node = Node::alloc(key, value, (), parent);
                self.core.attach(parent, left, node);
                self.splay(node);
                (node, true, None)
            },
        }
    }

    unsafe fn remove_root(&mut self) -> (K, V) {
        unsafe {
            let node = self.core.root;
            let left = (*node).left;
            let right = (*node).right;
            if !left.is_null() {
                (*left).parent = ptr::null_mut();
            }
            if !right.is_null() {
                (*right).parent = ptr::null_mut();
            }
            if left.is_null() {
                self.core.root = right;
            } else {
                // Join: the left maximum has no right child once splayed.
                self.core.root = left;
                let join = TreeCore::rightmost(left);
                self.splay(join);
                (*join).right = right;
                if !right.is_null() {
                    (*right).parent = join;
                }
            }
            self.core.len -= 1;
            Node::free(node)
        }
    }
}

impl<K: Ord, V> Default for SplayTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> Map for SplayTreeMap<K, V> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        self.core.len
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        let node = self.splay_to(key)?;
        unsafe { Some(&(*node).value) }
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let node = self.splay_to(key)?;
        unsafe { Some(&mut (*node).value) }
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
        self.splay_to(key)?;
        unsafe { Some(self.remove_root()) }
    }

    fn clear(&mut self) {
        self.core.clear_with(|_, _| ());
    }

    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> usize {
        self.core.traverse(visit)
    }

    fn verify(&self) -> bool {
        self.core.verify_structure(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::SplayTreeMap;
    use crate::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn accessed_key_moves_to_root() {
        let mut map = SplayTreeMap::new();
        for key in 1..=100u32 {
            map.insert(key, key);
        }
        map.get(&1);
        unsafe {
            assert_eq!((*map.core.root).key, 1);
        }
        // A miss splays the nearest inspected node.
        assert_eq!(map.get(&0), None);
        unsafe {
            assert_eq!((*map.core.root).key, 1);
        }
    }

    #[test]
    fn repeated_search_stays_cheap_after_sorted_inserts() {
        let mut map = SplayTreeMap::new();
        for key in 1..=1000u32 {
            map.insert(key, ());
        }
        // After the first access the key sits at the root; depth stays 1.
        for _ in 0..1000 {
            assert!(map.get(&1).is_some());
            unsafe {
                assert_eq!((*map.core.root).key, 1);
            }
        }
        assert!(map.verify());
    }

    #[test]
    fn random_operations_match_oracle() {
        let mut rng = StdRng::seed_from_u64(0x5EED_59);
        let mut map = SplayTreeMap::new();
        let mut oracle = BTreeMap::new();

        for round in 0..20_000 {
            let key: u16 = rng.random();
            match rng.random_range(0..3u8) {
                0 => {
                    let value: u32 = rng.random();
                    assert_eq!(map.insert(key, value), oracle.insert(key, value));
                }
                1 => assert_eq!(map.remove(&key), oracle.remove_entry(&key)),
                _ => assert_eq!(map.get(&key), oracle.get(&key)),
            }
            if round % 512 == 0 {
                assert!(map.verify());
            }
        }
        assert_eq!(map.len(), oracle.len());
        assert!(map.verify());
    }
}
