//! Randomized treap engine.
//!
//! Every node carries a 32-bit priority drawn from the map's own
//! linear-congruential stream; the tree is simultaneously a BST on keys and
//! a min-heap on priorities (parent ≤ child), which yields expected
//! logarithmic depth with no balancing bookkeeping. Insert attaches at a
//! leaf and rotates the node up while it out-prioritizes its parent; remove
//! sinks the target by rotating up its precedent child until a splice is
//! possible.

use std::mem;

use crate::rng::Lcg32;
use crate::tree::{self, Node, TreeCore};
use crate::Map;

type TreapNode<K, V> = Node<K, V, u32>;

pub struct TreapMap<K: Ord, V> {
    core: TreeCore<K, V, u32>,
    rng: Lcg32,
}

tree::tree_map_shared!(TreapMap, u32);

impl<K: Ord, V> TreapMap<K, V> {
    /// Fresh map with an entropy-seeded priority stream.
    pub fn new() -> Self {
        Self {
            core: TreeCore::new(),
            rng: Lcg32::from_entropy(),
        }
    }

    /// Deterministic priority stream, for reproducible shapes.
    pub fn with_seed(seed: u32) -> Self {
        Self {
            core: TreeCore::new(),
            rng: Lcg32::new(seed),
        }
    }

    fn probe_insert(&mut self, key: K, value: V) -> (*mut TreapNode<K, V>, bool, Option<V>) {
        match self.core.descend(&key) {
            Ok(node) => (node, false, Some(value)),
            Err((parent, left)) => unsafe {
                let node = Node::alloc(key, value, self.rng.next_u32(), parent);
                self.core.attach(parent, left, node);
                self.bubble_up(node);
                (node, true, None)
            },
        }
    }

    unsafe fn bubble_up(&mut self, node: *mut TreapNode<K, V>) {
        unsafe {
            loop {
                let parent = (*node).parent;
                if parent.is_null() || (*parent).meta <= (*node).meta {
                    break;
                }
                if (*parent).left == node {
                    self.core.rotate_right(parent);
                } else {
                    self.core.rotate_left(parent);
                }
            }
        }
    }

    unsafe fn remove_node(&mut self, node: *mut TreapNode<K, V>) -> (K, V) {
        unsafe {
            while !(*node).left.is_null() && !(*node).right.is_null() {
                // Rotate up whichever child takes heap precedence.
                if (*(*node).left).meta <= (*(*node).right).meta {
                    self.core.rotate_right(node);
                } else {
                    self.core.rotate_left(node);
                }
            }
            let child = if (*node).left.is_null() {
                (*node).right
            } else {
                (*node).left
            };
            self.core.replace_child((*node).parent, node, child);
            self.core.len -= 1;
            Node::free(node)
        }
    }
}

impl<K: Ord, V> Default for TreapMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> Map for TreapMap<K, V> {
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
        self.core.verify_structure(|node| unsafe {
            let parent = (*node).parent;
            parent.is_null() || (*parent).meta <= (*node).meta
        })
    }
}

#[cfg(test)]
mod tests {
    use super::TreapMap;
    use crate::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn heap_property_under_churn() {
        let mut rng = StdRng::seed_from_u64(0x5EED_7EA9);
        let mut map = TreapMap::with_seed(0x7EA9);
        let mut oracle = BTreeMap::new();

        for round in 0..10_000 {
            let key: u32 = rng.random();
            if round % 2 == 0 {
                let value: u32 = rng.random();
                assert_eq!(map.insert(key, value), oracle.insert(key, value));
            } else {
                // Mostly misses; hits exercise the sink-and-splice path.
                let target = if oracle.is_empty() || rng.random_bool(0.5) {
                    key
                } else {
                    *oracle.keys().next().unwrap()
                };
                assert_eq!(map.remove(&target), oracle.remove_entry(&target));
            }
            if round % 100 == 0 {
                assert!(map.verify());
            }
        }
        assert_eq!(map.len(), oracle.len());
        assert!(map.verify());
    }

    #[test]
    fn deterministic_seed_reproduces_shape() {
        let mut a = TreapMap::with_seed(99);
        let mut b = TreapMap::with_seed(99);
        for key in 0..200u32 {
            a.insert(key, ());
            b.insert(key, ());
        }
        fn shape<K: Ord, V>(node: *const super::TreapNode<K, V>, out: &mut Vec<u32>) {
            if node.is_null() {
                return;
            }
            unsafe {
                out.push((*node).meta);
                shape((*node).left, out);
                shape((*node).right, out);
            }
        }
        let (mut sa, mut sb) = (Vec::new(), Vec::new());
        shape(a.core.root, &mut sa);
        shape(b.core.root, &mut sb);
        assert_eq!(sa, sb);
        assert!(a.verify());
    }
}
