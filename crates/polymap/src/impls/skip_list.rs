//! Probabilistic skip list engine.
//!
//! Entries live in a single sorted level-0 chain; each node additionally
//! appears in every level below its randomly drawn height, so the upper
//! chains are sparser express lanes. A search enters at the highest occupied
//! level, runs right while the next key is still too small, and drops a
//! level at each overshoot. Heights come from the map's own
//! linear-congruential stream with a coin-flip distribution, capped by the
//! configured maximum. Links are forward-only, so iteration runs in
//! ascending order exclusively.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::mem;
use std::ptr;

use crate::rng::Lcg32;
use crate::{Map, SortedMap};

const LEVEL_LIMIT: usize = 32;
const DEFAULT_MAX_LEVEL: usize = 12;

type Link<K, V> = *mut SkipNode<K, V>;

struct SkipNode<K, V> {
    key: K,
    value: V,
    links: Box<[Link<K, V>]>,
}

impl<K, V> SkipNode<K, V> {
    fn alloc(key: K, value: V, level: usize) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            value,
            links: vec![ptr::null_mut(); level].into_boxed_slice(),
        }))
    }

    /// Frees the node and hands back its entry. The caller must have already
    /// unlinked it from every chain.
    unsafe fn free(node: *mut Self) -> (K, V) {
        let node = unsafe { Box::from_raw(node) };
        (node.key, node.value)
    }
}

pub struct SkipListMap<K: Ord, V> {
    head: Vec<Link<K, V>>,
    /// Highest occupied level; 0 only when empty.
    level: usize,
    len: usize,
    rng: Lcg32,
}

impl<K: Ord, V> SkipListMap<K, V> {
    pub fn new() -> Self {
        Self::build(DEFAULT_MAX_LEVEL, Lcg32::from_entropy())
    }

    /// Deterministic height stream, for reproducible shapes.
    pub fn with_seed(seed: u32) -> Self {
        Self::build(DEFAULT_MAX_LEVEL, Lcg32::new(seed))
    }

    /// Caps node heights at `max_level`, clamped to 1..=32.
    pub fn with_max_level(max_level: usize) -> Self {
        Self::build(max_level.clamp(1, LEVEL_LIMIT), Lcg32::from_entropy())
    }

    fn build(max_level: usize, rng: Lcg32) -> Self {
        Self {
            head: vec![ptr::null_mut(); max_level],
            level: 0,
            len: 0,
            rng,
        }
    }

    pub fn max_level(&self) -> usize {
        self.head.len()
    }

    /// Coin-flip height from one random word: each further level halves the
    /// accepting range.
    fn random_level(&mut self) -> usize {
        let word = self.rng.next_u32();
        let mut level = 1;
        let mut bound = 1u32 << 31;
        while level < self.head.len() && word <= bound {
            level += 1;
            bound >>= 1;
        }
        level
    }

    fn find(&self, key: &K) -> Link<K, V> {
        let mut forward: &[Link<K, V>] = &self.head;
        for lvl in (0..self.level).rev() {
            loop {
                let next = forward[lvl];
                if next.is_null() {
                    break;
                }
                match unsafe { (*next).key.cmp(key) } {
                    Ordering::Less => forward = unsafe { &(*next).links },
                    Ordering::Equal => return next,
                    Ordering::Greater => break,
                }
            }
        }
        ptr::null_mut()
    }

    /// Descends recording, per level, the last node whose key is < `key`;
    /// null marks levels where the head link is the predecessor. The match,
    /// if any, is the level-0 successor of `preds[0]`.
    fn find_preds(&self, key: &K) -> Vec<Link<K, V>> {
        let mut preds = vec![ptr::null_mut(); self.head.len()];
        let mut pred: Link<K, V> = ptr::null_mut();
        for lvl in (0..self.level).rev() {
            loop {
                let next = self.link(pred, lvl);
                if next.is_null() || unsafe { (*next).key.cmp(key) } != Ordering::Less {
                    break;
                }
                pred = next;
            }
            preds[lvl] = pred;
        }
        preds
    }

    /// The forward link out of `pred` at `lvl`; the head link when `pred` is
    /// null.
    fn link(&self, pred: Link<K, V>, lvl: usize) -> Link<K, V> {
        if pred.is_null() {
            self.head[lvl]
        } else {
            unsafe { (*pred).links[lvl] }
        }
    }

    unsafe fn set_link(&mut self, pred: Link<K, V>, lvl: usize, to: Link<K, V>) {
        if pred.is_null() {
            self.head[lvl] = to;
        } else {
            unsafe { (*pred).links[lvl] = to };
        }
    }

    fn probe_insert(&mut self, key: K, value: V) -> (Link<K, V>, bool, Option<V>) {
        let preds = self.find_preds(&key);
        let next = self.link(preds[0], 0);
        unsafe {
            if !next.is_null() && (*next).key == key {
                return (next, false, Some(value));
            }
            let height = self.random_level();
            let node = SkipNode::alloc(key, value, height);
            for (lvl, &pred) in preds.iter().enumerate().take(height) {
                (*node).links[lvl] = self.link(pred, lvl);
                self.set_link(pred, lvl, node);
            }
            self.level = self.level.max(height);
            self.len += 1;
            (node, true, None)
        }
    }

    /// Greatest entry < `key` (strict), and the level-0 link past it.
    fn bound_below(&self, key: &K, strict: bool) -> (Link<K, V>, Link<K, V>) {
        let mut forward: &[Link<K, V>] = &self.head;
        let mut prev = ptr::null_mut();
        for lvl in (0..self.level).rev() {
            loop {
                let next = forward[lvl];
                if next.is_null() {
                    break;
                }
                let order = unsafe { (*next).key.cmp(key) };
                if order == Ordering::Greater || (strict && order == Ordering::Equal) {
                    break;
                }
                prev = next;
                forward = unsafe { &(*next).links };
            }
        }
        (prev, forward[0])
    }
}

impl<K: Ord, V> Default for SkipListMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> Drop for SkipListMap<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: Ord, V> Map for SkipListMap<K, V> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        self.len
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        let node = self.find(key);
        if node.is_null() {
            None
        } else {
            unsafe { Some(&(*node).value) }
        }
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let node = self.find(key);
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
        let preds = self.find_preds(key);
        let node = self.link(preds[0], 0);
        unsafe {
            if node.is_null() || (*node).key != *key {
                return None;
            }
            let height = (&(*node).links).len();
            for (lvl, &pred) in preds.iter().enumerate().take(height) {
                debug_assert!(self.link(pred, lvl) == node);
                self.set_link(pred, lvl, (*node).links[lvl]);
            }
            while self.level > 0 && self.head[self.level - 1].is_null() {
                self.level -= 1;
            }
            self.len -= 1;
            Some(SkipNode::free(node))
        }
    }

    fn clear(&mut self) {
        let mut node = self.head[0];
        unsafe {
            while !node.is_null() {
                let next = (*node).links[0];
                SkipNode::free(node);
                node = next;
            }
        }
        self.head.fill(ptr::null_mut());
        self.level = 0;
        self.len = 0;
    }

    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> usize {
        let mut visited = 0;
        let mut node = self.head[0];
        unsafe {
            while !node.is_null() {
                visited += 1;
                if !visit(&(*node).key, &(*node).value) {
                    break;
                }
                node = (*node).links[0];
            }
        }
        visited
    }

    fn verify(&self) -> bool {
        // Level tracking: nothing above `level`, something at its top.
        for lvl in self.level..self.head.len() {
            if !self.head[lvl].is_null() {
                return false;
            }
        }
        if self.level > 0 && self.head[self.level - 1].is_null() {
            return false;
        }
        if self.level == 0 {
            return self.len == 0;
        }
        unsafe {
            // Every chain strictly ascending, within the height cap.
            for lvl in 0..self.level {
                let mut node = self.head[lvl];
                let mut prev: Link<K, V> = ptr::null_mut();
                while !node.is_null() {
                    let height = (&(*node).links).len();
                    if height <= lvl || height > self.head.len() {
                        return false;
                    }
                    if !prev.is_null() && (*prev).key.cmp(&(*node).key) != Ordering::Less {
                        return false;
                    }
                    prev = node;
                    node = (*node).links[lvl];
                }
            }
            // Level-0 carries everything.
            let mut seen = 0;
            let mut node = self.head[0];
            while !node.is_null() {
                seen += 1;
                node = (*node).links[0];
            }
            seen == self.len
        }
    }
}

impl<K: Ord, V> SortedMap for SkipListMap<K, V> {
    fn first(&self) -> Option<(&K, &V)> {
        let node = self.head[0];
        if node.is_null() {
            None
        } else {
            unsafe { Some((&(*node).key, &(*node).value)) }
        }
    }

    fn last(&self) -> Option<(&K, &V)> {
        let mut forward: &[Link<K, V>] = &self.head;
        let mut last = ptr::null_mut();
        for lvl in (0..self.level).rev() {
            loop {
                let next = forward[lvl];
                if next.is_null() {
                    break;
                }
                last = next;
                forward = unsafe { &(*next).links };
            }
        }
        if last.is_null() {
            None
        } else {
            unsafe { Some((&(*last).key, &(*last).value)) }
        }
    }

    fn find_le(&self, key: &K) -> Option<(&K, &V)> {
        let (below, _) = self.bound_below(key, false);
        if below.is_null() {
            None
        } else {
            unsafe { Some((&(*below).key, &(*below).value)) }
        }
    }

    fn find_lt(&self, key: &K) -> Option<(&K, &V)> {
        let (below, _) = self.bound_below(key, true);
        if below.is_null() {
            None
        } else {
            unsafe { Some((&(*below).key, &(*below).value)) }
        }
    }

    fn find_ge(&self, key: &K) -> Option<(&K, &V)> {
        let (_, at) = self.bound_below(key, true);
        if at.is_null() {
            None
        } else {
            unsafe { Some((&(*at).key, &(*at).value)) }
        }
    }

    fn find_gt(&self, key: &K) -> Option<(&K, &V)> {
        let (_, past) = self.bound_below(key, false);
        if past.is_null() {
            None
        } else {
            unsafe { Some((&(*past).key, &(*past).value)) }
        }
    }

    fn select(&self, rank: usize) -> Option<(&K, &V)> {
        if rank >= self.len {
            return None;
        }
        let mut node = self.head[0];
        unsafe {
            for _ in 0..rank {
                node = (*node).links[0];
            }
            Some((&(*node).key, &(*node).value))
        }
    }
}

/// Ascending-only: the chains carry no backward links, so there is no
/// `DoubleEndedIterator` here. The phantom borrow pins the map for the
/// iterator's lifetime.
pub struct Iter<'a, K, V> {
    node: Link<K, V>,
    _map: PhantomData<&'a SkipNode<K, V>>,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            _map: PhantomData,
        }
    }
}

impl<K, V> PartialEq for Iter<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        unsafe {
            let node = self.node;
            self.node = (*node).links[0];
            Some((&(*node).key, &(*node).value))
        }
    }
}

impl<K, V> std::iter::FusedIterator for Iter<'_, K, V> {}

impl<K: Ord, V> SkipListMap<K, V> {
    /// Entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            node: self.head[0],
            _map: PhantomData,
        }
    }

    /// Entries from the first key ≥ `key` onward.
    pub fn iter_from(&self, key: &K) -> Iter<'_, K, V> {
        let (_, at) = self.bound_below(key, true);
        Iter {
            node: at,
            _map: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SkipListMap;
    use crate::{Map, SortedMap};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn random_operations_match_oracle() {
        let mut rng = StdRng::seed_from_u64(0x5EED_5C19);
        let mut map = SkipListMap::with_seed(0x5C19);
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

    #[test]
    fn level_cap_is_respected() {
        let mut map = SkipListMap::with_max_level(4);
        assert_eq!(map.max_level(), 4);
        for key in 0..10_000u32 {
            map.insert(key, ());
        }
        assert!(map.verify());
        assert_eq!(map.len(), 10_000);

        // The clamp keeps degenerate caps usable.
        let mut flat = SkipListMap::with_max_level(0);
        assert_eq!(flat.max_level(), 1);
        for key in 0..100u32 {
            flat.insert(key, ());
        }
        assert!(flat.verify());
    }

    #[test]
    fn level_shrinks_as_tall_nodes_leave() {
        let mut map = SkipListMap::with_seed(7);
        for key in 0..1024u32 {
            map.insert(key, ());
        }
        let before = map.level;
        for key in 0..1024u32 {
            assert_eq!(map.remove(&key), Some((key, ())));
        }
        assert_eq!(map.level, 0);
        assert!(before > 0);
        assert!(map.is_empty());
        assert!(map.verify());
    }

    #[test]
    fn bounded_search_and_forward_iteration() {
        let mut map = SkipListMap::with_seed(11);
        for key in [10u32, 20, 30, 40, 50] {
            map.insert(key, key / 10);
        }
        assert_eq!(map.find_le(&35), Some((&30, &3)));
        assert_eq!(map.find_lt(&30), Some((&20, &2)));
        assert_eq!(map.find_ge(&35), Some((&40, &4)));
        assert_eq!(map.find_gt(&50), None);
        assert_eq!(map.first(), Some((&10, &1)));
        assert_eq!(map.last(), Some((&50, &5)));
        assert_eq!(map.select(2), Some((&30, &3)));
        assert_eq!(map.select(5), None);

        let keys: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, [10, 20, 30, 40, 50]);
        let tail: Vec<u32> = map.iter_from(&25).map(|(k, _)| *k).collect();
        assert_eq!(tail, [30, 40, 50]);

        let mut a = map.iter();
        let b = a.clone();
        assert!(a == b);
        a.next();
        assert!(a != b);
    }

    #[test]
    fn splices_relink_every_level() {
        let mut map = SkipListMap::with_seed(3);
        for key in 0..512u32 {
            map.insert(key, key);
        }
        // Removing a middle run forces relinks at every occupied height.
        for key in 128..384u32 {
            assert_eq!(map.remove(&key), Some((key, key)));
        }
        assert!(map.verify());
        assert_eq!(map.len(), 256);
        assert_eq!(map.find_le(&200), Some((&127, &127)));
        assert_eq!(map.find_ge(&128), Some((&384, &384)));
        let around: Vec<u32> = map.iter_from(&125).take(5).map(|(k, _)| *k).collect();
        assert_eq!(around, [125, 126, 127, 384, 385]);
    }
}
