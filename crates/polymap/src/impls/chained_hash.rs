//! Separate-chaining hash table engine with hash-sorted chains.
//!
//! Each bucket holds its entries sorted by full 64-bit hash, ties broken by
//! key order, so a lookup walking a chain can stop at the first entry whose
//! hash exceeds the probe's. The table never grows on its own; callers size
//! it up front or call [`ChainedHashMap::resize`] when chains get long.
//! Rehashing rebuilds every chain in sorted order, so iteration remains
//! deterministic for a given table size and hasher.

use std::cmp::Ordering;
use std::hash::{BuildHasher, Hash};
use std::mem;

use crate::hash::FnvBuildHasher;
use crate::Map;

const DEFAULT_BUCKETS: usize = 53;

struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
}

pub struct ChainedHashMap<K, V, S = FnvBuildHasher> {
    buckets: Box<[Vec<Entry<K, V>>]>,
    len: usize,
    hasher: S,
}

impl<K: Ord + Hash, V> ChainedHashMap<K, V> {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    pub fn with_buckets(buckets: usize) -> Self {
        Self::with_buckets_and_hasher(buckets, FnvBuildHasher::default())
    }
}

impl<K: Ord + Hash, V, S: BuildHasher> ChainedHashMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_buckets_and_hasher(DEFAULT_BUCKETS, hasher)
    }

    pub fn with_buckets_and_hasher(buckets: usize, hasher: S) -> Self {
        Self {
            buckets: alloc_buckets(buckets.max(1)),
            len: 0,
            hasher,
        }
    }

    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    fn locate(&self, key: &K) -> (usize, Result<usize, usize>) {
        let hash = self.hasher.hash_one(key);
        let bucket = self.bucket_of(hash);
        (bucket, chain_pos(&self.buckets[bucket], hash, key))
    }

    /// Rebuilds into `buckets` chains (at least one), keeping every chain
    /// sorted.
    pub fn resize(&mut self, buckets: usize) {
        let old = mem::replace(&mut self.buckets, alloc_buckets(buckets.max(1)));
        for chain in old {
            for entry in chain {
                let bucket = self.bucket_of(entry.hash);
                let chain = &mut self.buckets[bucket];
                match chain_pos(chain, entry.hash, &entry.key) {
                    Ok(_) => unreachable!("keys were unique before the rehash"),
                    Err(at) => chain.insert(at, entry),
                }
            }
        }
    }

    fn probe_insert(&mut self, key: K, value: V) -> (usize, usize, bool, Option<V>) {
        let hash = self.hasher.hash_one(&key);
        let bucket = self.bucket_of(hash);
        match chain_pos(&self.buckets[bucket], hash, &key) {
            Ok(at) => (bucket, at, false, Some(value)),
            Err(at) => {
                self.buckets[bucket].insert(at, Entry { hash, key, value });
                self.len += 1;
                (bucket, at, true, None)
            }
        }
    }

    /// Entries in bucket order, sorted within each chain; reversible with
    /// `.rev()`.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.buckets, self.len)
    }
}

/// First entry at or after `(hash, key)` in a sorted chain: `Ok` on a match,
/// `Err` with the insertion point otherwise. Stops early once the stored
/// hashes pass the probe's.
fn chain_pos<K: Ord, V>(chain: &[Entry<K, V>], hash: u64, key: &K) -> Result<usize, usize> {
    for (at, entry) in chain.iter().enumerate() {
        match entry.hash.cmp(&hash).then_with(|| entry.key.cmp(key)) {
            Ordering::Less => (),
            Ordering::Equal => return Ok(at),
            Ordering::Greater => return Err(at),
        }
    }
    Err(chain.len())
}

fn alloc_buckets<K, V>(buckets: usize) -> Box<[Vec<Entry<K, V>>]> {
    (0..buckets).map(|_| Vec::new()).collect()
}

impl<K: Ord + Hash, V> Default for ChainedHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Hash, V, S: BuildHasher> Map for ChainedHashMap<K, V, S> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        self.len
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        let (bucket, found) = self.locate(key);
        found.ok().map(|at| &self.buckets[bucket][at].value)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let (bucket, found) = self.locate(key);
        found.ok().map(|at| &mut self.buckets[bucket][at].value)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (bucket, at, inserted, unused) = self.probe_insert(key, value);
        if inserted {
            None
        } else {
            let value = unused.expect("hit returns the value");
            Some(mem::replace(&mut self.buckets[bucket][at].value, value))
        }
    }

    fn try_insert(&mut self, key: K, value: V) -> (&mut V, bool) {
        let (bucket, at, inserted, _) = self.probe_insert(key, value);
        (&mut self.buckets[bucket][at].value, inserted)
    }

    fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let (bucket, found) = self.locate(key);
        let at = found.ok()?;
        let entry = self.buckets[bucket].remove(at);
        self.len -= 1;
        Some((entry.key, entry.value))
    }

    fn clear(&mut self) {
        for chain in &mut self.buckets {
            chain.clear();
        }
        self.len = 0;
    }

    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> usize {
        let mut visited = 0;
        for chain in &self.buckets {
            for entry in chain {
                visited += 1;
                if !visit(&entry.key, &entry.value) {
                    return visited;
                }
            }
        }
        visited
    }

    fn verify(&self) -> bool {
        let mut seen = 0;
        for (bucket, chain) in self.buckets.iter().enumerate() {
            let mut prev: Option<&Entry<K, V>> = None;
            for entry in chain {
                seen += 1;
                if self.hasher.hash_one(&entry.key) != entry.hash {
                    return false;
                }
                if self.bucket_of(entry.hash) != bucket {
                    return false;
                }
                if let Some(prev) = prev {
                    let order = prev.hash.cmp(&entry.hash).then_with(|| prev.key.cmp(&entry.key));
                    if order != Ordering::Less {
                        return false;
                    }
                }
                prev = Some(entry);
            }
        }
        seen == self.len
    }
}

/// Cursor pair over (bucket, chain index) positions.
pub struct Iter<'a, K, V> {
    buckets: &'a [Vec<Entry<K, V>>],
    front: (usize, usize),
    back: (usize, usize),
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn new(buckets: &'a [Vec<Entry<K, V>>], len: usize) -> Self {
        let mut iter = Self {
            buckets,
            front: (0, 0),
            back: (0, 0),
            remaining: len,
        };
        if len > 0 {
            while iter.buckets[iter.front.0].is_empty() {
                iter.front.0 += 1;
            }
            let mut bucket = buckets.len() - 1;
            while iter.buckets[bucket].is_empty() {
                bucket -= 1;
            }
            iter.back = (bucket, iter.buckets[bucket].len() - 1);
        }
        iter
    }
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            buckets: self.buckets,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<K, V> PartialEq for Iter<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.buckets, other.buckets)
            && self.front == other.front
            && self.back == other.back
            && self.remaining == other.remaining
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let (bucket, at) = self.front;
        let entry = &self.buckets[bucket][at];
        self.remaining -= 1;
        if self.remaining > 0 {
            if at + 1 < self.buckets[bucket].len() {
                self.front.1 = at + 1;
            } else {
                let mut bucket = bucket + 1;
                while self.buckets[bucket].is_empty() {
                    bucket += 1;
                }
                self.front = (bucket, 0);
            }
        }
        Some((&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let (bucket, at) = self.back;
        let entry = &self.buckets[bucket][at];
        self.remaining -= 1;
        if self.remaining > 0 {
            if at > 0 {
                self.back.1 = at - 1;
            } else {
                let mut bucket = bucket - 1;
                while self.buckets[bucket].is_empty() {
                    bucket -= 1;
                }
                self.back = (bucket, self.buckets[bucket].len() - 1);
            }
        }
        Some((&entry.key, &entry.value))
    }
}

impl<K, V> std::iter::FusedIterator for Iter<'_, K, V> {}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

#[cfg(test)]
mod tests {
    use super::ChainedHashMap;
    use crate::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;
    use std::hash::{BuildHasherDefault, Hasher};

    /// Sends every key to one chain.
    #[derive(Default)]
    struct Collide;

    impl Hasher for Collide {
        fn finish(&self) -> u64 {
            42
        }

        fn write(&mut self, _: &[u8]) {}
    }

    #[test]
    fn random_operations_match_oracle() {
        let mut rng = StdRng::seed_from_u64(0x5EED_C4A1);
        let mut map = ChainedHashMap::with_buckets(64);
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
    fn one_chain_falls_back_to_key_order() {
        let mut map: ChainedHashMap<u32, u32, BuildHasherDefault<Collide>> =
            ChainedHashMap::with_buckets_and_hasher(8, BuildHasherDefault::default());
        for key in [5u32, 1, 4, 2, 3] {
            map.insert(key, key * 10);
        }
        assert!(map.verify());
        let keys: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, [1, 2, 3, 4, 5]);
        for key in 1..=5u32 {
            assert_eq!(map.get(&key), Some(&(key * 10)));
        }
        assert_eq!(map.remove(&3), Some((3, 30)));
        let keys: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, [1, 2, 4, 5]);
        assert!(map.verify());
    }

    #[test]
    fn resize_preserves_entries_and_chain_order() {
        let mut map = ChainedHashMap::with_buckets(4);
        for key in 0..1000u32 {
            map.insert(key, key);
        }
        assert!(map.verify());
        map.resize(257);
        assert_eq!(map.buckets(), 257);
        assert_eq!(map.len(), 1000);
        assert!(map.verify());
        for key in 0..1000u32 {
            assert_eq!(map.get(&key), Some(&key));
        }
        map.resize(0);
        assert_eq!(map.buckets(), 1);
        assert!(map.verify());
    }

    #[test]
    fn iteration_is_reversible_and_sized() {
        let mut map = ChainedHashMap::with_buckets(16);
        for key in 0..100u32 {
            map.insert(key, ());
        }
        let forward: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
        let mut backward: Vec<u32> = map.iter().rev().map(|(k, _)| *k).collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(map.iter().len(), 100);

        // Meet-in-the-middle never yields an entry twice.
        let mut iter = map.iter();
        let mut seen = 0;
        while iter.next().is_some() && iter.next_back().is_some() {
            seen += 2;
        }
        assert!(seen == 100 || seen + 1 == 100);
    }
}
