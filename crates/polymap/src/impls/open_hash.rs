//! Open-addressing hash table engine with linear probing.
//!
//! Entries occupy a flat prime-sized slot array; a probe starts at
//! `hash % capacity` and walks forward until it hits the key or an empty
//! slot. Capacity climbs a doubling prime ladder whenever the load would
//! pass 2/3. Removal leaves no tombstones: the vacated slot is healed by
//! taking every entry in the probe run that follows and re-placing it from
//! its home slot, so lookups never probe past an empty slot in vain.
//! A computed hash of zero is folded to `u64::MAX` so stored hashes are
//! never zero.

use std::hash::{BuildHasher, Hash};
use std::mem;

use crate::hash::FnvBuildHasher;
use crate::Map;

const PRIMES: [usize; 26] = [
    53, 97, 193, 389, 769, 1543, 3079, 6151, 12289, 24593, 49157, 98317, 196613, 393241, 786433,
    1572869, 3145739, 6291469, 12582917, 25165843, 50331653, 100663319, 201326611, 402653189,
    805306457, 1610612741,
];

struct Slot<K, V> {
    hash: u64,
    key: K,
    value: V,
}

pub struct OpenHashMap<K, V, S = FnvBuildHasher> {
    slots: Box<[Option<Slot<K, V>>]>,
    len: usize,
    hasher: S,
}

impl<K: Hash + Eq, V> OpenHashMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(FnvBuildHasher::default())
    }

    /// Sized to hold `entries` without growing.
    pub fn with_capacity(entries: usize) -> Self {
        Self::with_capacity_and_hasher(entries, FnvBuildHasher::default())
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> OpenHashMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            slots: alloc_slots(PRIMES[0]),
            len: 0,
            hasher,
        }
    }

    pub fn with_capacity_and_hasher(entries: usize, hasher: S) -> Self {
        // Invert the 2/3 load bound.
        let wanted = entries.saturating_mul(3).div_ceil(2).max(1);
        Self {
            slots: alloc_slots(ladder_prime(wanted)),
            len: 0,
            hasher,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn hash_of(&self, key: &K) -> u64 {
        match self.hasher.hash_one(key) {
            0 => u64::MAX,
            hash => hash,
        }
    }

    fn find_slot(&self, key: &K) -> Option<usize> {
        let hash = self.hash_of(key);
        let capacity = self.slots.len();
        let mut at = (hash % capacity as u64) as usize;
        while let Some(slot) = &self.slots[at] {
            if slot.hash == hash && slot.key == *key {
                return Some(at);
            }
            at = (at + 1) % capacity;
        }
        None
    }

    fn grow(&mut self) {
        let next = ladder_prime(self.slots.len() + 1);
        if next == self.slots.len() {
            return;
        }
        let old = mem::replace(&mut self.slots, alloc_slots(next));
        for slot in old.into_iter().flatten() {
            place(&mut self.slots, slot);
        }
    }

    fn probe_insert(&mut self, key: K, value: V) -> (usize, bool, Option<V>) {
        if let Some(at) = self.find_slot(&key) {
            return (at, false, Some(value));
        }
        if 3 * (self.len + 1) > 2 * self.slots.len() {
            self.grow();
        }
        let hash = self.hash_of(&key);
        let at = place(&mut self.slots, Slot { hash, key, value });
        self.len += 1;
        (at, true, None)
    }

    /// Entries in slot order; reversible with `.rev()`.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: &self.slots,
            front: 0,
            back: self.slots.len(),
            remaining: self.len,
        }
    }
}

fn alloc_slots<K, V>(capacity: usize) -> Box<[Option<Slot<K, V>>]> {
    (0..capacity).map(|_| None).collect()
}

/// Smallest ladder capacity ≥ `wanted` (the top rung once past it).
fn ladder_prime(wanted: usize) -> usize {
    for &prime in &PRIMES {
        if prime >= wanted {
            return prime;
        }
    }
    PRIMES[PRIMES.len() - 1]
}

/// Probes from the slot's home to the first empty slot and parks it there.
/// The table must have a free slot.
fn place<K, V>(slots: &mut [Option<Slot<K, V>>], slot: Slot<K, V>) -> usize {
    let capacity = slots.len();
    let mut at = (slot.hash % capacity as u64) as usize;
    while slots[at].is_some() {
        at = (at + 1) % capacity;
    }
    slots[at] = Some(slot);
    at
}

impl<K: Hash + Eq, V> Default for OpenHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> Map for OpenHashMap<K, V, S> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        self.len
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        let at = self.find_slot(key)?;
        self.slots[at].as_ref().map(|slot| &slot.value)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let at = self.find_slot(key)?;
        self.slots[at].as_mut().map(|slot| &mut slot.value)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (at, inserted, unused) = self.probe_insert(key, value);
        if inserted {
            None
        } else {
            let value = unused.expect("hit returns the value");
            let slot = self.slots[at].as_mut().expect("hit slot is occupied");
            Some(mem::replace(&mut slot.value, value))
        }
    }

    fn try_insert(&mut self, key: K, value: V) -> (&mut V, bool) {
        let (at, inserted, _) = self.probe_insert(key, value);
        let slot = self.slots[at].as_mut().expect("probe lands on a slot");
        (&mut slot.value, inserted)
    }

    fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let at = self.find_slot(key)?;
        let slot = self.slots[at].take().expect("found slot is occupied");
        self.len -= 1;
        // Heal the probe run: everything up to the next gap may have been
        // pushed past its home by the entry just removed.
        let capacity = self.slots.len();
        let mut follow = (at + 1) % capacity;
        while let Some(displaced) = self.slots[follow].take() {
            place(&mut self.slots, displaced);
            follow = (follow + 1) % capacity;
        }
        Some((slot.key, slot.value))
    }

    fn clear(&mut self) {
        self.slots.fill_with(|| None);
        self.len = 0;
    }

    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> usize {
        let mut visited = 0;
        for slot in self.slots.iter().flatten() {
            visited += 1;
            if !visit(&slot.key, &slot.value) {
                break;
            }
        }
        visited
    }

    fn verify(&self) -> bool {
        let capacity = self.slots.len();
        if 3 * self.len > 2 * capacity {
            return false;
        }
        let mut seen = 0;
        for (at, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            seen += 1;
            if slot.hash == 0 || self.hash_of(&slot.key) != slot.hash {
                return false;
            }
            // The whole run from the home slot must be occupied, or the
            // entry would be unreachable.
            let mut probe = (slot.hash % capacity as u64) as usize;
            while probe != at {
                if self.slots[probe].is_none() {
                    return false;
                }
                probe = (probe + 1) % capacity;
            }
        }
        seen == self.len
    }
}

/// Cursor pair over the occupied slots. `back` is one past the next
/// back-end candidate.
pub struct Iter<'a, K, V> {
    slots: &'a [Option<Slot<K, V>>],
    front: usize,
    back: usize,
    remaining: usize,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<K, V> PartialEq for Iter<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.slots, other.slots)
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
        loop {
            let at = self.front;
            self.front += 1;
            if let Some(slot) = &self.slots[at] {
                self.remaining -= 1;
                return Some((&slot.key, &slot.value));
            }
        }
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
        loop {
            self.back -= 1;
            if let Some(slot) = &self.slots[self.back] {
                self.remaining -= 1;
                return Some((&slot.key, &slot.value));
            }
        }
    }
}

impl<K, V> std::iter::FusedIterator for Iter<'_, K, V> {}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

#[cfg(test)]
mod tests {
    use super::{OpenHashMap, PRIMES};
    use crate::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;
    use std::hash::{BuildHasherDefault, Hasher};

    /// Hashes every key to a small constant so probe runs collide hard.
    #[derive(Default)]
    struct Clump;

    impl Hasher for Clump {
        fn finish(&self) -> u64 {
            7
        }

        fn write(&mut self, _: &[u8]) {}
    }

    #[test]
    fn random_operations_match_oracle() {
        let mut rng = StdRng::seed_from_u64(0x5EED_0A11);
        let mut map = OpenHashMap::new();
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
    fn removal_heals_collision_runs() {
        let mut map: OpenHashMap<u32, u32, BuildHasherDefault<Clump>> =
            OpenHashMap::with_hasher(BuildHasherDefault::default());
        for key in 0..20u32 {
            map.insert(key, key);
        }
        assert!(map.verify());
        // Removing from the middle of the run must keep the tail reachable.
        for key in [5u32, 0, 19, 10] {
            assert_eq!(map.remove(&key), Some((key, key)));
            assert!(map.verify());
        }
        for key in 0..20u32 {
            let expect = ![5, 0, 19, 10].contains(&key);
            assert_eq!(map.get(&key).is_some(), expect);
        }
    }

    #[test]
    fn growth_climbs_the_prime_ladder() {
        let mut map = OpenHashMap::new();
        assert_eq!(map.capacity(), PRIMES[0]);
        for key in 0..1000u32 {
            map.insert(key, ());
        }
        assert!(map.capacity() >= 1543);
        assert!(PRIMES.contains(&map.capacity()));
        assert!(3 * map.len() <= 2 * map.capacity());
        assert!(map.verify());

        let sized: OpenHashMap<u32, ()> = OpenHashMap::with_capacity(1000);
        assert!(3 * 1000 <= 2 * sized.capacity());
    }

    #[test]
    fn iteration_and_clear() {
        let mut map = OpenHashMap::new();
        for key in 0..100u32 {
            map.insert(key, key * 2);
        }
        let mut forward: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
        let mut backward: Vec<u32> = map.iter().rev().map(|(k, _)| *k).collect();
        assert_eq!(map.iter().len(), 100);
        forward.sort_unstable();
        backward.sort_unstable();
        assert_eq!(forward, backward);
        assert_eq!(forward, (0..100).collect::<Vec<_>>());

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.iter().next(), None);
        assert!(map.verify());
        map.insert(1, 2);
        assert_eq!(map.len(), 1);
    }
}
