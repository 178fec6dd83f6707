//! One key→value map interface, nine interchangeable engines.
//!
//! Five self-balancing search trees (height-balanced, weight-balanced,
//! path-reduction, red-black, splay), a randomized treap, a probabilistic
//! skip list, and two hash tables (hash-sorted chains, and open addressing
//! with backward-shift removal). Pick the engine at construction; program
//! against [`Map`] — or [`SortedMap`] where key order matters — ever after.
//! `Box<dyn Map<Key = K, Value = V>>` gives the fully dynamic form.

mod hash;
mod rng;
mod tree;

pub mod impls;

pub use hash::{FnvBuildHasher, FnvHasher};
pub use impls::{
    AvlTreeMap, ChainedHashMap, OpenHashMap, PathTreeMap, RbTreeMap, SkipListMap, SplayTreeMap,
    TreapMap, WbtTreeMap,
};

/// Uniform map surface implemented by every engine.
///
/// - Keys are unique; `insert` overwrites and returns the old value.
/// - `try_insert` is the probe-once form: it returns the value slot plus
///   whether a new entry was created. On a hit the supplied value is dropped
///   and the stored one is untouched.
/// - `remove` hands ownership of both key and value back to the caller.
/// - `get` takes `&mut self` so self-adjusting engines may restructure.
/// - `verify` is the corruption oracle: a full structural audit that never
///   mutates, `true` unless an invariant is broken.
pub trait Map {
    type Key;
    type Value;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&mut self, key: &Self::Key) -> Option<&Self::Value>;

    fn get_mut(&mut self, key: &Self::Key) -> Option<&mut Self::Value>;

    fn insert(&mut self, key: Self::Key, value: Self::Value) -> Option<Self::Value>;

    fn try_insert(&mut self, key: Self::Key, value: Self::Value) -> (&mut Self::Value, bool);

    fn remove(&mut self, key: &Self::Key) -> Option<(Self::Key, Self::Value)>;

    fn clear(&mut self);

    /// Visits entries — in ascending key order on ordered engines, in a
    /// stable-within-a-call order on hash engines — until the visitor returns
    /// false. Returns the number of visits performed.
    fn traverse(&self, visit: &mut dyn FnMut(&Self::Key, &Self::Value) -> bool) -> usize;

    fn verify(&self) -> bool;
}

/// Order-aware extension: bounded search and rank selection.
///
/// Bounded lookups never restructure (the splay engine splays only on `get`,
/// `insert`, and `remove`), so they borrow shared.
pub trait SortedMap: Map {
    fn first(&self) -> Option<(&Self::Key, &Self::Value)>;

    fn last(&self) -> Option<(&Self::Key, &Self::Value)>;

    /// Greatest key ≤ `key`.
    fn find_le(&self, key: &Self::Key) -> Option<(&Self::Key, &Self::Value)>;

    /// Greatest key < `key`.
    fn find_lt(&self, key: &Self::Key) -> Option<(&Self::Key, &Self::Value)>;

    /// Least key ≥ `key`.
    fn find_ge(&self, key: &Self::Key) -> Option<(&Self::Key, &Self::Value)>;

    /// Least key > `key`.
    fn find_gt(&self, key: &Self::Key) -> Option<(&Self::Key, &Self::Value)>;

    /// n-th entry in key order, counting from zero. O(n), walked from
    /// whichever end is nearer.
    fn select(&self, rank: usize) -> Option<(&Self::Key, &Self::Value)>;
}
