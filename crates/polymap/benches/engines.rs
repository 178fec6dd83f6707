//! Head-to-head engine comparison on uniform random workloads.

use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use polymap::{
    AvlTreeMap, ChainedHashMap, Map, OpenHashMap, PathTreeMap, RbTreeMap, SkipListMap,
    SplayTreeMap, TreapMap, WbtTreeMap,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEED: u64 = 0x5EED_BE4C;
const KEYS: usize = 10_000;

fn random_keys(count: usize, rng: &mut StdRng) -> Vec<u64> {
    (0..count).map(|_| rng.random()).collect()
}

fn fill<M: Map<Key = u64, Value = u64>>(map: &mut M, keys: &[u64]) {
    for &key in keys {
        map.insert(key, key);
    }
}

macro_rules! bench_inserts {
    ($group:ident, $keys:ident, $($name:literal => $ctor:expr),* $(,)?) => {$(
        $group.bench_function($name, |b| {
            b.iter_batched(
                || $ctor,
                |mut map| {
                    fill(&mut map, &$keys);
                    map
                },
                BatchSize::SmallInput,
            )
        });
    )*};
}

macro_rules! bench_lookups {
    ($group:ident, $keys:ident, $probes:ident, $($name:literal => $ctor:expr),* $(,)?) => {$(
        $group.bench_function($name, |b| {
            let mut map = $ctor;
            fill(&mut map, &$keys);
            b.iter(|| {
                let mut hits = 0usize;
                for key in &$probes {
                    if map.get(key).is_some() {
                        hits += 1;
                    }
                }
                black_box(hits)
            })
        });
    )*};
}

macro_rules! bench_churn {
    ($group:ident, $keys:ident, $($name:literal => $ctor:expr),* $(,)?) => {$(
        $group.bench_function($name, |b| {
            b.iter_batched(
                || {
                    let mut map = $ctor;
                    fill(&mut map, &$keys);
                    map
                },
                |mut map| {
                    for pair in $keys.chunks_exact(2) {
                        map.remove(&pair[0]);
                        map.insert(pair[1] ^ 1, pair[1]);
                    }
                    map
                },
                BatchSize::SmallInput,
            )
        });
    )*};
}

macro_rules! all_engines {
    ($bench:ident, $($args:ident),*) => {
        $bench!(
            $($args,)*
            "avl" => AvlTreeMap::new(),
            "wbt" => WbtTreeMap::new(),
            "pr" => PathTreeMap::new(),
            "rb" => RbTreeMap::new(),
            "splay" => SplayTreeMap::new(),
            "treap" => TreapMap::with_seed(1),
            "skip_list" => SkipListMap::with_seed(1),
            "chained_hash" => ChainedHashMap::with_buckets(KEYS / 4),
            "open_hash" => OpenHashMap::with_capacity(KEYS),
        );
    };
}

fn insert_random(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(SEED);
    let keys = random_keys(KEYS, &mut rng);
    let mut group = c.benchmark_group("insert_random");
    group.sample_size(20);
    all_engines!(bench_inserts, group, keys);
    group.finish();
}

fn lookup_hit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(SEED);
    let keys = random_keys(KEYS, &mut rng);
    let mut probes = keys.clone();
    // Probe in an order unrelated to insertion.
    probes.rotate_left(KEYS / 3);
    let mut group = c.benchmark_group("lookup_hit");
    group.sample_size(20);
    all_engines!(bench_lookups, group, keys, probes);
    group.finish();
}

fn mixed_churn(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(SEED);
    let keys = random_keys(KEYS, &mut rng);
    let mut group = c.benchmark_group("mixed_churn");
    group.sample_size(20);
    all_engines!(bench_churn, group, keys);
    group.finish();
}

criterion_group!(benches, insert_random, lookup_hit, mixed_churn);
criterion_main!(benches);
