use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::BTreeMap;
use std::hint::black_box;
use bplus_index::{BPlusTree, Order};

const N: usize = 10_000;

/// Branching factors to compare: the default and a wide, cache-friendlier one.
const ORDERS: [usize; 3] = [5, 16, 64];

// ─── Helper functions to generate key sequences ─────────────────────────────

fn ordered_keys(n: usize) -> Vec<i64> {
    (0..n as i64).collect()
}

fn reverse_ordered_keys(n: usize) -> Vec<i64> {
    (0..n as i64).rev().collect()
}

fn random_keys(n: usize) -> Vec<i64> {
    // Use a simple LCG for deterministic pseudo-random sequence
    let mut keys = Vec::with_capacity(n);
    let mut x: u64 = 12345;
    for _ in 0..n {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
        keys.push((x >> 33) as i64 % (n as i64 / 2));
    }
    keys
}

fn key_sequences() -> [(&'static str, Vec<i64>); 3] {
    [
        ("ordered", ordered_keys(N)),
        ("reverse", reverse_ordered_keys(N)),
        ("random", random_keys(N)),
    ]
}

fn build_tree(m: usize, keys: &[i64]) -> BPlusTree<i64, i64> {
    let mut tree = BPlusTree::new(Order::new(m).unwrap());
    for &k in keys {
        tree.insert(k, k);
    }
    tree
}

fn build_model(keys: &[i64]) -> BTreeMap<i64, Vec<i64>> {
    let mut map: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for &k in keys {
        map.entry(k).or_default().push(k);
    }
    map
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_insert(c: &mut Criterion) {
    for (name, keys) in key_sequences() {
        let mut group = c.benchmark_group(format!("insert_{name}"));

        for m in ORDERS {
            group.bench_function(BenchmarkId::new("BPlusTree", m), |b| {
                b.iter(|| build_tree(m, &keys));
            });
        }

        group.bench_function(BenchmarkId::new("BTreeMap", N), |b| {
            b.iter(|| build_model(&keys));
        });

        group.finish();
    }
}

fn bench_retrieve(c: &mut Criterion) {
    for (name, keys) in key_sequences() {
        let mut group = c.benchmark_group(format!("retrieve_{name}"));

        for m in ORDERS {
            let tree = build_tree(m, &keys);
            group.bench_function(BenchmarkId::new("BPlusTree", m), |b| {
                b.iter(|| {
                    let mut sum = 0i64;
                    for k in &keys {
                        if let Some(bucket) = tree.retrieve(k) {
                            sum = sum.wrapping_add(bucket[0]);
                        }
                    }
                    sum
                });
            });
        }

        let map = build_model(&keys);
        group.bench_function(BenchmarkId::new("BTreeMap", N), |b| {
            b.iter(|| {
                let mut sum = 0i64;
                for k in &keys {
                    if let Some(bucket) = map.get(k) {
                        sum = sum.wrapping_add(bucket[0]);
                    }
                }
                sum
            });
        });

        group.finish();
    }
}

fn bench_delete(c: &mut Criterion) {
    for (name, keys) in key_sequences() {
        let mut group = c.benchmark_group(format!("delete_{name}"));

        for m in ORDERS {
            group.bench_function(BenchmarkId::new("BPlusTree", m), |b| {
                b.iter_batched(
                    || build_tree(m, &keys),
                    |mut tree| {
                        for k in &keys {
                            tree.delete(k);
                        }
                        tree
                    },
                    BatchSize::SmallInput,
                );
            });
        }

        group.bench_function(BenchmarkId::new("BTreeMap", N), |b| {
            b.iter_batched(
                || build_model(&keys),
                |mut map| {
                    for k in &keys {
                        if let Some(bucket) = map.get_mut(k) {
                            bucket.pop();
                            if bucket.is_empty() {
                                map.remove(k);
                            }
                        }
                    }
                    map
                },
                BatchSize::SmallInput,
            );
        });

        group.finish();
    }
}

fn bench_scan(c: &mut Criterion) {
    let keys = random_keys(N);
    let mut group = c.benchmark_group("scan_from_middle");
    let start = N as i64 / 4;

    for m in ORDERS {
        let tree = build_tree(m, &keys);
        group.bench_function(BenchmarkId::new("BPlusTree", m), |b| {
            b.iter(|| tree.iter_from(black_box(&start)).map(|(_, bucket)| bucket.len()).sum::<usize>());
        });
    }

    let map = build_model(&keys);
    group.bench_function(BenchmarkId::new("BTreeMap", N), |b| {
        b.iter(|| map.range(black_box(start)..).map(|(_, bucket)| bucket.len()).sum::<usize>());
    });

    group.finish();
}

criterion_group!(crud_benches, bench_insert, bench_retrieve, bench_delete);

criterion_group!(scan_benches, bench_scan);

criterion_main!(crud_benches, scan_benches);
