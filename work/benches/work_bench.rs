use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

use troll_types::BlockHash;
use troll_work::{WorkCache, WorkGenerator, WorkOrigin};

// Far below the network thresholds so each iteration stays short.
const DIFFICULTY: u64 = 0xF000_0000_0000_0000;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Many callers waiting on one root should cost about one computation.
fn bench_coalesced_wait(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("work_cache_wait_for");
    let root = BlockHash::new([0x42; 32]);

    group.bench_function("direct_generate", |b| {
        b.iter(|| black_box(WorkGenerator.generate(black_box(&root), DIFFICULTY).unwrap()));
    });

    for waiters in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("waiters", waiters), &waiters, |b, &waiters| {
            b.iter(|| {
                rt.block_on(async {
                    let cache = WorkCache::new(Arc::new(WorkGenerator), DIFFICULTY, 8);
                    let mut set = JoinSet::new();
                    for _ in 0..waiters {
                        let cache = cache.clone();
                        set.spawn(async move { cache.wait_for(root).await });
                    }
                    while let Some(done) = set.join_next().await {
                        black_box(done.unwrap().unwrap());
                    }
                    assert_eq!(cache.computations_started(), 1);
                })
            });
        });
    }

    group.finish();
}

fn bench_cache_lookup(c: &mut Criterion) {
    let rt = runtime();
    let cache = WorkCache::new(Arc::new(WorkGenerator), DIFFICULTY, 64);
    let roots: Vec<BlockHash> = (0u8..32).map(|i| BlockHash::new([i; 32])).collect();
    rt.block_on(async {
        for root in &roots {
            cache.wait_for(*root).await.unwrap();
        }
    });

    c.bench_function("work_cache_hit", |b| {
        b.iter(|| {
            for root in &roots {
                black_box(cache.get(black_box(root)));
            }
        });
    });

    let nonces: Vec<_> = roots.iter().map(|root| (*root, cache.get(root).unwrap())).collect();
    c.bench_function("work_cache_insert_validated", |b| {
        b.iter(|| {
            let fresh = WorkCache::new(Arc::new(WorkGenerator), DIFFICULTY, 16);
            for (root, work) in &nonces {
                fresh.insert(*root, *work, WorkOrigin::Remote).unwrap();
            }
            black_box(fresh.len())
        });
    });
}

criterion_group!(benches, bench_coalesced_wait, bench_cache_lookup);
criterion_main!(benches);
