use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pools::{
    AtomicCounterOracle, EliminationConfig, EliminationStackPool, FlatCombiningQueuePool, HardwareSerializedOracle,
    Pool, PoolConfig, ThreadContext, TlArrayStackPool, TsStackPool,
};

const NUM_THREADS: usize = 4;
const OPS_PER_THREAD: usize = 2_000;

fn drive<P: Pool<u64> + Send + Sync + 'static>(pool: Arc<P>) {
    let mut handles = Vec::with_capacity(NUM_THREADS);
    for tid in 0..NUM_THREADS {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, NUM_THREADS);
            let mut out = 0u64;
            for i in 0..OPS_PER_THREAD {
                pool.put(&ctx, black_box(i as u64));
            }
            for _ in 0..OPS_PER_THREAD {
                pool.get(&ctx, &mut out);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

fn benchmark_stack_variants(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stack Pools");

    group.bench_function("TsStackPool (hardware-serialized)", |b| {
        b.iter(|| {
            let pool = Arc::new(TsStackPool::new(
                PoolConfig::new(NUM_THREADS, 0).unwrap(),
                HardwareSerializedOracle::new(0),
            ));
            drive(pool);
        })
    });

    group.bench_function("TlArrayStackPool (atomic counter)", |b| {
        b.iter(|| {
            let pool = Arc::new(TlArrayStackPool::new(
                PoolConfig::new(NUM_THREADS, 0).unwrap(),
                AtomicCounterOracle::new(),
            ));
            drive(pool);
        })
    });

    group.bench_function("EliminationStackPool", |b| {
        b.iter(|| {
            let config = EliminationConfig::new(PoolConfig::new(NUM_THREADS, 0).unwrap(), 4).unwrap();
            let pool = Arc::new(EliminationStackPool::new(config));
            drive(pool);
        })
    });

    group.finish();
}

fn benchmark_flat_combining_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("Flat-Combining Queue");

    group.bench_function("FlatCombiningQueuePool", |b| {
        b.iter(|| {
            let pool = Arc::new(FlatCombiningQueuePool::new(PoolConfig::new(NUM_THREADS, 0).unwrap()));
            drive(pool);
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_stack_variants, benchmark_flat_combining_queue);
criterion_main!(benches);
