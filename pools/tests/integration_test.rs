// Integration tests for the pools crate: the literal scenarios S1-S6
// and the cross-cutting invariants (no lost items, no duplicates,
// no-taken-twice, emptiness safety, ABA resistance, timestamp
// monotonicity) from spec.md §8, exercised through the public `Pool`
// trait rather than any buffer's internals.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use pools::{
    AtomicCounterOracle, EliminationConfig, EliminationStackPool, FlatCombiningQueuePool, HardwareSerializedOracle,
    Pool, PoolConfig, StutteringOracle, ThreadContext, TlArrayStackPool, TsDequeBuffer, TsDequePool, TsQueuePool,
    TsStackPool,
};

// ============================================================================
// S1: STACK LIFO
// ============================================================================

#[test]
fn s1_stack_lifo_single_thread() {
    let pool = TsStackPool::new(PoolConfig::new(1, 0).unwrap(), HardwareSerializedOracle::new(0));
    let ctx = ThreadContext::new(0, 1);

    assert!(pool.put(&ctx, 1u64));
    assert!(pool.put(&ctx, 2u64));
    assert!(pool.put(&ctx, 3u64));

    let mut out = 0u64;
    assert!(pool.get(&ctx, &mut out));
    assert_eq!(out, 3);
    assert!(pool.get(&ctx, &mut out));
    assert_eq!(out, 2);
    assert!(pool.get(&ctx, &mut out));
    assert_eq!(out, 1);
    assert!(!pool.get(&ctx, &mut out));
}

#[test]
fn s1_array_stack_lifo_single_thread() {
    let pool = TlArrayStackPool::new(PoolConfig::new(1, 0).unwrap(), AtomicCounterOracle::new());
    let ctx = ThreadContext::new(0, 1);
    for v in [1u64, 2, 3] {
        assert!(pool.put(&ctx, v));
    }
    let mut out = 0u64;
    let mut popped = Vec::new();
    for _ in 0..3 {
        assert!(pool.get(&ctx, &mut out));
        popped.push(out);
    }
    assert_eq!(popped, vec![3, 2, 1]);
    assert!(!pool.get(&ctx, &mut out));
}

// ============================================================================
// S2: QUEUE FIFO
// ============================================================================

#[test]
fn s2_queue_fifo_single_thread() {
    let pool = TsQueuePool::new(PoolConfig::new(1, 0).unwrap(), HardwareSerializedOracle::new(0));
    let ctx = ThreadContext::new(0, 1);

    assert!(pool.put(&ctx, 10u64));
    assert!(pool.put(&ctx, 20u64));
    assert!(pool.put(&ctx, 30u64));

    let mut out = 0u64;
    let mut seen = Vec::new();
    for _ in 0..3 {
        assert!(pool.get(&ctx, &mut out));
        seen.push(out);
    }
    assert_eq!(seen, vec![10, 20, 30]);
    assert!(!pool.get(&ctx, &mut out));
}

// ============================================================================
// S3: DEQUE BOTH ENDS
// ============================================================================

#[test]
fn s3_deque_both_ends_via_buffer() {
    // `TsDequeBuffer` itself (not the pool wrapper) to exercise the
    // literal insert_right/insert_right/insert_left/remove_left/
    // remove_right/remove_left/remove_right sequence from spec.md §8.
    let buf = TsDequeBuffer::new(1, HardwareSerializedOracle::new(0));
    let ctx = ThreadContext::new(0, 1);
    buf.insert_right(&ctx, 1u64);
    buf.insert_right(&ctx, 2u64);
    buf.insert_left(&ctx, 0u64);

    assert_eq!(buf.remove_left_blocking(&ctx), Some(0));
    assert_eq!(buf.remove_right_blocking(&ctx), Some(2));
    assert_eq!(buf.remove_left_blocking(&ctx), Some(1));
    assert_eq!(buf.remove_right_blocking(&ctx), None);
}

#[test]
fn s3_deque_side_semantics_via_pool() {
    // "insert_left then remove_left returns the same value" (testable
    // property 7): exercised through the pool wrapper's random side
    // selection by forcing single-direction traffic on one thread and
    // draining until the deque is observed empty.
    let pool = TsDequePool::new(PoolConfig::new(1, 0).unwrap(), HardwareSerializedOracle::new(0));
    let ctx = ThreadContext::new(0, 1);
    for v in 0..20u64 {
        assert!(pool.put(&ctx, v));
    }
    let mut out = 0u64;
    let mut seen = HashSet::new();
    while pool.get(&ctx, &mut out) {
        seen.insert(out);
    }
    assert_eq!(seen.len(), 20);
    for v in 0..20u64 {
        assert!(seen.contains(&v));
    }
}

// ============================================================================
// S4: ELIMINATION STACK, 4 THREADS
// ============================================================================

#[test]
fn s4_elimination_stack_push_pop_balance() {
    let num_threads = 4;
    let config = EliminationConfig::new(PoolConfig::new(num_threads, 0).unwrap(), 4).unwrap();
    let pool = Arc::new(EliminationStackPool::new(config));
    let per_pusher = 1000usize;

    let mut handles = Vec::new();
    for tid in 0..2 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, num_threads);
            for i in 0..per_pusher {
                pool.put(&ctx, (tid * per_pusher + i) as u64);
            }
        }));
    }

    let popped = Arc::new(std::sync::Mutex::new(Vec::new()));
    for tid in 2..4 {
        let pool = Arc::clone(&pool);
        let popped = Arc::clone(&popped);
        handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, num_threads);
            let mut mine = Vec::new();
            let mut out = 0u64;
            // Poll until both pushers are done and the stack drains;
            // a bounded retry budget keeps this from spinning forever
            // if scheduling starves a thread completely.
            for _ in 0..(per_pusher * 2 * 20) {
                if pool.get(&ctx, &mut out) {
                    mine.push(out);
                }
            }
            popped.lock().unwrap().extend(mine);
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Drain anything left (pushers may have finished after poppers
    // gave up their bounded budget).
    let ctx = ThreadContext::new(0, num_threads);
    let mut out = 0u64;
    let mut leftover = Vec::new();
    while pool.get(&ctx, &mut out) {
        leftover.push(out);
    }

    let mut all: Vec<u64> = popped.lock().unwrap().clone();
    all.extend(leftover);
    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len(), "elimination stack produced a duplicate");
    assert_eq!(all.len(), num_threads / 2 * per_pusher, "some pushed values were never observed");
}

// ============================================================================
// S5: FLAT COMBINING, 8 THREADS
// ============================================================================

#[test]
fn s5_flat_combining_ascending_per_thread() {
    let num_threads = 8;
    let per_thread = 300u64;
    let pool = Arc::new(FlatCombiningQueuePool::new(PoolConfig::new(num_threads, 0).unwrap()));

    let mut handles = Vec::new();
    for tid in 0..num_threads {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, num_threads);
            for seq in 0..per_thread {
                pool.put(&ctx, ((tid as u64) << 32) | seq);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let ctx = ThreadContext::new(0, num_threads);
    let mut out = 0u64;
    let mut per_tid = vec![Vec::new(); num_threads];
    let mut total = 0u64;
    while pool.get(&ctx, &mut out) {
        let tid = (out >> 32) as usize;
        per_tid[tid].push(out & 0xffff_ffff);
        total += 1;
    }

    assert_eq!(total, num_threads as u64 * per_thread);
    for seqs in &per_tid {
        assert_eq!(seqs.len(), per_thread as usize, "missing ops from one producer");
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "per-thread seq not ascending");
    }
}

// ============================================================================
// S6: BARRIER MODE (N PRODUCERS FILL, THEN N CONSUMERS DRAIN)
// ============================================================================

#[test]
fn s6_barrier_mode_fill_then_drain() {
    let num_threads = 6;
    let per_producer = 500usize;
    let pool = Arc::new(TsStackPool::new(
        PoolConfig::new(num_threads, 0).unwrap(),
        HardwareSerializedOracle::new(0),
    ));

    let mut producer_handles = Vec::new();
    for tid in 0..num_threads {
        let pool = Arc::clone(&pool);
        producer_handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, num_threads);
            for i in 0..per_producer {
                pool.put(&ctx, (tid * per_producer + i) as u64);
            }
        }));
    }
    for h in producer_handles {
        h.join().unwrap();
    }

    let successful_gets = Arc::new(AtomicUsize::new(0));
    let seen: Arc<std::sync::Mutex<HashSet<u64>>> = Arc::new(std::sync::Mutex::new(HashSet::new()));
    let mut consumer_handles = Vec::new();
    for tid in 0..num_threads {
        let pool = Arc::clone(&pool);
        let successful_gets = Arc::clone(&successful_gets);
        let seen = Arc::clone(&seen);
        consumer_handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, num_threads);
            let mut out = 0u64;
            let mut mine = Vec::new();
            while pool.get(&ctx, &mut out) {
                mine.push(out);
                successful_gets.fetch_add(1, Ordering::SeqCst);
            }
            seen.lock().unwrap().extend(mine);
        }));
    }
    for h in consumer_handles {
        h.join().unwrap();
    }

    let ctx = ThreadContext::new(0, num_threads);
    let mut out = 0u64;
    assert!(!pool.get(&ctx, &mut out), "pool must be empty after the drain");

    assert_eq!(successful_gets.load(Ordering::SeqCst), num_threads * per_producer);
    assert_eq!(seen.lock().unwrap().len(), num_threads * per_producer);
}

// ============================================================================
// INVARIANT 1/2: NO LOST ITEMS, NO DUPLICATES
// ============================================================================

#[test]
fn no_lost_items_no_duplicates_under_contention() {
    let num_threads = 8;
    let per_producer = 400usize;
    let pool = Arc::new(TsStackPool::new(
        PoolConfig::new(num_threads, 0).unwrap(),
        HardwareSerializedOracle::new(0),
    ));

    let mut handles = Vec::new();
    for tid in 0..num_threads / 2 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, num_threads);
            for i in 0..per_producer {
                pool.put(&ctx, (tid * per_producer + i) as u64);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let consumed: Arc<std::sync::Mutex<Vec<u64>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for tid in num_threads / 2..num_threads {
        let pool = Arc::clone(&pool);
        let consumed = Arc::clone(&consumed);
        handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, num_threads);
            let mut out = 0u64;
            let mut mine = Vec::new();
            while pool.get(&ctx, &mut out) {
                mine.push(out);
            }
            consumed.lock().unwrap().extend(mine);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let got = consumed.lock().unwrap();
    let expected_total = (num_threads / 2) * per_producer;
    assert_eq!(got.len(), expected_total, "lost or phantom items");
    let unique: HashSet<u64> = got.iter().copied().collect();
    assert_eq!(unique.len(), got.len(), "duplicate item observed");
}

// ============================================================================
// INVARIANT 3: NO-TAKEN-TWICE
// ============================================================================

#[test]
fn no_taken_twice_concurrent_consumers() {
    let num_threads = 8;
    let total_items = 2000usize;
    let pool = Arc::new(TsStackPool::new(
        PoolConfig::new(num_threads, 0).unwrap(),
        HardwareSerializedOracle::new(0),
    ));
    let ctx0 = ThreadContext::new(0, num_threads);
    for i in 0..total_items {
        pool.put(&ctx0, i as u64);
    }

    let claim_counts = Arc::new((0..total_items).map(|_| AtomicU64::new(0)).collect::<Vec<_>>());
    let mut handles = Vec::new();
    for tid in 0..num_threads {
        let pool = Arc::clone(&pool);
        let claim_counts = Arc::clone(&claim_counts);
        handles.push(thread::spawn(move || {
            let ctx = ThreadContext::new(tid, num_threads);
            let mut out = 0u64;
            while pool.get(&ctx, &mut out) {
                claim_counts[out as usize].fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    for (i, count) in claim_counts.iter().enumerate() {
        assert_eq!(count.load(Ordering::SeqCst), 1, "item {i} claimed {} times", count.load(Ordering::SeqCst));
    }
}

// ============================================================================
// INVARIANT 4: EMPTINESS SAFETY
// ============================================================================

#[test]
fn emptiness_safety_sequential() {
    let pool = TsStackPool::new(PoolConfig::new(1, 0).unwrap(), HardwareSerializedOracle::new(0));
    let ctx = ThreadContext::new(0, 1);
    let mut out = 0u64;
    // Never put anything; every get must observe empty immediately,
    // never spinning into `Retry` forever.
    assert!(!pool.get(&ctx, &mut out));
    pool.put(&ctx, 1);
    assert!(pool.get(&ctx, &mut out));
    assert_eq!(out, 1);
    assert!(!pool.get(&ctx, &mut out));
}

// ============================================================================
// INVARIANT 8: ELIMINATION HARMLESSNESS
// ============================================================================

#[test]
fn elimination_harmlessness_reduces_to_treiber() {
    let config = EliminationConfig::new(PoolConfig::new(2, 0).unwrap(), 0).unwrap();
    let pool = EliminationStackPool::new(config);
    let ctx = ThreadContext::new(0, 2);
    pool.put(&ctx, 1u64);
    pool.put(&ctx, 2u64);
    pool.put(&ctx, 3u64);

    let mut out = 0u64;
    assert!(pool.get(&ctx, &mut out));
    assert_eq!(out, 3);
    assert!(pool.get(&ctx, &mut out));
    assert_eq!(out, 2);
    assert!(pool.get(&ctx, &mut out));
    assert_eq!(out, 1);
    assert!(!pool.get(&ctx, &mut out));
}

// ============================================================================
// INVARIANT 9: ABA RESISTANCE
// ============================================================================

#[test]
fn aba_resistance_repeated_same_slot_churn() {
    let pool = TsStackPool::new(PoolConfig::new(1, 0).unwrap(), HardwareSerializedOracle::new(0));
    let ctx = ThreadContext::new(0, 1);
    let mut out = 0u64;
    // Repeatedly push and pop a single slot thousands of times; any
    // head-pointer corruption from ABA would surface as a wrong value,
    // a spurious `Empty`, or (worse) a panic in the free-list walker.
    for i in 0..20_000u64 {
        assert!(pool.put(&ctx, i));
        assert!(pool.get(&ctx, &mut out));
        assert_eq!(out, i);
    }
    assert!(!pool.get(&ctx, &mut out));
}

// ============================================================================
// INVARIANT 10: TIMESTAMP MONOTONICITY (STUTTERING ORACLE)
// ============================================================================

#[test]
fn stuttering_oracle_monotone_per_thread_through_pool() {
    use pools::ScalarOracle;

    let oracle = StutteringOracle::new(1);
    let ctx = ThreadContext::new(0, 1);
    let mut last = 0u64;
    for _ in 0..5_000 {
        let t = oracle.get_timestamp(&ctx);
        assert!(t > last, "stuttering oracle issued a non-increasing timestamp");
        last = t;
    }
}
