//! Default TS stack buffer: a per-thread singly linked list with
//! interval timestamps, per spec.md §4.2. This type realizes both the
//! base algorithm and the `TL2TSStackBuffer` variant — the source
//! treats them as separate classes, but per its own note ("same
//! algorithm, different interval source") they differ only in which
//! `IntervalOracle` impl is plugged in (`HardwareSerializedOracle` for
//! the default, a double-timestamp oracle for `TL2TS`); monomorphizing
//! over `O` gets both for free, per Design Notes §9's guidance to
//! replace virtual dispatch over buffer/oracle families with generics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::primitives::ThreadContext;
use crate::tagged_ptr::Tagged;
use crate::timestamp::{Interval, IntervalOracle, IntervalSlot};

struct StackItem<T> {
    next: AtomicU64,
    taken: AtomicBool,
    ts: IntervalSlot,
    data: T,
}

/// Outcome of a single scan-and-claim attempt. `Retry` means the pool
/// was observed non-empty but this attempt lost a race for the item it
/// found; the caller (the pool wrapper) re-scans.
pub(crate) enum RemoveOutcome<T> {
    Empty,
    Retry,
    Claimed(T),
}

pub struct TsStackBuffer<T, O> {
    /// One head per thread, each hammered by its own `insert` and
    /// scanned by every other thread's `try_remove`: cache-padded so
    /// one thread's insert doesn't bounce the cache line backing its
    /// neighbors' heads.
    heads: Vec<CachePadded<AtomicU64>>,
    emptiness_check: Vec<Vec<AtomicU64>>,
    oracle: O,
}

impl<T: Copy + Default + Send, O: IntervalOracle> TsStackBuffer<T, O> {
    pub fn new(num_threads: usize, oracle: O) -> Self {
        assert!(num_threads > 0);
        let heads: Vec<CachePadded<AtomicU64>> = (0..num_threads)
            .map(|_| {
                let sentinel = Box::into_raw(Box::new(StackItem {
                    next: AtomicU64::new(0),
                    taken: AtomicBool::new(true),
                    ts: IntervalSlot::new(Interval::SENTINEL),
                    data: T::default(),
                }));
                unsafe {
                    (*sentinel).next.store(sentinel as u64, Ordering::Relaxed);
                }
                CachePadded::new(AtomicU64::new(Tagged::encode(sentinel, 0).raw()))
            })
            .collect();
        let emptiness_check = (0..num_threads)
            .map(|_| heads.iter().map(|h| AtomicU64::new(h.load(Ordering::Relaxed))).collect())
            .collect();
        TsStackBuffer {
            heads,
            emptiness_check,
            oracle,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Walk `next` from `start`, skipping tombstones (`taken == true`),
    /// stopping at the first live item or at the self-loop terminator.
    fn skip_tombstones(&self, start: *mut StackItem<T>) -> *mut StackItem<T> {
        let mut cur = start;
        loop {
            let node = unsafe { &*cur };
            if !node.taken.load(Ordering::Acquire) {
                return cur;
            }
            let next = node.next.load(Ordering::Acquire) as *mut StackItem<T>;
            if next == cur {
                return cur;
            }
            cur = next;
        }
    }

    pub fn insert(&self, ctx: &ThreadContext, element: T) {
        let tid = ctx.id();
        let item = Box::into_raw(Box::new(StackItem {
            next: AtomicU64::new(0),
            taken: AtomicBool::new(false),
            ts: IntervalSlot::new(Interval::TOP),
            data: element,
        }));
        let old_top = Tagged::<StackItem<T>>::from_raw(self.heads[tid].load(Ordering::Acquire));
        let top = self.skip_tombstones(old_top.ptr());
        unsafe {
            (*item).next.store(top as u64, Ordering::Relaxed);
        }
        let new_tagged = Tagged::encode(item, old_top.aba() + 1);
        self.heads[tid].store(new_tagged.raw(), Ordering::Release);
        self.oracle.set_timestamp(unsafe { &(*item).ts });
    }

    fn advance_past_tombstones(&self, i: usize, tmp_head: Tagged<StackItem<T>>, item_ptr: *mut StackItem<T>) {
        let new_raw = Tagged::encode(item_ptr, tmp_head.aba()).raw();
        let _ = self.heads[i].compare_exchange(
            tmp_head.raw(),
            new_raw,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn try_remove(&self, ctx: &ThreadContext, invocation: Interval) -> RemoveOutcome<T> {
        let tid = ctx.id();
        let n = self.heads.len();
        let mut result: Option<(*mut StackItem<T>, usize, Tagged<StackItem<T>>)> = None;
        let mut best_ts = Interval::SENTINEL;
        let mut empty = true;
        let start = ctx.rand_below(n);
        for k in 0..n {
            let i = (start + k) % n;
            let tmp_head_raw = self.heads[i].load(Ordering::Acquire);
            let tmp_head = Tagged::<StackItem<T>>::from_raw(tmp_head_raw);
            let top_ptr = self.skip_tombstones(tmp_head.ptr());
            let top_node = unsafe { &*top_ptr };
            if top_node.taken.load(Ordering::Acquire) {
                let slot = &self.emptiness_check[tid][i];
                let prev = slot.swap(tmp_head_raw, Ordering::AcqRel);
                if prev != tmp_head_raw {
                    empty = false;
                }
                continue;
            }
            empty = false;
            let item_ts = top_node.ts.load();
            if !invocation.is_later(&item_ts) {
                if top_node
                    .taken
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.advance_past_tombstones(i, tmp_head, top_ptr);
                    return RemoveOutcome::Claimed(top_node.data);
                }
                continue;
            } else if item_ts.is_later(&best_ts) {
                result = Some((top_ptr, i, tmp_head));
                best_ts = item_ts;
            }
        }
        if let Some((item_ptr, i, tmp_head)) = result {
            let node = unsafe { &*item_ptr };
            if node
                .taken
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.advance_past_tombstones(i, tmp_head, item_ptr);
                return RemoveOutcome::Claimed(node.data);
            }
            return RemoveOutcome::Retry;
        }
        if empty {
            RemoveOutcome::Empty
        } else {
            RemoveOutcome::Retry
        }
    }
}

impl<T, O> Drop for TsStackBuffer<T, O> {
    fn drop(&mut self) {
        for head in &self.heads {
            let mut cur = Tagged::<StackItem<T>>::from_raw(head.load(Ordering::Relaxed)).ptr();
            loop {
                if cur.is_null() {
                    break;
                }
                let next = unsafe { (*cur).next.load(Ordering::Relaxed) } as *mut StackItem<T>;
                let is_self_loop = next == cur;
                unsafe {
                    drop(Box::from_raw(cur));
                }
                if is_self_loop {
                    break;
                }
                cur = next;
            }
        }
    }
}
