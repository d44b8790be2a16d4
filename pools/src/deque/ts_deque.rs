//! TS deque buffer (§4.3): a doubly linked per-thread list with two
//! head pointers (`left`, `right`), each independently ABA-tagged.
//! `TSQueue` specializes this to `enqueue = insert_left`,
//! `dequeue = try_remove_right`, matching `ts_queue.h` exactly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::primitives::ThreadContext;
use crate::tagged_ptr::Tagged;
use crate::timestamp::{Interval, IntervalOracle, IntervalSlot};

struct DequeItem<T> {
    left: AtomicU64,
    right: AtomicU64,
    taken: AtomicBool,
    ts: IntervalSlot,
    /// Sign encodes insertion side (negative = left, positive =
    /// right); magnitude is the per-thread monotonic insert counter.
    /// `0` only for the sentinel.
    index: i64,
    data: T,
}

#[inline]
fn inserted_left(idx: i64) -> bool {
    idx < 0
}

#[inline]
fn inserted_right(idx: i64) -> bool {
    idx > 0
}

/// "a is more to the left than b", per spec.md §4.3.
fn is_more_left(a_idx: i64, a_ts: Interval, b_idx: i64, b_ts: Interval) -> bool {
    match (inserted_left(b_idx), inserted_left(a_idx)) {
        (true, true) => a_ts.is_later(&b_ts),
        (true, false) => false,
        (false, true) => true,
        (false, false) => b_ts.is_later(&a_ts),
    }
}

/// "a is more to the right than b": the mirror of `is_more_left`.
fn is_more_right(a_idx: i64, a_ts: Interval, b_idx: i64, b_ts: Interval) -> bool {
    match (inserted_right(b_idx), inserted_right(a_idx)) {
        (true, true) => a_ts.is_later(&b_ts),
        (true, false) => false,
        (false, true) => true,
        (false, false) => b_ts.is_later(&a_ts),
    }
}

pub(crate) enum RemoveOutcome<T> {
    Empty,
    Retry,
    Claimed(T),
}

pub struct TsDequeBuffer<T, O> {
    /// Per-thread left/right heads: cache-padded for the same reason
    /// as the stack buffer's `heads` — every thread's scan touches
    /// every other thread's head.
    left_heads: Vec<CachePadded<AtomicU64>>,
    right_heads: Vec<CachePadded<AtomicU64>>,
    next_index: Vec<AtomicU64>,
    emptiness_left: Vec<Vec<AtomicU64>>,
    emptiness_right: Vec<Vec<AtomicU64>>,
    oracle: O,
}

impl<T: Copy + Default + Send, O: IntervalOracle> TsDequeBuffer<T, O> {
    pub fn new(num_threads: usize, oracle: O) -> Self {
        assert!(num_threads > 0);
        let mut left_heads = Vec::with_capacity(num_threads);
        let mut right_heads = Vec::with_capacity(num_threads);
        for _ in 0..num_threads {
            let sentinel = Box::into_raw(Box::new(DequeItem {
                left: AtomicU64::new(0),
                right: AtomicU64::new(0),
                taken: AtomicBool::new(true),
                ts: IntervalSlot::new(Interval::SENTINEL),
                index: 0,
                data: T::default(),
            }));
            unsafe {
                (*sentinel).left.store(sentinel as u64, Ordering::Relaxed);
                (*sentinel).right.store(sentinel as u64, Ordering::Relaxed);
            }
            left_heads.push(CachePadded::new(AtomicU64::new(Tagged::encode(sentinel, 0).raw())));
            right_heads.push(CachePadded::new(AtomicU64::new(Tagged::encode(sentinel, 0).raw())));
        }
        let emptiness_left = (0..num_threads)
            .map(|_| left_heads.iter().map(|h| AtomicU64::new(h.load(Ordering::Relaxed))).collect())
            .collect();
        let emptiness_right = (0..num_threads)
            .map(|_| right_heads.iter().map(|h| AtomicU64::new(h.load(Ordering::Relaxed))).collect())
            .collect();
        TsDequeBuffer {
            left_heads,
            right_heads,
            next_index: (0..num_threads).map(|_| AtomicU64::new(0)).collect(),
            emptiness_left,
            emptiness_right,
            oracle,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// `try_remove_left`, retrying on `Retry` until a definitive
    /// `Claimed`/`Empty` answer comes back. Exposed for tests and
    /// direct callers that don't need the pool wrapper's logging.
    pub fn remove_left_blocking(&self, ctx: &ThreadContext) -> Option<T> {
        loop {
            let invocation = self.oracle.read_time();
            match self.try_remove_left(ctx, invocation) {
                RemoveOutcome::Claimed(v) => return Some(v),
                RemoveOutcome::Empty => return None,
                RemoveOutcome::Retry => continue,
            }
        }
    }

    /// Mirror of [`Self::remove_left_blocking`] for the right end.
    pub fn remove_right_blocking(&self, ctx: &ThreadContext) -> Option<T> {
        loop {
            let invocation = self.oracle.read_time();
            match self.try_remove_right(ctx, invocation) {
                RemoveOutcome::Claimed(v) => return Some(v),
                RemoveOutcome::Empty => return None,
                RemoveOutcome::Retry => continue,
            }
        }
    }

    pub fn insert_right(&self, ctx: &ThreadContext, element: T) {
        let tid = ctx.id();
        let magnitude = self.next_index[tid].fetch_add(1, Ordering::AcqRel) + 1;
        let item = Box::into_raw(Box::new(DequeItem {
            left: AtomicU64::new(0),
            right: AtomicU64::new(0),
            taken: AtomicBool::new(false),
            ts: IntervalSlot::new(Interval::TOP),
            index: magnitude as i64,
            data: element,
        }));
        unsafe {
            (*item).right.store(item as u64, Ordering::Relaxed);
        }
        let old_right = Tagged::<DequeItem<T>>::from_raw(self.right_heads[tid].load(Ordering::Acquire));
        let right_item_ptr = self.walk_skip_tombstones(old_right.ptr(), /*via_left=*/ true);
        let right_item = unsafe { &*right_item_ptr };
        let was_empty = right_item.left.load(Ordering::Acquire) as *mut DequeItem<T> == right_item_ptr;
        unsafe {
            (*item).left.store(right_item_ptr as u64, Ordering::Relaxed);
        }
        right_item.right.store(item as u64, Ordering::Release);
        let new_tagged = Tagged::encode(item, old_right.aba() + 1);
        self.right_heads[tid].store(new_tagged.raw(), Ordering::Release);
        if was_empty {
            self.bump_aba(&self.left_heads[tid]);
        }
        self.oracle.set_timestamp(unsafe { &(*item).ts });
    }

    pub fn insert_left(&self, ctx: &ThreadContext, element: T) {
        let tid = ctx.id();
        let magnitude = self.next_index[tid].fetch_add(1, Ordering::AcqRel) + 1;
        let item = Box::into_raw(Box::new(DequeItem {
            left: AtomicU64::new(0),
            right: AtomicU64::new(0),
            taken: AtomicBool::new(false),
            ts: IntervalSlot::new(Interval::TOP),
            index: -(magnitude as i64),
            data: element,
        }));
        unsafe {
            (*item).left.store(item as u64, Ordering::Relaxed);
        }
        let old_left = Tagged::<DequeItem<T>>::from_raw(self.left_heads[tid].load(Ordering::Acquire));
        let left_item_ptr = self.walk_skip_tombstones(old_left.ptr(), /*via_left=*/ false);
        let left_item = unsafe { &*left_item_ptr };
        let was_empty = left_item.right.load(Ordering::Acquire) as *mut DequeItem<T> == left_item_ptr;
        unsafe {
            (*item).right.store(left_item_ptr as u64, Ordering::Relaxed);
        }
        left_item.left.store(item as u64, Ordering::Release);
        let new_tagged = Tagged::encode(item, old_left.aba() + 1);
        self.left_heads[tid].store(new_tagged.raw(), Ordering::Release);
        if was_empty {
            self.bump_aba(&self.right_heads[tid]);
        }
        self.oracle.set_timestamp(unsafe { &(*item).ts });
    }

    fn bump_aba(&self, head: &AtomicU64) {
        let old = Tagged::<DequeItem<T>>::from_raw(head.load(Ordering::Acquire));
        let bumped = Tagged::encode(old.ptr(), old.aba() + 1);
        head.store(bumped.raw(), Ordering::Release);
    }

    /// Mirror of the stack buffer's `advance_past_tombstones`: after
    /// claiming `item_ptr`, advance `head` to point at it directly so a
    /// later scan on this side doesn't have to re-walk the tombstones
    /// this scan already skipped to find it.
    fn advance_past_tombstones(&self, head: &AtomicU64, tmp_raw: u64, item_ptr: *mut DequeItem<T>) {
        let tmp = Tagged::<DequeItem<T>>::from_raw(tmp_raw);
        let new_raw = Tagged::encode(item_ptr, tmp.aba()).raw();
        let _ = head.compare_exchange(tmp_raw, new_raw, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Used by insert only: walk from `start` toward the center,
    /// skipping tombstones, to find the anchor to link a newly inserted
    /// item after. `via_left == true` walks through `.left` links
    /// (anchored at a right head, searching for the current rightmost
    /// live item); `false` walks through `.right` links. Unlike
    /// `scan_left`/`scan_right`, this always stops at the sentinel
    /// (`index == 0`): a right insert always attaches directly right of
    /// whatever is structurally nearest on the right chain, even if the
    /// left chain still has live items, since the two chains share only
    /// the sentinel as their common base.
    fn walk_skip_tombstones(&self, start: *mut DequeItem<T>, via_left: bool) -> *mut DequeItem<T> {
        let mut cur = start;
        loop {
            let node = unsafe { &*cur };
            if node.index == 0 || !node.taken.load(Ordering::Acquire) {
                return cur;
            }
            let next = if via_left {
                node.left.load(Ordering::Acquire)
            } else {
                node.right.load(Ordering::Acquire)
            } as *mut DequeItem<T>;
            if next == cur {
                return cur;
            }
            cur = next;
        }
    }

    /// Find the leftmost live item in thread `i`'s list, stopping if
    /// the walk would cross the opposite (right) head's index.
    fn scan_left(&self, i: usize) -> (Option<*mut DequeItem<T>>, u64) {
        let tmp_raw = self.left_heads[i].load(Ordering::Acquire);
        let tmp = Tagged::<DequeItem<T>>::from_raw(tmp_raw);
        let right_index = unsafe { (*Tagged::<DequeItem<T>>::from_raw(self.right_heads[i].load(Ordering::Acquire)).ptr()).index };
        let mut cur = tmp.ptr();
        loop {
            let node = unsafe { &*cur };
            // The sentinel (index == 0) is a permanent tombstone, not a
            // stop: if the left chain is exhausted this walk crosses it
            // into the right chain, since the whole list is one chain
            // threaded through a shared center.
            if node.index != 0 && !node.taken.load(Ordering::Acquire) {
                return (Some(cur), tmp_raw);
            }
            let next = node.right.load(Ordering::Acquire) as *mut DequeItem<T>;
            if next == cur {
                return (None, tmp_raw);
            }
            if right_index != 0 {
                let next_node = unsafe { &*next };
                if next_node.index.unsigned_abs() >= right_index.unsigned_abs() {
                    return (None, tmp_raw);
                }
            }
            cur = next;
        }
    }

    /// Mirror of `scan_left`: find the rightmost live item, stopping
    /// if the walk would cross the opposite (left) head's index.
    fn scan_right(&self, i: usize) -> (Option<*mut DequeItem<T>>, u64) {
        let tmp_raw = self.right_heads[i].load(Ordering::Acquire);
        let tmp = Tagged::<DequeItem<T>>::from_raw(tmp_raw);
        let left_index = unsafe { (*Tagged::<DequeItem<T>>::from_raw(self.left_heads[i].load(Ordering::Acquire)).ptr()).index };
        let mut cur = tmp.ptr();
        loop {
            let node = unsafe { &*cur };
            // Mirror of the note in `scan_left`: the sentinel is crossed,
            // not a stop.
            if node.index != 0 && !node.taken.load(Ordering::Acquire) {
                return (Some(cur), tmp_raw);
            }
            let next = node.left.load(Ordering::Acquire) as *mut DequeItem<T>;
            if next == cur {
                return (None, tmp_raw);
            }
            if left_index != 0 {
                let next_node = unsafe { &*next };
                if next_node.index.unsigned_abs() >= left_index.unsigned_abs() {
                    return (None, tmp_raw);
                }
            }
            cur = next;
        }
    }

    pub(crate) fn try_remove_left(&self, ctx: &ThreadContext, invocation: Interval) -> RemoveOutcome<T> {
        let tid = ctx.id();
        let n = self.left_heads.len();
        let mut result: Option<(*mut DequeItem<T>, usize, u64)> = None;
        let mut best_ts = Interval::SENTINEL;
        let mut best_idx: i64 = 0;
        let mut empty = true;
        let start = ctx.rand_below(n);
        for k in 0..n {
            let i = (start + k) % n;
            let (found, tmp_raw) = self.scan_left(i);
            match found {
                None => {
                    let slot = &self.emptiness_left[tid][i];
                    let prev = slot.swap(tmp_raw, Ordering::AcqRel);
                    if prev != tmp_raw {
                        empty = false;
                    }
                }
                Some(ptr) => {
                    empty = false;
                    let node = unsafe { &*ptr };
                    let item_ts = node.ts.load();
                    let item_idx = node.index;
                    // Open Question (spec.md §9): only same-side items get
                    // the inline elimination fast path; this asymmetry is
                    // preserved as stated, not re-derived.
                    if inserted_left(item_idx) && !invocation.is_later(&item_ts) {
                        if node
                            .taken
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            self.advance_past_tombstones(&self.left_heads[i], tmp_raw, ptr);
                            return RemoveOutcome::Claimed(node.data);
                        }
                        continue;
                    } else if result.is_none() || is_more_left(item_idx, item_ts, best_idx, best_ts) {
                        result = Some((ptr, i, tmp_raw));
                        best_ts = item_ts;
                        best_idx = item_idx;
                    }
                }
            }
        }
        if let Some((ptr, i, tmp_raw)) = result {
            let node = unsafe { &*ptr };
            if node
                .taken
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.advance_past_tombstones(&self.left_heads[i], tmp_raw, ptr);
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

    pub(crate) fn try_remove_right(&self, ctx: &ThreadContext, invocation: Interval) -> RemoveOutcome<T> {
        let tid = ctx.id();
        let n = self.right_heads.len();
        let mut result: Option<(*mut DequeItem<T>, usize, u64)> = None;
        let mut best_ts = Interval::SENTINEL;
        let mut best_idx: i64 = 0;
        let mut empty = true;
        let start = ctx.rand_below(n);
        for k in 0..n {
            let i = (start + k) % n;
            let (found, tmp_raw) = self.scan_right(i);
            match found {
                None => {
                    let slot = &self.emptiness_right[tid][i];
                    let prev = slot.swap(tmp_raw, Ordering::AcqRel);
                    if prev != tmp_raw {
                        empty = false;
                    }
                }
                Some(ptr) => {
                    empty = false;
                    let node = unsafe { &*ptr };
                    let item_ts = node.ts.load();
                    let item_idx = node.index;
                    if inserted_right(item_idx) && !invocation.is_later(&item_ts) {
                        if node
                            .taken
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            self.advance_past_tombstones(&self.right_heads[i], tmp_raw, ptr);
                            return RemoveOutcome::Claimed(node.data);
                        }
                        continue;
                    } else if result.is_none() || is_more_right(item_idx, item_ts, best_idx, best_ts) {
                        result = Some((ptr, i, tmp_raw));
                        best_ts = item_ts;
                        best_idx = item_idx;
                    }
                }
            }
        }
        if let Some((ptr, i, tmp_raw)) = result {
            let node = unsafe { &*ptr };
            if node
                .taken
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.advance_past_tombstones(&self.right_heads[i], tmp_raw, ptr);
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

impl<T, O> Drop for TsDequeBuffer<T, O> {
    fn drop(&mut self) {
        // Each item is reachable from exactly one thread's left-head
        // walk (via `.right` links); free every item once that way,
        // then the per-thread sentinels are already included in that
        // walk, so no separate pass is needed for them.
        for i in 0..self.left_heads.len() {
            let mut cur = Tagged::<DequeItem<T>>::from_raw(self.left_heads[i].load(Ordering::Relaxed)).ptr();
            // left_heads[i] may itself be mid-list (not the true
            // leftmost) if the last operation was a remove; walk left
            // first to find the true start of the chain.
            loop {
                let node = unsafe { &*cur };
                let left = node.left.load(Ordering::Relaxed) as *mut DequeItem<T>;
                if left == cur {
                    break;
                }
                cur = left;
            }
            loop {
                let next = unsafe { (*cur).right.load(Ordering::Relaxed) } as *mut DequeItem<T>;
                let is_last = next == cur;
                unsafe {
                    drop(Box::from_raw(cur));
                }
                if is_last {
                    break;
                }
                cur = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::HardwareSerializedOracle;

    #[test]
    fn both_ends_scenario() {
        let buf = TsDequeBuffer::new(1, HardwareSerializedOracle::new(0));
        let ctx = ThreadContext::new(0, 1);
        buf.insert_right(&ctx, 1u64);
        buf.insert_right(&ctx, 2u64);
        buf.insert_left(&ctx, 0u64);

        // Mirrors the pool wrapper's retry loop: `Retry` means the
        // emptiness-check protocol hasn't yet observed two stable scans
        // and needs another pass, not that the attempt failed.
        let remove_left = |ctx: &ThreadContext| loop {
            let inv = buf.oracle().read_time();
            match buf.try_remove_left(ctx, inv) {
                RemoveOutcome::Claimed(v) => break Some(v),
                RemoveOutcome::Empty => break None,
                RemoveOutcome::Retry => continue,
            }
        };
        let remove_right = |ctx: &ThreadContext| loop {
            let inv = buf.oracle().read_time();
            match buf.try_remove_right(ctx, inv) {
                RemoveOutcome::Claimed(v) => break Some(v),
                RemoveOutcome::Empty => break None,
                RemoveOutcome::Retry => continue,
            }
        };

        assert_eq!(remove_left(&ctx), Some(0));
        assert_eq!(remove_right(&ctx), Some(2));
        assert_eq!(remove_left(&ctx), Some(1));
        assert_eq!(remove_right(&ctx), None);
    }
}
