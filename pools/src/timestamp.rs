//! TimeStamp oracle: the five variants of §4.1, plus the interval
//! primitives ("top", "sentinel", `is_later`) shared by every TS
//! buffer regardless of which oracle stamps it.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::primitives::{hwptime, hwtime, spin_delay, ThreadContext};

/// An interval `[lo, hi]` of possible linearization times, per §3 and
/// the GLOSSARY. `TOP` ("un-stamped") and `SENTINEL` are the two
/// distinguished values used by every buffer variant.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Interval {
    pub lo: u64,
    pub hi: u64,
}

impl Interval {
    pub const TOP: Interval = Interval {
        lo: u64::MAX,
        hi: u64::MAX,
    };
    pub const SENTINEL: Interval = Interval { lo: 0, hi: 0 };

    /// `a.is_later(b)` ("a is strictly later than b") iff `b` definitely
    /// happened before `a`: `b.hi < a.lo`. Overlapping intervals are not
    /// later in either direction.
    #[inline]
    pub fn is_later(&self, other: &Interval) -> bool {
        other.hi < self.lo
    }
}

/// Atomic storage for an `Interval`: two independent `AtomicU64`
/// words, written `lo` then `hi` (the two-phase stamping pattern of
/// §4.2 step 6). Readers may observe a torn state between the two
/// writes; that is the intended in-flight widening the interval
/// exists to make visible.
#[derive(Debug)]
pub struct IntervalSlot {
    lo: AtomicU64,
    hi: AtomicU64,
}

impl IntervalSlot {
    pub fn new(init: Interval) -> Self {
        IntervalSlot {
            lo: AtomicU64::new(init.lo),
            hi: AtomicU64::new(init.hi),
        }
    }

    #[inline]
    pub fn load(&self) -> Interval {
        // hi first, then lo: a concurrent stamper writes lo then hi, so
        // reading hi-then-lo can only ever make the observed interval
        // look the same size or narrower than reality, never wider.
        let hi = self.hi.load(Ordering::Acquire);
        let lo = self.lo.load(Ordering::Acquire);
        Interval { lo, hi }
    }

    #[inline]
    pub fn store_top(&self) {
        self.lo.store(Interval::TOP.lo, Ordering::Relaxed);
        self.hi.store(Interval::TOP.hi, Ordering::Release);
    }

    #[inline]
    fn store_lo(&self, v: u64) {
        self.lo.store(v, Ordering::Release);
    }

    #[inline]
    fn store_hi(&self, v: u64) {
        self.hi.store(v, Ordering::Release);
    }
}

/// Oracle capable of stamping an interval and reading "now" as an
/// interval (the invocation timestamp of a `get`). Implemented by the
/// hardware-serialized variant and by the double-timestamp variant
/// (`TL2TSStackBuffer`/`TL2TSDequeBuffer` in the source, which is the
/// same algorithm over a different interval source per §4.2's note).
pub trait IntervalOracle: Send + Sync {
    /// Stamp `slot` with a fresh interval: `lo = now`, spin `delay`,
    /// `hi = now`.
    fn set_timestamp(&self, slot: &IntervalSlot);

    /// The invocation timestamp for a `get`: a degenerate interval
    /// `[now, now]`.
    fn read_time(&self) -> Interval;
}

/// Serialized-hardware-cycle oracle: the default, grounded in
/// `HardwarePTimeStamp`.
pub struct HardwareSerializedOracle {
    delay: u64,
}

impl HardwareSerializedOracle {
    pub fn new(delay: u64) -> Self {
        HardwareSerializedOracle { delay }
    }
}

impl IntervalOracle for HardwareSerializedOracle {
    fn set_timestamp(&self, slot: &IntervalSlot) {
        slot.store_lo(hwptime());
        spin_delay(self.delay);
        slot.store_hi(hwptime());
    }

    fn read_time(&self) -> Interval {
        let now = hwptime();
        Interval { lo: now, hi: now }
    }
}

/// Scalar (non-interval) timestamp source used by the array-based
/// stack buffer and as the "now" reference for its threshold-based
/// claim check: a single comparable `u64` rather than an interval.
pub trait ScalarOracle: Send + Sync {
    fn get_timestamp(&self, ctx: &ThreadContext) -> u64;
    fn read_time(&self, ctx: &ThreadContext) -> u64;
}

/// "Stuttering": scans all threads' last-issued clock, writes
/// `max + 1` into its own slot, and returns that value. Two threads
/// racing this can both observe and write the same value ("stutter"),
/// per §4.1.
pub struct StutteringOracle {
    clocks: Vec<AtomicU64>,
}

impl StutteringOracle {
    pub fn new(num_threads: usize) -> Self {
        StutteringOracle {
            clocks: (0..num_threads).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn scan_max(&self) -> u64 {
        self.clocks.iter().map(|c| c.load(Ordering::Acquire)).max().unwrap_or(0)
    }
}

impl ScalarOracle for StutteringOracle {
    fn get_timestamp(&self, ctx: &ThreadContext) -> u64 {
        let next = self.scan_max() + 1;
        self.clocks[ctx.id()].store(next, Ordering::Release);
        next
    }

    fn read_time(&self, _ctx: &ThreadContext) -> u64 {
        self.scan_max()
    }
}

/// Strictly monotone, totally ordered, shared-counter oracle.
/// High contention by construction.
pub struct AtomicCounterOracle {
    counter: AtomicU64,
}

impl AtomicCounterOracle {
    pub fn new() -> Self {
        AtomicCounterOracle {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for AtomicCounterOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarOracle for AtomicCounterOracle {
    fn get_timestamp(&self, _ctx: &ThreadContext) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn read_time(&self, _ctx: &ThreadContext) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

/// Plain hardware-cycle read, not globally serialized.
pub struct HardwareOracle;

impl ScalarOracle for HardwareOracle {
    fn get_timestamp(&self, _ctx: &ThreadContext) -> u64 {
        hwtime()
    }

    fn read_time(&self, _ctx: &ThreadContext) -> u64 {
        hwtime()
    }
}

/// Cycle counter right-shifted by one, coarsening time so that
/// concurrent inserts collide intentionally (per §4.1).
pub struct ShiftedHardwareOracle;

impl ScalarOracle for ShiftedHardwareOracle {
    fn get_timestamp(&self, _ctx: &ThreadContext) -> u64 {
        hwtime() >> 1
    }

    fn read_time(&self, _ctx: &ThreadContext) -> u64 {
        hwtime() >> 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_later_is_strict_and_overlap_aware() {
        let a = Interval { lo: 10, hi: 20 };
        let b = Interval { lo: 21, hi: 30 };
        assert!(b.is_later(&a));
        assert!(!a.is_later(&b));
        let overlapping = Interval { lo: 15, hi: 25 };
        assert!(!overlapping.is_later(&a));
        assert!(!a.is_later(&overlapping));
    }

    #[test]
    fn stuttering_oracle_is_monotone_per_thread() {
        let oracle = StutteringOracle::new(2);
        let ctx = ThreadContext::new(0, 2);
        let mut last = 0;
        for _ in 0..100 {
            let t = oracle.get_timestamp(&ctx);
            assert!(t > last);
            last = t;
        }
    }

    #[test]
    fn atomic_counter_oracle_is_totally_ordered() {
        let oracle = AtomicCounterOracle::new();
        let ctx = ThreadContext::new(0, 1);
        let a = oracle.get_timestamp(&ctx);
        let b = oracle.get_timestamp(&ctx);
        assert!(b > a);
    }
}
