//! Host-supplied primitives the core algorithms consume: thread
//! identity, monotonic hardware-ish time, per-thread randomness, and
//! arena allocation. None of these are novel; they are specified at
//! their interface per §1 and implemented here so the crate is
//! self-contained and portable (no inline assembly, no `rdtsc`).

use std::cell::Cell;
use std::sync::atomic::{fence, Ordering};
use std::time::Instant;

use once_cell_like::Lazy;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// A dense, contiguous per-thread identity plus the per-thread
/// mutable state (PRNG) that the algorithms need. One `ThreadContext`
/// is owned by exactly one OS thread for the lifetime of a benchmark
/// run; it is never shared, so interior mutability here needs no
/// atomics.
pub struct ThreadContext {
    tid: usize,
    num_threads: usize,
    rng: Cell<SmallRng>,
}

impl ThreadContext {
    pub fn new(tid: usize, num_threads: usize) -> Self {
        assert!(tid < num_threads, "tid {tid} out of range for {num_threads} threads");
        ThreadContext {
            tid,
            num_threads,
            rng: Cell::new(SmallRng::from_rng(rand::thread_rng()).expect("seed RNG from OS entropy")),
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.tid
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Fast per-thread pseudorandom `u64`. Grounds `hwrand()` from §6.3.
    #[inline]
    pub fn hwrand(&self) -> u64 {
        let mut rng = self.rng.take();
        let v = rng.gen();
        self.rng.set(rng);
        v
    }

    /// Uniform index in `[0, bound)`, used for random collision-slot and
    /// random-start-thread selection.
    #[inline]
    pub fn rand_below(&self, bound: usize) -> usize {
        debug_assert!(bound > 0);
        (self.hwrand() as usize) % bound
    }
}

/// Epoch fixed at first use so `hwtime`/`hwptime` return small, stable
/// nanosecond offsets instead of raw `Instant` bit patterns.
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic counter standing in for a CPU cycle counter (`rdtsc`).
/// Not serialized; two back-to-back calls on the same thread may be
/// reordered by the CPU relative to surrounding loads/stores.
#[inline]
pub fn hwtime() -> u64 {
    EPOCH.elapsed().as_nanos() as u64
}

/// Serialized variant: issues a `SeqCst` fence before sampling, which
/// is the portable stand-in for `rdtscp`'s implicit serialization.
/// Grounded in `HardwarePTimeStamp::get_timestamp`'s two-sample
/// (sample, delay, sample) pattern — callers invoke this once per
/// sample point.
#[inline]
pub fn hwptime() -> u64 {
    fence(Ordering::SeqCst);
    let t = EPOCH.elapsed().as_nanos() as u64;
    fence(Ordering::SeqCst);
    t
}

/// Busy-spin until `hwtime()` has advanced by at least `delay` (in the
/// same units `hwtime` returns). Used by the interval timestamp oracle
/// to widen the in-flight window between `t_lo` and `t_hi`.
#[inline]
pub fn spin_delay(delay: u64) {
    if delay == 0 {
        return;
    }
    let deadline = hwtime().wrapping_add(delay);
    while hwtime() < deadline {
        std::hint::spin_loop();
    }
}

/// Minimal `OnceCell`-backed lazy static, avoiding a dependency on the
/// `once_cell` crate for a single use site.
mod once_cell_like {
    use std::sync::OnceLock;

    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Lazy {
                cell: OnceLock::new(),
                init,
            }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}
