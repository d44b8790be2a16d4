//! Concurrent, linearizable pool data structures for high-throughput
//! multi-threaded producer/consumer workloads: the Timestamped (TS)
//! buffer family (stack, deque, queue), an elimination-backoff stack,
//! and a flat-combining queue.
//!
//! The hard engineering lives in the TS removal algorithm: per-thread
//! insertion buffers, hardware- or software-issued timestamps, and a
//! concurrent scan-and-elect removal protocol with emptiness
//! detection and ABA-safe pointer mutation. See each module for the
//! corresponding piece.
//!
//! Out of scope, per the design this crate follows: a benchmark
//! driver (see the separate `prodcon` binary), and well-known prior
//! art (Michael-Scott queues, simple linked stacks).

pub mod config;
pub mod deque;
pub mod error;
pub mod flat_combining;
pub mod logging;
pub mod primitives;
pub mod stack;
mod tagged_ptr;
pub mod timestamp;

pub use config::{EliminationConfig, PoolConfig};
pub use deque::{ts_deque::TsDequeBuffer, TsDequePool, TsQueuePool};
pub use error::PoolError;
pub use flat_combining::{FlatCombiningQueue, FlatCombiningQueuePool};
pub use logging::{NoopLogger, OperationKind, OperationLogger, TracingLogger};
pub use primitives::ThreadContext;
pub use stack::{elimination::EliminationBackoffStack, EliminationStackPool, TlArrayStackPool, TsStackPool};
pub use timestamp::{
    AtomicCounterOracle, HardwareOracle, HardwareSerializedOracle, Interval, IntervalOracle, ScalarOracle,
    ShiftedHardwareOracle, StutteringOracle,
};

/// What every pool exposes to a client thread (§6.1).
///
/// `put` returns `false` only for bounded buffers, which none of the
/// pools in this crate are; every `put` here always returns `true`.
/// `get` returns `false` iff the pool was observed empty at some
/// instant during the call; `*out` is left unmodified in that case.
pub trait Pool<T> {
    fn put(&self, ctx: &ThreadContext, item: T) -> bool;
    fn get(&self, ctx: &ThreadContext, out: &mut T) -> bool;
    /// Implementation-defined diagnostic line, e.g. average scan
    /// length. `None` when a pool has nothing interesting to report.
    fn ds_get_stats(&self) -> Option<String>;
}
