//! Stack-shaped pools: the default interval-timestamped buffer, the
//! array-indexed variant, and the elimination-backoff stack.

pub mod elimination;
pub mod ts_array_stack;
pub mod ts_stack;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{EliminationConfig, PoolConfig};
use crate::logging::{NoopLogger, OperationKind, OperationLogger};
use crate::primitives::ThreadContext;
use crate::timestamp::{IntervalOracle, ScalarOracle};
use crate::Pool;

use elimination::EliminationBackoffStack;
use ts_array_stack::TlArrayStackBuffer;
use ts_stack::{RemoveOutcome, TsStackBuffer};

/// The default TS stack pool: linked-list buffer, interval timestamps.
/// Also realizes the source's `TL2TSStackBuffer` variant when `O` is a
/// double-timestamp oracle, per §4.2's note that the two are the same
/// algorithm over different interval sources.
pub struct TsStackPool<T, O> {
    buffer: TsStackBuffer<T, O>,
    tries: AtomicU64,
    attempts: AtomicU64,
    logger: Box<dyn OperationLogger>,
}

impl<T: Copy + Default + Send, O: IntervalOracle> TsStackPool<T, O> {
    pub fn new(config: PoolConfig, oracle: O) -> Self {
        Self::with_logger(config, oracle, Box::new(NoopLogger))
    }

    pub fn with_logger(config: PoolConfig, oracle: O, logger: Box<dyn OperationLogger>) -> Self {
        TsStackPool {
            buffer: TsStackBuffer::new(config.num_threads, oracle),
            tries: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            logger,
        }
    }
}

impl<T: Copy + Default + Send, O: IntervalOracle> Pool<T> for TsStackPool<T, O> {
    fn put(&self, ctx: &ThreadContext, item: T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Put);
        self.buffer.insert(ctx, item);
        self.logger.linearization(ctx.id(), OperationKind::Put);
        self.logger.response(ctx.id(), OperationKind::Put, true, None);
        true
    }

    fn get(&self, ctx: &ThreadContext, out: &mut T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Get);
        loop {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let invocation = self.buffer.oracle().read_time();
            match self.buffer.try_remove(ctx, invocation) {
                RemoveOutcome::Claimed(v) => {
                    self.tries.fetch_add(1, Ordering::Relaxed);
                    *out = v;
                    self.logger.linearization(ctx.id(), OperationKind::Get);
                    self.logger.response(ctx.id(), OperationKind::Get, true, None);
                    return true;
                }
                RemoveOutcome::Retry => continue,
                RemoveOutcome::Empty => {
                    self.logger.response(ctx.id(), OperationKind::Get, false, None);
                    return false;
                }
            }
        }
    }

    fn ds_get_stats(&self) -> Option<String> {
        let tries = self.tries.load(Ordering::Relaxed).max(1);
        let attempts = self.attempts.load(Ordering::Relaxed);
        Some(format!("tries: {:.2}", attempts as f64 / tries as f64))
    }
}

/// The array-indexed stack variant (`TLArrayStackBuffer`): no inline
/// elimination fast path, see that module's doc comment.
pub struct TlArrayStackPool<T, O> {
    buffer: TlArrayStackBuffer<T, O>,
    logger: Box<dyn OperationLogger>,
}

impl<T: Copy + Default + Send, O: ScalarOracle> TlArrayStackPool<T, O> {
    pub fn new(config: PoolConfig, oracle: O) -> Self {
        Self::with_logger(config, oracle, Box::new(NoopLogger))
    }

    pub fn with_logger(config: PoolConfig, oracle: O, logger: Box<dyn OperationLogger>) -> Self {
        TlArrayStackPool {
            buffer: TlArrayStackBuffer::new(config.num_threads, oracle),
            logger,
        }
    }
}

impl<T: Copy + Default + Send, O: ScalarOracle> Pool<T> for TlArrayStackPool<T, O> {
    fn put(&self, ctx: &ThreadContext, item: T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Put);
        self.buffer.insert(ctx, item);
        self.logger.response(ctx.id(), OperationKind::Put, true, None);
        true
    }

    fn get(&self, ctx: &ThreadContext, out: &mut T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Get);
        loop {
            match self.buffer.try_remove(ctx) {
                RemoveOutcome::Claimed(v) => {
                    *out = v;
                    self.logger.response(ctx.id(), OperationKind::Get, true, None);
                    return true;
                }
                RemoveOutcome::Retry => continue,
                RemoveOutcome::Empty => {
                    self.logger.response(ctx.id(), OperationKind::Get, false, None);
                    return false;
                }
            }
        }
    }

    fn ds_get_stats(&self) -> Option<String> {
        None
    }
}

/// Elimination-backoff stack exposed as a `Pool`.
pub struct EliminationStackPool<T> {
    stack: EliminationBackoffStack<T>,
    logger: Box<dyn OperationLogger>,
}

impl<T> EliminationStackPool<T> {
    pub fn new(config: EliminationConfig) -> Self {
        Self::with_logger(config, Box::new(NoopLogger))
    }

    pub fn with_logger(config: EliminationConfig, logger: Box<dyn OperationLogger>) -> Self {
        EliminationStackPool {
            stack: EliminationBackoffStack::new(config.pool.num_threads, config.size_collision, config.pool.delay),
            logger,
        }
    }
}

impl<T> Pool<T> for EliminationStackPool<T> {
    fn put(&self, ctx: &ThreadContext, item: T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Put);
        self.stack.push(ctx, item);
        self.logger.response(ctx.id(), OperationKind::Put, true, None);
        true
    }

    fn get(&self, ctx: &ThreadContext, out: &mut T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Get);
        match self.stack.pop(ctx) {
            Some(v) => {
                *out = v;
                self.logger.response(ctx.id(), OperationKind::Get, true, None);
                true
            }
            None => {
                self.logger.response(ctx.id(), OperationKind::Get, false, None);
                false
            }
        }
    }

    fn ds_get_stats(&self) -> Option<String> {
        None
    }
}
