//! Deque-shaped pools: the two-ended TS deque, and the `TSQueue`
//! specialization (`enqueue = insert_left`, `dequeue = try_remove_right`).

pub mod ts_deque;

use crate::config::PoolConfig;
use crate::logging::{NoopLogger, OperationKind, OperationLogger};
use crate::primitives::ThreadContext;
use crate::timestamp::IntervalOracle;
use crate::Pool;

use ts_deque::{RemoveOutcome, TsDequeBuffer};

/// The TS deque as a pool: each call picks a side at random, based on a
/// hardware-time bit, per spec.md §4.3's closing note. `put`/`get` see
/// both ends of the same underlying structure, so an item inserted on
/// one side can be removed from either.
pub struct TsDequePool<T, O> {
    buffer: TsDequeBuffer<T, O>,
    logger: Box<dyn OperationLogger>,
}

impl<T: Copy + Default + Send, O: IntervalOracle> TsDequePool<T, O> {
    pub fn new(config: PoolConfig, oracle: O) -> Self {
        Self::with_logger(config, oracle, Box::new(NoopLogger))
    }

    pub fn with_logger(config: PoolConfig, oracle: O, logger: Box<dyn OperationLogger>) -> Self {
        TsDequePool {
            buffer: TsDequeBuffer::new(config.num_threads, oracle),
            logger,
        }
    }

    fn random_side(&self) -> bool {
        crate::primitives::hwtime() & 1 == 0
    }
}

impl<T: Copy + Default + Send, O: IntervalOracle> Pool<T> for TsDequePool<T, O> {
    fn put(&self, ctx: &ThreadContext, item: T) -> bool {
        if self.random_side() {
            self.logger.invoke(ctx.id(), OperationKind::InsertLeft);
            self.buffer.insert_left(ctx, item);
            self.logger.response(ctx.id(), OperationKind::InsertLeft, true, None);
        } else {
            self.logger.invoke(ctx.id(), OperationKind::InsertRight);
            self.buffer.insert_right(ctx, item);
            self.logger.response(ctx.id(), OperationKind::InsertRight, true, None);
        }
        true
    }

    fn get(&self, ctx: &ThreadContext, out: &mut T) -> bool {
        loop {
            let left_side = self.random_side();
            let kind = if left_side { OperationKind::RemoveLeft } else { OperationKind::RemoveRight };
            self.logger.invoke(ctx.id(), kind);
            let invocation = self.buffer.oracle().read_time();
            let outcome = if left_side {
                self.buffer.try_remove_left(ctx, invocation)
            } else {
                self.buffer.try_remove_right(ctx, invocation)
            };
            match outcome {
                RemoveOutcome::Claimed(v) => {
                    *out = v;
                    self.logger.response(ctx.id(), kind, true, None);
                    return true;
                }
                RemoveOutcome::Retry => continue,
                RemoveOutcome::Empty => {
                    self.logger.response(ctx.id(), kind, false, None);
                    return false;
                }
            }
        }
    }

    fn ds_get_stats(&self) -> Option<String> {
        None
    }
}

/// `TSQueue`: the deque specialized to FIFO order by always inserting
/// on the left and removing from the right, per `ts_queue.h`.
pub struct TsQueuePool<T, O> {
    buffer: TsDequeBuffer<T, O>,
    logger: Box<dyn OperationLogger>,
}

impl<T: Copy + Default + Send, O: IntervalOracle> TsQueuePool<T, O> {
    pub fn new(config: PoolConfig, oracle: O) -> Self {
        Self::with_logger(config, oracle, Box::new(NoopLogger))
    }

    pub fn with_logger(config: PoolConfig, oracle: O, logger: Box<dyn OperationLogger>) -> Self {
        TsQueuePool {
            buffer: TsDequeBuffer::new(config.num_threads, oracle),
            logger,
        }
    }
}

impl<T: Copy + Default + Send, O: IntervalOracle> Pool<T> for TsQueuePool<T, O> {
    fn put(&self, ctx: &ThreadContext, item: T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Put);
        self.buffer.insert_left(ctx, item);
        self.logger.response(ctx.id(), OperationKind::Put, true, None);
        true
    }

    fn get(&self, ctx: &ThreadContext, out: &mut T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Get);
        loop {
            let invocation = self.buffer.oracle().read_time();
            match self.buffer.try_remove_right(ctx, invocation) {
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
