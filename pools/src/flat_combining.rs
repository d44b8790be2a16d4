//! Flat-combining queue (§4.5), grounded in `flatcombining_queue.h`: a
//! single plain `SingleList<T>` protected by a CAS-acquired
//! `global_lock`, with per-thread `Operation` slots so a winning thread
//! (the combiner) can apply every pending request in one pass instead
//! of each thread fighting for the lock individually.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::PoolConfig;
use crate::logging::{NoopLogger, OperationKind, OperationLogger};
use crate::primitives::ThreadContext;
use crate::Pool;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Opcode {
    Done,
    Enqueue,
    Dequeue,
}

fn encode_opcode(op: Opcode) -> u64 {
    match op {
        Opcode::Done => 0,
        Opcode::Enqueue => 1,
        Opcode::Dequeue => 2,
    }
}

fn decode_opcode(v: u64) -> Opcode {
    match v {
        1 => Opcode::Enqueue,
        2 => Opcode::Dequeue,
        _ => Opcode::Done,
    }
}

/// A published request slot. `data` doubles as the enqueue payload
/// going in and the dequeue result coming back out; only the combiner
/// (holding `global_lock`) ever touches it, and only while `opcode` is
/// not `Done`, so there is no concurrent access to the cell.
struct Operation<T> {
    opcode: AtomicU64,
    data: std::cell::UnsafeCell<Option<T>>,
    /// Set by the combiner alongside writing back `Done`, so a thread
    /// whose CAS lost the combiner race can tell success from "still
    /// empty" without re-reading `data` before the combiner is done.
    ok: AtomicBool,
}

impl<T> Operation<T> {
    fn new() -> Self {
        Operation {
            opcode: AtomicU64::new(encode_opcode(Opcode::Done)),
            data: std::cell::UnsafeCell::new(None),
            ok: AtomicBool::new(false),
        }
    }
}

unsafe impl<T: Send> Send for Operation<T> {}
unsafe impl<T: Send> Sync for Operation<T> {}

struct Node<T> {
    data: T,
    next: Option<Box<Node<T>>>,
}

/// Plain singly linked FIFO list, touched only by the combiner.
struct SingleList<T> {
    head: Option<Box<Node<T>>>,
    tail: *mut Node<T>,
}

impl<T> SingleList<T> {
    fn new() -> Self {
        SingleList {
            head: None,
            tail: std::ptr::null_mut(),
        }
    }

    fn push_back(&mut self, data: T) {
        let mut node = Box::new(Node { data, next: None });
        let node_ptr: *mut Node<T> = &mut *node;
        if self.tail.is_null() {
            self.head = Some(node);
        } else {
            unsafe {
                (*self.tail).next = Some(node);
            }
        }
        self.tail = node_ptr;
    }

    fn pop_front(&mut self) -> Option<T> {
        let mut front = self.head.take()?;
        self.head = front.next.take();
        if self.head.is_none() {
            self.tail = std::ptr::null_mut();
        }
        Some(front.data)
    }
}

/// Flat-combining queue: FIFO order, linearizable (a single combiner
/// applies every pending op in thread order each time it runs).
pub struct FlatCombiningQueue<T> {
    list: std::cell::UnsafeCell<SingleList<T>>,
    global_lock: AtomicBool,
    operations: Vec<Operation<T>>,
}

unsafe impl<T: Send> Send for FlatCombiningQueue<T> {}
unsafe impl<T: Send> Sync for FlatCombiningQueue<T> {}

impl<T> FlatCombiningQueue<T> {
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0);
        FlatCombiningQueue {
            list: std::cell::UnsafeCell::new(SingleList::new()),
            global_lock: AtomicBool::new(false),
            operations: (0..num_threads).map(|_| Operation::new()).collect(),
        }
    }

    /// Walk every slot once, applying each pending op against the list
    /// and writing back `(Done, result)`. Only ever called by the
    /// thread that just won `global_lock`.
    fn scan_combine_apply(&self) {
        let list = unsafe { &mut *self.list.get() };
        for op in &self.operations {
            match decode_opcode(op.opcode.load(Ordering::Acquire)) {
                Opcode::Enqueue => {
                    let value = unsafe { (*op.data.get()).take() }.expect("enqueue op missing payload");
                    list.push_back(value);
                    op.ok.store(true, Ordering::Release);
                    op.opcode.store(encode_opcode(Opcode::Done), Ordering::Release);
                }
                Opcode::Dequeue => {
                    let popped = list.pop_front();
                    let ok = popped.is_some();
                    unsafe {
                        *op.data.get() = popped;
                    }
                    op.ok.store(ok, Ordering::Release);
                    op.opcode.store(encode_opcode(Opcode::Done), Ordering::Release);
                }
                Opcode::Done => {}
            }
        }
    }

    fn submit(&self, ctx: &ThreadContext, opcode: Opcode, payload: Option<T>) -> (bool, Option<T>) {
        let tid = ctx.id();
        let op = &self.operations[tid];
        unsafe {
            *op.data.get() = payload;
        }
        op.opcode.store(encode_opcode(opcode), Ordering::Release);

        loop {
            if self
                .global_lock
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.scan_combine_apply();
                self.global_lock.store(false, Ordering::Release);
                break;
            }
            if decode_opcode(op.opcode.load(Ordering::Acquire)) == Opcode::Done {
                break;
            }
        }

        let ok = op.ok.load(Ordering::Acquire);
        let result = unsafe { (*op.data.get()).take() };
        (ok, result)
    }

    pub fn enqueue(&self, ctx: &ThreadContext, item: T) {
        self.submit(ctx, Opcode::Enqueue, Some(item));
    }

    pub fn dequeue(&self, ctx: &ThreadContext) -> Option<T> {
        let (ok, result) = self.submit(ctx, Opcode::Dequeue, None);
        if ok {
            result
        } else {
            None
        }
    }
}

/// `FlatCombiningQueue` as a `Pool`.
pub struct FlatCombiningQueuePool<T> {
    queue: FlatCombiningQueue<T>,
    logger: Box<dyn OperationLogger>,
}

impl<T> FlatCombiningQueuePool<T> {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_logger(config, Box::new(NoopLogger))
    }

    pub fn with_logger(config: PoolConfig, logger: Box<dyn OperationLogger>) -> Self {
        FlatCombiningQueuePool {
            queue: FlatCombiningQueue::new(config.num_threads),
            logger,
        }
    }
}

impl<T> Pool<T> for FlatCombiningQueuePool<T> {
    fn put(&self, ctx: &ThreadContext, item: T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Put);
        self.queue.enqueue(ctx, item);
        self.logger.linearization(ctx.id(), OperationKind::Put);
        self.logger.response(ctx.id(), OperationKind::Put, true, None);
        true
    }

    fn get(&self, ctx: &ThreadContext, out: &mut T) -> bool {
        self.logger.invoke(ctx.id(), OperationKind::Get);
        match self.queue.dequeue(ctx) {
            Some(v) => {
                *out = v;
                self.logger.linearization(ctx.id(), OperationKind::Get);
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
