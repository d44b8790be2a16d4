//! Error types for the ambient, recoverable edges of the library.
//!
//! Per the design, structural failures inside the lock-free algorithms
//! (a CAS the algorithm guarantees cannot fail, list corruption) are
//! programming bugs, not recoverable errors: they `panic!` with a
//! diagnostic rather than flowing through `Result`. `PoolError` exists
//! for the one genuinely recoverable boundary this crate has: building
//! a pool from caller-supplied configuration.

use thiserror::Error;

/// Errors raised while constructing a pool or oracle from configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("num_threads must be at least 1, got {0}")]
    ZeroThreads(usize),
    #[error("thread id {tid} out of range for a pool constructed with {num_threads} threads")]
    ThreadIdOutOfRange { tid: usize, num_threads: usize },
}
