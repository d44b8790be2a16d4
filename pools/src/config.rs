//! Construction-time configuration shared by every pool, replacing
//! the source's `g_num_threads`/`g_delay` globals with plain fields
//! (Design Notes §9: "pass as fields of the constructed pool; no
//! global state").

use crate::error::PoolError;

/// Parameters every TS pool is constructed with.
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    pub num_threads: usize,
    /// Spin-delay (in `hwtime` units) between the two samples of an
    /// interval timestamp.
    pub delay: u64,
}

impl PoolConfig {
    pub fn new(num_threads: usize, delay: u64) -> Result<Self, PoolError> {
        if num_threads == 0 {
            return Err(PoolError::ZeroThreads(num_threads));
        }
        Ok(PoolConfig { num_threads, delay })
    }

    pub(crate) fn check_tid(&self, tid: usize) -> Result<(), PoolError> {
        if tid >= self.num_threads {
            return Err(PoolError::ThreadIdOutOfRange {
                tid,
                num_threads: self.num_threads,
            });
        }
        Ok(())
    }
}

/// Extra parameter for the elimination-backoff stack.
#[derive(Clone, Copy, Debug)]
pub struct EliminationConfig {
    pub pool: PoolConfig,
    pub size_collision: usize,
}

impl EliminationConfig {
    pub fn new(pool: PoolConfig, size_collision: usize) -> Result<Self, PoolError> {
        Ok(EliminationConfig { pool, size_collision })
    }
}
