//! Optional operation logger (§6.3). Off the hot path by default: a
//! `NoopLogger` compiles to nothing, and a `tracing`-backed logger is
//! available for diagnosing linearization issues during development.

/// What kind of operation is being logged, for `invoke`/`response`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Put,
    Get,
    InsertLeft,
    InsertRight,
    RemoveLeft,
    RemoveRight,
}

/// Per spec.md §6.3: `invoke(kind)`, `response(ok, value)`,
/// `linearization()`, called around every pool operation.
pub trait OperationLogger: Send + Sync {
    fn invoke(&self, tid: usize, kind: OperationKind);
    fn response(&self, tid: usize, kind: OperationKind, ok: bool, value: Option<u64>);
    /// Marks the instant the operation's effect becomes externally
    /// visible (the CAS that actually wins), distinct from `response`
    /// which marks the call returning to the caller.
    fn linearization(&self, tid: usize, kind: OperationKind);
}

/// Default logger: every call is a no-op, optimized away entirely.
pub struct NoopLogger;

impl OperationLogger for NoopLogger {
    #[inline]
    fn invoke(&self, _tid: usize, _kind: OperationKind) {}
    #[inline]
    fn response(&self, _tid: usize, _kind: OperationKind, _ok: bool, _value: Option<u64>) {}
    #[inline]
    fn linearization(&self, _tid: usize, _kind: OperationKind) {}
}

/// Routes operation events through `tracing` at `trace` level, so a
/// benchmark run can opt in with `RUST_LOG=pools=trace` without any
/// code changes.
pub struct TracingLogger;

impl OperationLogger for TracingLogger {
    fn invoke(&self, tid: usize, kind: OperationKind) {
        tracing::trace!(tid, ?kind, "invoke");
    }

    fn response(&self, tid: usize, kind: OperationKind, ok: bool, value: Option<u64>) {
        tracing::trace!(tid, ?kind, ok, value, "response");
    }

    fn linearization(&self, tid: usize, kind: OperationKind) {
        tracing::trace!(tid, ?kind, "linearization");
    }
}
