// motion-core/src/status.rs
// Status codes shared by the planner and the runtime executor.

/// Errors returned by the queueing surface (aline, dwell, queue_command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    /// The requested move has no usable length or time.
    ZeroLengthMove,
    /// No write buffer was available. The caller is expected to check
    /// availability before queueing, so hitting this is a contract violation.
    BufferFullFatal,
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::ZeroLengthMove => write!(f, "zero length move"),
            PlanError::BufferFullFatal => write!(f, "planner buffer unexpectedly full"),
        }
    }
}

impl std::error::Error for PlanError {}

/// Returns from exec_move() and its continuations.
///
/// Eagain is not an error: it means the current block has more segments to
/// run and the executor should be invoked again. Ok means the block finished
/// and its buffer was freed. Noop means there was nothing to run (or the
/// machine is holding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Ok,
    Eagain,
    Noop,
    /// A section computed to less than the minimum segment time; the block
    /// is abandoned without advancing position.
    BlockSkipped,
    /// A running block had no dispatchable move type.
    InternalError,
}

impl ExecStatus {
    /// True when the executor made forward progress or cleanly finished.
    pub fn is_ok(self) -> bool {
        matches!(self, ExecStatus::Ok | ExecStatus::Eagain | ExecStatus::Noop)
    }
}

impl std::fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecStatus::Ok => write!(f, "ok"),
            ExecStatus::Eagain => write!(f, "again"),
            ExecStatus::Noop => write!(f, "noop"),
            ExecStatus::BlockSkipped => write!(f, "block skipped"),
            ExecStatus::InternalError => write!(f, "internal error"),
        }
    }
}
