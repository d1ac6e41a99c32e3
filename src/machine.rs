// motion-core/src/machine.rs
// Motion, cycle, and feedhold state shared by the planner and executor.

/// Aggregate motion state of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    #[default]
    Stop,
    Run,
    Hold,
}

/// A cycle spans from the first queued move until the queue drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Off,
    Started,
}

/// Feedhold sub-state machine.
///
/// Off -> Sync on a hold request while motion is running. The executor
/// finishes its current segment and moves Sync -> Plan; the foreground
/// replan (plan_hold_callback) moves Plan -> Decel; the executor reaching
/// zero velocity moves Decel -> Hold; a cycle start releases Hold -> Off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldState {
    #[default]
    Off,
    Sync,
    Plan,
    Decel,
    Hold,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MachineState {
    pub motion: MotionState,
    pub cycle: CycleState,
    pub hold: HoldState,
    /// Latched by an asynchronous cycle-start request (e.g. `~`); consumed
    /// by end_hold_callback.
    pub cycle_start_flag: bool,
    /// Report-request latches for the layer above to poll and clear. The
    /// reporting channels themselves live outside this crate.
    pub status_report_requested: bool,
    pub queue_report_requested: bool,
}

impl MachineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a machining cycle (first move after idle).
    pub(crate) fn cycle_start(&mut self) {
        self.cycle = CycleState::Started;
    }

    /// End the cycle when the queue drains.
    pub(crate) fn cycle_end(&mut self) {
        self.cycle = CycleState::Off;
        self.motion = MotionState::Stop;
    }

    /// Operator hold request (e.g. `!`). Only meaningful while moving.
    pub fn request_feedhold(&mut self) {
        if self.hold == HoldState::Off && self.motion == MotionState::Run {
            self.hold = HoldState::Sync;
            self.motion = MotionState::Hold;
        }
    }

    /// Operator cycle-start request (e.g. `~`). Latched; takes effect at
    /// the next end_hold_callback tick.
    pub fn request_cycle_start(&mut self) {
        self.cycle_start_flag = true;
    }

    /// Read and clear the status-report latch.
    pub fn take_status_report_request(&mut self) -> bool {
        std::mem::take(&mut self.status_report_requested)
    }

    /// Read and clear the queue-report latch.
    pub fn take_queue_report_request(&mut self) -> bool {
        std::mem::take(&mut self.queue_report_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedhold_only_from_run() {
        let mut m = MachineState::new();
        m.request_feedhold();
        assert_eq!(m.hold, HoldState::Off);

        m.motion = MotionState::Run;
        m.request_feedhold();
        assert_eq!(m.hold, HoldState::Sync);
        assert_eq!(m.motion, MotionState::Hold);

        // A second request mid-hold is ignored.
        m.request_feedhold();
        assert_eq!(m.hold, HoldState::Sync);
    }

    #[test]
    fn test_report_latches_clear_on_take() {
        let mut m = MachineState::new();
        m.status_report_requested = true;
        assert!(m.take_status_report_request());
        assert!(!m.take_status_report_request());
    }
}
