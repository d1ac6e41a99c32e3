// motion-core/src/controller.rs
// Owning facade over the planner, block pool, runtime and machine state.
//
// The controller is the single owner of everything the planner and executor
// share. Foreground code (G-code layer, main loop callbacks) and the
// executor tick both go through &mut self, so the aliasing rules the
// original firmware enforced by convention are enforced by the borrow
// checker here. For cross-thread use wrap it in a MotionHandle.

use log::debug;

use crate::axis::{Axis, AxisVector};
use crate::block::{MoveType, Payload};
use crate::config::MotionConfig;
use crate::machine::{MachineState, MotionState};
use crate::planner::PlanState;
use crate::pool::BlockPool;
use crate::runtime::RuntimeState;
use crate::status::PlanError;
use crate::stepper::{Kinematics, StepPulser};

pub struct MotionController {
    pub(crate) cfg: MotionConfig,
    pub(crate) pool: BlockPool,
    pub(crate) plan: PlanState,
    pub(crate) run: RuntimeState,
    pub(crate) machine: MachineState,
    pub(crate) pulser: Box<dyn StepPulser + Send>,
    pub(crate) kin: Box<dyn Kinematics + Send>,
    pub(crate) trapezoid_misses: u32,
}

impl MotionController {
    pub fn new(
        cfg: MotionConfig,
        pulser: Box<dyn StepPulser + Send>,
        kin: Box<dyn Kinematics + Send>,
    ) -> Self {
        let pool = BlockPool::new(cfg.pool_size);
        MotionController {
            cfg,
            pool,
            plan: PlanState::default(),
            run: RuntimeState::default(),
            machine: MachineState::new(),
            pulser,
            kin,
            trapezoid_misses: 0,
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.cfg
    }

    /// Replace the configuration. Flushes the planner: precomputed jerk
    /// terms in queued blocks were derived from the old limits and must not
    /// drive a live move.
    pub fn set_config(&mut self, cfg: MotionConfig) {
        let resize = cfg.pool_size != self.cfg.pool_size;
        self.cfg = cfg;
        if resize {
            self.pool = BlockPool::new(self.cfg.pool_size);
        }
        self.plan.clear_jerk_cache();
        self.flush_planner();
    }

    /// True while motion control is busy (queue draining or pulses left).
    /// Poll until false to sync to a stopped machine.
    pub fn is_busy(&self) -> bool {
        self.pulser.is_busy() || self.run.move_state.is_active()
    }

    /// Empty the planning queue and stop motion. Does not touch the move
    /// currently in the runtime: its half-emitted segments complete, the
    /// remainder of the block is lost. Designed to be called during a hold.
    pub fn flush_planner(&mut self) {
        self.pool.reset();
        self.machine.motion = MotionState::Stop;
        debug!("planner flushed");
    }

    // --- queue operations -------------------------------------------------

    /// Queue a timed pause. The pulse engine times the dwell on its own
    /// timer; no axis moves.
    pub fn dwell(&mut self, seconds: f64) -> Result<(), PlanError> {
        let idx = self
            .acquire_write_buffer()
            .ok_or(PlanError::BufferFullFatal)?;
        self.pool.block_mut(idx).payload = Payload::Dwell { seconds };
        self.pool.commit_write(MoveType::Dwell);
        self.pulser.request_exec_move();
        Ok(())
    }

    /// Queue a synchronous command (M-code or similar) to execute in queue
    /// order. Buffer availability is the caller's responsibility, checked
    /// upstream; a full queue drops the command without error.
    pub fn queue_command(&mut self, exec: crate::block::CommandExec, int_val: u8, dbl_val: f64) {
        let Some(idx) = self.acquire_write_buffer() else {
            debug!("queue_command dropped: no write buffer");
            return;
        };
        self.pool.block_mut(idx).payload = Payload::Command {
            exec,
            int_val,
            dbl_val,
        };
        self.pool.commit_write(MoveType::Command);
        self.pulser.request_exec_move();
    }

    /// Get a cleared write buffer and stamp it with the next line index.
    pub(crate) fn acquire_write_buffer(&mut self) -> Option<usize> {
        let idx = self.pool.acquire_write()?;
        self.plan.lineindex += 1;
        self.pool.block_mut(idx).lineindex = self.plan.lineindex;
        Some(idx)
    }

    /// Release the run buffer, promote the next block, and close out the
    /// cycle if the queue drained.
    pub(crate) fn free_run_buffer(&mut self) {
        let queue_empty = self.pool.free_run();
        if queue_empty {
            self.machine.cycle_end();
        }
        self.machine.queue_report_requested = true;
    }

    // --- position and provenance surgery ---------------------------------

    /// Set the planning position (e.g. after a G92 offset change). Does not
    /// move the machine.
    pub fn set_plan_position(&mut self, position: AxisVector) {
        self.plan.position = position;
    }

    pub fn get_plan_position(&self) -> AxisVector {
        self.plan.position
    }

    /// Set both the planning and runtime positions.
    pub fn set_axes_position(&mut self, position: AxisVector) {
        self.plan.position = position;
        self.run.position = position;
    }

    /// Single-axis variant of set_axes_position.
    pub fn set_axis_position(&mut self, axis: Axis, position: f64) {
        self.plan.position[axis.index()] = position;
        self.run.position[axis.index()] = position;
    }

    pub fn set_plan_lineindex(&mut self, lineindex: u32) {
        self.plan.lineindex = lineindex;
        self.run.lineindex = lineindex;
    }

    /// G-code line number stamped on subsequently queued moves. Zero means
    /// unnumbered; reports fall back to the line index.
    pub fn set_model_linenum(&mut self, linenum: u32) {
        self.plan.model_linenum = linenum;
    }

    // --- runtime snapshots ------------------------------------------------
    // Scalar reads for the reporting layer. The runtime advances position as
    // segments are prepped, so these lead the physical tool slightly.

    pub fn get_runtime_machine_position(&self, axis: Axis) -> f64 {
        self.run.position[axis.index()]
    }

    pub fn get_runtime_work_position(&self, axis: Axis) -> f64 {
        self.run.position[axis.index()] - self.run.work_offset[axis.index()]
    }

    pub fn get_runtime_velocity(&self) -> f64 {
        self.run.segment_velocity
    }

    pub fn get_runtime_linenum(&self) -> u32 {
        self.run.linenum
    }

    pub fn get_runtime_lineindex(&self) -> u32 {
        self.run.lineindex
    }

    /// Zero the reported velocity after a stop, so status reads do not show
    /// the last segment's speed forever.
    pub fn zero_segment_velocity(&mut self) {
        self.run.segment_velocity = 0.0;
    }

    pub fn get_planner_buffers_available(&self) -> u8 {
        self.pool.available().min(u8::MAX as usize) as u8
    }

    // --- machine state ----------------------------------------------------

    pub fn machine(&self) -> &MachineState {
        &self.machine
    }

    pub fn request_feedhold(&mut self) {
        self.machine.request_feedhold();
    }

    pub fn request_cycle_start(&mut self) {
        self.machine.request_cycle_start();
    }

    pub fn take_status_report_request(&mut self) -> bool {
        self.machine.take_status_report_request()
    }

    pub fn take_queue_report_request(&mut self) -> bool {
        self.machine.take_queue_report_request()
    }

    /// Count of trapezoid fits that hit the iteration cap without settling.
    /// Motion proceeds on the last computed value; this is telemetry.
    pub fn trapezoid_convergence_misses(&self) -> u32 {
        self.trapezoid_misses
    }
}
