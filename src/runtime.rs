// motion-core/src/runtime.rs
// The segment executor.
//
// Runs from the low-priority interrupt whenever the step pulser wants the
// next segment. Every invocation of exec_move() preps exactly one segment
// and returns: Eagain while the block has more segments, Ok when the block
// finished (its buffer is freed), Noop when there is nothing to run. The
// interrupt sequencing relies on that contract being exact.
//
// An aline executes as head -> body -> tail, each section carved into
// fixed-time segments. The head and tail are S-curves built from two
// quadratic halves (concave then convex, meeting at the midpoint velocity),
// evaluated by forward differences: two adds per segment, no multiplies.
//
//   A = T0 - 2*T1 + T2, with T1 = T0 (concave) or T1 = T2 (convex)
//   h = 1 / segments
//   forward_diff_1 = A*h^2, forward_diff_2 = 2*A*h^2
//   per segment: velocity += fd1; fd1 += fd2
//
// The second half of the S starts where the first ended and only the sign
// of forward_diff_2 changes.
//
// Once a block's fields are copied into the runtime singleton the block
// contents no longer affect execution; the feedhold replan exploits that by
// rewriting the runtime tail directly.

use crate::axis::{usec, AxisVector, AXES, EPSILON};
use crate::block::{MoveState, MoveType, Payload};
use crate::controller::MotionController;
use crate::machine::{CycleState, HoldState, MotionState};
use crate::status::ExecStatus;

/// Executor-owned singleton. Written only from exec_move() and the feedhold
/// replan; the foreground reads scalars through controller accessors.
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    pub linenum: u32,
    pub lineindex: u32,
    pub move_state: MoveState,
    pub section_state: MoveState,

    /// Final target of the block, used to cancel accumulated rounding on
    /// the last segment.
    pub endpoint: AxisVector,
    pub position: AxisVector,
    pub target: AxisVector,
    pub unit: AxisVector,
    pub work_offset: AxisVector,

    pub head_length: f64,
    pub body_length: f64,
    pub tail_length: f64,
    pub entry_velocity: f64,
    pub cruise_velocity: f64,
    pub exit_velocity: f64,

    pub move_time: f64,
    pub midpoint_velocity: f64,
    pub jerk: f64,

    /// Segment count per half-section (head/tail) or per section (body).
    pub segments: f64,
    pub segment_count: u32,
    pub segment_move_time: f64,
    pub microseconds: f64,
    pub segment_velocity: f64,

    pub forward_diff_1: f64,
    pub forward_diff_2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentProgress {
    More,
    Complete,
}

impl MotionController {
    /// Dequeue and run the head of the queue. Called from the low-priority
    /// interrupt; must prep one and only one segment per call.
    pub fn exec_move(&mut self) -> ExecStatus {
        let Some(r) = self.pool.acquire_run() else {
            return ExecStatus::Noop; // nothing's running
        };

        if self.machine.cycle == CycleState::Off {
            self.machine.cycle_start();
        }
        let move_type = self.pool.block(r).move_type;
        if self.machine.motion == MotionState::Stop && move_type == MoveType::Aline {
            self.machine.motion = MotionState::Run;
        }

        match move_type {
            MoveType::Aline => self.exec_aline(r),
            MoveType::Dwell => self.exec_dwell(r),
            MoveType::Command => self.exec_command(r),
            MoveType::None => ExecStatus::InternalError,
        }
    }

    fn exec_dwell(&mut self, r: usize) -> ExecStatus {
        let Payload::Dwell { seconds } = self.pool.block(r).payload else {
            return ExecStatus::InternalError;
        };
        self.pulser.prep_dwell(seconds * 1_000_000.0);
        self.free_run_buffer();
        ExecStatus::Ok
    }

    fn exec_command(&mut self, r: usize) -> ExecStatus {
        let Payload::Command {
            exec,
            int_val,
            dbl_val,
        } = self.pool.block(r).payload
        else {
            return ExecStatus::InternalError;
        };
        exec(int_val, dbl_val);
        // A null prep keeps the loader fed while nothing moves.
        self.pulser.prep_null();
        self.free_run_buffer();
        ExecStatus::Ok
    }

    fn exec_aline(&mut self, bf_idx: usize) -> ExecStatus {
        if self.pool.block(bf_idx).move_state == MoveState::Off {
            return ExecStatus::Noop;
        }

        if self.run.move_state == MoveState::Off {
            if self.machine.hold == HoldState::Hold {
                return ExecStatus::Noop; // stops here while holding
            }

            // Latch the block: from here on the planner leaves it alone.
            self.pool.block_mut(bf_idx).replannable = false;

            if self.pool.block(bf_idx).length < EPSILON {
                self.run.move_state = MoveState::Off;
                self.run.section_state = MoveState::Off;
                // Prevent over-planning the next block against a move that
                // will never run.
                let nx = self.pool.next_of(bf_idx);
                self.pool.block_mut(nx).replannable = false;
                self.pulser.prep_null();
                self.free_run_buffer();
                return ExecStatus::Noop;
            }

            let bf = self.pool.block(bf_idx).clone();
            self.pool.block_mut(bf_idx).move_state = MoveState::Run;

            self.run.move_state = MoveState::Head;
            self.run.section_state = MoveState::New;
            self.run.linenum = bf.linenum;
            self.run.lineindex = bf.lineindex;
            self.run.jerk = bf.jerk;
            self.run.head_length = bf.head_length;
            self.run.body_length = bf.body_length;
            self.run.tail_length = bf.tail_length;
            self.run.entry_velocity = bf.entry_velocity;
            self.run.cruise_velocity = bf.cruise_velocity;
            self.run.exit_velocity = bf.exit_velocity;
            self.run.unit = bf.unit;
            self.run.endpoint = bf.target;
            self.run.work_offset = bf.work_offset;
        }
        // From this point the bf buffer contents do not affect execution.

        let status = match self.run.move_state {
            MoveState::Head => self.exec_aline_head(),
            MoveState::Body => self.exec_aline_body(),
            MoveState::Tail => self.exec_aline_tail(),
            _ => ExecStatus::Ok, // Skip and stray states end the move
        };

        // Feedhold post-processing: the executor has finished a segment, so
        // the foreground may now replan (bounded latency of one segment).
        if self.machine.hold == HoldState::Sync {
            self.machine.hold = HoldState::Plan;
        }
        // The hold takes effect when a decel move runs out at zero. A hold
        // whose braking spans several blocks ends partial decels at nonzero
        // exit velocities; those keep running until the terminal block.
        if self.machine.hold == HoldState::Decel
            && status == ExecStatus::Ok
            && self.run.exit_velocity < EPSILON
        {
            self.machine.hold = HoldState::Hold;
            self.machine.status_report_requested = true;
        }

        // Three ways out:
        //   Eagain            - the runtime has more segments to run
        //   other + state Run - block and runtime are both done; free it
        //   other + state New - runtime done but the buffer was reused by a
        //                       feedhold replan and must run again
        if status != ExecStatus::Eagain {
            self.run.move_state = MoveState::Off;
            self.run.section_state = MoveState::Off;
            let nx = self.pool.next_of(bf_idx);
            self.pool.block_mut(nx).replannable = false;
            if self.pool.block(bf_idx).move_state == MoveState::Run {
                self.free_run_buffer();
            }
        }
        status
    }

    /// Seed the forward-difference registers for one quadratic half.
    /// t1 always equals t0, so A collapses to t2 - t0.
    fn init_forward_diffs(&mut self, t0: f64, t2: f64) {
        let h_squared = (1.0 / self.run.segments) * (1.0 / self.run.segments);
        let ah_squared = (t2 - t0) * h_squared;
        self.run.forward_diff_1 = ah_squared;
        self.run.forward_diff_2 = 2.0 * ah_squared;
        self.run.segment_velocity = t0;
    }

    fn exec_aline_head(&mut self) -> ExecStatus {
        if self.run.section_state == MoveState::New {
            if self.run.head_length < EPSILON {
                self.run.move_state = MoveState::Body;
                return self.exec_aline_body(); // skip ahead to the body
            }
            self.run.midpoint_velocity =
                (self.run.entry_velocity + self.run.cruise_velocity) / 2.0;
            self.run.move_time = self.run.head_length / self.run.midpoint_velocity;
            // segment count for *each half* of the S
            self.run.segments =
                (usec(self.run.move_time) / (2.0 * self.cfg.estd_segment_usec)).ceil();
            self.run.segment_move_time = self.run.move_time / (2.0 * self.run.segments);
            self.run.segment_count = self.run.segments as u32;
            self.run.microseconds = usec(self.run.segment_move_time);
            if self.run.microseconds < self.cfg.min_segment_usec {
                return ExecStatus::BlockSkipped; // exit without advancing position
            }
            let (t0, t2) = (self.run.entry_velocity, self.run.midpoint_velocity);
            self.init_forward_diffs(t0, t2);
            self.run.section_state = MoveState::Run;
        }
        if self.run.section_state == MoveState::Run {
            // concave part of the accel curve
            self.run.segment_velocity += self.run.forward_diff_1;
            if self.exec_aline_segment(false) == SegmentProgress::Complete {
                // Second half starts where the first ended; only the sign
                // of forward_diff_2 changes.
                self.run.segment_count = self.run.segments as u32;
                self.run.section_state = MoveState::Run2;
                self.run.forward_diff_2 = -self.run.forward_diff_2;
            } else {
                self.run.forward_diff_1 += self.run.forward_diff_2;
            }
            return ExecStatus::Eagain;
        }
        if self.run.section_state == MoveState::Run2 {
            // convex part of the accel curve
            self.run.segment_velocity += self.run.forward_diff_1;
            self.run.forward_diff_1 += self.run.forward_diff_2;
            if self.exec_aline_segment(false) == SegmentProgress::Complete {
                if self.run.body_length < EPSILON && self.run.tail_length < EPSILON {
                    return ExecStatus::Ok; // end the move
                }
                self.run.move_state = MoveState::Body;
                self.run.section_state = MoveState::New;
            }
        }
        ExecStatus::Eagain
    }

    /// The body is carved into segments even though it is a straight run at
    /// constant velocity, so a feedhold can land mid-line with at most one
    /// segment of latency.
    fn exec_aline_body(&mut self) -> ExecStatus {
        if self.run.section_state == MoveState::New {
            if self.run.body_length < EPSILON {
                self.run.move_state = MoveState::Tail;
                return self.exec_aline_tail(); // skip ahead to the tail
            }
            self.run.move_time = self.run.body_length / self.run.cruise_velocity;
            self.run.segments = (usec(self.run.move_time) / self.cfg.estd_segment_usec).ceil();
            self.run.segment_move_time = self.run.move_time / self.run.segments;
            self.run.segment_velocity = self.run.cruise_velocity;
            self.run.segment_count = self.run.segments as u32;
            self.run.microseconds = usec(self.run.segment_move_time);
            if self.run.microseconds < self.cfg.min_segment_usec {
                return ExecStatus::BlockSkipped;
            }
            self.run.section_state = MoveState::Run;
        }
        if self.run.section_state == MoveState::Run {
            if self.exec_aline_segment(false) == SegmentProgress::Complete {
                if self.run.tail_length < EPSILON {
                    return ExecStatus::Ok;
                }
                self.run.move_state = MoveState::Tail;
                self.run.section_state = MoveState::New;
            }
        }
        ExecStatus::Eagain
    }

    fn exec_aline_tail(&mut self) -> ExecStatus {
        if self.run.section_state == MoveState::New {
            if self.run.tail_length < EPSILON {
                return ExecStatus::Ok; // end the move
            }
            self.run.midpoint_velocity =
                (self.run.cruise_velocity + self.run.exit_velocity) / 2.0;
            self.run.move_time = self.run.tail_length / self.run.midpoint_velocity;
            self.run.segments =
                (usec(self.run.move_time) / (2.0 * self.cfg.estd_segment_usec)).ceil();
            self.run.segment_move_time = self.run.move_time / (2.0 * self.run.segments);
            self.run.segment_count = self.run.segments as u32;
            self.run.microseconds = usec(self.run.segment_move_time);
            if self.run.microseconds < self.cfg.min_segment_usec {
                return ExecStatus::BlockSkipped;
            }
            let (t0, t2) = (self.run.cruise_velocity, self.run.midpoint_velocity);
            self.init_forward_diffs(t0, t2);
            self.run.section_state = MoveState::Run;
        }
        if self.run.section_state == MoveState::Run {
            // convex part of the decel curve
            self.run.segment_velocity += self.run.forward_diff_1;
            if self.exec_aline_segment(false) == SegmentProgress::Complete {
                self.run.segment_count = self.run.segments as u32;
                self.run.section_state = MoveState::Run2;
                self.run.forward_diff_2 = -self.run.forward_diff_2;
            } else {
                self.run.forward_diff_1 += self.run.forward_diff_2;
            }
            return ExecStatus::Eagain;
        }
        if self.run.section_state == MoveState::Run2 {
            // concave part of the decel curve
            self.run.segment_velocity += self.run.forward_diff_1;
            self.run.forward_diff_1 += self.run.forward_diff_2;
            if self.exec_aline_segment(true) == SegmentProgress::Complete {
                return ExecStatus::Ok; // end the move
            }
        }
        ExecStatus::Eagain
    }

    /// Prep one segment: project the segment velocity along the unit vector
    /// into an axis target, transform to motor steps, and hand the batch to
    /// the pulser. Position advances only if the pulser accepted it.
    fn exec_aline_segment(&mut self, correction: bool) -> SegmentProgress {
        // On the final segment of a normally running move, snap to the
        // block endpoint to cancel accumulated rounding. Never when easing
        // into a hold: the endpoint no longer applies.
        if correction
            && self.run.segment_count == 1
            && self.machine.motion == MotionState::Run
            && self.machine.cycle == CycleState::Started
        {
            self.run.target = self.run.endpoint;
        } else {
            let intermediate = self.run.segment_velocity * self.run.segment_move_time;
            for i in 0..AXES {
                self.run.target[i] = self.run.position[i] + self.run.unit[i] * intermediate;
            }
        }
        let mut travel = [0.0; AXES];
        for i in 0..AXES {
            travel[i] = self.run.target[i] - self.run.position[i];
        }
        let steps = self.kin.travel_to_steps(&travel);
        if self
            .pulser
            .prep_line(steps, self.run.microseconds)
            .is_ok()
        {
            self.run.position = self.run.target;
        }
        self.run.segment_count -= 1;
        if self.run.segment_count == 0 {
            SegmentProgress::Complete
        } else {
            SegmentProgress::More
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::config::MotionConfig;
    use crate::stepper::{CartesianKinematics, SharedRecordingPulser};
    use float_cmp::assert_approx_eq;

    // The controller owns its pulser; tests keep a clone of the shared
    // recorder to inspect what was emitted.
    fn controller() -> (MotionController, SharedRecordingPulser) {
        let recorder = SharedRecordingPulser::new();
        let mc = MotionController::new(
            MotionConfig::default(),
            Box::new(recorder.clone()),
            Box::new(CartesianKinematics::default()),
        );
        (mc, recorder)
    }

    fn drain(mc: &mut MotionController, limit: usize) -> usize {
        let mut calls = 0;
        for _ in 0..limit {
            match mc.exec_move() {
                ExecStatus::Noop => break,
                s => assert!(s.is_ok() || s == ExecStatus::BlockSkipped, "bad status {s}"),
            }
            calls += 1;
        }
        calls
    }

    #[test]
    fn test_exec_with_empty_queue_is_noop() {
        let (mut mc, _rec) = controller();
        assert_eq!(mc.exec_move(), ExecStatus::Noop);
    }

    #[test]
    fn test_single_move_reconstructs_endpoint() {
        let (mut mc, rec) = controller();
        let mut target = [0.0; AXES];
        target[0] = 10.0;
        mc.aline(target, 0.1, [0.0; AXES], 0.0).unwrap();

        let calls = drain(&mut mc, 10_000);
        assert!(calls > 0);
        assert_approx_eq!(
            f64,
            mc.get_runtime_machine_position(Axis::X),
            10.0,
            epsilon = 1e-6
        );
        // Summed step batches reconstruct the endpoint too (identity
        // kinematics: steps == mm).
        let total = rec.lock().total_steps();
        assert_approx_eq!(f64, total[0], 10.0, epsilon = 1e-6);
        assert_eq!(mc.machine().cycle, CycleState::Off);
        assert_eq!(mc.machine().motion, MotionState::Stop);
        assert_eq!(mc.get_planner_buffers_available(), mc.config().pool_size as u8);
    }

    #[test]
    fn test_diagonal_move_tracks_both_axes() {
        let (mut mc, rec) = controller();
        let mut target = [0.0; AXES];
        target[0] = 3.0;
        target[1] = 4.0;
        mc.aline(target, 0.05, [0.0; AXES], 0.0).unwrap();
        drain(&mut mc, 10_000);
        assert_approx_eq!(f64, mc.get_runtime_machine_position(Axis::X), 3.0, epsilon = 1e-6);
        assert_approx_eq!(f64, mc.get_runtime_machine_position(Axis::Y), 4.0, epsilon = 1e-6);
        let total = rec.lock().total_steps();
        assert_approx_eq!(f64, total[0], 3.0, epsilon = 1e-6);
        assert_approx_eq!(f64, total[1], 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_velocity_profile_peaks_then_returns_to_zero() {
        let (mut mc, _rec) = controller();
        let mut target = [0.0; AXES];
        target[0] = 10.0;
        mc.aline(target, 0.1, [0.0; AXES], 0.0).unwrap();

        let mut peak: f64 = 0.0;
        let mut last = 0.0;
        for _ in 0..10_000 {
            if mc.exec_move() == ExecStatus::Noop {
                break;
            }
            last = mc.get_runtime_velocity();
            peak = peak.max(last);
        }
        // Cruise is 100 mm/min; the last segment of the tail ends at the
        // exit velocity, which planned to zero.
        assert!(peak > 90.0, "peak {peak}");
        assert!(last < 10.0, "final segment velocity {last}");

        mc.zero_segment_velocity();
        assert_approx_eq!(f64, mc.get_runtime_velocity(), 0.0);
    }

    #[test]
    fn test_work_offset_propagates_to_runtime() {
        let (mut mc, _rec) = controller();
        let mut target = [0.0; AXES];
        target[0] = 5.0;
        let mut offset = [0.0; AXES];
        offset[0] = 2.0;
        mc.aline(target, 0.05, offset, 0.0).unwrap();
        // First exec initializes the runtime from the block.
        mc.exec_move();
        assert_approx_eq!(
            f64,
            mc.get_runtime_work_position(Axis::X),
            mc.get_runtime_machine_position(Axis::X) - 2.0
        );
        drain(&mut mc, 10_000);
    }

    #[test]
    fn test_dwell_and_command_blocks_execute_in_order() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COMMANDS_RUN: AtomicU32 = AtomicU32::new(0);
        fn bump(i: u8, _d: f64) {
            COMMANDS_RUN.fetch_add(u32::from(i), Ordering::SeqCst);
        }

        let (mut mc, rec) = controller();
        let mut target = [0.0; AXES];
        target[0] = 5.0;
        mc.aline(target, 0.05, [0.0; AXES], 0.0).unwrap();
        mc.dwell(0.5).unwrap();
        mc.queue_command(bump, 3, 0.0);
        drain(&mut mc, 10_000);

        assert_eq!(COMMANDS_RUN.load(Ordering::SeqCst), 3);
        assert_approx_eq!(f64, mc.get_runtime_machine_position(Axis::X), 5.0, epsilon = 1e-6);
        // The dwell reached the pulser in microseconds and moved no axis.
        let rec = rec.lock();
        assert_eq!(rec.dwells.len(), 1);
        assert_approx_eq!(f64, rec.dwells[0], 500_000.0);
        assert_eq!(rec.nulls, 1);
        let total = rec.total_steps();
        assert_approx_eq!(f64, total[0], 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_segment_times_respect_minimum() {
        let (mut mc, rec) = controller();
        let mut target = [0.0; AXES];
        target[0] = 10.0;
        mc.aline(target, 0.1, [0.0; AXES], 0.0).unwrap();
        drain(&mut mc, 10_000);
        for &(_, us) in rec.lock().lines.iter() {
            assert!(us >= mc.config().min_segment_usec, "segment time {us}");
        }
    }

    #[test]
    fn test_linenum_visible_during_execution() {
        let (mut mc, _rec) = controller();
        mc.set_model_linenum(7);
        let mut target = [0.0; AXES];
        target[0] = 5.0;
        mc.aline(target, 0.05, [0.0; AXES], 0.0).unwrap();
        mc.exec_move();
        assert_eq!(mc.get_runtime_linenum(), 7);
        assert_eq!(mc.get_runtime_lineindex(), 1);
        drain(&mut mc, 10_000);
    }
}
