// motion-core/src/feedhold.rs
// Feedhold planning and release.
//
// A hold request while moving sets the hold state to Sync. The executor
// finishes its current segment and advances Sync -> Plan; the main loop then
// calls plan_hold_callback() which reshapes the queue into a brake-to-zero
// trajectory and sets Decel. When the executor runs the decel out, the state
// latches at Hold until a cycle-start request releases it through
// end_hold_callback().
//
// The replan works on the runtime buffer (mr) plus its companion block at
// the head of the queue (bp). Normally bp would be freed once mr is loaded;
// the hold re-uses it as the extra slot needed to split a move where the
// deceleration reaches zero: one piece brakes to zero, the other replans up
// from zero. Everything queued behind is marked replannable and replanned
// for the new velocities.

use log::debug;

use crate::axis::{vector_length, EPSILON};
use crate::block::{MoveState, MoveType};
use crate::controller::MotionController;
use crate::machine::{HoldState, MotionState};
use crate::status::ExecStatus;
use crate::trapezoid::{target_length, target_velocity};

impl MotionController {
    /// Main-loop callback: replan the queue for a pending hold. A no-op
    /// unless the hold state machine is in Plan.
    pub fn plan_hold_callback(&mut self) -> ExecStatus {
        if self.machine.hold != HoldState::Plan {
            return ExecStatus::Noop;
        }
        let Some(bp) = self.pool.acquire_run() else {
            return ExecStatus::Noop; // nothing's running
        };

        let mut mr_flag = true; // replan accounts for the runtime's state
        let mr_available_length = vector_length(&self.run.endpoint, &self.run.position);

        // Velocity still to shed. This wants the velocity at the start of
        // the *next* segment, which has not been computed yet; deriving it
        // from the forward-difference state is the standing workaround.
        let braking_velocity = self.next_segment_velocity();
        let (recip_jerk, cbrt_jerk) = {
            let b = self.pool.block(bp);
            (b.recip_jerk, b.cbrt_jerk)
        };
        let mut braking_length = target_length(braking_velocity, 0.0, recip_jerk);

        // Perfect-fit decels (e.g. homing moves already planned to zero)
        // must not fall into case 2: clamp the braking length to what the
        // runtime has left.
        if braking_length > mr_available_length && self.pool.block(bp).exit_velocity < EPSILON {
            braking_length = mr_available_length;
        }

        // Case 1: the deceleration fits inside the runtime's remaining
        // length. Turn mr into a pure tail to zero, and re-use bp as the
        // hold point drawing whatever length remains.
        if braking_length <= mr_available_length {
            debug!("feedhold case 1: braking {braking_length:.4} of {mr_available_length:.4}");
            self.run.exit_velocity = 0.0;
            self.run.tail_length = braking_length;
            self.run.cruise_velocity = braking_velocity;
            self.run.move_state = MoveState::Tail;
            self.run.section_state = MoveState::New;

            {
                let b = self.pool.block_mut(bp);
                b.length = mr_available_length - braking_length;
                b.delta_vmax = target_velocity(0.0, b.length, cbrt_jerk);
                b.entry_vmax = 0.0; // bp is the hold point
                b.move_state = MoveState::New; // tell exec to re-use the buffer
            }

            self.reset_replannable_list();
            if let Some(last) = self.pool.last() {
                self.plan_block_list(last, &mut mr_flag);
            }
            self.machine.hold = HoldState::Decel;
            return ExecStatus::Ok;
        }

        // Case 2: the deceleration does not fit in the runtime. Brake as
        // hard as the remaining length allows, then walk the queue shedding
        // the rest across as many blocks as it takes.
        debug!("feedhold case 2: braking {braking_length:.4} exceeds {mr_available_length:.4}");
        self.run.move_state = MoveState::Tail;
        self.run.section_state = MoveState::New;
        self.run.tail_length = mr_available_length;
        self.run.cruise_velocity = braking_velocity;
        self.run.exit_velocity =
            braking_velocity - target_velocity(0.0, mr_available_length, cbrt_jerk);

        let mut braking_velocity = self.run.exit_velocity;
        self.pool.block_mut(bp).move_state = MoveState::New;
        let mut bp = bp;
        // Bounded by the pool size to avoid wrapping forever.
        for _ in 0..self.pool.len() {
            let nx = self.pool.next_of(bp);
            self.pool.copy_block(bp, nx);
            if self.pool.block(bp).move_type != MoveType::Aline {
                bp = self.pool.next_of(bp); // skip non-move buffers
                continue;
            }
            let (length, recip, cbrt) = {
                let b = self.pool.block(bp);
                (b.length, b.recip_jerk, b.cbrt_jerk)
            };
            self.pool.block_mut(bp).entry_vmax = braking_velocity;
            braking_length = target_length(braking_velocity, 0.0, recip);
            if braking_length > length {
                // decel does not fit in this buffer either
                let exit = braking_velocity - target_velocity(0.0, length, cbrt);
                self.pool.block_mut(bp).exit_vmax = exit;
                braking_velocity = exit;
                bp = self.pool.next_of(bp);
                continue;
            }
            break;
        }

        // The deceleration now fits in bp. Split the pair: bp brakes to
        // zero over braking_length, its twin restarts from zero with the
        // remainder (the two were identical copies, lengths included).
        {
            let b = self.pool.block_mut(bp);
            b.length = braking_length;
            b.exit_vmax = 0.0;
        }
        let accel = self.pool.next_of(bp);
        {
            let cbrt = self.pool.block(accel).cbrt_jerk;
            let b = self.pool.block_mut(accel);
            b.entry_vmax = 0.0;
            b.length -= braking_length;
            b.delta_vmax = target_velocity(0.0, b.length, cbrt);
            b.exit_vmax = b.delta_vmax;
        }

        self.reset_replannable_list();
        if let Some(last) = self.pool.last() {
            self.plan_block_list(last, &mut mr_flag);
        }
        self.machine.hold = HoldState::Decel;
        ExecStatus::Ok
    }

    /// Velocity at the start of the next segment, derived from the forward
    /// difference registers. Bodies run at constant velocity so the current
    /// segment velocity is already right.
    pub(crate) fn next_segment_velocity(&self) -> f64 {
        if self.run.move_state == MoveState::Body {
            return self.run.segment_velocity;
        }
        self.run.segment_velocity + self.run.forward_diff_1
    }

    /// Main-loop callback: release a hold once a cycle-start request has
    /// been latched. Restarts the executor on the next queued block.
    pub fn end_hold_callback(&mut self) -> ExecStatus {
        if self.machine.hold == HoldState::Hold && self.machine.cycle_start_flag {
            self.machine.cycle_start_flag = false;
            self.machine.hold = HoldState::Off;
            if self.pool.acquire_run().is_none() {
                // Nothing left to run; the hold drained the queue.
                self.machine.motion = MotionState::Stop;
                return ExecStatus::Noop;
            }
            self.machine.motion = MotionState::Run;
            self.pulser.request_exec_move();
        }
        ExecStatus::Ok
    }
}
