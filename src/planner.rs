// motion-core/src/planner.rs
// Queueing of acceleration-planned lines and the block-list replan.
//
// aline() stages a jerk-limited linear move into a write buffer, seeds its
// velocity ceilings from the config and the junction with its predecessor,
// then replans the tail of the queue so every block's entry velocity chains
// from its predecessor's exit and no block demands more deceleration than
// the queue behind it can deliver.

use crate::axis::{vector_length, AxisVector, AXES, EPSILON};
use crate::block::{MoveState, MoveType};
use crate::controller::MotionController;
use crate::junction::junction_vmax;
use crate::status::PlanError;
use crate::trapezoid::{calculate_trapezoid, target_velocity};

/// Planner-side singleton: the committed end position of the last queued
/// block, the running line index, and the jerk-term cache.
#[derive(Debug, Clone, Default)]
pub struct PlanState {
    pub lineindex: u32,
    /// G-code line number to stamp on the next queued move (0 = unnumbered).
    pub model_linenum: u32,
    /// Endpoint of the last block handed to the planner. Runtime position
    /// lags this while the queue drains.
    pub position: AxisVector,
    // Jerk terms cached from the previous move. Consecutive blocks usually
    // share a jerk value, and cbrt() is not cheap.
    pub(crate) prev_jerk: f64,
    pub(crate) prev_recip_jerk: f64,
    pub(crate) prev_cbrt_jerk: f64,
}

impl PlanState {
    pub(crate) fn clear_jerk_cache(&mut self) {
        self.prev_jerk = 0.0;
        self.prev_recip_jerk = 0.0;
        self.prev_cbrt_jerk = 0.0;
    }
}

impl MotionController {
    /// Queue a jerk-limited linear move to `target` over `minutes`.
    ///
    /// `work_offset` is carried through to the runtime for work-coordinate
    /// reporting; `min_time` is the floor duration used by rate-override
    /// replanning. A non-Ok return means the planning position did NOT
    /// advance, so too-short lines accumulate until they exceed the minimum
    /// instead of being silently dropped.
    pub fn aline(
        &mut self,
        target: AxisVector,
        minutes: f64,
        work_offset: AxisVector,
        min_time: f64,
    ) -> Result<(), PlanError> {
        if minutes < EPSILON {
            return Err(PlanError::ZeroLengthMove);
        }
        let length = vector_length(&target, &self.plan.position);
        if length < EPSILON {
            return Err(PlanError::ZeroLengthMove);
        }

        let idx = self
            .acquire_write_buffer()
            .ok_or(PlanError::BufferFullFatal)?;

        // Unit vector and the composite jerk for the move. The per-axis
        // deltas are compared against exact zero, not epsilon: an axis the
        // G-code did not move is exactly unchanged.
        let mut unit = [0.0; AXES];
        let mut jerk_squared = 0.0;
        for i in 0..AXES {
            let diff = target[i] - self.plan.position[i];
            if diff != 0.0 {
                unit[i] = diff / length;
                jerk_squared += (unit[i] * self.cfg.axes[i].jerk_max).powi(2);
            }
        }
        let jerk = jerk_squared.sqrt();

        // Reuse the previous block's reciprocal and cube root when the jerk
        // matches to within the configured precision.
        let (recip_jerk, cbrt_jerk) =
            if (jerk - self.plan.prev_jerk).abs() < self.cfg.jerk_match_precision {
                (self.plan.prev_recip_jerk, self.plan.prev_cbrt_jerk)
            } else {
                let recip = 1.0 / jerk;
                let cbrt = jerk.cbrt();
                self.plan.prev_jerk = jerk;
                self.plan.prev_recip_jerk = recip;
                self.plan.prev_cbrt_jerk = cbrt;
                (recip, cbrt)
            };

        let prev_idx = self.pool.prev_of(idx);
        let junction_velocity = junction_vmax(&self.pool.block(prev_idx).unit, &unit, &self.cfg);

        let linenum = if self.plan.model_linenum != 0 {
            self.plan.model_linenum
        } else {
            self.plan.lineindex
        };

        {
            let bf = self.pool.block_mut(idx);
            bf.linenum = linenum;
            bf.time = minutes;
            bf.min_time = min_time;
            bf.length = length;
            bf.target = target;
            bf.work_offset = work_offset;
            bf.unit = unit;
            bf.jerk = jerk;
            bf.recip_jerk = recip_jerk;
            bf.cbrt_jerk = cbrt_jerk;
            bf.replannable = true;

            bf.cruise_vmax = bf.length / bf.time;
            bf.entry_vmax = bf.cruise_vmax.min(junction_velocity);
            bf.delta_vmax = target_velocity(0.0, bf.length, bf.cbrt_jerk);
            bf.exit_vmax = bf.cruise_vmax.min(bf.entry_vmax + bf.delta_vmax);
            bf.braking_velocity = bf.delta_vmax;
        }

        let mut mr_flag = false;
        self.plan_block_list(idx, &mut mr_flag);
        self.plan.position = target;
        self.pool.commit_write(MoveType::Aline);
        self.pulser.request_exec_move();
        Ok(())
    }

    /// Replan every replannable block up to and including `bf_idx`.
    ///
    /// Backward pass: walk from bf's predecessor while blocks are
    /// replannable, accumulating the braking velocity each block could shed
    /// if everything after it planned to zero. Forward pass: from the first
    /// block of that window, chain entry velocities from predecessor exits,
    /// cap exits by what the next block can brake from, and regenerate each
    /// trapezoid. A block whose exit hit one of its ceilings is optimally
    /// planned and drops out of future replans.
    ///
    /// Non-aline blocks ride through with zero length and zero vmax fields,
    /// which plans the queue down to zero and back up around them.
    ///
    /// `mr_flag` forces the first planned block to take its entry ceiling
    /// rather than chaining from a predecessor; the feedhold replan sets it
    /// because the predecessor state then lives in the runtime, not the
    /// queue.
    pub(crate) fn plan_block_list(&mut self, bf_idx: usize, mr_flag: &mut bool) {
        // Backward pass. Ends with bp at the first buffer before the
        // replannable window.
        let mut bp = bf_idx;
        loop {
            bp = self.pool.prev_of(bp);
            if bp == bf_idx {
                break;
            }
            if !self.pool.block(bp).replannable {
                break;
            }
            let nx = self.pool.next_of(bp);
            let (nx_entry_vmax, nx_braking) = {
                let n = self.pool.block(nx);
                (n.entry_vmax, n.braking_velocity)
            };
            let b = self.pool.block_mut(bp);
            b.braking_velocity = nx_entry_vmax.min(nx_braking) + b.delta_vmax;
        }

        // Forward pass: recompute trapezoids through the window.
        loop {
            bp = self.pool.next_of(bp);
            if bp == bf_idx {
                break;
            }
            let pv = self.pool.prev_of(bp);
            let nx = self.pool.next_of(bp);

            let entry = if pv == bf_idx || *mr_flag {
                *mr_flag = false;
                self.pool.block(bp).entry_vmax
            } else {
                self.pool.block(pv).exit_velocity
            };
            let (nx_braking, nx_entry_vmax) = {
                let n = self.pool.block(nx);
                (n.braking_velocity, n.entry_vmax)
            };
            {
                let b = self.pool.block_mut(bp);
                b.entry_velocity = entry;
                b.cruise_velocity = b.cruise_vmax;
                b.exit_velocity = b
                    .exit_vmax
                    .min(nx_braking)
                    .min(nx_entry_vmax)
                    .min(b.entry_velocity + b.delta_vmax);
            }
            if !calculate_trapezoid(self.pool.block_mut(bp), &self.cfg) {
                self.trapezoid_misses += 1;
            }

            // Optimally planned trapezoids only need their exit conditions
            // checked: once the exit sits on a ceiling it cannot improve.
            let pv_replannable = self.pool.block(pv).replannable;
            let b = self.pool.block(bp);
            if b.exit_velocity == b.exit_vmax
                || b.exit_velocity == nx_entry_vmax
                || (!pv_replannable && b.exit_velocity == b.entry_velocity + b.delta_vmax)
            {
                self.pool.block_mut(bp).replannable = false;
            }
        }

        // The last block always plans to a standstill: it is the queue
        // terminus until something is queued behind it.
        let pv = self.pool.prev_of(bp);
        let pv_exit = self.pool.block(pv).exit_velocity;
        {
            let b = self.pool.block_mut(bp);
            b.entry_velocity = pv_exit;
            b.cruise_velocity = b.cruise_vmax;
            b.exit_velocity = 0.0;
        }
        if !calculate_trapezoid(self.pool.block_mut(bp), &self.cfg) {
            self.trapezoid_misses += 1;
        }
    }

    /// Make every block in the queue replannable again. Used by the
    /// feedhold replan, which overrides earlier optimal-plan decisions.
    pub(crate) fn reset_replannable_list(&mut self) {
        let Some(first) = self.pool.first() else {
            return;
        };
        let mut bp = first;
        loop {
            self.pool.block_mut(bp).replannable = true;
            bp = self.pool.next_of(bp);
            if bp == first || self.pool.block(bp).move_state == MoveState::Off {
                break;
            }
        }
    }
}
