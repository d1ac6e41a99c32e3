// motion-core/src/trapezoid.rs
// Head/body/tail generation for a single block.
//
// Given a block's length and its requested entry, cruise, and exit
// velocities, partition the length into a jerk-limited acceleration head, a
// constant-velocity body, and a deceleration tail. Lengths must stay exact;
// velocities may be lowered (never raised) to make the move fit. The
// velocities are set even for zero-length sections so adjacent blocks can
// chain entries and exits.
//
// Classes of fit, tested in this order (the ordering matters):
//   Degraded  - too short to honor both entry and exit; entry gives way
//   Requested - length accommodates the cruise velocity as asked
//   Rate-limited - entry/exit honored but cruise must drop (symmetric split
//                  or asymmetric successive approximation)
//   No fit    - shorter than one executor segment; block is skipped
//
// Precondition: entry_velocity <= cruise_velocity >= exit_velocity.

use log::warn;

use crate::axis::EPSILON;
use crate::block::{Block, MoveState};
use crate::config::MotionConfig;

/// Distance required to change between two velocities at the block's jerk.
/// Uses the linear-ramp equivalence: L = |V1-V0| * sqrt(|V1-V0| / Jm).
#[inline]
pub fn target_length(v0: f64, v1: f64, recip_jerk: f64) -> f64 {
    let dv = (v0 - v1).abs();
    dv * (dv * recip_jerk).sqrt()
}

/// Velocity reachable from v0 over a distance at the block's jerk:
/// Vt = L^(2/3) * Jm^(1/3) + V0.
#[inline]
pub fn target_velocity(v0: f64, length: f64, cbrt_jerk: f64) -> f64 {
    length.powf(2.0 / 3.0) * cbrt_jerk + v0
}

// Minimum section lengths are dynamic: they guarantee each emitted section
// is at least one executor segment long at the velocities now in the block.
// Recomputed at each use because the velocities change mid-function.
#[inline]
fn min_head_length(bf: &Block, min_segment_time: f64) -> f64 {
    min_segment_time * (bf.cruise_velocity + bf.entry_velocity)
}

#[inline]
fn min_tail_length(bf: &Block, min_segment_time: f64) -> f64 {
    min_segment_time * (bf.cruise_velocity + bf.exit_velocity)
}

#[inline]
fn min_body_length(bf: &Block, min_segment_time: f64) -> f64 {
    min_segment_time * bf.cruise_velocity
}

/// Partition bf.length into head, body and tail. Returns false when the
/// asymmetric approximation hit its iteration cap; the last computed cruise
/// is kept and motion proceeds (a near-miss must never fault the machine).
pub fn calculate_trapezoid(bf: &mut Block, cfg: &MotionConfig) -> bool {
    let mst = cfg.min_segment_time();

    bf.head_length = 0.0;
    bf.body_length = 0.0;
    bf.tail_length = 0.0;

    // Combined short cases: exact-fit single sections, degraded fits where
    // entry has to give way, and the no-fit skip. Also converts heads/tails
    // too short for two segments into a single-segment body.
    let minimum_length = target_length(bf.entry_velocity, bf.exit_velocity, bf.recip_jerk);
    if bf.length <= minimum_length + min_body_length(bf, mst) {
        if bf.entry_velocity > bf.exit_velocity {
            // Tail cases
            if bf.length < minimum_length - cfg.trapezoid_length_fit_tolerance {
                // Degraded: the entry velocity cannot be met in this length
                bf.entry_velocity = target_velocity(bf.exit_velocity, bf.length, bf.cbrt_jerk);
            }
            bf.cruise_velocity = bf.entry_velocity;
            if bf.length >= min_tail_length(bf, mst) {
                bf.tail_length = bf.length;
            } else if bf.length > min_body_length(bf, mst) {
                bf.body_length = bf.length;
            } else {
                bf.move_state = MoveState::Skip;
            }
            return true;
        }
        if bf.entry_velocity < bf.exit_velocity {
            // Head cases (mirror of the above)
            if bf.length < minimum_length - cfg.trapezoid_length_fit_tolerance {
                bf.exit_velocity = target_velocity(bf.entry_velocity, bf.length, bf.cbrt_jerk);
            }
            bf.cruise_velocity = bf.exit_velocity;
            if bf.length >= min_head_length(bf, mst) {
                bf.head_length = bf.length;
            } else if bf.length > min_body_length(bf, mst) {
                bf.body_length = bf.length;
            } else {
                bf.move_state = MoveState::Skip;
            }
            return true;
        }
    }

    // Ideal head and tail for the requested cruise velocity
    bf.head_length = target_length(bf.entry_velocity, bf.cruise_velocity, bf.recip_jerk);
    bf.tail_length = target_length(bf.exit_velocity, bf.cruise_velocity, bf.recip_jerk);
    if bf.head_length < min_head_length(bf, mst) {
        bf.head_length = 0.0;
    }
    if bf.tail_length < min_tail_length(bf, mst) {
        bf.tail_length = 0.0;
    }

    let mut converged = true;

    if bf.length < bf.head_length + bf.tail_length {
        // Rate limited: the requested cruise cannot be reached.

        // Symmetric case: equal entry and exit, split the length in half.
        if (bf.entry_velocity - bf.exit_velocity).abs() < cfg.velocity_tolerance(bf.entry_velocity)
        {
            bf.head_length = bf.length / 2.0;
            bf.tail_length = bf.head_length;
            bf.cruise_velocity = bf
                .cruise_vmax
                .min(target_velocity(bf.entry_velocity, bf.head_length, bf.cbrt_jerk));
            return true;
        }

        // Asymmetric case: reallocate length between head and tail by
        // successive approximation until the cruise velocity settles.
        // Infrequent, so the expense is acceptable.
        let mut computed_velocity = bf.cruise_vmax;
        converged = false;
        for _ in 0..cfg.trapezoid_iteration_max {
            bf.cruise_velocity = computed_velocity;
            bf.head_length =
                target_length(bf.entry_velocity, bf.cruise_velocity, bf.recip_jerk);
            bf.tail_length = target_length(bf.exit_velocity, bf.cruise_velocity, bf.recip_jerk);
            if bf.head_length > bf.tail_length {
                bf.head_length =
                    (bf.head_length / (bf.head_length + bf.tail_length)) * bf.length;
                computed_velocity =
                    target_velocity(bf.entry_velocity, bf.head_length, bf.cbrt_jerk);
            } else {
                bf.tail_length =
                    (bf.tail_length / (bf.head_length + bf.tail_length)) * bf.length;
                computed_velocity =
                    target_velocity(bf.exit_velocity, bf.tail_length, bf.cbrt_jerk);
            }
            if (bf.cruise_velocity - computed_velocity).abs() / computed_velocity
                <= cfg.trapezoid_iteration_error_percent
            {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(
                "trapezoid iteration did not converge (line {}), keeping cruise {:.3}",
                bf.linenum, computed_velocity
            );
        }
        bf.cruise_velocity = computed_velocity;
        bf.head_length = target_length(bf.entry_velocity, bf.cruise_velocity, bf.recip_jerk);
        bf.tail_length = bf.length - bf.head_length;
        if bf.head_length < min_head_length(bf, mst) {
            // the move becomes all tail...
            bf.tail_length = bf.length;
            bf.head_length = 0.0;
        }
        if bf.tail_length < min_tail_length(bf, mst) {
            // ...or all head
            bf.head_length = bf.length;
            bf.tail_length = 0.0;
        }
        return converged;
    }

    // Requested fit: whatever is not head or tail cruises.
    bf.body_length = bf.length - bf.head_length - bf.tail_length;

    // A non-zero body below the minimum folds into the head and/or tail.
    // This trades a small velocity error for exact distance, which is the
    // right side to err on.
    if bf.body_length < min_body_length(bf, mst) && bf.body_length > EPSILON {
        if bf.head_length > EPSILON {
            if bf.tail_length > EPSILON {
                // HBT reduces to HT
                bf.head_length += bf.body_length / 2.0;
                bf.tail_length += bf.body_length / 2.0;
            } else {
                // HB reduces to H
                bf.head_length += bf.body_length;
            }
        } else {
            // BT reduces to T
            bf.tail_length += bf.body_length;
        }
        bf.body_length = 0.0;
    } else if bf.head_length < EPSILON && bf.tail_length < EPSILON {
        // Standalone body: match cruise to entry to avoid a velocity step.
        bf.cruise_velocity = bf.entry_velocity;
    }

    converged
}
