// motion-core/src/config.rs
// Read-mostly machine configuration for planning and execution.
//
// Built once at startup and treated as immutable while moves are queued.
// Replacing the configuration on a live controller flushes the planner so
// precomputed jerk terms never drive a move they were not derived from.

use serde::{Deserialize, Serialize};

use crate::axis::{AXES, MICROSECONDS_PER_MINUTE};

/// Per-axis kinematic limits. Velocities are mm/min (degrees/min for
/// rotaries), jerk is mm/min^3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    pub jerk_max: f64,
    pub junction_dev: f64,
    pub velocity_max: f64,
    pub feedrate_max: f64,
    pub travel_max: f64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        AxisConfig {
            jerk_max: 50_000_000.0,
            junction_dev: 0.05,
            velocity_max: 16_000.0,
            feedrate_max: 16_000.0,
            travel_max: 400.0,
        }
    }
}

/// Global planner/executor configuration.
// Scalar fields precede `axes` so the TOML form serializes cleanly (values
// may not follow an array of tables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Centripetal acceleration ceiling used for cornering speed.
    pub junction_acceleration: f64,

    /// Nominal segment duration the executor aims for.
    pub estd_segment_usec: f64,
    /// Hard floor under which a section is skipped rather than emitted.
    pub min_segment_usec: f64,

    /// Number of slots in the planning block ring.
    pub pool_size: usize,

    /// Allowable length error for "exact fit" head/tail cases (mm).
    pub trapezoid_length_fit_tolerance: f64,
    /// Floor for the adaptive entry/exit velocity tolerance.
    pub trapezoid_velocity_tolerance: f64,
    /// Iteration cap for the asymmetric head/tail approximation.
    pub trapezoid_iteration_max: u8,
    /// Relative cruise-velocity change below which the iteration has
    /// converged. 0.10 = 10%.
    pub trapezoid_iteration_error_percent: f64,

    /// Jerk values closer than this reuse the previous block's precomputed
    /// reciprocal and cube root.
    pub jerk_match_precision: f64,

    pub axes: [AxisConfig; AXES],
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            junction_acceleration: 100_000.0,
            estd_segment_usec: 5_000.0,
            min_segment_usec: 2_500.0,
            pool_size: 28,
            trapezoid_length_fit_tolerance: 0.0001,
            trapezoid_velocity_tolerance: 2.0,
            trapezoid_iteration_max: 10,
            trapezoid_iteration_error_percent: 0.10,
            jerk_match_precision: 1000.0,
            axes: [AxisConfig::default(); AXES],
        }
    }
}

impl MotionConfig {
    /// Minimum segment time in minutes. Sections shorter than one of these
    /// per segment cannot be emitted.
    #[inline]
    pub fn min_segment_time(&self) -> f64 {
        self.min_segment_usec / MICROSECONDS_PER_MINUTE
    }

    /// Adaptive velocity tolerance for the trapezoid symmetric-case test.
    #[inline]
    pub fn velocity_tolerance(&self, entry_velocity: f64) -> f64 {
        self.trapezoid_velocity_tolerance.max(entry_velocity / 100.0)
    }
}
