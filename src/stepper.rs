// motion-core/src/stepper.rs
// Seams to the step-pulse engine and the kinematic transform.
//
// The core never touches hardware. It hands fractional step-count batches
// with durations to a StepPulser, and maps axis travel to motor space
// through a Kinematics transform. Both are boxed trait objects on the
// controller so firmware, simulators, and tests plug in freely.

use crate::axis::{AxisVector, MOTORS};

/// Error from the pulse engine. A failed prep means the segment was not
/// loaded; the executor does not advance position past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseError;

impl std::fmt::Display for PulseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step pulser rejected segment")
    }
}

impl std::error::Error for PulseError {}

/// The downward interface consumed by the runtime executor.
pub trait StepPulser {
    /// Enqueue one pulse-count batch to run over a duration.
    fn prep_line(&mut self, steps: [f64; MOTORS], microseconds: f64) -> Result<(), PulseError>;

    /// No motion this tick (command blocks, finished dwells). Keeps the
    /// loader fed so it does not stall waiting on a segment.
    fn prep_null(&mut self);

    /// Idle the pulse engine for a duration.
    fn prep_dwell(&mut self, microseconds: f64);

    /// True while the pulse engine has unfinished work.
    fn is_busy(&self) -> bool;

    /// Arm the low-priority interrupt that calls exec_move().
    fn request_exec_move(&mut self);
}

/// Forward transform from axis travel to motor steps.
pub trait Kinematics {
    fn travel_to_steps(&self, travel: &AxisVector) -> [f64; MOTORS];
}

/// Straight-through Cartesian mapping: one motor per axis, scaled by steps
/// per unit of travel.
#[derive(Debug, Clone)]
pub struct CartesianKinematics {
    pub steps_per_unit: [f64; MOTORS],
}

impl CartesianKinematics {
    pub fn new(steps_per_unit: [f64; MOTORS]) -> Self {
        CartesianKinematics { steps_per_unit }
    }
}

impl Default for CartesianKinematics {
    fn default() -> Self {
        CartesianKinematics {
            steps_per_unit: [1.0; MOTORS],
        }
    }
}

impl Kinematics for CartesianKinematics {
    fn travel_to_steps(&self, travel: &AxisVector) -> [f64; MOTORS] {
        let mut steps = [0.0; MOTORS];
        for i in 0..MOTORS {
            steps[i] = travel[i] * self.steps_per_unit[i];
        }
        steps
    }
}

/// Pulser that swallows everything. Useful as a placeholder while bringing
/// a machine up.
#[derive(Debug, Default)]
pub struct NullPulser;

impl StepPulser for NullPulser {
    fn prep_line(&mut self, _steps: [f64; MOTORS], _microseconds: f64) -> Result<(), PulseError> {
        Ok(())
    }
    fn prep_null(&mut self) {}
    fn prep_dwell(&mut self, _microseconds: f64) {}
    fn is_busy(&self) -> bool {
        false
    }
    fn request_exec_move(&mut self) {}
}

/// Pulser that records everything it is handed. Used by the tests and handy
/// for offline simulation: summing the recorded step batches reconstructs
/// the commanded toolpath.
#[derive(Debug, Default)]
pub struct RecordingPulser {
    pub lines: Vec<([f64; MOTORS], f64)>,
    pub dwells: Vec<f64>,
    pub nulls: usize,
    pub exec_requests: usize,
}

impl RecordingPulser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total steps emitted per motor across all recorded segments.
    pub fn total_steps(&self) -> [f64; MOTORS] {
        let mut total = [0.0; MOTORS];
        for (steps, _) in &self.lines {
            for i in 0..MOTORS {
                total[i] += steps[i];
            }
        }
        total
    }

    /// Total commanded motion time across all recorded segments, in
    /// microseconds. Dwell time not included.
    pub fn total_microseconds(&self) -> f64 {
        self.lines.iter().map(|(_, us)| us).sum()
    }
}

impl StepPulser for RecordingPulser {
    fn prep_line(&mut self, steps: [f64; MOTORS], microseconds: f64) -> Result<(), PulseError> {
        self.lines.push((steps, microseconds));
        Ok(())
    }

    fn prep_null(&mut self) {
        self.nulls += 1;
    }

    fn prep_dwell(&mut self, microseconds: f64) {
        self.dwells.push(microseconds);
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn request_exec_move(&mut self) {
        self.exec_requests += 1;
    }
}

/// Recorder that stays observable after the controller takes ownership of
/// the pulser: the controller gets one handle, the test or simulator keeps
/// a clone and inspects the shared record.
#[derive(Debug, Clone, Default)]
pub struct SharedRecordingPulser {
    inner: std::sync::Arc<parking_lot::Mutex<RecordingPulser>>,
}

impl SharedRecordingPulser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> parking_lot::MutexGuard<'_, RecordingPulser> {
        self.inner.lock()
    }
}

impl StepPulser for SharedRecordingPulser {
    fn prep_line(&mut self, steps: [f64; MOTORS], microseconds: f64) -> Result<(), PulseError> {
        self.inner.lock().prep_line(steps, microseconds)
    }

    fn prep_null(&mut self) {
        self.inner.lock().prep_null();
    }

    fn prep_dwell(&mut self, microseconds: f64) {
        self.inner.lock().prep_dwell(microseconds);
    }

    fn is_busy(&self) -> bool {
        self.inner.lock().is_busy()
    }

    fn request_exec_move(&mut self) {
        self.inner.lock().request_exec_move();
    }
}
