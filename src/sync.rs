// motion-core/src/sync.rs
// Shared handle for splitting the controller between a foreground planner
// thread and a background executor tick.
//
// The controller itself is single-owner; this wraps it in a mutex so the
// two contexts serialize. Foreground status readers use the snapshot
// getters, which take the lock only long enough to copy scalars out, the
// discipline the runtime accessors are designed around.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::axis::Axis;
use crate::controller::MotionController;
use crate::status::ExecStatus;

#[derive(Clone)]
pub struct MotionHandle {
    inner: Arc<Mutex<MotionController>>,
}

impl MotionHandle {
    pub fn new(controller: MotionController) -> Self {
        MotionHandle {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    /// Full access for queueing moves and running the main-loop callbacks.
    pub fn lock(&self) -> MutexGuard<'_, MotionController> {
        self.inner.lock()
    }

    /// Executor tick: call from the timer/interrupt context.
    pub fn exec_move(&self) -> ExecStatus {
        self.inner.lock().exec_move()
    }

    // Scalar snapshots for status reporting.

    pub fn runtime_velocity(&self) -> f64 {
        self.inner.lock().get_runtime_velocity()
    }

    pub fn runtime_machine_position(&self, axis: Axis) -> f64 {
        self.inner.lock().get_runtime_machine_position(axis)
    }

    pub fn runtime_work_position(&self, axis: Axis) -> f64 {
        self.inner.lock().get_runtime_work_position(axis)
    }

    pub fn runtime_linenum(&self) -> u32 {
        self.inner.lock().get_runtime_linenum()
    }

    pub fn runtime_lineindex(&self) -> u32 {
        self.inner.lock().get_runtime_lineindex()
    }

    pub fn planner_buffers_available(&self) -> u8 {
        self.inner.lock().get_planner_buffers_available()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock().is_busy()
    }
}
