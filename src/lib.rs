// motion-core/src/lib.rs

// Motion planning and execution core for multi-axis G-code controllers.
//
// The crate sits below a canonical-machine / G-code layer and above a
// step-pulse engine. Moves arrive as aline() calls, are queued in a ring of
// planning blocks, replanned for cornering as the queue grows, and are
// executed as fixed-time segments with jerk-limited (S-curve) velocity
// profiles. Feedholds reshape the queue mid-motion to brake to zero and
// restart without losing queued work.

pub mod axis;
pub mod block;
pub mod config;
pub mod controller;
pub mod feedhold;
pub mod junction;
pub mod machine;
pub mod planner;
pub mod pool;
pub mod runtime;
pub mod status;
pub mod stepper;
pub mod sync;
pub mod trapezoid;

pub use axis::{Axis, AxisVector, AXES, MOTORS};
pub use block::{Block, BufferState, CommandExec, MoveState, MoveType, Payload};
pub use config::{AxisConfig, MotionConfig};
pub use controller::MotionController;
pub use machine::{CycleState, HoldState, MachineState, MotionState};
pub use status::{ExecStatus, PlanError};
pub use stepper::{
    CartesianKinematics, Kinematics, NullPulser, PulseError, RecordingPulser,
    SharedRecordingPulser, StepPulser,
};
pub use sync::MotionHandle;
