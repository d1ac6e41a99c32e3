// motion-core/src/block.rs
// The planning block: one queue slot holding one motion-generating G-code
// line (or a synchronous command riding the queue).

use crate::axis::AxisVector;

/// Queue lifecycle of a block slot.
///
/// Empty -> Loading (acquired for writing) -> Queued (committed) ->
/// Pending (next to run) -> Running -> Empty (freed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferState {
    #[default]
    Empty,
    Loading,
    Queued,
    Pending,
    Running,
}

/// What kind of work the block carries; dispatches the exec routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    #[default]
    None,
    /// Acceleration-planned line (the common case).
    Aline,
    /// Timed pause with no motion.
    Dwell,
    /// Synchronous non-motion action executed in queue order.
    Command,
}

/// Executor progress through a block, and the section/sub-section states of
/// an aline. Off must stay the zeroed default: cleared slots read as Off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveState {
    #[default]
    Off,
    New,
    Run,
    Run2,
    Head,
    Body,
    Tail,
    /// Planner determined the block is too short to execute.
    Skip,
}

impl MoveState {
    /// True once the executor has begun consuming the move.
    #[inline]
    pub fn is_active(self) -> bool {
        !matches!(self, MoveState::Off | MoveState::New)
    }
}

/// Callback for queued synchronous commands (M-codes and similar). Called
/// from the executor with the payload scalars when the block reaches the
/// head of the queue.
pub type CommandExec = fn(u8, f64);

/// Non-line payloads. Aline blocks keep their data in the block's planning
/// fields; dwell and command blocks carry theirs here.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    Dwell {
        seconds: f64,
    },
    Command {
        exec: CommandExec,
        int_val: u8,
        dbl_val: f64,
    },
}

/// One slot of the planning ring.
///
/// The prev/next links are fixed ring indices assigned at pool init; clear()
/// and the pool's copy preserve them. All velocities are mm/min, lengths mm,
/// times minutes.
#[derive(Debug, Clone)]
pub struct Block {
    pub state: BufferState,
    pub move_type: MoveType,
    pub move_state: MoveState,
    /// True while the planner may still revise this block's velocities.
    pub replannable: bool,

    pub payload: Payload,

    /// G-code line number for reports; zero if the line was unnumbered.
    pub linenum: u32,
    /// Autoincremented queue index for reports.
    pub lineindex: u32,

    /// Absolute endpoint of the move.
    pub target: AxisVector,
    /// Unit direction vector of the move.
    pub unit: AxisVector,
    /// Work-coordinate offset in effect when the move was planned.
    pub work_offset: AxisVector,

    /// Requested duration and rate-override floor, minutes.
    pub time: f64,
    pub min_time: f64,

    pub length: f64,
    pub head_length: f64,
    pub body_length: f64,
    pub tail_length: f64,

    pub entry_velocity: f64,
    pub cruise_velocity: f64,
    pub exit_velocity: f64,
    pub braking_velocity: f64,

    pub entry_vmax: f64,
    pub cruise_vmax: f64,
    pub exit_vmax: f64,
    /// Velocity gain achievable over this block's length from standstill.
    pub delta_vmax: f64,

    pub jerk: f64,
    /// 1/jerk, precomputed once per block.
    pub recip_jerk: f64,
    /// jerk^(1/3), precomputed once per block.
    pub cbrt_jerk: f64,

    /// Fixed ring links (indices into the pool).
    pub prev: usize,
    pub next: usize,
}

impl Block {
    pub(crate) fn new(prev: usize, next: usize) -> Self {
        Block {
            state: BufferState::Empty,
            move_type: MoveType::None,
            move_state: MoveState::Off,
            replannable: false,
            payload: Payload::None,
            linenum: 0,
            lineindex: 0,
            target: [0.0; crate::axis::AXES],
            unit: [0.0; crate::axis::AXES],
            work_offset: [0.0; crate::axis::AXES],
            time: 0.0,
            min_time: 0.0,
            length: 0.0,
            head_length: 0.0,
            body_length: 0.0,
            tail_length: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            braking_velocity: 0.0,
            entry_vmax: 0.0,
            cruise_vmax: 0.0,
            exit_vmax: 0.0,
            delta_vmax: 0.0,
            jerk: 0.0,
            recip_jerk: 0.0,
            cbrt_jerk: 0.0,
            prev,
            next,
        }
    }

    /// Zero the block back to an empty slot, preserving the ring links.
    pub(crate) fn clear(&mut self) {
        let prev = self.prev;
        let next = self.next;
        *self = Block::new(prev, next);
    }

    /// Overwrite this block with another's contents, preserving the links.
    pub(crate) fn copy_from(&mut self, other: &Block) {
        let prev = self.prev;
        let next = self.next;
        *self = other.clone();
        self.prev = prev;
        self.next = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_preserves_links() {
        let mut b = Block::new(3, 5);
        b.length = 12.0;
        b.state = BufferState::Queued;
        b.clear();
        assert_eq!(b.prev, 3);
        assert_eq!(b.next, 5);
        assert_eq!(b.length, 0.0);
        assert_eq!(b.state, BufferState::Empty);
        assert_eq!(b.move_state, MoveState::Off);
        assert!(!b.replannable);
    }

    #[test]
    fn test_copy_preserves_links() {
        let mut dst = Block::new(1, 2);
        let mut src = Block::new(8, 9);
        src.length = 7.5;
        src.entry_vmax = 100.0;
        dst.copy_from(&src);
        assert_eq!(dst.prev, 1);
        assert_eq!(dst.next, 2);
        assert_eq!(dst.length, 7.5);
        assert_eq!(dst.entry_vmax, 100.0);
    }

    #[test]
    fn test_move_state_activity() {
        assert!(!MoveState::Off.is_active());
        assert!(!MoveState::New.is_active());
        assert!(MoveState::Head.is_active());
        assert!(MoveState::Tail.is_active());
    }
}
