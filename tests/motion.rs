// motion-core/tests/motion.rs
// End-to-end scenarios: queue moves through the public surface, drain the
// executor, and check what reached the step pulser.

use float_cmp::assert_approx_eq;
use motion_core::{
    Axis, CartesianKinematics, CycleState, ExecStatus, HoldState, MotionConfig, MotionController,
    MotionState, PlanError, SharedRecordingPulser, AXES,
};

fn controller() -> (MotionController, SharedRecordingPulser) {
    let recorder = SharedRecordingPulser::new();
    let mc = MotionController::new(
        MotionConfig::default(),
        Box::new(recorder.clone()),
        Box::new(CartesianKinematics::default()),
    );
    (mc, recorder)
}

fn xyz(x: f64, y: f64, z: f64) -> [f64; AXES] {
    let mut t = [0.0; AXES];
    t[0] = x;
    t[1] = y;
    t[2] = z;
    t
}

/// Run main-loop callbacks plus one executor tick, the way the controller
/// loop and the low-priority interrupt interleave on hardware.
fn tick(mc: &mut MotionController) -> ExecStatus {
    mc.plan_hold_callback();
    mc.end_hold_callback();
    mc.exec_move()
}

fn drain(mc: &mut MotionController) {
    let mut guard = 0;
    loop {
        let status = tick(mc);
        if status == ExecStatus::Noop && mc.machine().hold == HoldState::Off {
            break;
        }
        guard += 1;
        assert!(guard < 200_000, "queue failed to drain");
    }
}

#[test]
fn test_straight_line_alone() {
    let (mut mc, rec) = controller();
    mc.aline(xyz(10.0, 0.0, 0.0), 0.1, [0.0; AXES], 0.0).unwrap();
    drain(&mut mc);

    let total = rec.lock().total_steps();
    assert_approx_eq!(f64, total[0], 10.0, epsilon = 1e-6);
    assert_approx_eq!(f64, total[1], 0.0, epsilon = 1e-9);
    assert_approx_eq!(f64, mc.get_runtime_machine_position(Axis::X), 10.0, epsilon = 1e-6);
    assert_eq!(mc.machine().motion, MotionState::Stop);
    assert_eq!(mc.machine().cycle, CycleState::Off);
}

#[test]
fn test_two_collinear_segments_no_intermediate_stop() {
    let (mut mc, rec) = controller();
    mc.aline(xyz(5.0, 0.0, 0.0), 0.05, [0.0; AXES], 0.0).unwrap();
    mc.aline(xyz(10.0, 0.0, 0.0), 0.05, [0.0; AXES], 0.0).unwrap();

    // Track velocity across the junction: a collinear pair must carry full
    // speed through, never braking between the blocks.
    let mut min_mid_velocity = f64::INFINITY;
    let mut seen_cruise = false;
    let mut guard = 0;
    loop {
        let status = tick(&mut mc);
        if status == ExecStatus::Noop {
            break;
        }
        let v = mc.get_runtime_velocity();
        let x = mc.get_runtime_machine_position(Axis::X);
        if v > 99.0 {
            seen_cruise = true;
        }
        // Around the junction both blocks should still be at speed.
        if (4.0..=6.0).contains(&x) {
            min_mid_velocity = min_mid_velocity.min(v);
        }
        guard += 1;
        assert!(guard < 100_000);
    }
    assert!(seen_cruise, "cruise velocity never reached");
    assert!(
        min_mid_velocity > 99.0,
        "velocity sagged to {min_mid_velocity} across a collinear junction"
    );
    let total = rec.lock().total_steps();
    assert_approx_eq!(f64, total[0], 10.0, epsilon = 1e-6);
}

#[test]
fn test_right_angle_corner_slows_then_completes() {
    let (mut mc, rec) = controller();
    // Fast enough that the corner, not the cruise, limits the junction.
    mc.aline(xyz(10.0, 0.0, 0.0), 0.01, [0.0; AXES], 0.0).unwrap();
    mc.aline(xyz(10.0, 10.0, 0.0), 0.01, [0.0; AXES], 0.0).unwrap();

    // Junction velocity for a 90 degree corner with junction_dev 0.05 and
    // junction_acceleration 100000.
    let s = 0.5f64.sqrt();
    let junction = (0.05 * (s / (1.0 - s)) * 100_000.0).sqrt();

    let mut corner_velocity = f64::INFINITY;
    let mut guard = 0;
    loop {
        let status = tick(&mut mc);
        if status == ExecStatus::Noop {
            break;
        }
        let x = mc.get_runtime_machine_position(Axis::X);
        let y = mc.get_runtime_machine_position(Axis::Y);
        if x > 9.99 && y < 0.01 {
            corner_velocity = corner_velocity.min(mc.get_runtime_velocity());
        }
        guard += 1;
        assert!(guard < 100_000);
    }
    // The machine slowed into the corner to (about) the junction velocity
    // without stopping.
    assert!(corner_velocity < junction * 1.10, "corner at {corner_velocity}");
    assert!(corner_velocity > 1.0, "machine stopped in the corner");

    let total = rec.lock().total_steps();
    assert_approx_eq!(f64, total[0], 10.0, epsilon = 1e-6);
    assert_approx_eq!(f64, total[1], 10.0, epsilon = 1e-6);
}

#[test]
fn test_feedhold_mid_body_and_resume() {
    let (mut mc, rec) = controller();
    for i in 1..=3 {
        mc.aline(xyz(i as f64 * 20.0, 0.0, 0.0), 0.02, [0.0; AXES], 0.0)
            .unwrap();
    }

    // Run a while, then hold mid-motion.
    for _ in 0..150 {
        tick(&mut mc);
    }
    assert_eq!(mc.machine().motion, MotionState::Run);
    mc.request_feedhold();

    // Drive until the hold latches at zero velocity.
    let mut guard = 0;
    while mc.machine().hold != HoldState::Hold {
        tick(&mut mc);
        guard += 1;
        assert!(guard < 100_000, "hold never latched");
    }
    let held_at = mc.get_runtime_machine_position(Axis::X);
    assert!(held_at > 0.0 && held_at < 60.0);
    assert!(mc.take_status_report_request());

    // Parked: the executor emits nothing while holding.
    let lines_before = rec.lock().lines.len();
    for _ in 0..10 {
        assert_eq!(mc.exec_move(), ExecStatus::Noop);
    }
    assert_eq!(rec.lock().lines.len(), lines_before);

    // Resume; queued work survives the hold and the total path is intact.
    mc.request_cycle_start();
    drain(&mut mc);
    let total = rec.lock().total_steps();
    assert_approx_eq!(f64, total[0], 60.0, epsilon = 1e-6);
    assert_approx_eq!(f64, mc.get_runtime_machine_position(Axis::X), 60.0, epsilon = 1e-6);
}

#[test]
fn test_feedhold_spanning_multiple_blocks() {
    let (mut mc, rec) = controller();
    // High speed and short blocks so the braking distance cannot fit in
    // what remains of the running block.
    for i in 1..=8 {
        mc.aline(xyz(i as f64 * 5.0, 0.0, 0.0), 0.0025, [0.0; AXES], 0.0)
            .unwrap();
    }

    // Run until the chain is at full speed mid-queue: from 2000 mm/min the
    // braking distance (~12.6 mm) cannot fit in the rest of a 5 mm block.
    let mut guard = 0;
    while mc.get_runtime_velocity() < 1900.0 {
        tick(&mut mc);
        guard += 1;
        assert!(guard < 100_000, "never reached full speed");
    }
    mc.request_feedhold();

    let mut guard = 0;
    while mc.machine().hold != HoldState::Hold {
        tick(&mut mc);
        guard += 1;
        assert!(guard < 100_000, "hold never latched");
    }
    // Velocity is fully shed wherever the decel finally fit, well before
    // the end of the queued path.
    assert!(mc.get_runtime_velocity() < 1.0);
    assert!(mc.get_runtime_machine_position(Axis::X) < 40.0);

    mc.request_cycle_start();
    drain(&mut mc);
    let total = rec.lock().total_steps();
    assert_approx_eq!(f64, total[0], 40.0, epsilon = 1e-6);
}

#[test]
fn test_dwell_between_moves() {
    let (mut mc, rec) = controller();
    mc.aline(xyz(10.0, 0.0, 0.0), 0.1, [0.0; AXES], 0.0).unwrap();
    mc.dwell(0.5).unwrap();
    mc.aline(xyz(20.0, 0.0, 0.0), 0.1, [0.0; AXES], 0.0).unwrap();
    drain(&mut mc);

    let rec = rec.lock();
    assert_eq!(rec.dwells.len(), 1);
    assert_approx_eq!(f64, rec.dwells[0], 500_000.0);
    // The dwell moved nothing.
    let total = rec.total_steps();
    assert_approx_eq!(f64, total[0], 20.0, epsilon = 1e-6);
}

#[test]
fn test_backpressure_and_flush() {
    let (mut mc, _rec) = controller();
    let mut i = 0.0;
    // Fill the queue without draining; aline must fail cleanly when full.
    let overflow = loop {
        i += 1.0;
        match mc.aline(xyz(i, 0.0, 0.0), 0.01, [0.0; AXES], 0.0) {
            Ok(()) => continue,
            Err(e) => break e,
        }
    };
    assert_eq!(overflow, PlanError::BufferFullFatal);
    assert_eq!(mc.get_planner_buffers_available(), 0);

    mc.flush_planner();
    assert_eq!(
        mc.get_planner_buffers_available() as usize,
        mc.config().pool_size
    );
    assert_eq!(mc.machine().motion, MotionState::Stop);
    assert_eq!(mc.exec_move(), ExecStatus::Noop);
}

#[test]
fn test_work_offsets_reported_not_executed() {
    let (mut mc, rec) = controller();
    let mut offset = [0.0; AXES];
    offset[0] = 50.0;
    mc.aline(xyz(10.0, 0.0, 0.0), 0.1, offset, 0.0).unwrap();
    drain(&mut mc);

    // Offsets shift reported work position only; machine motion ignores them.
    let total = rec.lock().total_steps();
    assert_approx_eq!(f64, total[0], 10.0, epsilon = 1e-6);
    assert_approx_eq!(f64, mc.get_runtime_machine_position(Axis::X), 10.0, epsilon = 1e-6);
    assert_approx_eq!(
        f64,
        mc.get_runtime_work_position(Axis::X),
        10.0 - 50.0,
        epsilon = 1e-6
    );
}

#[test]
fn test_rate_limited_short_move_still_lands_exactly() {
    let (mut mc, rec) = controller();
    // Too short to reach the requested feed: the planner degrades cruise,
    // the executor must still land on the endpoint.
    mc.aline(xyz(0.8, 0.0, 0.0), 0.8 / 600.0, [0.0; AXES], 0.0)
        .unwrap();
    drain(&mut mc);
    let total = rec.lock().total_steps();
    assert_approx_eq!(f64, total[0], 0.8, epsilon = 1e-6);
}

#[test]
fn test_motor_scaling_applies_to_emitted_steps() {
    let recorder = SharedRecordingPulser::new();
    let mut mc = MotionController::new(
        MotionConfig::default(),
        Box::new(recorder.clone()),
        Box::new(CartesianKinematics::new([80.0, 80.0, 400.0, 1.0, 1.0, 1.0])),
    );
    mc.aline(xyz(1.0, 2.0, 0.5), 0.05, [0.0; AXES], 0.0).unwrap();
    drain(&mut mc);
    let total = recorder.lock().total_steps();
    assert_approx_eq!(f64, total[0], 80.0, epsilon = 1e-4);
    assert_approx_eq!(f64, total[1], 160.0, epsilon = 1e-4);
    assert_approx_eq!(f64, total[2], 200.0, epsilon = 1e-4);
}
