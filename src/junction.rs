// motion-core/src/junction.rs
// Maximum cornering velocity at the boundary between two moves.
//
// At a junction, place a circle tangent to both lines; the circular arc is
// the path of constant centripetal acceleration, and its deviation from the
// corner point (delta) sets the effective radius of curvature:
//   sin(theta/2) = R / (R + delta)
//   R = delta * sin(theta/2) / (1 - sin(theta/2))
// with cos(theta) from the dot product of the two unit vectors, and
// sin(theta/2) via the half-angle identity to avoid trig calls. The corner
// speed is then sqrt(R * junction_acceleration).
//
// delta is not a single machine constant: each axis contributes its own
// junction deviation scaled by how much it participates in the two moves,
// so a slow screw-driven Z or a rotary axis tightens the corner only when
// it is actually moving.

use crate::axis::{AxisVector, AXES};
use crate::config::MotionConfig;

/// Returned for nearly collinear junctions: effectively "no cornering
/// limit", large enough to never constrain a real machine.
pub const JUNCTION_VMAX_SENTINEL: f64 = 10_000_000.0;

/// Maximum velocity through the junction between a move along `a_unit` and
/// a following move along `b_unit`.
pub fn junction_vmax(a_unit: &AxisVector, b_unit: &AxisVector, cfg: &MotionConfig) -> f64 {
    let mut costheta = 0.0;
    for i in 0..AXES {
        costheta -= a_unit[i] * b_unit[i];
    }

    if costheta < -0.99 {
        return JUNCTION_VMAX_SENTINEL; // straight line cases
    }
    if costheta > 0.99 {
        return 0.0; // reversal cases
    }

    // Fuse the per-axis junction deviations into a composite delta
    let mut a_delta = 0.0;
    let mut b_delta = 0.0;
    for i in 0..AXES {
        let dev = cfg.axes[i].junction_dev;
        a_delta += (a_unit[i] * dev) * (a_unit[i] * dev);
        b_delta += (b_unit[i] * dev) * (b_unit[i] * dev);
    }
    let delta = (a_delta.sqrt() + b_delta.sqrt()) / 2.0;

    let sintheta_over2 = ((1.0 - costheta) / 2.0).sqrt();
    let radius = delta * sintheta_over2 / (1.0 - sintheta_over2);
    (radius * cfg.junction_acceleration).sqrt()
}
