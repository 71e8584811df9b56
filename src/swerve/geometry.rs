// Planar geometry for the swerve base
//
// Angles are radians, counter-clockwise positive. x is forward, y is left.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Below this the series expansions are used in exp/log
const SMALL_ANGLE: f64 = 1e-9;

/// Wrap an angle into [0, 2π)
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Signed shortest-path difference `target - current`, in [-π, π)
///
/// Crossing the 0/2π seam goes the short way: current=350°, target=10° gives +20°.
pub fn angle_error(target: f64, current: f64) -> f64 {
    let wrapped = (target - current + PI).rem_euclid(TAU) - PI;
    if wrapped >= PI { -PI } else { wrapped }
}

/// Rotate a 2D vector counter-clockwise by `angle`
pub fn rotate(x: f64, y: f64, angle: f64) -> (f64, f64) {
    let (sin, cos) = angle.sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Infinitesimal pose change: translation along a constant-curvature arc plus rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl Twist2d {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }
}

/// Planar pose of the base in the field frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    /// Heading in radians, not wrapped
    pub heading: f64,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    pub fn origin() -> Self {
        Self::default()
    }

    /// Apply a twist expressed in this pose's frame and return the resulting pose
    pub fn exp(&self, twist: Twist2d) -> Pose2d {
        let (sin_theta, cos_theta) = twist.dtheta.sin_cos();
        let (s, c) = if twist.dtheta.abs() < SMALL_ANGLE {
            (
                1.0 - twist.dtheta * twist.dtheta / 6.0,
                0.5 * twist.dtheta,
            )
        } else {
            (
                sin_theta / twist.dtheta,
                (1.0 - cos_theta) / twist.dtheta,
            )
        };

        // Local-frame displacement, then rotated into the field frame
        let local_x = twist.dx * s - twist.dy * c;
        let local_y = twist.dx * c + twist.dy * s;
        let (dx, dy) = rotate(local_x, local_y, self.heading);

        Pose2d {
            x: self.x + dx,
            y: self.y + dy,
            heading: self.heading + twist.dtheta,
        }
    }

    /// Twist that takes this pose to `end`, the inverse of [`Pose2d::exp`]
    pub fn log(&self, end: &Pose2d) -> Twist2d {
        // Relative transform expressed in this pose's frame
        let (rel_x, rel_y) = rotate(end.x - self.x, end.y - self.y, -self.heading);
        let dtheta = end.heading - self.heading;

        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = dtheta.cos() - 1.0;
        let half_theta_by_tan = if cos_minus_one.abs() < SMALL_ANGLE {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * dtheta.sin()) / cos_minus_one
        };

        let (tx, ty) = rotate(rel_x, rel_y, (-half_dtheta).atan2(half_theta_by_tan));
        let scale = half_theta_by_tan.hypot(half_dtheta);

        Twist2d {
            dx: tx * scale,
            dy: ty * scale,
            dtheta,
        }
    }
}
