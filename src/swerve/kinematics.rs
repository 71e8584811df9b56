// Swerve kinematics for a four-module base
// Converts body-frame velocities (vx, vy, omega) into per-module speed and steering angle,
// and back again (least squares) for diagnostics and odometry.

use nalgebra::{SMatrix, SVector, Vector2};
use serde::{Deserialize, Serialize};

use super::geometry::{Pose2d, Twist2d, normalize_angle, rotate};

/// Number of swerve modules on the base
pub const NUM_MODULES: usize = 4;

/// Module speeds below this (m/s) keep their previous steering angle
const SPEED_EPSILON: f64 = 1e-9;

/// Tolerance for layout validation (meters)
const LAYOUT_TOLERANCE: f64 = 1e-6;

/// Singular values below this count as zero
const RANK_EPSILON: f64 = 1e-9;

/// Two rows (x, y) per module, three body velocity columns (vx, vy, omega)
const ROWS: usize = 2 * NUM_MODULES;
type InverseMatrix = SMatrix<f64, ROWS, 3>;
type ForwardMatrix = SMatrix<f64, 3, ROWS>;

/// Error types for kinematics construction
#[derive(Debug, thiserror::Error)]
pub enum KinematicsError {
    #[error("Expected {expected} module offsets, got {found}")]
    ModuleCount { expected: usize, found: usize },

    #[error("Modules {a} and {b} share the same mounting offset")]
    DuplicateOffset { a: usize, b: usize },

    #[error("Module offsets do not form a rectangle centered on the rotation center: {reason}")]
    NotRectangular { reason: String },

    #[error("Module layout is singular (rank {rank} < 3)")]
    Singular { rank: usize },
}

/// Body velocity of the base
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    /// Forward velocity in m/s
    pub vx: f64,
    /// Sideways velocity in m/s (positive = left)
    pub vy: f64,
    /// Rotational velocity in rad/s (positive = counter-clockwise)
    pub omega: f64,
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Convert a field-relative command into the robot frame given the current heading
    pub fn from_field_relative(vx: f64, vy: f64, omega: f64, heading: f64) -> Self {
        let (vx, vy) = rotate(vx, vy, -heading);
        Self { vx, vy, omega }
    }

    /// Equivalent constant-curvature command for one control period of `dt` seconds
    ///
    /// Translating while rotating with a naive command drifts off the intended line, because the
    /// velocity is held in the robot frame for the whole period. This finds the twist that lands
    /// on the pose the continuous command would have reached.
    pub fn discretize(&self, dt: f64) -> Self {
        if dt <= 0.0 {
            return *self;
        }
        let desired = Pose2d::new(self.vx * dt, self.vy * dt, self.omega * dt);
        let twist = Pose2d::origin().log(&desired);
        Self {
            vx: twist.dx / dt,
            vy: twist.dy / dt,
            omega: twist.dtheta / dt,
        }
    }
}

/// Speed and steering angle of one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Wheel speed in m/s (signed)
    pub speed: f64,
    /// Steering angle in radians
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self { speed, angle }
    }
}

/// Accumulated drive distance and steering angle of one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    /// Distance driven in meters
    pub distance: f64,
    /// Steering angle in radians
    pub angle: f64,
}

impl ModulePosition {
    pub fn new(distance: f64, angle: f64) -> Self {
        Self { distance, angle }
    }
}

/// Swerve kinematics for a fixed four-module layout
///
/// Offsets are ordered front-left, front-right, back-left, back-right, with x forward and
/// y left of the rotation center.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    offsets: [Vector2<f64>; NUM_MODULES],
    forward: ForwardMatrix,
    /// Last commanded angle per module, held while a module is stopped
    headings: [f64; NUM_MODULES],
}

impl SwerveKinematics {
    /// Build kinematics from module offsets, validating the layout
    pub fn new(offsets: &[[f64; 2]]) -> Result<Self, KinematicsError> {
        let offsets: [Vector2<f64>; NUM_MODULES] = offsets
            .iter()
            .map(|o| Vector2::new(o[0], o[1]))
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|v: Vec<_>| KinematicsError::ModuleCount {
                expected: NUM_MODULES,
                found: v.len(),
            })?;

        validate_layout(&offsets)?;

        let inverse = inverse_matrix(&offsets, Vector2::zeros());
        let rank = inverse.svd(false, false).rank(RANK_EPSILON);
        if rank < 3 {
            return Err(KinematicsError::Singular { rank });
        }
        let forward = inverse
            .pseudo_inverse(RANK_EPSILON)
            .map_err(|_| KinematicsError::Singular { rank })?;

        Ok(Self {
            offsets,
            forward,
            headings: [0.0; NUM_MODULES],
        })
    }

    /// Module offsets as [x, y] pairs
    pub fn offsets(&self) -> [[f64; 2]; NUM_MODULES] {
        self.offsets.map(|o| [o.x, o.y])
    }

    /// Seed the held angles, e.g. from measured module angles at startup
    pub fn reset_headings(&mut self, angles: [f64; NUM_MODULES]) {
        self.headings = angles.map(normalize_angle);
    }

    /// Convert a body velocity into module targets about `center_of_rotation`
    ///
    /// A module that ends up (near) stationary keeps its previous angle, so a stop command never
    /// makes the wheels swing back to zero.
    pub fn to_module_states(
        &mut self,
        speeds: ChassisSpeeds,
        center_of_rotation: [f64; 2],
    ) -> [ModuleState; NUM_MODULES] {
        let center = Vector2::new(center_of_rotation[0], center_of_rotation[1]);
        let mut states = [ModuleState::default(); NUM_MODULES];

        for (i, offset) in self.offsets.iter().enumerate() {
            let r = offset - center;
            // v = v_body + omega x r
            let vx = speeds.vx - speeds.omega * r.y;
            let vy = speeds.vy + speeds.omega * r.x;
            let speed = vx.hypot(vy);

            if speed < SPEED_EPSILON {
                states[i] = ModuleState::new(0.0, self.headings[i]);
            } else {
                let angle = normalize_angle(vy.atan2(vx));
                self.headings[i] = angle;
                states[i] = ModuleState::new(speed, angle);
            }
        }

        states
    }

    /// Least-squares body velocity from measured module states (diagnostics only)
    pub fn to_chassis_speeds(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisSpeeds {
        let mut b = SVector::<f64, ROWS>::zeros();
        for (i, state) in states.iter().enumerate() {
            let (sin, cos) = state.angle.sin_cos();
            b[2 * i] = state.speed * cos;
            b[2 * i + 1] = state.speed * sin;
        }
        let v = self.forward * b;
        ChassisSpeeds::new(v[0], v[1], v[2])
    }

    /// Least-squares twist between two sets of module positions
    ///
    /// Each module's displacement is taken along its end angle.
    pub fn to_twist(
        &self,
        start: &[ModulePosition; NUM_MODULES],
        end: &[ModulePosition; NUM_MODULES],
    ) -> Twist2d {
        let mut b = SVector::<f64, ROWS>::zeros();
        for (i, (s, e)) in start.iter().zip(end.iter()).enumerate() {
            let delta = e.distance - s.distance;
            let (sin, cos) = e.angle.sin_cos();
            b[2 * i] = delta * cos;
            b[2 * i + 1] = delta * sin;
        }
        let v = self.forward * b;
        Twist2d::new(v[0], v[1], v[2])
    }
}

/// Scale all module speeds down uniformly so none exceeds `max_speed`
///
/// Clipping modules independently would bend the path; uniform scaling keeps its shape.
pub fn desaturate_wheel_speeds(states: &mut [ModuleState], max_speed: f64) {
    let fastest = states.iter().map(|s| s.speed.abs()).fold(0.0f64, f64::max);

    if fastest > max_speed {
        let scale = max_speed / fastest;
        for state in states.iter_mut() {
            state.speed *= scale;
        }
    }
}

/// Rows [1, 0, -ry] and [0, 1, rx] per module, r relative to `center`
fn inverse_matrix(offsets: &[Vector2<f64>; NUM_MODULES], center: Vector2<f64>) -> InverseMatrix {
    let mut m = InverseMatrix::zeros();
    for (i, offset) in offsets.iter().enumerate() {
        let r = offset - center;
        m[(2 * i, 0)] = 1.0;
        m[(2 * i, 2)] = -r.y;
        m[(2 * i + 1, 1)] = 1.0;
        m[(2 * i + 1, 2)] = r.x;
    }
    m
}

fn validate_layout(offsets: &[Vector2<f64>; NUM_MODULES]) -> Result<(), KinematicsError> {
    for a in 0..NUM_MODULES {
        for b in (a + 1)..NUM_MODULES {
            if (offsets[a] - offsets[b]).norm() < LAYOUT_TOLERANCE {
                return Err(KinematicsError::DuplicateOffset { a, b });
            }
        }
    }

    let centroid: Vector2<f64> = offsets.iter().sum::<Vector2<f64>>() / NUM_MODULES as f64;
    if centroid.norm() > LAYOUT_TOLERANCE {
        return Err(KinematicsError::NotRectangular {
            reason: format!("centroid at ({:.4}, {:.4})", centroid.x, centroid.y),
        });
    }

    // With a centered centroid and distinct offsets, equal |x| and |y| leaves only the four corners
    let half_length = offsets[0].x.abs();
    let half_width = offsets[0].y.abs();
    for (i, o) in offsets.iter().enumerate() {
        if (o.x.abs() - half_length).abs() > LAYOUT_TOLERANCE
            || (o.y.abs() - half_width).abs() > LAYOUT_TOLERANCE
        {
            return Err(KinematicsError::NotRectangular {
                reason: format!("module {} at ({:.4}, {:.4})", i, o.x, o.y),
            });
        }
    }

    Ok(())
}
