// Swerve drive core for a four-module base
//
// Provides:
// - Geometry helpers (angle wrapping, poses, twists)
// - Swerve kinematics (body velocity <-> module speed and angle)
// - Per-module closed-loop control over a hardware capability interface
// - Odometry from module positions and the heading sensor
// - A drivetrain coordinator tying them together
// - Simulated hardware for running without a robot

mod drivetrain;
pub mod geometry;
pub mod hardware;
pub mod kinematics;
mod module;
pub mod odometry;
pub mod pid;
pub mod sim;

pub use drivetrain::{CENTROID, Drivetrain, DrivetrainError, MODULE_NAMES};
pub use geometry::{Pose2d, Twist2d};
pub use hardware::{HardwareError, HeadingSensor, ModuleEffort, ModuleIo};
pub use kinematics::{ChassisSpeeds, ModulePosition, ModuleState, NUM_MODULES, SwerveKinematics};
pub use module::{ModuleHealth, ModuleTuning, SwerveModule, optimize};
pub use odometry::SwerveOdometry;
pub use pid::{PidController, PidGains};
