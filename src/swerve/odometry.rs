// Dead-reckoning pose from module positions and the heading sensor
//
// Wheel displacement gives the translation; the heading sensor is authoritative for rotation.

use super::geometry::{Pose2d, Twist2d, angle_error};
use super::kinematics::{ModulePosition, NUM_MODULES, SwerveKinematics};

/// Running pose estimate for a swerve base
#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    kinematics: SwerveKinematics,
    pose: Pose2d,
    /// Added to the raw sensor heading to get the field heading
    heading_offset: f64,
    previous_heading: f64,
    previous_positions: [ModulePosition; NUM_MODULES],
}

impl SwerveOdometry {
    /// Start at `initial_pose`, given the sensor heading and module positions at that moment
    pub fn new(
        kinematics: SwerveKinematics,
        sensor_heading: f64,
        positions: [ModulePosition; NUM_MODULES],
        initial_pose: Pose2d,
    ) -> Self {
        Self {
            kinematics,
            pose: initial_pose,
            heading_offset: initial_pose.heading - sensor_heading,
            previous_heading: initial_pose.heading,
            previous_positions: positions,
        }
    }

    /// Current pose estimate (a copy)
    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Re-zero the estimate to `pose` without touching the sensor
    pub fn reset_position(
        &mut self,
        sensor_heading: f64,
        positions: [ModulePosition; NUM_MODULES],
        pose: Pose2d,
    ) {
        self.pose = pose;
        self.heading_offset = pose.heading - sensor_heading;
        self.previous_heading = pose.heading;
        self.previous_positions = positions;
    }

    /// Integrate one cycle of module motion and return the new pose
    pub fn update(
        &mut self,
        sensor_heading: f64,
        positions: [ModulePosition; NUM_MODULES],
    ) -> Pose2d {
        let heading = sensor_heading + self.heading_offset;

        let wheel_twist = self
            .kinematics
            .to_twist(&self.previous_positions, &positions);
        // Sensors may wrap at any seam; only the shortest-arc change counts
        let twist = Twist2d {
            dtheta: angle_error(heading, self.previous_heading),
            ..wheel_twist
        };

        let moved = self.pose.exp(twist);
        self.pose = Pose2d::new(moved.x, moved.y, heading);
        self.previous_heading = heading;
        self.previous_positions = positions;

        self.pose
    }
}
