// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::swerve::{
    CENTROID, ChassisSpeeds, MODULE_NAMES, ModuleEffort, ModuleHealth, ModuleState, NUM_MODULES,
    Pose2d,
};

// Command from teleop/scripts -> runtime
// Velocities are m/s and rad/s; missing optional fields mean robot-relative about the centroid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    pub x_vel: f64,
    pub y_vel: f64,
    pub theta_vel: f64,
    #[serde(default)]
    pub field_relative: bool,
    /// [x, y] offset in meters from the platform centroid
    #[serde(default)]
    pub center_of_rotation: Option<[f64; 2]>,
}

impl DriveCommand {
    pub fn speeds(&self) -> ChassisSpeeds {
        ChassisSpeeds::new(self.x_vel, self.y_vel, self.theta_vel)
    }

    pub fn center(&self) -> [f64; 2] {
        self.center_of_rotation.unwrap_or(CENTROID)
    }
}

// Re-zero requests from operator/scripts -> runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reset", rename_all = "snake_case")]
pub enum ResetCommand {
    /// Zero the heading sensor, keep position
    Heading,
    /// Move the pose estimate to a known field position
    Pose { x: f64, y: f64, heading: f64 },
}

// Pose estimate from runtime -> dashboards
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PoseTelemetry {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl From<Pose2d> for PoseTelemetry {
    fn from(pose: Pose2d) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            heading: pose.heading,
        }
    }
}

// Per-module snapshot from runtime -> dashboards
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleTelemetry {
    pub name: String,
    pub target: ModuleState,
    pub measured: ModuleState,
    pub distance: f64,
    pub effort: ModuleEffort,
    pub health: ModuleHealth,
}

/// Build module telemetry from per-module arrays in kinematics order
pub fn module_telemetry(
    targets: [ModuleState; NUM_MODULES],
    measured: [ModuleState; NUM_MODULES],
    distances: [f64; NUM_MODULES],
    efforts: [ModuleEffort; NUM_MODULES],
    health: [ModuleHealth; NUM_MODULES],
) -> Vec<ModuleTelemetry> {
    (0..NUM_MODULES)
        .map(|i| ModuleTelemetry {
            name: MODULE_NAMES[i].to_string(),
            target: targets[i],
            measured: measured[i],
            distance: distances[i],
            effort: efforts[i],
            health: health[i],
        })
        .collect()
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// At least one module has no valid telemetry
    ModuleFault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_command_defaults() {
        let cmd: DriveCommand =
            serde_json::from_str(r#"{"x_vel": 1.0, "y_vel": 0.0, "theta_vel": 0.5}"#).unwrap();
        assert!(!cmd.field_relative);
        assert_eq!(cmd.center(), CENTROID);
        assert_eq!(cmd.speeds(), ChassisSpeeds::new(1.0, 0.0, 0.5));
    }

    #[test]
    fn test_drive_command_pivot() {
        let cmd: DriveCommand = serde_json::from_str(
            r#"{"x_vel": 0.0, "y_vel": 0.0, "theta_vel": 1.0,
                "field_relative": true, "center_of_rotation": [0.45, -0.45]}"#,
        )
        .unwrap();
        assert!(cmd.field_relative);
        assert_eq!(cmd.center(), [0.45, -0.45]);
    }

    #[test]
    fn test_reset_command_tags() {
        let heading: ResetCommand = serde_json::from_str(r#"{"reset": "heading"}"#).unwrap();
        assert_eq!(heading, ResetCommand::Heading);

        let pose: ResetCommand =
            serde_json::from_str(r#"{"reset": "pose", "x": 1.0, "y": 2.0, "heading": 0.0}"#)
                .unwrap();
        assert_eq!(
            pose,
            ResetCommand::Pose {
                x: 1.0,
                y: 2.0,
                heading: 0.0
            }
        );
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            "\"cmd_stale\""
        );
        assert_eq!(
            serde_json::to_string(&ModuleHealth::NoValidTarget).unwrap(),
            "\"no_valid_target\""
        );
    }
}
