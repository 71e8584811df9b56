// Timeouts, topics, drivetrain configuration
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use std::time::Duration;

use crate::swerve::{ModuleTuning, PidGains};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "swerve/cmd/drive"; // drive commands
pub const TOPIC_CMD_RESET: &str = "swerve/cmd/reset"; // heading / pose re-zero
pub const TOPIC_STATE_POSE: &str = "swerve/state/pose"; // odometry
pub const TOPIC_STATE_MODULES: &str = "swerve/state/modules"; // per-module telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Platform limits
pub const MAX_SPEED: f64 = 3.0; // m/s
pub const MAX_ANGULAR_SPEED: f64 = PI; // rad/s, half a rotation per second

// Square 3ft x 3ft frame, modules at the corners
pub const FRAME_SIDE: f64 = 0.9144; // meters

/// Error types for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Drivetrain parameters, loadable from TOML
///
/// Missing fields fall back to the defaults for the 3ft square base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    /// Maximum wheel speed in m/s; module targets are scaled to stay under it
    pub max_speed: f64,
    /// Maximum rotational speed in rad/s, used to scale normalized operator input
    pub max_angular_speed: f64,
    /// Control period in seconds
    pub control_period: f64,
    /// Module offsets [x, y] in meters: front-left, front-right, back-left, back-right
    pub module_offsets: Vec<[f64; 2]>,
    pub tuning: ModuleTuning,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        let half = FRAME_SIDE / 2.0;
        Self {
            max_speed: MAX_SPEED,
            max_angular_speed: MAX_ANGULAR_SPEED,
            control_period: 1.0 / LOOP_HZ as f64,
            module_offsets: vec![[half, half], [half, -half], [-half, half], [-half, -half]],
            tuning: ModuleTuning {
                drive_pid: PidGains::new(0.1, 0.0, 0.0),
                steer_pid: PidGains::new(1.5, 0.0, 0.0),
                drive_kv: 1.0 / MAX_SPEED,
            },
        }
    }
}

impl DrivetrainConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DrivetrainConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the built-in base
    ///
    /// The runtime and teleop both go through here so they agree on the module layout.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check scalar limits; the module layout is checked when kinematics is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("max_speed", self.max_speed)?;
        require_positive("max_angular_speed", self.max_angular_speed)?;
        require_positive("control_period", self.control_period)
    }
}

fn require_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}
