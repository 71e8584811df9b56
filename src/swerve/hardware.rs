// Hardware capability interfaces for swerve modules and the heading sensor
//
// Motor controller and encoder drivers live outside this crate; each concrete module variant
// implements these traits.

use serde::{Deserialize, Serialize};

/// Error types for hardware reads and writes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HardwareError {
    #[error("Timeout reading {channel}")]
    Timeout { channel: &'static str },

    #[error("Reading from {channel} out of range: {value}")]
    OutOfRange { channel: &'static str, value: f64 },
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Closed-loop outputs for one module, each normalized to [-1, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleEffort {
    pub drive: f64,
    pub steer: f64,
}

impl ModuleEffort {
    pub fn new(drive: f64, steer: f64) -> Self {
        Self { drive, steer }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Drive and steer motors plus encoders of one swerve module
pub trait ModuleIo {
    /// Wheel speed in m/s
    fn read_speed(&mut self) -> Result<f64>;

    /// Steering angle in radians
    fn read_angle(&mut self) -> Result<f64>;

    /// Accumulated drive distance in meters
    fn read_distance(&mut self) -> Result<f64>;

    /// Apply drive and steer effort; called once per cycle
    fn write_effort(&mut self, effort: ModuleEffort) -> Result<()>;
}

/// Absolute heading source (gyro), radians counter-clockwise
pub trait HeadingSensor {
    fn read_heading(&mut self) -> Result<f64>;

    /// Zero the sensor; the next read must reflect it
    fn reset_heading(&mut self) -> Result<()>;
}
