// In-process simulated hardware for running the drivetrain without a robot
//
// SimModule integrates the written effort over one control period on every write, so
// telemetry read on the next cycle reflects the last command. SimGyro is advanced by the
// host with the base's rotation rate.

use super::geometry::normalize_angle;
use super::hardware::{HardwareError, HeadingSensor, ModuleEffort, ModuleIo, Result};

/// A simulated swerve module with first-order drive and rate-limited steering
#[derive(Debug, Clone)]
pub struct SimModule {
    /// Wheel speed at full drive effort (m/s)
    free_speed: f64,
    /// Steering rate at full steer effort (rad/s)
    steer_rate: f64,
    period: f64,
    speed: f64,
    angle: f64,
    distance: f64,
    failing_reads: u32,
}

impl SimModule {
    pub fn new(free_speed: f64, steer_rate: f64, period: f64) -> Self {
        Self {
            free_speed,
            steer_rate,
            period,
            speed: 0.0,
            angle: 0.0,
            distance: 0.0,
            failing_reads: 0,
        }
    }

    /// Start with the wheel pointed at `angle`
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = normalize_angle(angle);
        self
    }

    /// Make the next `cycles` speed reads time out
    pub fn fail_reads(&mut self, cycles: u32) {
        self.failing_reads = cycles;
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }
}

impl ModuleIo for SimModule {
    fn read_speed(&mut self) -> Result<f64> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(HardwareError::Timeout { channel: "speed" });
        }
        Ok(self.speed)
    }

    fn read_angle(&mut self) -> Result<f64> {
        Ok(self.angle)
    }

    fn read_distance(&mut self) -> Result<f64> {
        Ok(self.distance)
    }

    fn write_effort(&mut self, effort: ModuleEffort) -> Result<()> {
        self.speed = effort.drive.clamp(-1.0, 1.0) * self.free_speed;
        self.angle =
            normalize_angle(self.angle + effort.steer.clamp(-1.0, 1.0) * self.steer_rate * self.period);
        self.distance += self.speed * self.period;
        Ok(())
    }
}

/// A simulated gyro
#[derive(Debug, Clone, Default)]
pub struct SimGyro {
    heading: f64,
}

impl SimGyro {
    pub fn new(heading: f64) -> Self {
        Self { heading }
    }

    /// Advance the heading by `rate` rad/s over `dt` seconds
    pub fn integrate(&mut self, rate: f64, dt: f64) {
        self.heading += rate * dt;
    }
}

impl HeadingSensor for SimGyro {
    fn read_heading(&mut self) -> Result<f64> {
        Ok(self.heading)
    }

    fn reset_heading(&mut self) -> Result<()> {
        self.heading = 0.0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_module_integrates_effort() {
        let mut module = SimModule::new(3.0, 10.0, 0.02);
        module.write_effort(ModuleEffort::new(0.5, 1.0)).unwrap();
        assert_eq!(module.read_speed().unwrap(), 1.5);
        assert!((module.read_distance().unwrap() - 0.03).abs() < 1e-12);
        assert!((module.read_angle().unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_module_read_faults() {
        let mut module = SimModule::new(3.0, 10.0, 0.02);
        module.fail_reads(1);
        assert!(module.read_speed().is_err());
        assert!(module.read_speed().is_ok());
    }

    #[test]
    fn test_gyro_reset() {
        let mut gyro = SimGyro::new(FRAC_PI_2);
        gyro.integrate(1.0, 0.5);
        assert!((gyro.read_heading().unwrap() - (FRAC_PI_2 + 0.5)).abs() < 1e-12);
        gyro.reset_heading().unwrap();
        assert_eq!(gyro.read_heading().unwrap(), 0.0);
    }
}
