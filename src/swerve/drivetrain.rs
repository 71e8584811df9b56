// Drivetrain coordinator for the four-module swerve base
//
// Owns the modules, kinematics, heading sensor and odometry. The host calls `drive` and
// `periodic` once per control cycle; nothing here blocks or keeps a command queue.

use tracing::{debug, info, warn};

use super::geometry::Pose2d;
use super::hardware::{HeadingSensor, ModuleEffort, ModuleIo};
use super::kinematics::{
    ChassisSpeeds, KinematicsError, ModulePosition, ModuleState, NUM_MODULES, SwerveKinematics,
    desaturate_wheel_speeds,
};
use super::module::{ModuleHealth, SwerveModule};
use super::odometry::SwerveOdometry;
use crate::config::{ConfigError, DrivetrainConfig};

/// Module names, in kinematics order
pub const MODULE_NAMES: [&str; NUM_MODULES] = ["front_left", "front_right", "back_left", "back_right"];

/// Default center of rotation: the platform centroid
pub const CENTROID: [f64; 2] = [0.0, 0.0];

/// Error types for drivetrain construction
#[derive(Debug, thiserror::Error)]
pub enum DrivetrainError {
    #[error("Invalid module geometry: {0}")]
    Kinematics(#[from] KinematicsError),

    #[error("Kinematics expects {expected} modules but {found} are installed")]
    ModuleCount { expected: usize, found: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Four-module swerve drivetrain
pub struct Drivetrain<M: ModuleIo, G: HeadingSensor> {
    max_speed: f64,
    period: f64,
    kinematics: SwerveKinematics,
    modules: [SwerveModule<M>; NUM_MODULES],
    gyro: G,
    /// Last valid sensor heading
    heading: f64,
    odometry: SwerveOdometry,
}

impl<M: ModuleIo, G: HeadingSensor> Drivetrain<M, G> {
    /// Create a drivetrain whose pose starts at the origin, facing the current sensor heading
    pub fn new(config: &DrivetrainConfig, modules: Vec<M>, gyro: G) -> Result<Self, DrivetrainError> {
        Self::build(config, modules, gyro, None)
    }

    /// Create a drivetrain whose pose starts at `initial_pose`
    pub fn with_initial_pose(
        config: &DrivetrainConfig,
        modules: Vec<M>,
        gyro: G,
        initial_pose: Pose2d,
    ) -> Result<Self, DrivetrainError> {
        Self::build(config, modules, gyro, Some(initial_pose))
    }

    fn build(
        config: &DrivetrainConfig,
        modules: Vec<M>,
        mut gyro: G,
        initial_pose: Option<Pose2d>,
    ) -> Result<Self, DrivetrainError> {
        config.validate()?;
        let mut kinematics = SwerveKinematics::new(&config.module_offsets)?;

        let expected = kinematics.offsets().len();
        if modules.len() != expected {
            return Err(DrivetrainError::ModuleCount {
                expected,
                found: modules.len(),
            });
        }

        let found = modules.len();
        let modules: [SwerveModule<M>; NUM_MODULES] = modules
            .into_iter()
            .zip(MODULE_NAMES)
            .map(|(io, name)| SwerveModule::new(name, io, config.tuning, config.control_period))
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| DrivetrainError::ModuleCount { expected, found })?;

        // Hold the wheels where they are until the first real command
        kinematics.reset_headings(std::array::from_fn(|i| modules[i].state().angle));

        let heading = match gyro.read_heading() {
            Ok(h) if h.is_finite() => h,
            Ok(h) => {
                warn!("Heading sensor returned {}, assuming 0", h);
                0.0
            }
            Err(e) => {
                warn!("Heading sensor unavailable at startup ({}), assuming 0", e);
                0.0
            }
        };

        let positions = std::array::from_fn(|i| modules[i].position());
        let initial_pose = initial_pose.unwrap_or(Pose2d::new(0.0, 0.0, heading));
        let odometry = SwerveOdometry::new(kinematics.clone(), heading, positions, initial_pose);

        info!(
            "Drivetrain ready: max speed {} m/s, period {} s, offsets {:?}",
            config.max_speed,
            config.control_period,
            kinematics.offsets()
        );

        Ok(Self {
            max_speed: config.max_speed,
            period: config.control_period,
            kinematics,
            modules,
            gyro,
            heading,
            odometry,
        })
    }

    /// Read the heading sensor, falling back to the last valid value
    fn read_heading(&mut self) -> f64 {
        match self.gyro.read_heading() {
            Ok(h) if h.is_finite() => self.heading = h,
            Ok(h) => debug!("Ignoring non-finite heading {}", h),
            Err(e) => debug!("Heading read failed ({}), using last value", e),
        }
        self.heading
    }

    /// Command the base and update odometry; returns the module targets after speed limiting
    ///
    /// Field-relative commands are rotated into the robot frame by the sensor heading.
    /// `center_of_rotation` is relative to the platform centroid, see [`CENTROID`].
    pub fn drive(
        &mut self,
        speeds: ChassisSpeeds,
        field_relative: bool,
        center_of_rotation: [f64; 2],
    ) -> [ModuleState; NUM_MODULES] {
        let heading = self.read_heading();

        let robot_speeds = if field_relative {
            ChassisSpeeds::from_field_relative(speeds.vx, speeds.vy, speeds.omega, heading)
        } else {
            speeds
        };

        let discrete = robot_speeds.discretize(self.period);
        let mut states = self.kinematics.to_module_states(discrete, center_of_rotation);
        desaturate_wheel_speeds(&mut states, self.max_speed);

        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_target(state);
        }

        self.update_odometry_with(heading);
        states
    }

    /// Stop all wheels, keeping their steering angles
    pub fn stop(&mut self) -> [ModuleState; NUM_MODULES] {
        self.drive(ChassisSpeeds::zero(), false, CENTROID)
    }

    /// Run every module's control loop once
    pub fn periodic(&mut self) -> [ModuleHealth; NUM_MODULES] {
        std::array::from_fn(|i| self.modules[i].periodic_update())
    }

    /// Fold the latest module positions and heading into the pose estimate
    pub fn update_odometry(&mut self) -> Pose2d {
        let heading = self.read_heading();
        self.update_odometry_with(heading)
    }

    fn update_odometry_with(&mut self, heading: f64) -> Pose2d {
        let positions = self.module_positions();
        self.odometry.update(heading, positions)
    }

    /// Zero the heading sensor; the pose keeps its position and faces 0
    pub fn reset_heading(&mut self) {
        if let Err(e) = self.gyro.reset_heading() {
            warn!("Failed to reset heading sensor: {}", e);
        }
        let heading = self.read_heading();
        let pose = self.odometry.pose();
        let positions = self.module_positions();
        self.odometry
            .reset_position(heading, positions, Pose2d::new(pose.x, pose.y, 0.0));
        info!("Heading reset at ({:.3}, {:.3})", pose.x, pose.y);
    }

    /// Re-zero the pose estimate
    pub fn reset_pose(&mut self, pose: Pose2d) {
        let heading = self.read_heading();
        let positions = self.module_positions();
        self.odometry.reset_position(heading, positions, pose);
        info!("Pose reset to {:?}", pose);
    }

    /// Current pose estimate (a copy)
    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    pub fn module_states(&self) -> [ModuleState; NUM_MODULES] {
        std::array::from_fn(|i| self.modules[i].state())
    }

    pub fn module_positions(&self) -> [ModulePosition; NUM_MODULES] {
        std::array::from_fn(|i| self.modules[i].position())
    }

    pub fn module_targets(&self) -> [ModuleState; NUM_MODULES] {
        std::array::from_fn(|i| self.modules[i].target())
    }

    pub fn module_efforts(&self) -> [ModuleEffort; NUM_MODULES] {
        std::array::from_fn(|i| self.modules[i].last_effort())
    }

    /// Body velocity reconstructed from measured module states
    pub fn estimated_chassis_speeds(&self) -> ChassisSpeeds {
        self.kinematics.to_chassis_speeds(&self.module_states())
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn heading_sensor_mut(&mut self) -> &mut G {
        &mut self.gyro
    }

    pub fn module_io(&self, index: usize) -> Option<&M> {
        self.modules.get(index).map(|m| m.io())
    }

    pub fn module_io_mut(&mut self, index: usize) -> Option<&mut M> {
        self.modules.get_mut(index).map(|m| m.io_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swerve::geometry::angle_error;
    use crate::swerve::hardware::HardwareError;
    use crate::swerve::sim::{SimGyro, SimModule};
    use std::collections::VecDeque;
    use std::f64::consts::FRAC_PI_2;

    const DT: f64 = 0.02;

    fn sim_modules(config: &DrivetrainConfig, count: usize) -> Vec<SimModule> {
        (0..count)
            .map(|_| SimModule::new(config.max_speed, 4.0 * std::f64::consts::PI, DT))
            .collect()
    }

    fn sim_drivetrain() -> Drivetrain<SimModule, SimGyro> {
        let config = DrivetrainConfig::default();
        Drivetrain::new(&config, sim_modules(&config, 4), SimGyro::default()).unwrap()
    }

    /// Heading sensor that replays queued readings; `None` is a timeout
    struct ScriptedGyro {
        readings: VecDeque<Option<f64>>,
        last: f64,
    }

    impl ScriptedGyro {
        fn new(readings: impl IntoIterator<Item = Option<f64>>) -> Self {
            Self {
                readings: readings.into_iter().collect(),
                last: 0.0,
            }
        }
    }

    impl HeadingSensor for ScriptedGyro {
        fn read_heading(&mut self) -> Result<f64, HardwareError> {
            match self.readings.pop_front() {
                Some(Some(h)) => {
                    self.last = h;
                    Ok(h)
                }
                Some(None) => Err(HardwareError::Timeout { channel: "heading" }),
                None => Ok(self.last),
            }
        }

        fn reset_heading(&mut self) -> Result<(), HardwareError> {
            self.last = 0.0;
            Ok(())
        }
    }

    fn scripted_drivetrain(gyro: ScriptedGyro) -> Drivetrain<SimModule, ScriptedGyro> {
        let config = DrivetrainConfig::default();
        Drivetrain::new(&config, sim_modules(&config, 4), gyro).unwrap()
    }

    /// One host cycle: command, control, then let the gyro follow the base
    fn step(base: &mut Drivetrain<SimModule, SimGyro>, speeds: ChassisSpeeds, field_relative: bool) {
        base.drive(speeds, field_relative, CENTROID);
        base.periodic();
        let omega = base.estimated_chassis_speeds().omega;
        base.heading_sensor_mut().integrate(omega, DT);
    }

    #[test]
    fn test_forward_command_targets() {
        let mut base = sim_drivetrain();
        let states = base.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), false, CENTROID);
        for state in states {
            assert!((state.speed - 1.0).abs() < 1e-9);
            assert!(state.angle.abs() < 1e-9);
            assert!(state.speed <= base.max_speed());
        }
        assert_eq!(base.module_targets(), states);
    }

    #[test]
    fn test_saturated_command_scales_all_modules() {
        let mut base = sim_drivetrain();
        let command = ChassisSpeeds::new(2.5, 0.0, 3.0);

        let mut raw_kinematics =
            SwerveKinematics::new(&DrivetrainConfig::default().module_offsets).unwrap();
        let raw = raw_kinematics.to_module_states(command.discretize(DT), CENTROID);
        let fastest = raw.iter().map(|s| s.speed).fold(0.0, f64::max);
        assert!(fastest > 3.0);

        let states = base.drive(command, false, CENTROID);
        let scale = 3.0 / fastest;
        for (scaled, raw) in states.iter().zip(raw.iter()) {
            assert!((scaled.speed - raw.speed * scale).abs() < 1e-9);
            assert!((scaled.angle - raw.angle).abs() < 1e-9);
        }
        let top = states.iter().map(|s| s.speed).fold(0.0, f64::max);
        assert!((top - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_holds_angles() {
        let mut base = sim_drivetrain();
        base.drive(ChassisSpeeds::new(0.0, 1.0, 0.0), false, CENTROID);
        let states = base.stop();
        for state in states {
            assert_eq!(state.speed, 0.0);
            assert!((state.angle - FRAC_PI_2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_startup_holds_measured_angles() {
        let config = DrivetrainConfig::default();
        let modules = sim_modules(&config, 4)
            .into_iter()
            .map(|m| m.with_angle(0.5))
            .collect();
        let mut base = Drivetrain::new(&config, modules, SimGyro::default()).unwrap();
        for state in base.stop() {
            assert_eq!(state.speed, 0.0);
            assert!((state.angle - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_field_relative_uses_heading() {
        let config = DrivetrainConfig::default();
        let mut base =
            Drivetrain::new(&config, sim_modules(&config, 4), SimGyro::new(FRAC_PI_2)).unwrap();
        // Facing field +y: field-forward means driving robot-right
        let states = base.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), true, CENTROID);
        for state in states {
            assert!((state.speed.abs() - 1.0).abs() < 1e-9);
            assert!(angle_error(state.angle, -FRAC_PI_2).abs() < 1e-9);
        }
        // Initial pose faces the sensor heading
        assert!((base.pose().heading - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_startup_heading_fault_assumes_zero() {
        let mut base = scripted_drivetrain(ScriptedGyro::new([None, Some(1.0)]));
        assert_eq!(base.pose().heading, 0.0);
        // First valid reading afterwards is taken as is
        assert!((base.update_odometry().heading - 1.0).abs() < 1e-12);

        let base = scripted_drivetrain(ScriptedGyro::new([Some(f64::NAN)]));
        assert_eq!(base.pose(), Pose2d::origin());
    }

    #[test]
    fn test_heading_fault_uses_last_valid_heading() {
        let mut base = scripted_drivetrain(ScriptedGyro::new([
            Some(FRAC_PI_2),
            Some(f64::NAN),
            None,
        ]));

        // NaN read: field-relative rotation still uses π/2
        let states = base.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), true, CENTROID);
        for state in states {
            assert!((state.speed.abs() - 1.0).abs() < 1e-9);
            assert!(angle_error(state.angle, -FRAC_PI_2).abs() < 1e-9, "state = {:?}", state);
        }

        // Timed-out read: pose keeps the last valid heading
        let pose = base.update_odometry();
        assert!((pose.heading - FRAC_PI_2).abs() < 1e-12);
        assert!(pose.x.is_finite() && pose.y.is_finite());
    }

    #[test]
    fn test_rejects_wrong_module_count() {
        let config = DrivetrainConfig::default();
        let result = Drivetrain::new(&config, sim_modules(&config, 3), SimGyro::default());
        assert!(matches!(
            result,
            Err(DrivetrainError::ModuleCount {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        let config = DrivetrainConfig {
            module_offsets: vec![[0.5, 0.5], [0.5, 0.5], [-0.5, 0.5], [-0.5, -0.5]],
            ..Default::default()
        };
        let result = Drivetrain::new(&config, sim_modules(&config, 4), SimGyro::default());
        assert!(matches!(result, Err(DrivetrainError::Kinematics(_))));
    }

    #[test]
    fn test_idle_cycles_leave_pose_unchanged() {
        let config = DrivetrainConfig::default();
        let start = Pose2d::new(1.0, 2.0, 0.0);
        let mut base = Drivetrain::with_initial_pose(
            &config,
            sim_modules(&config, 4),
            SimGyro::default(),
            start,
        )
        .unwrap();

        for _ in 0..100 {
            step(&mut base, ChassisSpeeds::zero(), false);
        }
        assert_eq!(base.update_odometry(), start);
    }

    #[test]
    fn test_closed_loop_drives_forward() {
        let mut base = sim_drivetrain();
        for _ in 0..50 {
            step(&mut base, ChassisSpeeds::new(1.0, 0.0, 0.0), false);
        }
        let pose = base.update_odometry();
        let measured = base.module_positions()[0].distance;
        assert!((pose.x - measured).abs() < 1e-9);
        // Odometry trails the simulated wheel by at most one cycle
        let travelled = base.module_io(0).unwrap().distance();
        assert!((travelled - pose.x).abs() < 0.1);
        assert!(pose.x > 0.9 && pose.x < 1.1, "x = {}", pose.x);
        assert!(pose.y.abs() < 1e-9);

        let speeds = base.estimated_chassis_speeds();
        assert!((speeds.vx - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_closed_loop_strafe_steers_modules() {
        let mut base = sim_drivetrain();
        for _ in 0..100 {
            step(&mut base, ChassisSpeeds::new(0.0, 1.0, 0.0), false);
        }
        for state in base.module_states() {
            // Either pointed left driving forward, or pointed right driving backward
            let along_y = state.speed * state.angle.sin();
            assert!((along_y - 1.0).abs() < 0.05, "state = {:?}", state);
        }
        assert!(base.pose().y > 1.0);
    }

    #[test]
    fn test_reset_heading_keeps_position() {
        let config = DrivetrainConfig::default();
        let mut base =
            Drivetrain::new(&config, sim_modules(&config, 4), SimGyro::new(1.0)).unwrap();
        base.reset_pose(Pose2d::new(3.0, -1.0, 1.0));

        base.reset_heading();
        let pose = base.update_odometry();
        assert_eq!(pose, Pose2d::new(3.0, -1.0, 0.0));
    }

    #[test]
    fn test_telemetry_loss_reported_per_module() {
        let mut base = sim_drivetrain();
        base.drive(ChassisSpeeds::new(1.0, 0.0, 0.0), false, CENTROID);
        base.periodic();

        base.module_io_mut(2).unwrap().fail_reads(2);
        let health = base.periodic();
        assert_eq!(health[2], ModuleHealth::Holding);
        assert_eq!(health[0], ModuleHealth::Ok);

        let health = base.periodic();
        assert_eq!(health[2], ModuleHealth::NoValidTarget);
        assert_eq!(base.module_efforts()[2], ModuleEffort::zero());

        assert_eq!(base.periodic()[2], ModuleHealth::Ok);
    }
}
