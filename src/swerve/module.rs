// Closed-loop controller for one swerve module
//
// Each cycle: read telemetry, run the drive speed loop and the steer angle loop,
// write the resulting effort. Targets are set separately and never actuate on their own.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use tracing::{debug, warn};

use super::geometry::{angle_error, normalize_angle};
use super::hardware::{HardwareError, ModuleEffort, ModuleIo, Result};
use super::kinematics::{ModulePosition, ModuleState};
use super::pid::{PidController, PidGains};

/// Consecutive failed reads tolerated before the module stops driving
const MAX_HELD_CYCLES: u32 = 1;

/// Gains for the two module loops
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleTuning {
    /// Drive speed loop (m/s in, normalized effort out)
    pub drive_pid: PidGains,
    /// Steer angle loop (radians in, normalized effort out)
    pub steer_pid: PidGains,
    /// Drive feedforward, effort per m/s
    pub drive_kv: f64,
}

/// Outcome of one module update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleHealth {
    Ok,
    /// Telemetry missing this cycle, previous effort re-applied
    Holding,
    /// Telemetry missing for several cycles, output zeroed
    NoValidTarget,
}

/// Pick the equivalent target that needs the least steering
///
/// Flipping the wheel direction and turning by π gives the same motion, so the steer delta
/// never has to exceed a quarter turn.
pub fn optimize(target: ModuleState, current_angle: f64) -> ModuleState {
    let delta = angle_error(target.angle, current_angle);
    if delta.abs() > FRAC_PI_2 {
        ModuleState::new(-target.speed, normalize_angle(target.angle + PI))
    } else {
        ModuleState::new(target.speed, normalize_angle(target.angle))
    }
}

fn checked(channel: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(HardwareError::OutOfRange { channel, value })
    }
}

/// One drive + steer module
pub struct SwerveModule<M: ModuleIo> {
    name: &'static str,
    io: M,
    drive_pid: PidController,
    steer_pid: PidController,
    drive_kv: f64,
    period: f64,
    target: ModuleState,
    state: ModuleState,
    position: ModulePosition,
    last_effort: ModuleEffort,
    missed_reads: u32,
}

impl<M: ModuleIo> SwerveModule<M> {
    /// Create a module controller running at a fixed `period` (seconds)
    pub fn new(name: &'static str, io: M, tuning: ModuleTuning, period: f64) -> Self {
        let mut drive_pid = PidController::new(tuning.drive_pid);
        drive_pid.set_output_limits(-1.0, 1.0);

        let mut steer_pid = PidController::new(tuning.steer_pid);
        steer_pid.set_output_limits(-1.0, 1.0);
        steer_pid.enable_continuous_input();

        let mut module = Self {
            name,
            io,
            drive_pid,
            steer_pid,
            drive_kv: tuning.drive_kv,
            period,
            target: ModuleState::default(),
            state: ModuleState::default(),
            position: ModulePosition::default(),
            last_effort: ModuleEffort::zero(),
            missed_reads: 0,
        };

        // Start by holding whatever angle the wheel is already at
        match module.read_telemetry() {
            Ok((state, position)) => {
                module.state = state;
                module.position = position;
                module.set_target(ModuleState::new(0.0, state.angle));
            }
            Err(e) => warn!("Module {} initial telemetry unavailable: {}", name, e),
        }

        module
    }

    /// Set a new target, optimized against the last measured angle
    pub fn set_target(&mut self, target: ModuleState) {
        let optimized = optimize(target, self.state.angle);
        self.target = optimized;
        self.drive_pid.set_set_point(optimized.speed);
        self.steer_pid.set_set_point(optimized.angle);
    }

    /// Current (optimized) target
    pub fn target(&self) -> ModuleState {
        self.target
    }

    /// Last valid measured speed and angle
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Last valid measured distance and angle
    pub fn position(&self) -> ModulePosition {
        self.position
    }

    /// Effort written on the most recent cycle
    pub fn last_effort(&self) -> ModuleEffort {
        self.last_effort
    }

    pub fn io(&self) -> &M {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut M {
        &mut self.io
    }

    fn read_telemetry(&mut self) -> Result<(ModuleState, ModulePosition)> {
        let speed = checked("speed", self.io.read_speed()?)?;
        let angle = normalize_angle(checked("angle", self.io.read_angle()?)?);
        let distance = checked("distance", self.io.read_distance()?)?;
        Ok((
            ModuleState::new(speed, angle),
            ModulePosition::new(distance, angle),
        ))
    }

    /// Run both loops once and write the effort to hardware
    pub fn periodic_update(&mut self) -> ModuleHealth {
        let (effort, health) = match self.read_telemetry() {
            Ok((state, position)) => {
                self.missed_reads = 0;
                self.state = state;
                self.position = position;

                let drive = (self.drive_kv * self.target.speed
                    + self.drive_pid.update(state.speed, self.period))
                .clamp(-1.0, 1.0);
                let steer = self.steer_pid.update(state.angle, self.period);
                (ModuleEffort::new(drive, steer), ModuleHealth::Ok)
            }
            Err(e) => {
                self.missed_reads = self.missed_reads.saturating_add(1);
                if self.missed_reads <= MAX_HELD_CYCLES {
                    debug!("Module {} telemetry missed ({}), holding effort", self.name, e);
                    (self.last_effort, ModuleHealth::Holding)
                } else {
                    if self.missed_reads == MAX_HELD_CYCLES + 1 {
                        warn!(
                            "Module {} telemetry lost for {} cycles, zeroing output: {}",
                            self.name, self.missed_reads, e
                        );
                    }
                    self.drive_pid.reset();
                    self.steer_pid.reset();
                    (ModuleEffort::zero(), ModuleHealth::NoValidTarget)
                }
            }
        };

        if let Err(e) = self.io.write_effort(effort) {
            warn!("Module {} failed to write effort: {}", self.name, e);
        }
        self.last_effort = effort;

        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const DT: f64 = 0.02;

    fn tuning() -> ModuleTuning {
        ModuleTuning {
            drive_pid: PidGains::new(0.1, 0.0, 0.0),
            steer_pid: PidGains::new(1.0, 0.0, 0.0),
            drive_kv: 1.0 / 3.0,
        }
    }

    /// Scripted hardware: each queued `true` makes the next speed read fail
    #[derive(Default)]
    struct ScriptedIo {
        angle: f64,
        speed: f64,
        failures: VecDeque<bool>,
        written: Vec<ModuleEffort>,
    }

    impl ScriptedIo {
        fn fails(&mut self) -> bool {
            self.failures.pop_front().unwrap_or(false)
        }
    }

    impl ModuleIo for ScriptedIo {
        fn read_speed(&mut self) -> Result<f64> {
            if self.fails() {
                Err(HardwareError::Timeout { channel: "speed" })
            } else {
                Ok(self.speed)
            }
        }

        fn read_angle(&mut self) -> Result<f64> {
            Ok(self.angle)
        }

        fn read_distance(&mut self) -> Result<f64> {
            Ok(0.0)
        }

        fn write_effort(&mut self, effort: ModuleEffort) -> Result<()> {
            self.written.push(effort);
            Ok(())
        }
    }

    fn module_at(angle_deg: f64) -> SwerveModule<ScriptedIo> {
        let io = ScriptedIo {
            angle: angle_deg.to_radians(),
            ..Default::default()
        };
        SwerveModule::new("test", io, tuning(), DT)
    }

    #[test]
    fn test_optimize_never_exceeds_quarter_turn() {
        for current in (0..360).step_by(15) {
            for target in (0..360).step_by(7) {
                let current = (current as f64).to_radians();
                let state = ModuleState::new(1.0, (target as f64).to_radians());
                let optimized = optimize(state, current);
                let delta = angle_error(optimized.angle, current);
                assert!(delta.abs() <= FRAC_PI_2 + 1e-9);
                assert!((optimized.speed.abs() - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_optimize_flips_reverse_target() {
        let optimized = optimize(ModuleState::new(2.0, PI), 0.0);
        assert!((optimized.speed + 2.0).abs() < 1e-12);
        assert!(optimized.angle.abs() < 1e-9 || (optimized.angle - 2.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn test_new_holds_measured_angle() {
        let module = module_at(42.0);
        assert_eq!(module.target().speed, 0.0);
        assert!((module.target().angle - 42f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_steer_crosses_seam_short_way() {
        let mut module = module_at(350.0);
        module.set_target(ModuleState::new(0.0, 10f64.to_radians()));
        assert_eq!(module.periodic_update(), ModuleHealth::Ok);
        // 20 degrees counter-clockwise, not 340 clockwise
        let steer = module.last_effort().steer;
        assert!((steer - 20f64.to_radians()).abs() < 1e-9, "steer = {}", steer);
    }

    #[test]
    fn test_drive_feedforward_and_feedback() {
        let mut module = module_at(0.0);
        module.set_target(ModuleState::new(1.5, 0.0));
        module.periodic_update();
        // kv * 1.5 + kp * (1.5 - 0)
        let expected = 1.5 / 3.0 + 0.1 * 1.5;
        assert!((module.last_effort().drive - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missed_read_holds_then_zeroes() {
        let mut module = module_at(0.0);
        module.set_target(ModuleState::new(1.5, 0.3));
        assert_eq!(module.periodic_update(), ModuleHealth::Ok);
        let good = module.last_effort();

        module.io_mut().failures.extend([true, true, true]);
        assert_eq!(module.periodic_update(), ModuleHealth::Holding);
        assert_eq!(module.last_effort(), good);

        assert_eq!(module.periodic_update(), ModuleHealth::NoValidTarget);
        assert_eq!(module.last_effort(), ModuleEffort::zero());
        assert_eq!(module.periodic_update(), ModuleHealth::NoValidTarget);

        // Recovers as soon as telemetry is back
        assert_eq!(module.periodic_update(), ModuleHealth::Ok);
        assert!(module.last_effort().drive > 0.0);
        assert_eq!(module.io().written.len(), 5);
    }

    #[test]
    fn test_sustained_fault_count_saturates() {
        let mut module = module_at(0.0);
        module.missed_reads = u32::MAX;
        module.io_mut().failures.push_back(true);
        assert_eq!(module.periodic_update(), ModuleHealth::NoValidTarget);
        assert_eq!(module.missed_reads, u32::MAX);
        assert_eq!(module.last_effort(), ModuleEffort::zero());
    }

    #[test]
    fn test_non_finite_reading_is_a_fault() {
        let mut module = module_at(0.0);
        module.io_mut().speed = f64::NAN;
        assert_eq!(module.periodic_update(), ModuleHealth::Holding);
        // Last valid state is kept
        assert_eq!(module.state().speed, 0.0);
    }
}
