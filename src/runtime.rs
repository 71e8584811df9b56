// 50 Hz loop with watchdog
// Note: the watchdog stops the base if drive commands stop arriving, eg. if teleop crashes
// The runtime is the host around the swerve core: it plays scheduler, command input and
// telemetry sink, and drives simulated module hardware through the same traits real drivers use

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, DrivetrainConfig, TOPIC_CMD_DRIVE, TOPIC_CMD_RESET, TOPIC_HEALTH,
    TOPIC_STATE_MODULES, TOPIC_STATE_POSE,
};
use crate::messages::{
    DriveCommand, ModuleTelemetry, PoseTelemetry, ResetCommand, RuntimeHealth, module_telemetry,
};
use crate::swerve::sim::{SimGyro, SimModule};
use crate::swerve::{Drivetrain, DrivetrainError, ModuleHealth, NUM_MODULES, Pose2d};

/// Simulated steering rate at full effort (rad/s)
const SIM_STEER_RATE: f64 = 4.0 * std::f64::consts::PI;

pub type SimDrivetrain = Drivetrain<SimModule, SimGyro>;

pub struct Runtime {
    drivetrain: SimDrivetrain,
    period: f64,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(config: &DrivetrainConfig) -> Result<Self, DrivetrainError> {
        let modules = (0..NUM_MODULES)
            .map(|_| SimModule::new(config.max_speed, SIM_STEER_RATE, config.control_period))
            .collect();
        let drivetrain = Drivetrain::new(config, modules, SimGyro::default())?;

        Ok(Self {
            drivetrain,
            period: config.control_period,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        })
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn drivetrain(&self) -> &SimDrivetrain {
        &self.drivetrain
    }

    /// Loop tick; matches the period the controllers and discretization assume
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.period)
    }

    /// Process incoming command
    fn on_command(&mut self, cmd: DriveCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Process a re-zero request
    fn on_reset(&mut self, reset: ResetCommand) {
        info!("Received reset: {:?}", &reset);
        match reset {
            ResetCommand::Heading => self.drivetrain.reset_heading(),
            ResetCommand::Pose { x, y, heading } => {
                self.drivetrain.reset_pose(Pose2d::new(x, y, heading))
            }
        }
    }

    /// Run one control cycle: command (or stop, if the watchdog fired), module loops, sim step
    fn step(&mut self) -> (PoseTelemetry, Vec<ModuleTelemetry>) {
        let cmd_age = self.cmd_received_at.elapsed();

        let stale = match self.latest_cmd {
            Some(ref cmd) if cmd_age <= CMD_TIMEOUT => {
                let (speeds, field_relative, center) =
                    (cmd.speeds(), cmd.field_relative, cmd.center());
                self.drivetrain.drive(speeds, field_relative, center);
                false
            }
            _ => {
                // Watchdog triggered (or no command ever received) - stop the robot
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age);
                }
                self.drivetrain.stop();
                true
            }
        };

        let module_health = self.drivetrain.periodic();

        // The simulated gyro follows the rotation the wheels actually produce
        let omega = self.drivetrain.estimated_chassis_speeds().omega;
        self.drivetrain
            .heading_sensor_mut()
            .integrate(omega, self.period);

        let faulted = module_health
            .iter()
            .any(|h| *h == ModuleHealth::NoValidTarget);
        self.health = if stale {
            RuntimeHealth::CmdStale
        } else if faulted {
            RuntimeHealth::ModuleFault
        } else {
            RuntimeHealth::Ok
        };

        let pose = PoseTelemetry::from(self.drivetrain.pose());
        let modules = module_telemetry(
            self.drivetrain.module_targets(),
            self.drivetrain.module_states(),
            self.drivetrain.module_positions().map(|p| p.distance),
            self.drivetrain.module_efforts(),
            module_health,
        );
        (pose, modules)
    }
}

pub async fn run(config: DrivetrainConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::new(&config)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_drive = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_reset = session.declare_subscriber(TOPIC_CMD_RESET).await?;
    let pub_pose = session.declare_publisher(TOPIC_STATE_POSE).await?;
    let pub_modules = session.declare_publisher(TOPIC_STATE_MODULES).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(runtime.tick_period());

    info!(
        "Runtime started: {:.1}Hz loop, {}ms watchdog timeout",
        1.0 / config.control_period,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_DRIVE, TOPIC_CMD_RESET);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_STATE_POSE, TOPIC_STATE_MODULES, TOPIC_HEALTH
    );

    loop {
        tick.tick().await;

        // 1. Apply pending resets before driving
        while let Ok(Some(sample)) = sub_reset.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ResetCommand>(&payload) {
                Ok(reset) => runtime.on_reset(reset),
                Err(e) => warn!("Failed to parse reset: {}", e),
            }
        }

        // 2. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_drive.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 3. Run one control cycle (includes watchdog logic)
        let (pose, modules) = runtime.step();

        // 4. Publish telemetry
        pub_pose.put(serde_json::to_string(&pose)?).await?;
        pub_modules.put(serde_json::to_string(&modules)?).await?;
        pub_health.put(serde_json::to_string(&runtime.health)?).await?;
    }
}
