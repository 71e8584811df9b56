// Keyboard teleop: WASD move, Z/X rotate, R/F speed, T field-relative, 1-4 pivot corner,
// 0 pivot center, G reset heading, Q quit
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{DrivetrainConfig, TOPIC_CMD_DRIVE, TOPIC_CMD_RESET};
use swerve_zenoh_runtime::messages::{DriveCommand, ResetCommand};
use swerve_zenoh_runtime::swerve::MODULE_NAMES;

const SPEED_LEVELS: [f64; 3] = [0.15, 0.4, 1.0]; // fraction of max speed
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

/// Keyboard teleop for the swerve runtime
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Drivetrain config (TOML) the runtime was started with; pivot keys use its module offsets
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let config = DrivetrainConfig::load_or_default(args.config.as_deref())?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_drive = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    let pub_reset = session.declare_publisher(TOPIC_CMD_RESET).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, T=field-relative, 1-4/0=pivot, G=reset heading, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&config, &pub_drive, &pub_reset).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    config: &DrivetrainConfig,
    pub_drive: &zenoh::pubsub::Publisher<'_>,
    pub_reset: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut field_relative = false;
    let mut center_of_rotation: Option<[f64; 2]> = None;

    // Persistent velocity state
    let mut x_vel = 0.0;
    let mut y_vel = 0.0;
    let mut theta_vel = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        let linear = SPEED_LEVELS[speed_idx] * config.max_speed;
        let angular = SPEED_LEVELS[speed_idx] * config.max_angular_speed;

        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - update velocity and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        x_vel = linear;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        x_vel = -linear;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        y_vel = linear;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        y_vel = -linear;
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        theta_vel = angular;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        theta_vel = -angular;
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(SPEED_LEVELS.len() - 1);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Driving mode
                    KeyCode::Char('t') if pressed => {
                        field_relative = !field_relative;
                        info!("Field-relative: {}", field_relative);
                    }
                    KeyCode::Char(c @ '1'..='4') if pressed => {
                        let idx = c as usize - '1' as usize;
                        center_of_rotation = config.module_offsets.get(idx).copied();
                        info!("Pivot: {}", MODULE_NAMES[idx]);
                    }
                    KeyCode::Char('0') if pressed => {
                        center_of_rotation = None;
                        info!("Pivot: center");
                    }
                    KeyCode::Char('g') if pressed => {
                        pub_reset
                            .put(serde_json::to_string(&ResetCommand::Heading)?)
                            .await?;
                        info!("Heading reset requested");
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            x_vel = 0.0;
            y_vel = 0.0;
            theta_vel = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = DriveCommand {
            x_vel,
            y_vel,
            theta_vel,
            field_relative,
            center_of_rotation,
        };
        pub_drive.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
