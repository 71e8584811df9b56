// PID (proportional-integral-derivative) controller for the module loops
//
// The caller supplies the measurement once per control period and applies the returned
// output to an actuator. Angle loops enable continuous input so the error wraps and the
// controller always turns the short way round.

use serde::{Deserialize, Serialize};

use super::geometry::angle_error;

/// Proportional, integral and derivative gains
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// A PID controller with output clamping and optional wrap-around input.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    set_point: f64,
    integral: f64,
    last_error: Option<f64>,
    output_min: f64,
    output_max: f64,
    continuous: bool,
}

impl PidController {
    /// Create a new controller. Output is unclamped until [`PidController::set_output_limits`].
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            set_point: 0.0,
            integral: 0.0,
            last_error: None,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
            continuous: false,
        }
    }

    pub fn set_set_point(&mut self, set_point: f64) {
        self.set_point = set_point;
    }

    /// Clamp the output (and the integral contribution) to `[min, max]`.
    pub fn set_output_limits(&mut self, min: f64, max: f64) {
        self.output_min = min;
        self.output_max = max;
    }

    /// Treat input as an angle in radians: error is the signed shortest arc, in [-π, π).
    pub fn enable_continuous_input(&mut self) {
        self.continuous = true;
    }

    /// Error between set-point and `measurement` as the controller sees it.
    pub fn error(&self, measurement: f64) -> f64 {
        if self.continuous {
            angle_error(self.set_point, measurement)
        } else {
            self.set_point - measurement
        }
    }

    /// Compute the next output. Returns `0.0` without touching state if `dt` is not positive.
    pub fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        if dt <= 0.0 {
            return 0.0;
        }

        let error = self.error(measurement);
        let PidGains { kp, ki, kd } = self.gains;

        let p = kp * error;

        // Integral with anti-windup: back-calculate so it never exceeds the output range
        self.integral += error * dt;
        let i = (ki * self.integral).clamp(self.output_min, self.output_max);
        if ki.abs() > f64::EPSILON {
            self.integral = i / ki;
        }

        let d = match self.last_error {
            Some(prev) => kd * (error - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error);

        (p + i + d).clamp(self.output_min, self.output_max)
    }

    /// Reset integral and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}
