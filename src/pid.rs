//! Per-wheel velocity PID
//!
//! Regulates one wheel toward a target speed in encoder pulses per second.
//! The setpoint actually fed to the controller soft-starts toward the target at
//! `|target| / ramp_time` per millisecond, the integral is clamped against
//! windup, and the derivative is taken on the error.

use crate::config::PidTuning;

/// Controller state of one wheel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VelocityPid {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Requested speed (pulses/s)
    target: f32,
    /// Ramped setpoint currently regulated to (pulses/s)
    applied: f32,
    integral: f32,
    prev_error: f32,
}

impl VelocityPid {
    pub fn new(tuning: &PidTuning) -> Self {
        Self {
            kp: tuning.kp,
            ki: tuning.ki,
            kd: tuning.kd,
            target: 0.0,
            applied: 0.0,
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    pub fn set_gains(&mut self, kp: f32, ki: f32, kd: f32) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    /// Sets the target; while the loop is disabled the setpoint jumps straight to it
    pub fn set_target(&mut self, pulses_per_second: f32, loop_enabled: bool) {
        self.target = pulses_per_second;
        if !loop_enabled {
            self.applied = pulses_per_second;
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn applied_setpoint(&self) -> f32 {
        self.applied
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Moves the applied setpoint toward the target for `elapsed_ms`
    pub fn ramp(&mut self, elapsed_ms: u32, ramp_time_ms: u32) {
        if ramp_time_ms == 0 {
            self.applied = self.target;
            return;
        }
        let max_step = libm::fabsf(self.target) / ramp_time_ms as f32 * elapsed_ms as f32;
        if self.applied < self.target {
            self.applied = (self.applied + max_step).min(self.target);
        } else if self.applied > self.target {
            self.applied = (self.applied - max_step).max(self.target);
        }
    }

    /// One PID step against a measured speed; returns the raw controller output
    pub fn update(&mut self, measured: f32, dt_s: f32, integral_clamp: f32) -> f32 {
        let error = self.applied - measured;
        self.integral = (self.integral + error * dt_s).clamp(-integral_clamp, integral_clamp);
        let derivative = (error - self.prev_error) / dt_s;
        self.prev_error = error;
        self.kp * error + self.ki * self.integral + self.kd * derivative
    }

    /// Clears integral, derivative memory and the ramped setpoint
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.applied = 0.0;
    }
}
