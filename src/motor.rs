//! Wheel Actuation
//!
//! Turns motion requests into signed duty cycles for the two drive wheels and
//! optionally closes a velocity loop around them.
//!
//! # Duty convention
//! Duty is signed on the 8-bit driver scale: `+255` full forward, `-255` full
//! backward, `0` stopped. How a signed duty maps onto the two PWM inputs of a
//! BTS7960 half-bridge pair is the job of the [`WheelOutput`] implementation.
//!
//! # Drift compensation
//! The right wheel of the reference chassis runs faster for the same duty, so
//! its open-loop command is scaled by `DriveTuning::right_compensation`. The
//! closed-loop output uses the separate `pid_right_compensation`. In-place
//! turns are commanded without compensation.
//!
//! # Velocity loop
//! With the loop enabled, [`WheelActuator::update_velocity_control`] is fed
//! every tick with the pulses each wheel travelled and the elapsed time. Calls
//! accumulate until the configured interval has passed; only then does a PID
//! step run and a new duty get written. Disabling the loop resets both
//! controllers but leaves the wheels as they are.

use crate::config::{DriveTuning, PidTuning};
use crate::pid::VelocityPid;

/// Physical wheel duty sink
pub trait WheelOutput {
    /// Applies signed duty to both wheels; positive drives forward
    fn set_duty(&mut self, left: i16, right: i16);
}

/// Drive wheel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wheel {
    Left,
    Right,
}

/// Pulses and time collected between two PID steps
#[derive(Debug, Clone, Copy, Default)]
struct PendingSample {
    left_pulses: i32,
    right_pulses: i32,
    elapsed_ms: u32,
}

/// Motion primitives and optional closed-loop regulation over a [`WheelOutput`]
pub struct WheelActuator<M: WheelOutput> {
    output: M,
    drive: DriveTuning,
    pid: PidTuning,
    left_pid: VelocityPid,
    right_pid: VelocityPid,
    velocity_enabled: bool,
    pending: PendingSample,
    commanded: (i16, i16),
}

/// Raises a non-zero duty to the friction floor, keeping its sign
fn apply_min_duty(duty: i16, min_duty: i16) -> i16 {
    if duty > 0 && duty < min_duty {
        min_duty
    } else if duty < 0 && duty > -min_duty {
        -min_duty
    } else {
        duty
    }
}

fn scale_duty(duty: i16, factor: f32) -> i16 {
    libm::roundf(duty as f32 * factor) as i16
}

impl<M: WheelOutput> WheelActuator<M> {
    pub fn new(output: M, drive: DriveTuning, pid: PidTuning) -> Self {
        let mut actuator = Self {
            output,
            drive,
            pid,
            left_pid: VelocityPid::new(&pid),
            right_pid: VelocityPid::new(&pid),
            velocity_enabled: false,
            pending: PendingSample::default(),
            commanded: (0, 0),
        };
        actuator.stop();
        actuator
    }

    fn write(&mut self, left: i16, right: i16) {
        self.commanded = (left, right);
        self.output.set_duty(left, right);
    }

    /// Both wheels forward; duty clamped into `[min_duty, max_duty]`
    pub fn move_forward(&mut self, duty: i16) {
        let left = duty.clamp(self.drive.min_duty, self.drive.max_duty);
        let right = scale_duty(left, self.drive.right_compensation).clamp(0, self.drive.max_duty);
        self.write(left, right);
    }

    /// Both wheels backward; duty clamped into `[min_duty, max_duty]`
    pub fn move_backward(&mut self, duty: i16) {
        let left = duty.clamp(self.drive.min_duty, self.drive.max_duty);
        let right = scale_duty(left, self.drive.right_compensation).clamp(0, self.drive.max_duty);
        self.write(-left, -right);
    }

    /// Counter-clockwise rotation in place; zero duty stops
    pub fn turn_left(&mut self, duty: i16) {
        let duty = duty.clamp(0, self.drive.max_duty);
        self.write(-duty, duty);
    }

    /// Clockwise rotation in place; zero duty stops
    pub fn turn_right(&mut self, duty: i16) {
        let duty = duty.clamp(0, self.drive.max_duty);
        self.write(duty, -duty);
    }

    pub fn stop(&mut self) {
        self.write(0, 0);
    }

    /// Independent wheel duties in `[-max_duty, max_duty]`, right wheel compensated
    pub fn set_both(&mut self, left: i16, right: i16) {
        let max = self.drive.max_duty;
        let left = apply_min_duty(left.clamp(-max, max), self.drive.min_duty);
        let right = scale_duty(right.clamp(-max, max), self.drive.right_compensation).clamp(-max, max);
        let right = apply_min_duty(right, self.drive.min_duty);
        self.write(left, right);
    }

    pub fn set_wheel(&mut self, wheel: Wheel, duty: i16) {
        let (left, right) = self.commanded;
        let max = self.drive.max_duty;
        match wheel {
            Wheel::Left => {
                let left = apply_min_duty(duty.clamp(-max, max), self.drive.min_duty);
                self.write(left, right);
            }
            Wheel::Right => {
                let compensated = scale_duty(duty.clamp(-max, max), self.drive.right_compensation);
                let right = apply_min_duty(compensated.clamp(-max, max), self.drive.min_duty);
                self.write(left, right);
            }
        }
    }

    /// Writes duty as given (bounded to `max_duty`), bypassing floor and compensation
    pub fn set_raw_duty(&mut self, left: i16, right: i16) {
        let max = self.drive.max_duty;
        self.write(left.clamp(-max, max), right.clamp(-max, max));
    }

    /// Last duty written to the wheels (left, right)
    pub fn commanded(&self) -> (i16, i16) {
        self.commanded
    }

    pub fn drive_tuning(&self) -> &DriveTuning {
        &self.drive
    }

    pub fn output(&self) -> &M {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut M {
        &mut self.output
    }

    // --- velocity loop ---

    pub fn enable_velocity_control(&mut self, enabled: bool) {
        self.velocity_enabled = enabled;
        self.pending = PendingSample::default();
        if !enabled {
            self.left_pid.reset();
            self.right_pid.reset();
        }
        info!("velocity control {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_velocity_control_enabled(&self) -> bool {
        self.velocity_enabled
    }

    /// Per-wheel targets in encoder pulses per second
    pub fn set_target_pulses_per_second(&mut self, left: f32, right: f32) {
        self.left_pid.set_target(left, self.velocity_enabled);
        self.right_pid.set_target(right, self.velocity_enabled);
    }

    pub fn set_pid_gains(&mut self, kp: f32, ki: f32, kd: f32) {
        self.left_pid.set_gains(kp, ki, kd);
        self.right_pid.set_gains(kp, ki, kd);
    }

    pub fn set_wheel_pid_gains(&mut self, wheel: Wheel, kp: f32, ki: f32, kd: f32) {
        match wheel {
            Wheel::Left => self.left_pid.set_gains(kp, ki, kd),
            Wheel::Right => self.right_pid.set_gains(kp, ki, kd),
        }
    }

    pub fn set_pid_interval(&mut self, interval_ms: u32) {
        self.pid.interval_ms = interval_ms.max(PidTuning::MIN_INTERVAL_MS);
    }

    pub fn set_ramp_time(&mut self, ramp_time_ms: u32) {
        self.pid.ramp_time_ms = ramp_time_ms;
    }

    pub fn pid_state(&self, wheel: Wheel) -> &VelocityPid {
        match wheel {
            Wheel::Left => &self.left_pid,
            Wheel::Right => &self.right_pid,
        }
    }

    /// Feeds one tick of wheel travel; returns the written duty when a PID step ran
    ///
    /// Disabled loop, zero elapsed time and calls inside the update interval are
    /// silent no-ops (the latter still accumulate toward the next step).
    pub fn update_velocity_control(&mut self, left_delta: i32, right_delta: i32, elapsed_ms: u32) -> Option<(i16, i16)> {
        if !self.velocity_enabled || elapsed_ms == 0 {
            return None;
        }

        self.pending.left_pulses = self.pending.left_pulses.wrapping_add(left_delta);
        self.pending.right_pulses = self.pending.right_pulses.wrapping_add(right_delta);
        self.pending.elapsed_ms = self.pending.elapsed_ms.saturating_add(elapsed_ms);
        if self.pending.elapsed_ms < self.pid.interval_ms {
            return None;
        }

        let sample = core::mem::take(&mut self.pending);
        let dt = sample.elapsed_ms as f32 / 1000.0;
        let measured_left = sample.left_pulses as f32 / dt;
        let measured_right = sample.right_pulses as f32 / dt;

        self.left_pid.ramp(sample.elapsed_ms, self.pid.ramp_time_ms);
        self.right_pid.ramp(sample.elapsed_ms, self.pid.ramp_time_ms);

        let out_left = self.left_pid.update(measured_left, dt, self.pid.integral_clamp);
        let out_right = self.right_pid.update(measured_right, dt, self.pid.integral_clamp);

        let max = self.drive.max_duty as f32;
        let left = libm::roundf(out_left).clamp(-max, max) as i16;
        let right = libm::roundf(out_right * self.drive.pid_right_compensation).clamp(-max, max) as i16;

        trace!(
            "pid dt={} meas=({}, {}) duty=({}, {})",
            dt,
            measured_left,
            measured_right,
            left,
            right
        );
        self.write(left, right);
        Some((left, right))
    }
}

/// Records every duty written; used by the tests of all the controllers
#[cfg(test)]
pub(crate) mod testing {
    use super::WheelOutput;

    #[derive(Debug, Default)]
    pub struct RecordingOutput {
        pub writes: std::vec::Vec<(i16, i16)>,
    }

    impl WheelOutput for RecordingOutput {
        fn set_duty(&mut self, left: i16, right: i16) {
            self.writes.push((left, right));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingOutput;
    use super::*;

    fn actuator() -> WheelActuator<RecordingOutput> {
        WheelActuator::new(RecordingOutput::default(), DriveTuning::default(), PidTuning::default())
    }

    #[test]
    fn starts_stopped() {
        let actuator = actuator();
        assert_eq!(actuator.output().writes, vec![(0, 0)]);
    }

    #[test]
    fn forward_clamps_and_compensates_right() {
        let mut actuator = actuator();
        actuator.move_forward(102);
        // 102 * 0.85 = 86.7
        assert_eq!(actuator.commanded(), (102, 87));

        actuator.move_forward(10);
        assert_eq!(actuator.commanded(), (80, 68));

        actuator.move_forward(1000);
        assert_eq!(actuator.commanded(), (255, 217));

        actuator.move_backward(102);
        assert_eq!(actuator.commanded(), (-102, -87));
    }

    #[test]
    fn turns_skip_floor_and_compensation() {
        let mut actuator = actuator();
        actuator.turn_left(51);
        assert_eq!(actuator.commanded(), (-51, 51));
        actuator.turn_right(51);
        assert_eq!(actuator.commanded(), (51, -51));
        actuator.turn_right(0);
        assert_eq!(actuator.commanded(), (0, 0));
    }

    #[test]
    fn independent_duty_is_bounded() {
        let mut actuator = actuator();
        actuator.set_both(-400, 400);
        assert_eq!(actuator.commanded(), (-255, 217));
        actuator.set_both(20, -20);
        assert_eq!(actuator.commanded(), (80, -80));
        actuator.set_both(0, 0);
        assert_eq!(actuator.commanded(), (0, 0));

        actuator.set_wheel(Wheel::Left, 120);
        assert_eq!(actuator.commanded(), (120, 0));
        actuator.set_wheel(Wheel::Right, -200);
        assert_eq!(actuator.commanded(), (120, -170));

        actuator.set_raw_duty(0, 300);
        assert_eq!(actuator.commanded(), (0, 255));
    }

    #[test]
    fn velocity_loop_is_rate_limited() {
        let mut actuator = actuator();
        assert_eq!(actuator.update_velocity_control(10, 10, 20), None);

        actuator.enable_velocity_control(true);
        actuator.set_target_pulses_per_second(1000.0, 1000.0);
        assert_eq!(actuator.update_velocity_control(0, 0, 0), None);
        assert_eq!(actuator.update_velocity_control(0, 0, 20), None);
        assert_eq!(actuator.update_velocity_control(0, 0, 20), None);
        let duty = actuator.update_velocity_control(0, 0, 20);
        assert!(duty.is_some());
        let (left, right) = duty.unwrap_or_default();
        assert!(left > 0);
        assert!(right > 0 && right < left);
    }

    #[test]
    fn velocity_loop_at_rest_stays_at_zero() {
        let mut actuator = actuator();
        actuator.enable_velocity_control(true);
        actuator.set_target_pulses_per_second(0.0, 0.0);
        for _ in 0..100 {
            if let Some(duty) = actuator.update_velocity_control(0, 0, 50) {
                assert_eq!(duty, (0, 0));
            }
            let integral = actuator.pid_state(Wheel::Left).integral();
            assert!(integral.abs() <= PidTuning::default().integral_clamp);
        }
    }

    #[test]
    fn disabling_resets_without_stopping() {
        let mut actuator = actuator();
        actuator.enable_velocity_control(true);
        actuator.set_target_pulses_per_second(800.0, 800.0);
        actuator.update_velocity_control(0, 0, 50);
        let driving = actuator.commanded();
        assert_ne!(driving, (0, 0));

        actuator.enable_velocity_control(false);
        assert_eq!(actuator.commanded(), driving);
        assert_eq!(actuator.pid_state(Wheel::Left).integral(), 0.0);
        assert_eq!(actuator.pid_state(Wheel::Right).applied_setpoint(), 0.0);
    }

    #[test]
    fn pid_interval_has_floor() {
        let mut actuator = actuator();
        actuator.set_pid_interval(1);
        actuator.enable_velocity_control(true);
        actuator.set_target_pulses_per_second(100.0, 100.0);
        assert_eq!(actuator.update_velocity_control(0, 0, 4), None);
        assert!(actuator.update_velocity_control(0, 0, 1).is_some());
    }
}
