//! Robot Configuration
//!
//! Geometry, encoder calibration and the tuning constants of every controller.
//!
//! # Calibration
//! [`CalibrationConfig`] is set at startup (or restored from flash by the
//! firmware) and may be overwritten at runtime by the revolution capture in
//! [`crate::diagnostics`]. The odometry, the turn controller and the route
//! executor all read it through the same instance owned by the navigator, so a
//! new pulses-per-revolution value takes effect on the next tick everywhere.
//!
//! # Tuning
//! The remaining structs are plain constants grouped per controller. They are
//! not operator-facing state; the defaults below are the values measured on
//! the reference chassis (BTS7960 drivers, 15.5 cm wheels, 63.5 cm track).

use core::f32::consts::PI;

use crate::error::NavError;

/// Pulses per wheel revolution measured with the single-revolution capture
pub const DEFAULT_PULSES_PER_REVOLUTION: u32 = 3418;
/// Wheel diameter in centimeters
pub const WHEEL_DIAMETER_CM: f32 = 15.5;
/// Center-to-center distance between the drive wheels in centimeters
pub const WHEEL_BASE_CM: f32 = 63.5;

/// Encoder calibration and chassis geometry
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationConfig {
    /// Encoder pulses for one full wheel revolution (always > 0)
    pulses_per_revolution: u32,
    /// Wheel diameter (cm)
    pub wheel_diameter_cm: f32,
    /// Axle-to-axle wheel base (cm)
    pub wheel_base_cm: f32,
    /// Flip the sign of the left encoder count
    pub left_inverted: bool,
    /// Flip the sign of the right encoder count
    pub right_inverted: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl CalibrationConfig {
    /// Reference chassis values, usable in `const` contexts
    pub const DEFAULT: Self = Self {
        pulses_per_revolution: DEFAULT_PULSES_PER_REVOLUTION,
        wheel_diameter_cm: WHEEL_DIAMETER_CM,
        wheel_base_cm: WHEEL_BASE_CM,
        left_inverted: false,
        // right encoder is mounted mirrored on the reference chassis
        right_inverted: true,
    };

    /// Current pulses per revolution
    pub fn pulses_per_revolution(&self) -> u32 {
        self.pulses_per_revolution
    }

    /// Overwrites pulses per revolution; zero is rejected and leaves the value untouched
    pub fn set_pulses_per_revolution(&mut self, value: u32) -> Result<(), NavError> {
        if value == 0 {
            return Err(NavError::InvalidPulsesPerRevolution);
        }
        self.pulses_per_revolution = value;
        Ok(())
    }

    /// Wheel circumference in centimeters
    pub fn wheel_circumference_cm(&self) -> f32 {
        PI * self.wheel_diameter_cm
    }

    /// Converts a signed pulse count to wheel revolutions
    pub fn pulses_to_revolutions(&self, pulses: i32) -> f32 {
        pulses as f32 / self.pulses_per_revolution as f32
    }

    /// Converts a signed pulse count to linear wheel travel in centimeters
    pub fn pulses_to_cm(&self, pulses: i32) -> f32 {
        self.pulses_to_revolutions(pulses) * self.wheel_circumference_cm()
    }

    /// Converts a linear distance to the nearest whole pulse count
    pub fn cm_to_pulses(&self, distance_cm: f32) -> i32 {
        libm::roundf(distance_cm / self.wheel_circumference_cm() * self.pulses_per_revolution as f32) as i32
    }

    /// Pulses each wheel must travel to rotate the chassis in place by `angle_deg`
    ///
    /// Arc length per wheel is `angle * wheel_base / 2`, so in revolutions this
    /// reduces to `|angle| * wheel_base / (360 * wheel_diameter)`.
    pub fn turn_pulses(&self, angle_deg: f32) -> i32 {
        let pulses = libm::fabsf(angle_deg) * self.pulses_per_revolution as f32 * self.wheel_base_cm
            / (360.0 * self.wheel_diameter_cm);
        libm::roundf(pulses) as i32
    }
}

/// Open-loop duty limits and drift compensation
///
/// Duty is expressed on the 8-bit scale of the BTS7960 inputs (0..=255).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveTuning {
    /// Upper duty bound for any wheel
    pub max_duty: i16,
    /// Duty used for forward legs and manual forward/backward (≈40 %)
    pub default_duty: i16,
    /// Duty used for in-place rotation (≈20 %)
    pub turn_duty: i16,
    /// Smallest non-zero duty that overcomes static friction
    pub min_duty: i16,
    /// Multiplier applied to the right wheel in open-loop mode
    pub right_compensation: f32,
    /// Multiplier applied to the right wheel PID output
    pub pid_right_compensation: f32,
}

impl Default for DriveTuning {
    fn default() -> Self {
        Self {
            max_duty: 255,
            default_duty: 102,
            turn_duty: 51,
            min_duty: 80,
            right_compensation: 0.85,
            pid_right_compensation: 0.85,
        }
    }
}

/// Velocity PID gains and timing
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidTuning {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Anti-windup bound for the integral term (shared by both wheels)
    pub integral_clamp: f32,
    /// Soft-start time to go from 0 to the target setpoint
    pub ramp_time_ms: u32,
    /// Minimum time between two PID updates
    pub interval_ms: u32,
}

impl PidTuning {
    /// Shortest update interval accepted by the velocity loop
    pub const MIN_INTERVAL_MS: u32 = 5;
}

impl Default for PidTuning {
    fn default() -> Self {
        Self {
            kp: 0.08,
            ki: 0.02,
            kd: 0.002,
            integral_clamp: 500.0,
            ramp_time_ms: 600,
            interval_ms: 50,
        }
    }
}

/// Route execution and obstacle avoidance constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NavTuning {
    /// Frontal distance below which an obstacle is suspected
    pub obstacle_threshold_cm: f32,
    /// Extra clearance the side probe must report before turning back
    pub clearance_margin_cm: f32,
    /// Time a frontal reading must persist before avoidance starts
    pub debounce_ms: u64,
    /// Fixed advance used to cross the obstacle after turning back
    pub avoid_step_cm: f32,
    /// Longest sideways escape before the safety cap trips
    pub max_escape_cm: f32,
    /// Wall-clock ceiling for a single in-place turn
    pub turn_timeout_ms: u64,
    /// Remaining distances below this are treated as arrived
    pub arrival_epsilon_cm: f32,
    /// Heading errors below this are not corrected with a turn after avoidance
    pub heading_tolerance_deg: f32,
    /// Raw reads averaged per distance sample
    pub sensor_samples: u8,
}

impl Default for NavTuning {
    fn default() -> Self {
        Self {
            obstacle_threshold_cm: 30.0,
            clearance_margin_cm: 10.0,
            debounce_ms: 300,
            avoid_step_cm: 40.0,
            max_escape_cm: 150.0,
            turn_timeout_ms: 6000,
            arrival_epsilon_cm: 1.0,
            heading_tolerance_deg: 3.0,
            sensor_samples: 5,
        }
    }
}

/// Wall follower constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WallFollowTuning {
    /// A sensor closer than this sees a wall
    pub wall_threshold_cm: f32,
    /// Closer than this to the followed wall: steer away
    pub near_cm: f32,
    /// Further than this from the followed wall: steer toward
    pub far_cm: f32,
    /// Duty for both wheels inside the band
    pub base_duty: i16,
    /// Duty taken off one wheel to steer
    pub correction_duty: i16,
    /// Boxed in for this long ends wall following
    pub all_walls_timeout_ms: u64,
}

impl Default for WallFollowTuning {
    fn default() -> Self {
        Self {
            wall_threshold_cm: 30.0,
            near_cm: 15.0,
            far_cm: 25.0,
            base_duty: 102,
            correction_duty: 30,
            all_walls_timeout_ms: 3000,
        }
    }
}

/// Everything the navigator needs to be configured with
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RobotConfig {
    pub calibration: CalibrationConfig,
    pub drive: DriveTuning,
    pub pid: PidTuning,
    pub nav: NavTuning,
    pub wall: WallFollowTuning,
}
