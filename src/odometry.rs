//! Dead-reckoning pose estimation
//!
//! Integrates left/right pulse deltas into `(x, y, heading)`:
//!
//! ```text
//! d      = (d_left + d_right) / 2
//! dθ     = (d_right - d_left) / wheel_base
//! θ_mid  = θ + dθ / 2
//! x     += d * cos(θ_mid)
//! y     += d * sin(θ_mid)
//! θ      = θ + dθ
//! ```
//!
//! Integrating along the midpoint heading keeps arcs (turning while driving)
//! close to the true path. Translations below [`MIN_TRANSLATION_CM`] are
//! dropped so that rotating in place, where the two wheel distances cancel up
//! to rounding, does not creep the position.

use core::f32::consts::PI;

use crate::config::CalibrationConfig;
use crate::encoder::WheelPulses;

/// Translations at or below this magnitude do not move the position
pub const MIN_TRANSLATION_CM: f32 = 0.001;

/// Wraps an angle into (-π, π]; a non-finite angle becomes 0
pub fn normalize_angle(radians: f32) -> f32 {
    if !radians.is_finite() {
        return 0.0;
    }
    let wrapped = libm::remainderf(radians, 2.0 * PI);
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

pub fn degrees_to_radians(degrees: f32) -> f32 {
    degrees * PI / 180.0
}

pub fn radians_to_degrees(radians: f32) -> f32 {
    radians * 180.0 / PI
}

/// A point on the floor plane, centimeters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Robot pose; heading in radians, always within (-π, π]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

impl Pose {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn heading_degrees(&self) -> f32 {
        radians_to_degrees(self.heading)
    }

    /// Straight-line distance to a point
    pub fn distance_to(&self, target: Point) -> f32 {
        libm::hypotf(target.x - self.x, target.y - self.y)
    }

    /// Absolute bearing of a point, radians
    pub fn bearing_to(&self, target: Point) -> f32 {
        libm::atan2f(target.y - self.y, target.x - self.x)
    }

    /// Signed in-place rotation (degrees, positive = counter-clockwise) that faces a point
    pub fn turn_toward(&self, target: Point) -> f32 {
        radians_to_degrees(normalize_angle(self.bearing_to(target) - self.heading))
    }
}

/// Pose integrator fed with wheel pulse snapshots
#[derive(Debug, Clone)]
pub struct Odometry {
    pose: Pose,
    last: WheelPulses,
}

impl Odometry {
    pub fn new(pulses: WheelPulses) -> Self {
        Self {
            pose: Pose::default(),
            last: pulses,
        }
    }

    /// Sets the starting pose (heading in degrees) and re-bases on the current counts
    pub fn init(&mut self, x: f32, y: f32, heading_deg: f32, pulses: WheelPulses) {
        self.set_position(x, y, heading_deg);
        self.last = pulses;
    }

    /// Integrates the motion since the previous call and returns the new pose
    pub fn update(&mut self, pulses: WheelPulses, calibration: &CalibrationConfig) -> Pose {
        let delta = pulses.since(self.last);
        self.last = pulses;

        let left_cm = calibration.pulses_to_cm(delta.left);
        let right_cm = calibration.pulses_to_cm(delta.right);

        let distance = (left_cm + right_cm) / 2.0;
        let delta_heading = (right_cm - left_cm) / calibration.wheel_base_cm;

        let previous = self.pose.heading;
        if libm::fabsf(distance) > MIN_TRANSLATION_CM {
            let mid = normalize_angle(previous + delta_heading * 0.5);
            self.pose.x += distance * libm::cosf(mid);
            self.pose.y += distance * libm::sinf(mid);
        }
        self.pose.heading = normalize_angle(previous + delta_heading);

        self.pose
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Operator correction of the pose; heading in degrees
    pub fn set_position(&mut self, x: f32, y: f32, heading_deg: f32) {
        self.pose = Pose {
            x,
            y,
            heading: normalize_angle(degrees_to_radians(heading_deg)),
        };
    }

    /// Back to the origin; the caller zeroes the encoder counters alongside
    pub fn reset_position(&mut self) {
        self.pose = Pose::default();
        self.last = WheelPulses::default();
    }

    pub fn distance_from_origin(&self) -> f32 {
        libm::hypotf(self.pose.x, self.pose.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn calibration() -> CalibrationConfig {
        CalibrationConfig::default()
    }

    /// Pulses that move each wheel by the given distances
    fn step(cal: &CalibrationConfig, at: WheelPulses, left_cm: f32, right_cm: f32) -> WheelPulses {
        WheelPulses::new(at.left + cal.cm_to_pulses(left_cm), at.right + cal.cm_to_pulses(right_cm))
    }

    #[test]
    fn normalize_keeps_half_open_range() {
        assert_abs_diff_eq!(normalize_angle(PI), PI);
        assert_abs_diff_eq!(normalize_angle(-PI), PI);
        assert_abs_diff_eq!(normalize_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(normalize_angle(-5.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(normalize_angle(0.25), 0.25);
    }

    #[test]
    fn straight_line_moves_along_heading() {
        let cal = calibration();
        let mut odometry = Odometry::new(WheelPulses::default());
        let pulses = step(&cal, WheelPulses::default(), 50.0, 50.0);
        let pose = odometry.update(pulses, &cal);
        assert_abs_diff_eq!(pose.x, 50.0, epsilon = 0.05);
        assert_abs_diff_eq!(pose.y, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(pose.heading, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn rotation_in_place_keeps_position() {
        let cal = calibration();
        let mut odometry = Odometry::new(WheelPulses::default());
        let pulses = cal.turn_pulses(90.0);
        let mut at = WheelPulses::default();
        // split into ticks like the control loop would
        for _ in 0..10 {
            at = WheelPulses::new(at.left - pulses / 10, at.right + pulses / 10);
            odometry.update(at, &cal);
        }
        let pose = odometry.pose();
        assert_abs_diff_eq!(pose.x, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pose.y, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pose.heading_degrees(), 90.0, epsilon = 0.2);
    }

    #[test]
    fn closed_rectangle_returns_heading() {
        let cal = calibration();
        let quarter = cal.turn_pulses(90.0);
        let mut odometry = Odometry::new(WheelPulses::default());
        let mut at = WheelPulses::default();
        for side in [80.0, 40.0, 80.0, 40.0] {
            at = step(&cal, at, side, side);
            odometry.update(at, &cal);
            at = WheelPulses::new(at.left - quarter, at.right + quarter);
            odometry.update(at, &cal);
        }
        let pose = odometry.pose();
        // four quarter turns: net rotation is a full circle
        assert_abs_diff_eq!(normalize_angle(pose.heading), 0.0, epsilon = 0.01);
        assert_abs_diff_eq!(pose.x, 0.0, epsilon = 0.5);
        assert_abs_diff_eq!(pose.y, 0.0, epsilon = 0.5);
    }

    #[test]
    fn arc_uses_midpoint_heading() {
        let cal = calibration();
        let mut odometry = Odometry::new(WheelPulses::default());
        let pulses = step(&cal, WheelPulses::default(), 20.0, 30.0);
        let pose = odometry.update(pulses, &cal);
        let delta_heading = pose.heading;
        assert!(delta_heading > 0.0);
        // displacement direction sits halfway between old and new heading
        let direction = libm::atan2f(pose.y, pose.x);
        assert_abs_diff_eq!(direction, delta_heading / 2.0, epsilon = 1e-3);
    }

    #[test]
    fn set_and_reset_position() {
        let mut odometry = Odometry::new(WheelPulses::new(10, 10));
        odometry.set_position(12.0, -3.0, 270.0);
        let pose = odometry.pose();
        assert_abs_diff_eq!(pose.heading_degrees(), -90.0, epsilon = 1e-3);
        assert_abs_diff_eq!(odometry.distance_from_origin(), libm::hypotf(12.0, 3.0));

        odometry.reset_position();
        assert_eq!(odometry.pose(), Pose::default());
        // counters were zeroed alongside, so a zero snapshot means no motion
        assert_eq!(odometry.update(WheelPulses::default(), &calibration()), Pose::default());
    }

    #[test]
    fn init_rebases_on_current_counts() {
        let cal = calibration();
        let mut odometry = Odometry::new(WheelPulses::default());
        let at = WheelPulses::new(5000, 5000);
        odometry.init(100.0, 50.0, 90.0, at);
        // counts before init are not integrated
        let pose = odometry.update(at, &cal);
        assert_abs_diff_eq!(pose.x, 100.0);
        assert_abs_diff_eq!(pose.y, 50.0);

        let pose = odometry.update(step(&cal, at, 10.0, 10.0), &cal);
        assert_abs_diff_eq!(pose.x, 100.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pose.y, 60.0, epsilon = 0.05);
    }

    #[test]
    fn non_finite_heading_is_rejected() {
        assert_eq!(normalize_angle(f32::INFINITY), 0.0);
        assert_eq!(normalize_angle(f32::NEG_INFINITY), 0.0);
        assert_eq!(normalize_angle(f32::NAN), 0.0);

        let mut odometry = Odometry::new(WheelPulses::default());
        odometry.set_position(5.0, 5.0, f32::INFINITY);
        assert_eq!(odometry.pose().heading, 0.0);
        assert_abs_diff_eq!(odometry.pose().x, 5.0);
    }

    #[test]
    fn turn_toward_is_relative_to_heading() {
        let pose = Pose {
            x: 0.0,
            y: 0.0,
            heading: PI / 2.0,
        };
        assert_abs_diff_eq!(pose.turn_toward(Point::new(10.0, 0.0)), -90.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pose.turn_toward(Point::new(0.0, 10.0)), 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pose.distance_to(Point::new(3.0, 4.0)), 5.0);
    }
}
