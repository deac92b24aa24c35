//! Distance sensing contract
//!
//! Four infrared rangers: two looking forward (slightly splayed), one on each
//! flank. The navigation core only consumes calibrated centimeters; the raw
//! voltage curve and the averaging live behind [`DistanceSensors`].

/// One of the four ranging sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorId {
    FrontLeft,
    FrontRight,
    Left,
    Right,
}

impl SensorId {
    pub const ALL: [SensorId; 4] = [SensorId::FrontLeft, SensorId::FrontRight, SensorId::Left, SensorId::Right];
}

/// Lateral side of the chassis
///
/// The sign convention matches rotation: left is `+1` (counter-clockwise),
/// right is `-1` (clockwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn sign(self) -> i8 {
        match self {
            Side::Left => 1,
            Side::Right => -1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Lateral sensor on this side
    pub fn sensor(self) -> SensorId {
        match self {
            Side::Left => SensorId::Left,
            Side::Right => SensorId::Right,
        }
    }

    /// In-place rotation of 90° toward this side, degrees
    pub fn quarter_turn(self) -> f32 {
        90.0 * self.sign() as f32
    }
}

/// Synchronous, averaged distance sampling
///
/// Implementations return a conservative large distance on an invalid
/// reading instead of an error.
pub trait DistanceSensors {
    /// Averages `samples` raw reads of one sensor into centimeters
    fn sample_cm(&mut self, sensor: SensorId, samples: u8) -> f32;

    /// Closer of the two forward sensors
    fn front_min_cm(&mut self, samples: u8) -> f32 {
        let left = self.sample_cm(SensorId::FrontLeft, samples);
        let right = self.sample_cm(SensorId::FrontRight, samples);
        left.min(right)
    }
}

impl<T: DistanceSensors + ?Sized> DistanceSensors for &mut T {
    fn sample_cm(&mut self, sensor: SensorId, samples: u8) -> f32 {
        (**self).sample_cm(sensor, samples)
    }
}

/// Fixed readings per sensor; what the controller tests drive the behaviours with
#[cfg(test)]
pub(crate) mod testing {
    use super::{DistanceSensors, SensorId};

    #[derive(Debug, Clone, Copy)]
    pub struct FixedSensors {
        pub front_left: f32,
        pub front_right: f32,
        pub left: f32,
        pub right: f32,
    }

    impl FixedSensors {
        pub fn open() -> Self {
            Self::all(200.0)
        }

        pub fn all(distance: f32) -> Self {
            Self {
                front_left: distance,
                front_right: distance,
                left: distance,
                right: distance,
            }
        }

        pub fn with_front(mut self, distance: f32) -> Self {
            self.front_left = distance;
            self.front_right = distance;
            self
        }
    }

    impl DistanceSensors for FixedSensors {
        fn sample_cm(&mut self, sensor: SensorId, _samples: u8) -> f32 {
            match sensor {
                SensorId::FrontLeft => self.front_left,
                SensorId::FrontRight => self.front_right,
                SensorId::Left => self.left,
                SensorId::Right => self.right,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedSensors;
    use super::*;

    #[test]
    fn side_signs_and_sensors() {
        assert_eq!(Side::Left.sign(), 1);
        assert_eq!(Side::Right.sign(), -1);
        assert_eq!(Side::Left.opposite().sensor(), SensorId::Right);
        assert_eq!(Side::Right.quarter_turn(), -90.0);
    }

    #[test]
    fn front_min_takes_closer_reading() {
        let mut sensors = FixedSensors::open();
        sensors.front_right = 22.0;
        assert_eq!(sensors.front_min_cm(5), 22.0);

        fn through<S: DistanceSensors>(mut sensors: S) -> f32 {
            sensors.front_min_cm(5)
        }
        assert_eq!(through(&mut sensors), 22.0);
    }
}
