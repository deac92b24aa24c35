//! Analog IR distance sensors
//!
//! Four GP2Y0A21-class rangers on the ADC pins. Each sample averages a burst of
//! raw conversions, turns the voltage into centimeters with the sensor's
//! power-law curve and runs the result through a short moving median so a
//! single reflection spike never reaches the navigation logic.
//!
//! # Voltage to distance
//! ```text
//! distance_cm = 27.73 * V^-1.2045      (valid for 10..80 cm)
//! ```
//! Below the far end of the range the output voltage flattens out and carries
//! no information, so anything under [`MIN_VALID_VOLTAGE`] reads as open space.
//!
//! The ADC is used in blocking mode: one conversion takes about 2 µs, so even
//! a full sweep of four sensors fits easily in a control loop tick.

use amr_nav::sensors::{DistanceSensors, SensorId};
use embassy_rp::adc::{Adc, Blocking, Channel};
use moving_median::MovingMedian;

/// Reported when there is nothing in range or every read failed
pub const OPEN_DISTANCE_CM: f32 = 200.0;

/// Closest distance the sensor resolves
const MIN_RANGE_CM: f32 = 10.0;

/// Output voltage at the far end of the range (about 80 cm)
const MIN_VALID_VOLTAGE: f32 = 0.4;

/// ADC reference voltage
const REF_VOLTAGE: f32 = 3.3;

/// ADC resolution (12-bit)
const ADC_RANGE: f32 = 4096.0;

/// Median window per sensor
const MEDIAN_WINDOW_SIZE: usize = 3;

fn voltage_to_cm(voltage: f32) -> f32 {
    if voltage < MIN_VALID_VOLTAGE {
        return OPEN_DISTANCE_CM;
    }
    (27.73 * libm::powf(voltage, -1.2045)).max(MIN_RANGE_CM)
}

struct Ranger {
    channel: Channel<'static>,
    filter: MovingMedian<f32, MEDIAN_WINDOW_SIZE>,
}

/// All four rangers sharing the ADC
pub struct AnalogDistanceSensors {
    adc: Adc<'static, Blocking>,
    rangers: [Ranger; 4],
}

impl AnalogDistanceSensors {
    /// Channels in [`SensorId::ALL`] order
    pub fn new(adc: Adc<'static, Blocking>, channels: [Channel<'static>; 4]) -> Self {
        Self {
            adc,
            rangers: channels.map(|channel| Ranger {
                channel,
                filter: MovingMedian::new(),
            }),
        }
    }

    fn ranger_index(sensor: SensorId) -> usize {
        match sensor {
            SensorId::FrontLeft => 0,
            SensorId::FrontRight => 1,
            SensorId::Left => 2,
            SensorId::Right => 3,
        }
    }
}

impl DistanceSensors for AnalogDistanceSensors {
    fn sample_cm(&mut self, sensor: SensorId, samples: u8) -> f32 {
        let ranger = &mut self.rangers[Self::ranger_index(sensor)];

        let mut sum = 0.0;
        let mut valid = 0u8;
        for _ in 0..samples.max(1) {
            if let Ok(raw) = self.adc.blocking_read(&mut ranger.channel) {
                sum += f32::from(raw) * REF_VOLTAGE / ADC_RANGE;
                valid += 1;
            }
        }

        let distance = if valid == 0 {
            OPEN_DISTANCE_CM
        } else {
            voltage_to_cm(sum / valid as f32)
        };
        ranger.filter.add_value(distance);
        ranger.filter.median()
    }
}
