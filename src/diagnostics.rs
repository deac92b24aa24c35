//! Operator diagnostics
//!
//! Both routines are driven from the control loop tick like every behaviour:
//! [`SelfTest`] spins each wheel forward then backward in turn, and
//! [`RevolutionCapture`] averages operator-marked single wheel revolutions
//! into a new pulses-per-revolution value.

use heapless::Vec;

use crate::config::CalibrationConfig;
use crate::encoder::WheelPulses;
use crate::error::NavError;
use crate::motor::{WheelActuator, WheelOutput};

/// Raw duty of each self-test step
pub const SELF_TEST_DUTY: i16 = 150;
/// How long each wheel spins per step
pub const SELF_TEST_RUN_MS: u64 = 1000;
/// Standstill between steps
pub const SELF_TEST_PAUSE_MS: u64 = 300;
/// Revolutions averaged by one capture
pub const CAPTURE_SAMPLES: usize = 3;

/// (left, right) duty per step: left forward, left backward, right forward, right backward
const SELF_TEST_STEPS: [(i16, i16); 4] = [
    (SELF_TEST_DUTY, 0),
    (-SELF_TEST_DUTY, 0),
    (0, SELF_TEST_DUTY),
    (0, -SELF_TEST_DUTY),
];

/// Non-blocking motor self-test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelfTest {
    step: usize,
    spinning: bool,
    deadline_ms: u64,
}

impl SelfTest {
    /// Starts the first step right away
    pub fn start<M: WheelOutput>(now_ms: u64, actuator: &mut WheelActuator<M>) -> Self {
        info!("motor self-test");
        let (left, right) = SELF_TEST_STEPS[0];
        actuator.set_raw_duty(left, right);
        Self {
            step: 0,
            spinning: true,
            deadline_ms: now_ms + SELF_TEST_RUN_MS,
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Advances the sequence; returns `true` once the last pause is over
    pub fn tick<M: WheelOutput>(&mut self, now_ms: u64, actuator: &mut WheelActuator<M>) -> bool {
        if now_ms < self.deadline_ms {
            return false;
        }
        if self.spinning {
            actuator.stop();
            self.spinning = false;
            self.deadline_ms = now_ms + SELF_TEST_PAUSE_MS;
            return false;
        }

        self.step += 1;
        let Some(&(left, right)) = SELF_TEST_STEPS.get(self.step) else {
            info!("self-test done");
            return true;
        };
        debug!("self-test step {}: ({}, {})", self.step, left, right);
        actuator.set_raw_duty(left, right);
        self.spinning = true;
        self.deadline_ms = now_ms + SELF_TEST_RUN_MS;
        false
    }
}

/// Pulses-per-revolution capture from several single revolutions
///
/// The operator turns a wheel exactly one revolution (or drives it one
/// revolution) between two marks. Each mark records the pulses either wheel
/// travelled since the previous one.
#[derive(Debug, Clone, Default)]
pub struct RevolutionCapture {
    last_mark: Option<WheelPulses>,
    samples: Vec<u32, CAPTURE_SAMPLES>,
}

impl RevolutionCapture {
    pub fn is_running(&self) -> bool {
        self.last_mark.is_some()
    }

    pub fn samples(&self) -> &[u32] {
        &self.samples
    }

    /// Opens a capture at the current counts, dropping any earlier samples
    pub fn start(&mut self, pulses: WheelPulses) {
        info!("revolution capture: mark {} revolutions", CAPTURE_SAMPLES);
        self.last_mark = Some(pulses);
        self.samples.clear();
    }

    pub fn cancel(&mut self) {
        self.last_mark = None;
        self.samples.clear();
    }

    /// Ends one revolution; on the last one the average is written into `calibration`
    ///
    /// Returns the new pulses per revolution once the capture is complete.
    pub fn mark(&mut self, pulses: WheelPulses, calibration: &mut CalibrationConfig) -> Result<Option<u32>, NavError> {
        let Some(last) = self.last_mark else {
            return Err(NavError::CalibrationNotRunning);
        };

        let travelled = pulses.since(last).max_abs().unsigned_abs();
        self.last_mark = Some(pulses);
        // a full capture is closed below, so there is always room here
        if self.samples.push(travelled).is_err() {
            return Err(NavError::CalibrationNotRunning);
        }
        debug!("revolution {}: {} pulses", self.samples.len(), travelled);

        if !self.samples.is_full() {
            return Ok(None);
        }

        let total: u64 = self.samples.iter().map(|&s| s as u64).sum();
        let average = (total + self.samples.len() as u64 / 2) / self.samples.len() as u64;
        let result = calibration.set_pulses_per_revolution(average as u32);
        self.cancel();
        result?;
        info!("pulses per revolution set to {}", average);
        Ok(Some(average as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriveTuning, PidTuning};
    use crate::motor::testing::RecordingOutput;

    fn actuator() -> WheelActuator<RecordingOutput> {
        WheelActuator::new(RecordingOutput::default(), DriveTuning::default(), PidTuning::default())
    }

    #[test]
    fn self_test_runs_each_wheel_both_ways() {
        let mut actuator = actuator();
        let mut test = SelfTest::start(0, &mut actuator);
        let mut now = 0;
        let mut done = false;
        while !done && now < 10_000 {
            now += 10;
            done = test.tick(now, &mut actuator);
        }
        assert!(done);
        // 4 * (1000 + 300)
        assert_eq!(now, 5200);

        let distinct: std::vec::Vec<_> = actuator
            .output()
            .writes
            .windows(2)
            .filter(|w| w[0] != w[1])
            .map(|w| w[1])
            .collect();
        assert_eq!(
            distinct,
            vec![(150, 0), (0, 0), (-150, 0), (0, 0), (0, 150), (0, 0), (0, -150), (0, 0)]
        );
    }

    #[test]
    fn capture_averages_revolutions() {
        let mut capture = RevolutionCapture::default();
        let mut cal = CalibrationConfig::default();
        assert_eq!(
            capture.mark(WheelPulses::default(), &mut cal),
            Err(NavError::CalibrationNotRunning)
        );

        capture.start(WheelPulses::new(100, 0));
        assert_eq!(capture.mark(WheelPulses::new(3500, 0), &mut cal), Ok(None));
        assert_eq!(capture.mark(WheelPulses::new(6800, 2), &mut cal), Ok(None));
        // wheel turned backwards: magnitude counts
        assert_eq!(capture.mark(WheelPulses::new(6800, -3498), &mut cal), Ok(Some(3400)));
        assert_eq!(cal.pulses_per_revolution(), 3400);
        assert!(!capture.is_running());
    }

    #[test]
    fn zero_average_is_rejected() {
        let mut capture = RevolutionCapture::default();
        let mut cal = CalibrationConfig::default();
        capture.start(WheelPulses::default());
        for _ in 0..2 {
            capture.mark(WheelPulses::default(), &mut cal).unwrap();
        }
        assert_eq!(
            capture.mark(WheelPulses::default(), &mut cal),
            Err(NavError::InvalidPulsesPerRevolution)
        );
        assert_eq!(cal.pulses_per_revolution(), 3418);
    }
}
