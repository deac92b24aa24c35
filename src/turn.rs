//! In-place rotation primitive
//!
//! Commands the wheels in opposite directions at the turn duty and ends the
//! rotation from encoder feedback: once either wheel has travelled the arc
//! length of the requested angle the wheels stop and [`TurnController::tick`]
//! reports [`TurnOutcome::Completed`] exactly once. A wall-clock ceiling ends a
//! turn that never gets there (jammed wheel, stalled motor) with
//! [`TurnOutcome::TimedOut`].
//!
//! While a turn is in progress the controller owns the wheels. Callers poll
//! the outcome instead of commanding motion.

use crate::config::CalibrationConfig;
use crate::encoder::WheelPulses;
use crate::error::NavError;
use crate::motor::{WheelActuator, WheelOutput};
use crate::odometry::{degrees_to_radians, normalize_angle, Pose};

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TurnOutcome {
    Completed,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TurnState {
    Idle,
    InProgress {
        /// Counts at the start of the turn
        start: WheelPulses,
        /// Pulses either wheel has to travel
        target_pulses: i32,
        /// Expected heading once done, radians
        target_heading: f32,
        started_at_ms: u64,
    },
}

pub struct TurnController {
    state: TurnState,
    timeout_ms: u64,
    last_outcome: Option<TurnOutcome>,
}

impl TurnController {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            state: TurnState::Idle,
            timeout_ms,
            last_outcome: None,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_turning(&self) -> bool {
        matches!(self.state, TurnState::InProgress { .. })
    }

    pub fn last_outcome(&self) -> Option<TurnOutcome> {
        self.last_outcome
    }

    pub fn target_heading(&self) -> Option<f32> {
        match self.state {
            TurnState::InProgress { target_heading, .. } => Some(target_heading),
            TurnState::Idle => None,
        }
    }

    /// Starts rotating by `angle_deg`; positive is counter-clockwise
    pub fn start_turn<M: WheelOutput>(
        &mut self,
        angle_deg: f32,
        pose: &Pose,
        pulses: WheelPulses,
        now_ms: u64,
        calibration: &CalibrationConfig,
        actuator: &mut WheelActuator<M>,
    ) -> Result<(), NavError> {
        if self.is_turning() {
            return Err(NavError::TurnInProgress);
        }

        let target_pulses = calibration.turn_pulses(angle_deg);
        let target_heading = normalize_angle(pose.heading + degrees_to_radians(angle_deg));
        self.state = TurnState::InProgress {
            start: pulses,
            target_pulses,
            target_heading,
            started_at_ms: now_ms,
        };

        let duty = actuator.drive_tuning().turn_duty;
        if target_pulses == 0 {
            actuator.stop();
        } else if angle_deg > 0.0 {
            actuator.turn_left(duty);
        } else {
            actuator.turn_right(duty);
        }
        debug!("turn {} deg, {} pulses", angle_deg, target_pulses);
        Ok(())
    }

    /// Advances a running turn; yields the outcome on the tick the turn ends
    pub fn tick<M: WheelOutput>(
        &mut self,
        pulses: WheelPulses,
        now_ms: u64,
        actuator: &mut WheelActuator<M>,
    ) -> Option<TurnOutcome> {
        let TurnState::InProgress {
            start,
            target_pulses,
            started_at_ms,
            ..
        } = self.state
        else {
            return None;
        };

        // reaching the target wins over an expired timeout on the same tick
        let outcome = if pulses.since(start).max_abs() >= target_pulses {
            TurnOutcome::Completed
        } else if now_ms.saturating_sub(started_at_ms) >= self.timeout_ms {
            warn!("turn timed out after {} ms", now_ms.saturating_sub(started_at_ms));
            TurnOutcome::TimedOut
        } else {
            return None;
        };

        actuator.stop();
        self.state = TurnState::Idle;
        self.last_outcome = Some(outcome);
        Some(outcome)
    }

    /// Drops a running turn without touching the wheels
    pub fn cancel(&mut self) {
        self.state = TurnState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriveTuning, PidTuning};
    use crate::motor::testing::RecordingOutput;
    use approx::assert_abs_diff_eq;

    fn setup() -> (TurnController, WheelActuator<RecordingOutput>, CalibrationConfig) {
        (
            TurnController::new(6000),
            WheelActuator::new(RecordingOutput::default(), DriveTuning::default(), PidTuning::default()),
            CalibrationConfig::default(),
        )
    }

    #[test]
    fn completes_on_pulse_target() {
        let (mut turn, mut actuator, cal) = setup();
        let start = WheelPulses::new(500, 500);
        turn.start_turn(90.0, &Pose::default(), start, 0, &cal, &mut actuator).unwrap();
        assert!(turn.is_turning());
        assert_eq!(actuator.commanded(), (-51, 51));
        assert_abs_diff_eq!(turn.target_heading().unwrap_or_default(), core::f32::consts::FRAC_PI_2);

        assert_eq!(turn.tick(WheelPulses::new(-1000, 2000), 100, &mut actuator), None);
        // only one wheel needs to get there
        assert_eq!(
            turn.tick(WheelPulses::new(-2000, 500 + 3501), 200, &mut actuator),
            Some(TurnOutcome::Completed)
        );
        assert_eq!(actuator.commanded(), (0, 0));
        assert!(!turn.is_turning());
        assert_eq!(turn.tick(WheelPulses::new(0, 9000), 300, &mut actuator), None);
    }

    #[test]
    fn negative_angle_turns_clockwise() {
        let (mut turn, mut actuator, cal) = setup();
        turn.start_turn(-45.0, &Pose::default(), WheelPulses::default(), 0, &cal, &mut actuator)
            .unwrap();
        assert_eq!(actuator.commanded(), (51, -51));
    }

    #[test]
    fn times_out_when_stalled() {
        let (mut turn, mut actuator, cal) = setup();
        turn.start_turn(180.0, &Pose::default(), WheelPulses::default(), 1000, &cal, &mut actuator)
            .unwrap();
        assert_eq!(turn.tick(WheelPulses::new(-10, 10), 6999, &mut actuator), None);
        assert_eq!(
            turn.tick(WheelPulses::new(-10, 10), 7000, &mut actuator),
            Some(TurnOutcome::TimedOut)
        );
        assert_eq!(actuator.commanded(), (0, 0));
        assert_eq!(turn.last_outcome(), Some(TurnOutcome::TimedOut));
    }

    #[test]
    fn completion_beats_timeout() {
        let (mut turn, mut actuator, cal) = setup();
        turn.start_turn(90.0, &Pose::default(), WheelPulses::default(), 0, &cal, &mut actuator)
            .unwrap();
        assert_eq!(
            turn.tick(WheelPulses::new(-3501, 3501), 60_000, &mut actuator),
            Some(TurnOutcome::Completed)
        );
    }

    #[test]
    fn second_turn_is_rejected() {
        let (mut turn, mut actuator, cal) = setup();
        turn.start_turn(90.0, &Pose::default(), WheelPulses::default(), 0, &cal, &mut actuator)
            .unwrap();
        assert_eq!(
            turn.start_turn(-90.0, &Pose::default(), WheelPulses::default(), 0, &cal, &mut actuator),
            Err(NavError::TurnInProgress)
        );
        assert_eq!(actuator.commanded(), (-51, 51));
    }

    #[test]
    fn zero_angle_completes_next_tick() {
        let (mut turn, mut actuator, cal) = setup();
        actuator.move_forward(102);
        turn.start_turn(0.0, &Pose::default(), WheelPulses::default(), 0, &cal, &mut actuator)
            .unwrap();
        assert_eq!(actuator.commanded(), (0, 0));
        assert_eq!(
            turn.tick(WheelPulses::default(), 10, &mut actuator),
            Some(TurnOutcome::Completed)
        );
    }
}
