//! Per-tick view of the drive train handed to the behaviours

use crate::config::CalibrationConfig;
use crate::encoder::WheelPulses;
use crate::error::{Fault, NavError};
use crate::motor::{WheelActuator, WheelOutput};
use crate::odometry::Pose;
use crate::turn::{TurnController, TurnOutcome};

/// Everything a behaviour may read or command during one control-loop tick
///
/// Built by the navigator after the odometry update and the turn controller
/// tick, so `pose` is current and `turn_outcome` carries the turn result of
/// this tick (consumed by whichever behaviour owns the turn).
pub struct MotionContext<'a, M: WheelOutput> {
    pub actuator: &'a mut WheelActuator<M>,
    pub turn: &'a mut TurnController,
    pub calibration: &'a CalibrationConfig,
    pub pose: Pose,
    pub pulses: WheelPulses,
    pub now_ms: u64,
    pub turn_outcome: Option<TurnOutcome>,
    /// Fault raised by the behaviour during this tick
    pub fault: Option<Fault>,
}

impl<M: WheelOutput> MotionContext<'_, M> {
    pub fn start_turn(&mut self, angle_deg: f32) -> Result<(), NavError> {
        self.turn
            .start_turn(angle_deg, &self.pose, self.pulses, self.now_ms, self.calibration, self.actuator)
    }

    pub fn forward(&mut self) {
        let duty = self.actuator.drive_tuning().default_duty;
        self.actuator.move_forward(duty);
    }

    /// Halts the wheels and drops any turn in flight
    pub fn halt(&mut self) {
        self.turn.cancel();
        self.actuator.stop();
    }

    pub fn report(&mut self, fault: Fault) {
        error!("fault: {}", fault);
        self.fault = Some(fault);
    }

    /// Pulses travelled since `start`, averaged over both wheels
    pub fn travelled_since(&self, start: WheelPulses) -> i32 {
        self.pulses.since(start).mean_abs()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::MotionContext;
    use crate::config::{CalibrationConfig, DriveTuning, PidTuning};
    use crate::encoder::WheelPulses;
    use crate::motor::testing::RecordingOutput;
    use crate::motor::WheelActuator;
    use crate::odometry::Pose;
    use crate::turn::{TurnController, TurnOutcome};

    /// Owns the pieces a [`MotionContext`] borrows
    pub struct Rig {
        pub actuator: WheelActuator<RecordingOutput>,
        pub turn: TurnController,
        pub calibration: CalibrationConfig,
        pub pose: Pose,
        pub pulses: WheelPulses,
        pub now_ms: u64,
    }

    impl Rig {
        pub fn new() -> Self {
            Self {
                actuator: WheelActuator::new(RecordingOutput::default(), DriveTuning::default(), PidTuning::default()),
                turn: TurnController::new(6000),
                calibration: CalibrationConfig::default(),
                pose: Pose::default(),
                pulses: WheelPulses::default(),
                now_ms: 0,
            }
        }

        pub fn ctx(&mut self, turn_outcome: Option<TurnOutcome>) -> MotionContext<'_, RecordingOutput> {
            MotionContext {
                actuator: &mut self.actuator,
                turn: &mut self.turn,
                calibration: &self.calibration,
                pose: self.pose,
                pulses: self.pulses,
                now_ms: self.now_ms,
                turn_outcome,
                fault: None,
            }
        }

        /// Moves both counters forward by `pulses`
        pub fn advance(&mut self, pulses: i32) {
            self.pulses = WheelPulses::new(self.pulses.left + pulses, self.pulses.right + pulses);
        }

        /// Finishes whatever turn is running, as the navigator tick would report it
        pub fn complete_turn(&mut self) -> Option<TurnOutcome> {
            if self.turn.is_turning() {
                self.turn.cancel();
                self.actuator.stop();
                Some(TurnOutcome::Completed)
            } else {
                None
            }
        }
    }
}
