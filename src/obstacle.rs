//! Obstacle avoidance maneuver
//!
//! Runs nested inside a moving route leg. A frontal reading below the obstacle
//! threshold first arms a debounce timer; only a re-sample that is still
//! below threshold once the timer expires starts the maneuver:
//!
//! ```text
//! Idle ─▶ Turn ─▶ Forward ─▶ TurnBack ─▶ CrossForward ─▶ Done
//!  (0)    (1)      (2)         (3)          (4)          (5)
//! ```
//!
//! 1. quarter turn toward the lateral side with more clearance
//! 2. drive sideways until the sensor facing the obstacle reports it passed,
//!    or the escape distance cap is hit
//! 3. quarter turn back onto the original heading
//! 4. drive a fixed step to get past the obstacle's extent
//!
//! The owning route re-plans toward its target once the machine is done.

use crate::config::NavTuning;
use crate::encoder::WheelPulses;
use crate::error::Fault;
use crate::motion::MotionContext;
use crate::motor::WheelOutput;
use crate::sensors::{DistanceSensors, SensorId, Side};
use crate::turn::TurnOutcome;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AvoidancePhase {
    Idle,
    /// Frontal reading below threshold, waiting for it to persist
    Debouncing { since_ms: u64 },
    Turn { side: Side, cap_pulses: i32 },
    Forward { side: Side, start: WheelPulses, cap_pulses: i32 },
    TurnBack { side: Side },
    CrossForward { start: WheelPulses, target_pulses: i32 },
    Done,
}

impl AvoidancePhase {
    /// Numeric phase as reported in the status (debouncing counts as idle)
    pub fn index(&self) -> u8 {
        match self {
            AvoidancePhase::Idle | AvoidancePhase::Debouncing { .. } => 0,
            AvoidancePhase::Turn { .. } => 1,
            AvoidancePhase::Forward { .. } => 2,
            AvoidancePhase::TurnBack { .. } => 3,
            AvoidancePhase::CrossForward { .. } => 4,
            AvoidancePhase::Done => 5,
        }
    }
}

/// Result of advancing the maneuver by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AvoidanceStep {
    /// Still debouncing or maneuvering
    Pending,
    /// The obstruction cleared during debounce; normal movement resumes
    Transient,
    /// Obstacle passed; the route re-plans toward its target
    Finished,
    /// A turn timed out; the route must stop
    Aborted,
}

/// Escape direction: the lateral side with more room, left on a tie
pub fn choose_side(left_cm: f32, right_cm: f32) -> Side {
    if left_cm >= right_cm {
        Side::Left
    } else {
        Side::Right
    }
}

pub struct ObstacleAvoidance {
    phase: AvoidancePhase,
    tuning: NavTuning,
}

impl ObstacleAvoidance {
    pub fn new(tuning: NavTuning) -> Self {
        Self {
            phase: AvoidancePhase::Idle,
            tuning,
        }
    }

    pub fn phase(&self) -> AvoidancePhase {
        self.phase
    }

    /// Neither debouncing nor maneuvering
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, AvoidancePhase::Idle)
    }

    /// Maneuver underway (debounce excluded)
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, AvoidancePhase::Idle | AvoidancePhase::Debouncing { .. })
    }

    pub fn side(&self) -> Option<Side> {
        match self.phase {
            AvoidancePhase::Turn { side, .. }
            | AvoidancePhase::Forward { side, .. }
            | AvoidancePhase::TurnBack { side } => Some(side),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.phase = AvoidancePhase::Idle;
    }

    /// Samples the front pair; arms the debounce and halts the wheels when something is close
    ///
    /// Returns whether the debounce was armed.
    pub fn check_front<M: WheelOutput, S: DistanceSensors>(
        &mut self,
        ctx: &mut MotionContext<'_, M>,
        sensors: &mut S,
    ) -> bool {
        if !self.is_idle() {
            return false;
        }
        let front = sensors.front_min_cm(self.tuning.sensor_samples);
        if front >= self.tuning.obstacle_threshold_cm {
            return false;
        }
        debug!("front {} cm, debouncing", front);
        ctx.actuator.stop();
        self.phase = AvoidancePhase::Debouncing { since_ms: ctx.now_ms };
        true
    }

    /// Advances the debounce or the maneuver by one tick
    pub fn step<M: WheelOutput, S: DistanceSensors>(
        &mut self,
        ctx: &mut MotionContext<'_, M>,
        sensors: &mut S,
    ) -> AvoidanceStep {
        match self.phase {
            AvoidancePhase::Idle | AvoidancePhase::Done => AvoidanceStep::Pending,
            AvoidancePhase::Debouncing { since_ms } => self.debounce(ctx, sensors, since_ms),
            AvoidancePhase::Turn { side, cap_pulses } => match ctx.turn_outcome {
                Some(TurnOutcome::Completed) => {
                    debug!("avoid: escaping sideways");
                    ctx.forward();
                    self.phase = AvoidancePhase::Forward {
                        side,
                        start: ctx.pulses,
                        cap_pulses,
                    };
                    AvoidanceStep::Pending
                }
                Some(TurnOutcome::TimedOut) => self.abort(ctx),
                None => AvoidanceStep::Pending,
            },
            AvoidancePhase::Forward { side, start, cap_pulses } => {
                let probe = sensors.sample_cm(side.opposite().sensor(), self.tuning.sensor_samples);
                let cleared = probe >= self.tuning.obstacle_threshold_cm + self.tuning.clearance_margin_cm;
                let capped = ctx.travelled_since(start) >= cap_pulses;
                if !cleared && !capped {
                    return AvoidanceStep::Pending;
                }
                if !cleared {
                    warn!("avoid: escape cap reached before clearing");
                    ctx.report(Fault::SafetyCapReached);
                }
                self.turn_or_abort(ctx, -side.quarter_turn(), AvoidancePhase::TurnBack { side })
            }
            AvoidancePhase::TurnBack { .. } => match ctx.turn_outcome {
                Some(TurnOutcome::Completed) => {
                    debug!("avoid: crossing");
                    ctx.forward();
                    self.phase = AvoidancePhase::CrossForward {
                        start: ctx.pulses,
                        target_pulses: ctx.calibration.cm_to_pulses(self.tuning.avoid_step_cm),
                    };
                    AvoidanceStep::Pending
                }
                Some(TurnOutcome::TimedOut) => self.abort(ctx),
                None => AvoidanceStep::Pending,
            },
            AvoidancePhase::CrossForward { start, target_pulses } => {
                if ctx.travelled_since(start) < target_pulses {
                    return AvoidanceStep::Pending;
                }
                info!("avoid: obstacle passed");
                ctx.actuator.stop();
                self.phase = AvoidancePhase::Done;
                AvoidanceStep::Finished
            }
        }
    }

    fn debounce<M: WheelOutput, S: DistanceSensors>(
        &mut self,
        ctx: &mut MotionContext<'_, M>,
        sensors: &mut S,
        since_ms: u64,
    ) -> AvoidanceStep {
        if ctx.now_ms.saturating_sub(since_ms) < self.tuning.debounce_ms {
            return AvoidanceStep::Pending;
        }

        let front = sensors.front_min_cm(self.tuning.sensor_samples);
        if front >= self.tuning.obstacle_threshold_cm {
            debug!("front cleared to {} cm, transient", front);
            self.phase = AvoidancePhase::Idle;
            return AvoidanceStep::Transient;
        }

        let left = sensors.sample_cm(SensorId::Left, self.tuning.sensor_samples);
        let right = sensors.sample_cm(SensorId::Right, self.tuning.sensor_samples);
        let side = choose_side(left, right);
        let cap_pulses = ctx.calibration.cm_to_pulses(self.tuning.max_escape_cm);
        info!("obstacle at {} cm, escaping {} (L {} R {})", front, side, left, right);
        self.turn_or_abort(ctx, side.quarter_turn(), AvoidancePhase::Turn { side, cap_pulses })
    }

    fn turn_or_abort<M: WheelOutput>(
        &mut self,
        ctx: &mut MotionContext<'_, M>,
        angle_deg: f32,
        next: AvoidancePhase,
    ) -> AvoidanceStep {
        match ctx.start_turn(angle_deg) {
            Ok(()) => {
                self.phase = next;
                AvoidanceStep::Pending
            }
            Err(_) => {
                error!("avoid: turn rejected");
                self.phase = AvoidancePhase::Idle;
                ctx.halt();
                AvoidanceStep::Aborted
            }
        }
    }

    fn abort<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>) -> AvoidanceStep {
        ctx.report(Fault::TurnTimedOut);
        ctx.halt();
        self.phase = AvoidancePhase::Idle;
        AvoidanceStep::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::testing::Rig;
    use crate::sensors::testing::FixedSensors;

    fn machine() -> ObstacleAvoidance {
        ObstacleAvoidance::new(NavTuning::default())
    }

    /// Arms the debounce at t=0 and lets it expire against `sensors`
    fn trigger(avoid: &mut ObstacleAvoidance, rig: &mut Rig, sensors: &mut FixedSensors) -> AvoidanceStep {
        assert!(avoid.check_front(&mut rig.ctx(None), sensors));
        rig.now_ms = 300;
        avoid.step(&mut rig.ctx(None), sensors)
    }

    #[test]
    fn side_prefers_more_clearance() {
        assert_eq!(choose_side(40.0, 20.0), Side::Left);
        assert_eq!(choose_side(20.0, 40.0), Side::Right);
        assert_eq!(choose_side(25.0, 25.0), Side::Left);
    }

    #[test]
    fn clear_front_does_not_arm() {
        let mut avoid = machine();
        let mut rig = Rig::new();
        let mut sensors = FixedSensors::open().with_front(30.0);
        assert!(!avoid.check_front(&mut rig.ctx(None), &mut sensors));
        assert!(avoid.is_idle());
    }

    #[test]
    fn debounce_waits_then_engages_toward_open_side() {
        let mut avoid = machine();
        let mut rig = Rig::new();
        let mut sensors = FixedSensors::open().with_front(25.0);
        sensors.left = 40.0;
        sensors.right = 20.0;

        rig.actuator.move_forward(102);
        assert!(avoid.check_front(&mut rig.ctx(None), &mut sensors));
        assert_eq!(rig.actuator.commanded(), (0, 0));
        assert_eq!(avoid.phase().index(), 0);

        rig.now_ms = 299;
        assert_eq!(avoid.step(&mut rig.ctx(None), &mut sensors), AvoidanceStep::Pending);
        assert!(!avoid.is_active());

        rig.now_ms = 300;
        assert_eq!(avoid.step(&mut rig.ctx(None), &mut sensors), AvoidanceStep::Pending);
        assert_eq!(avoid.phase().index(), 1);
        assert_eq!(avoid.side(), Some(Side::Left));
        assert!(rig.turn.is_turning());
        assert_eq!(rig.actuator.commanded(), (-51, 51));
    }

    #[test]
    fn cleared_reading_is_transient() {
        let mut avoid = machine();
        let mut rig = Rig::new();
        let mut sensors = FixedSensors::open().with_front(25.0);
        assert!(avoid.check_front(&mut rig.ctx(None), &mut sensors));

        rig.now_ms = 150;
        sensors = sensors.with_front(60.0);
        assert_eq!(avoid.step(&mut rig.ctx(None), &mut sensors), AvoidanceStep::Pending);
        rig.now_ms = 300;
        assert_eq!(avoid.step(&mut rig.ctx(None), &mut sensors), AvoidanceStep::Transient);
        assert!(avoid.is_idle());
        assert!(!rig.turn.is_turning());
    }

    #[test]
    fn full_maneuver_runs_all_phases() {
        let mut avoid = machine();
        let mut rig = Rig::new();
        let mut sensors = FixedSensors::open().with_front(25.0);
        sensors.left = 20.0;
        sensors.right = 40.0;
        trigger(&mut avoid, &mut rig, &mut sensors);
        assert_eq!(avoid.side(), Some(Side::Right));
        assert_eq!(rig.actuator.commanded(), (51, -51));

        // turn done: escape sideways while the obstacle sits on the left
        let outcome = rig.complete_turn();
        sensors.left = 20.0;
        assert_eq!(avoid.step(&mut rig.ctx(outcome), &mut sensors), AvoidanceStep::Pending);
        assert_eq!(avoid.phase().index(), 2);
        assert_eq!(rig.actuator.commanded(), (102, 87));

        rig.advance(1000);
        assert_eq!(avoid.step(&mut rig.ctx(None), &mut sensors), AvoidanceStep::Pending);
        assert_eq!(avoid.phase().index(), 2);

        // left probe sees past the obstacle
        sensors.left = 45.0;
        rig.advance(200);
        let mut ctx = rig.ctx(None);
        assert_eq!(avoid.step(&mut ctx, &mut sensors), AvoidanceStep::Pending);
        assert_eq!(ctx.fault, None);
        assert_eq!(avoid.phase().index(), 3);
        assert_eq!(rig.actuator.commanded(), (-51, 51));

        let outcome = rig.complete_turn();
        assert_eq!(avoid.step(&mut rig.ctx(outcome), &mut sensors), AvoidanceStep::Pending);
        assert_eq!(avoid.phase().index(), 4);

        let step = rig.calibration.cm_to_pulses(40.0);
        rig.advance(step - 1);
        assert_eq!(avoid.step(&mut rig.ctx(None), &mut sensors), AvoidanceStep::Pending);
        rig.advance(1);
        assert_eq!(avoid.step(&mut rig.ctx(None), &mut sensors), AvoidanceStep::Finished);
        assert_eq!(avoid.phase(), AvoidancePhase::Done);
        assert_eq!(avoid.phase().index(), 5);
        assert_eq!(rig.actuator.commanded(), (0, 0));
    }

    #[test]
    fn escape_cap_reports_fault_and_turns_back() {
        let mut avoid = machine();
        let mut rig = Rig::new();
        let mut sensors = FixedSensors::all(20.0);
        sensors.left = 35.0;
        trigger(&mut avoid, &mut rig, &mut sensors);
        let outcome = rig.complete_turn();
        avoid.step(&mut rig.ctx(outcome), &mut sensors);

        // probe (right) never clears
        let cap = rig.calibration.cm_to_pulses(150.0);
        rig.advance(cap);
        let mut ctx = rig.ctx(None);
        assert_eq!(avoid.step(&mut ctx, &mut sensors), AvoidanceStep::Pending);
        assert_eq!(ctx.fault, Some(Fault::SafetyCapReached));
        assert_eq!(avoid.phase(), AvoidancePhase::TurnBack { side: Side::Left });
    }

    #[test]
    fn turn_timeout_aborts() {
        let mut avoid = machine();
        let mut rig = Rig::new();
        let mut sensors = FixedSensors::open().with_front(10.0);
        trigger(&mut avoid, &mut rig, &mut sensors);

        rig.turn.cancel();
        let mut ctx = rig.ctx(Some(TurnOutcome::TimedOut));
        assert_eq!(avoid.step(&mut ctx, &mut sensors), AvoidanceStep::Aborted);
        assert_eq!(ctx.fault, Some(Fault::TurnTimedOut));
        assert!(avoid.is_idle());
    }
}
