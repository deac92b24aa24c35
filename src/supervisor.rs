//! Navigation supervisor
//!
//! [`Navigator`] owns every piece of navigation state and is the only thing
//! the control loop talks to. Once per tick it:
//!
//! 1. integrates the new pulse snapshot into the pose
//! 2. feeds the wheel deltas to the velocity loop
//! 3. advances the turn controller
//! 4. advances whichever behaviour is active (self-test, route or wall follow)
//!
//! Operator commands arrive between ticks. Route execution and wall following
//! exclude each other: starting one stops and resets the other before it
//! starts, so no tick ever sees both active. Manual motion is rejected while
//! an in-place turn owns the wheels and otherwise overrides any automatic
//! behaviour.

use crate::config::RobotConfig;
use crate::diagnostics::{RevolutionCapture, SelfTest};
use crate::encoder::{Encoders, WheelPulses};
use crate::error::{Fault, NavError};
use crate::motion::MotionContext;
use crate::motor::{WheelActuator, WheelOutput};
use crate::odometry::{Odometry, Pose};
use crate::route::{Direction, Route, RouteExecutor, RouteStage};
use crate::sensors::{DistanceSensors, Side};
use crate::turn::TurnController;
use crate::wall_follow::{ResumeAction, WallFollowEvent, WallFollowState, WallFollower};

/// Operator motion primitives
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManualCommand {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    /// Encoder-terminated in-place rotation, degrees (positive counter-clockwise)
    Rotate(f32),
    Stop,
}

/// Top-level behaviour currently driving the wheels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Behaviour {
    Idle,
    Manual,
    Route,
    WallFollow,
    SelfTest,
}

/// Snapshot of everything the operator layer may display
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NavigatorStatus {
    pub pose: Pose,
    pub pulses: WheelPulses,
    pub behaviour: Behaviour,
    pub route_active: bool,
    pub route_id: u8,
    pub route_stage: RouteStage,
    pub direction: Direction,
    pub waypoint: Option<usize>,
    /// Obstacle avoidance phase, 0 (idle) to 5 (done)
    pub avoidance_phase: u8,
    pub awaiting_start: bool,
    pub awaiting_return: bool,
    pub remaining_delay_ms: Option<u64>,
    pub wall_follow_active: bool,
    pub wall_side: Side,
    pub wall_state: WallFollowState,
    pub turning: bool,
    pub velocity_control: bool,
    pub duty: (i16, i16),
    pub calibrating: bool,
    pub last_fault: Option<Fault>,
}

pub struct Navigator<M: WheelOutput> {
    config: RobotConfig,
    actuator: WheelActuator<M>,
    odometry: Odometry,
    turn: TurnController,
    route: RouteExecutor,
    wall: WallFollower,
    self_test: Option<SelfTest>,
    capture: RevolutionCapture,
    manual: bool,
    pulses: WheelPulses,
    now_ms: u64,
    last_fault: Option<Fault>,
}

impl<M: WheelOutput> Navigator<M> {
    /// Starts idle at the origin with the wheels stopped
    pub fn new(output: M, config: RobotConfig, routes: &'static [Route], pulses: WheelPulses, now_ms: u64) -> Self {
        Self {
            actuator: WheelActuator::new(output, config.drive, config.pid),
            odometry: Odometry::new(pulses),
            turn: TurnController::new(config.nav.turn_timeout_ms),
            route: RouteExecutor::new(routes, config.nav),
            wall: WallFollower::new(config.wall, config.nav.sensor_samples),
            self_test: None,
            capture: RevolutionCapture::default(),
            manual: false,
            pulses,
            now_ms,
            last_fault: None,
            config,
        }
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn pose(&self) -> Pose {
        self.odometry.pose()
    }

    pub fn actuator(&self) -> &WheelActuator<M> {
        &self.actuator
    }

    pub fn route(&self) -> &RouteExecutor {
        &self.route
    }

    pub fn wall_follower(&self) -> &WallFollower {
        &self.wall
    }

    pub fn last_fault(&self) -> Option<Fault> {
        self.last_fault
    }

    pub fn behaviour(&self) -> Behaviour {
        if self.self_test.is_some() {
            Behaviour::SelfTest
        } else if self.route.is_active() {
            Behaviour::Route
        } else if self.wall.is_active() {
            Behaviour::WallFollow
        } else if self.manual {
            Behaviour::Manual
        } else {
            Behaviour::Idle
        }
    }

    /// One control-loop iteration
    pub fn tick<S: DistanceSensors>(&mut self, pulses: WheelPulses, now_ms: u64, sensors: &mut S) {
        let delta = pulses.since(self.pulses);
        let elapsed_ms = now_ms.saturating_sub(self.now_ms);
        self.pulses = pulses;
        self.now_ms = now_ms;

        let pose = self.odometry.update(pulses, &self.config.calibration);
        let elapsed_ms = u32::try_from(elapsed_ms).unwrap_or(u32::MAX);
        // a running turn owns the wheels
        if !self.turn.is_turning() {
            self.actuator.update_velocity_control(delta.left, delta.right, elapsed_ms);
        }
        let turn_outcome = self.turn.tick(pulses, now_ms, &mut self.actuator);

        if let Some(test) = self.self_test.as_mut() {
            if test.tick(now_ms, &mut self.actuator) {
                self.self_test = None;
            }
            return;
        }

        let mut ctx = MotionContext {
            actuator: &mut self.actuator,
            turn: &mut self.turn,
            calibration: &self.config.calibration,
            pose,
            pulses,
            now_ms,
            turn_outcome,
            fault: None,
        };

        if self.route.is_active() {
            self.route.tick(&mut ctx, sensors);
        } else if self.wall.is_active() {
            match self.wall.tick(&mut ctx, sensors) {
                Some(WallFollowEvent::Resume { leg, action }) => {
                    let via_turn = action == ResumeAction::ViaTurn;
                    if let Err(e) = self.route.resume(leg, via_turn, &mut ctx) {
                        warn!("route resume rejected: {}", e);
                        ctx.halt();
                    }
                }
                Some(WallFollowEvent::Ended) | None => {}
            }
        } else if let Some(outcome) = turn_outcome {
            debug!("manual rotation {}", outcome);
            self.manual = false;
        }

        if let Some(fault) = ctx.fault {
            self.last_fault = Some(fault);
        }
    }

    fn halt(&mut self) {
        self.turn.cancel();
        self.actuator.stop();
    }

    /// Stops every behaviour, the velocity loop and the wheels
    fn stop_all(&mut self) {
        self.route.stop();
        self.wall.stop();
        self.self_test = None;
        self.manual = false;
        if self.actuator.is_velocity_control_enabled() {
            self.actuator.enable_velocity_control(false);
        }
        self.halt();
    }

    fn ensure_not_turning(&self) -> Result<(), NavError> {
        if self.turn.is_turning() {
            Err(NavError::TurnInProgress)
        } else {
            Ok(())
        }
    }

    // --- route ---

    /// Starts a route after `delay_ms`, or earlier on confirmation
    pub fn start_route(&mut self, route_id: u8, direction: Direction, delay_ms: u64) -> Result<(), NavError> {
        if self.route.is_active() {
            return Err(NavError::RouteAlreadyActive);
        }
        if self.route.routes().get(route_id as usize).is_none() {
            return Err(NavError::UnknownRoute(route_id));
        }
        self.stop_all();
        self.route.start(route_id, direction, delay_ms, self.now_ms)
    }

    pub fn confirm_route(&mut self) -> Result<(), NavError> {
        self.route.confirm(self.now_ms)
    }

    pub fn stop_route(&mut self) {
        self.route.stop();
        self.halt();
    }

    // --- wall follow ---

    /// Follows the wall on `side`; a route leg in flight is kept for resuming
    pub fn start_wall_follow(&mut self, side: Side) {
        let leg = self.route.in_flight_leg();
        self.stop_all();
        self.wall.start(side, leg);
    }

    pub fn stop_wall_follow(&mut self) {
        self.wall.stop();
        self.halt();
    }

    // --- manual and diagnostics ---

    pub fn manual(&mut self, command: ManualCommand) -> Result<(), NavError> {
        self.ensure_not_turning()?;
        self.stop_all();

        let drive = *self.actuator.drive_tuning();
        match command {
            ManualCommand::Forward => self.actuator.move_forward(drive.default_duty),
            ManualCommand::Backward => self.actuator.move_backward(drive.default_duty),
            ManualCommand::TurnLeft => self.actuator.turn_left(drive.turn_duty),
            ManualCommand::TurnRight => self.actuator.turn_right(drive.turn_duty),
            ManualCommand::Rotate(angle_deg) => self.turn.start_turn(
                angle_deg,
                &self.odometry.pose(),
                self.pulses,
                self.now_ms,
                &self.config.calibration,
                &mut self.actuator,
            )?,
            ManualCommand::Stop => return Ok(()),
        }
        self.manual = true;
        Ok(())
    }

    pub fn run_self_test(&mut self) -> Result<(), NavError> {
        self.ensure_not_turning()?;
        self.stop_all();
        self.self_test = Some(SelfTest::start(self.now_ms, &mut self.actuator));
        Ok(())
    }

    pub fn start_calibration(&mut self) -> Result<(), NavError> {
        self.ensure_not_turning()?;
        self.capture.start(self.pulses);
        Ok(())
    }

    /// Marks the end of one revolution; returns the new PPR once the capture completes
    pub fn mark_revolution(&mut self) -> Result<Option<u32>, NavError> {
        self.capture.mark(self.pulses, &mut self.config.calibration)
    }

    pub fn cancel_calibration(&mut self) {
        self.capture.cancel();
    }

    // --- velocity loop ---

    pub fn enable_velocity_control(&mut self, enabled: bool) -> Result<(), NavError> {
        self.ensure_not_turning()?;
        if enabled {
            self.stop_all();
            self.manual = true;
        }
        self.actuator.enable_velocity_control(enabled);
        Ok(())
    }

    pub fn set_target_speed(&mut self, left_pps: f32, right_pps: f32) -> Result<(), NavError> {
        self.ensure_not_turning()?;
        self.actuator.set_target_pulses_per_second(left_pps, right_pps);
        Ok(())
    }

    pub fn set_pid_gains(&mut self, kp: f32, ki: f32, kd: f32) {
        self.actuator.set_pid_gains(kp, ki, kd);
    }

    // --- pose and calibration ---

    /// Operator pose correction, heading in degrees
    pub fn set_position(&mut self, x: f32, y: f32, heading_deg: f32) {
        self.odometry.set_position(x, y, heading_deg);
    }

    /// Back to the origin; zeroes the pulse counters together with the pose
    ///
    /// Every behaviour is stopped first: their pulse snapshots would be stale.
    pub fn reset_position(&mut self, encoders: &Encoders) {
        self.stop_all();
        encoders.reset();
        self.odometry.reset_position();
        self.pulses = WheelPulses::default();
        self.capture.cancel();
    }

    pub fn set_pulses_per_revolution(&mut self, value: u32) -> Result<(), NavError> {
        self.config.calibration.set_pulses_per_revolution(value)
    }

    pub fn set_encoder_inversion(&mut self, left: bool, right: bool, encoders: &Encoders) {
        self.config.calibration.left_inverted = left;
        self.config.calibration.right_inverted = right;
        encoders.apply_calibration(&self.config.calibration);
    }

    pub fn status(&self) -> NavigatorStatus {
        NavigatorStatus {
            pose: self.odometry.pose(),
            pulses: self.pulses,
            behaviour: self.behaviour(),
            route_active: self.route.is_active(),
            route_id: self.route.route_id(),
            route_stage: self.route.stage(),
            direction: self.route.direction(),
            waypoint: self.route.current_waypoint(),
            avoidance_phase: self.route.avoidance_phase().index(),
            awaiting_start: self.route.awaiting_start(),
            awaiting_return: self.route.awaiting_return(),
            remaining_delay_ms: self.route.remaining_delay_ms(self.now_ms),
            wall_follow_active: self.wall.is_active(),
            wall_side: self.wall.side(),
            wall_state: self.wall.state(),
            turning: self.turn.is_turning(),
            velocity_control: self.actuator.is_velocity_control_enabled(),
            duty: self.actuator.commanded(),
            calibrating: self.capture.is_running(),
            last_fault: self.last_fault,
        }
    }
}
