//! Waypoint route execution
//!
//! A route is an ordered list of floor points. Running it in the forward
//! direction visits indices `1..N`, the return direction visits `N-2` down to
//! `0`: the first point of each leg is where the robot already stands, so a
//! round trip never drives to the point it just left.
//!
//! ```text
//!        start / confirm                turn done
//! Idle ───────────────▶ Waiting ──▶ Turning ──────▶ Moving ──▶ (next waypoint)
//!                                      ▲                │
//!                                      └── leg end ◀────┘
//!                                          180° ──▶ Done
//! ```
//!
//! Every leg is "face the waypoint, drive the straight-line distance". While
//! moving, the frontal sensors are watched and an [`ObstacleAvoidance`]
//! maneuver takes over when something blocks the way.
//!
//! The forward leg ends with a 180° turn and then waits for the operator to
//! confirm the return leg. The return leg ends with a final 180° turn and
//! finishes the route.

use crate::config::NavTuning;
use crate::encoder::WheelPulses;
use crate::error::{Fault, NavError};
use crate::motion::MotionContext;
use crate::motor::WheelOutput;
use crate::obstacle::{AvoidancePhase, AvoidanceStep, ObstacleAvoidance};
use crate::odometry::Point;
use crate::sensors::DistanceSensors;
use crate::turn::TurnOutcome;

/// Named, immutable list of waypoints
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub name: &'static str,
    pub waypoints: &'static [Point],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Return,
}

/// What a route-owned turn is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TurnPurpose {
    TowardWaypoint,
    EndOfForwardLeg,
    EndOfReturnLeg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteStage {
    Idle,
    /// Waiting for the start delay to expire or an operator confirmation
    Waiting { resume_at_ms: u64 },
    Turning { purpose: TurnPurpose },
    Moving { start: WheelPulses, target_pulses: i32 },
    Done,
}

/// Movement of a route that was interrupted mid-leg
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResumeLeg {
    pub route_id: u8,
    pub direction: Direction,
    /// Number of waypoints of the leg already reached
    pub step: usize,
    pub target: Point,
}

/// Waypoint index of the `step`-th stop of a leg, `None` once the leg is complete
pub fn waypoint_index(len: usize, direction: Direction, step: usize) -> Option<usize> {
    let stops = len.saturating_sub(1);
    if step >= stops {
        return None;
    }
    match direction {
        Direction::Forward => Some(step + 1),
        Direction::Return => Some(stops - 1 - step),
    }
}

pub struct RouteExecutor {
    routes: &'static [Route],
    tuning: NavTuning,
    active: bool,
    route_id: u8,
    direction: Direction,
    step: usize,
    stage: RouteStage,
    awaiting_start: bool,
    awaiting_return: bool,
    target: Point,
    obstacle: ObstacleAvoidance,
}

impl RouteExecutor {
    pub fn new(routes: &'static [Route], tuning: NavTuning) -> Self {
        Self {
            routes,
            tuning,
            active: false,
            route_id: 0,
            direction: Direction::Forward,
            step: 0,
            stage: RouteStage::Idle,
            awaiting_start: false,
            awaiting_return: false,
            target: Point::default(),
            obstacle: ObstacleAvoidance::new(tuning),
        }
    }

    pub fn routes(&self) -> &'static [Route] {
        self.routes
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stage(&self) -> RouteStage {
        self.stage
    }

    pub fn route_id(&self) -> u8 {
        self.route_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn target(&self) -> Point {
        self.target
    }

    /// Waypoint index currently driven to, if any
    pub fn current_waypoint(&self) -> Option<usize> {
        let route = self.routes.get(self.route_id as usize)?;
        waypoint_index(route.waypoints.len(), self.direction, self.step)
    }

    pub fn awaiting_start(&self) -> bool {
        self.awaiting_start
    }

    pub fn awaiting_return(&self) -> bool {
        self.awaiting_return
    }

    pub fn avoidance_phase(&self) -> AvoidancePhase {
        self.obstacle.phase()
    }

    /// Milliseconds until the delayed start fires
    pub fn remaining_delay_ms(&self, now_ms: u64) -> Option<u64> {
        match self.stage {
            RouteStage::Waiting { resume_at_ms } => Some(resume_at_ms.saturating_sub(now_ms)),
            _ => None,
        }
    }

    /// Accepts a route; it starts after `delay_ms` or on confirmation, whichever comes first
    pub fn start(&mut self, route_id: u8, direction: Direction, delay_ms: u64, now_ms: u64) -> Result<(), NavError> {
        if self.active {
            return Err(NavError::RouteAlreadyActive);
        }
        let routes = self.routes;
        let route = routes.get(route_id as usize).ok_or(NavError::UnknownRoute(route_id))?;

        self.route_id = route_id;
        self.direction = direction;
        self.step = 0;
        self.obstacle.reset();
        self.awaiting_return = false;

        if route.waypoints.len() < 2 {
            info!("route {} has no leg to drive", route_id);
            self.awaiting_start = false;
            self.stage = RouteStage::Done;
            return Ok(());
        }

        info!("route {} ({}) {} starts in {} ms", route_id, route.name, direction, delay_ms);
        self.active = true;
        self.awaiting_start = true;
        self.stage = RouteStage::Waiting {
            resume_at_ms: now_ms.saturating_add(delay_ms),
        };
        Ok(())
    }

    /// Operator confirmation: skips the start delay or releases the return leg
    pub fn confirm(&mut self, now_ms: u64) -> Result<(), NavError> {
        if !self.active {
            return Err(NavError::NothingToConfirm);
        }
        if self.awaiting_return {
            info!("route {} return leg confirmed", self.route_id);
            self.awaiting_return = false;
            self.direction = Direction::Return;
            self.step = 0;
            self.stage = RouteStage::Waiting {
                resume_at_ms: now_ms,
            };
            return Ok(());
        }
        match self.stage {
            RouteStage::Waiting { .. } if self.awaiting_start => {
                self.stage = RouteStage::Waiting {
                    resume_at_ms: now_ms,
                };
                Ok(())
            }
            _ => Err(NavError::NothingToConfirm),
        }
    }

    /// Drops the route; the caller halts the wheels
    pub fn stop(&mut self) {
        if self.active {
            info!("route {} stopped", self.route_id);
        }
        self.active = false;
        self.stage = RouteStage::Idle;
        self.awaiting_start = false;
        self.awaiting_return = false;
        self.obstacle.reset();
    }

    /// The leg being driven right now, for resuming after an interruption
    pub fn in_flight_leg(&self) -> Option<ResumeLeg> {
        if !self.active {
            return None;
        }
        match self.stage {
            RouteStage::Moving { .. } | RouteStage::Turning {
                purpose: TurnPurpose::TowardWaypoint,
            } => Some(ResumeLeg {
                route_id: self.route_id,
                direction: self.direction,
                step: self.step,
                target: self.target,
            }),
            _ => None,
        }
    }

    /// Re-enters an interrupted leg, either driving straight on or facing the target first
    pub fn resume<M: WheelOutput>(
        &mut self,
        leg: ResumeLeg,
        via_turn: bool,
        ctx: &mut MotionContext<'_, M>,
    ) -> Result<(), NavError> {
        if self.active {
            return Err(NavError::RouteAlreadyActive);
        }
        let routes = self.routes;
        let route = routes.get(leg.route_id as usize).ok_or(NavError::UnknownRoute(leg.route_id))?;

        self.active = true;
        self.route_id = leg.route_id;
        self.direction = leg.direction;
        self.step = leg.step;
        self.awaiting_start = false;
        self.awaiting_return = false;
        self.obstacle.reset();

        let Some(target) = self.waypoint(route) else {
            self.corrupt(ctx);
            return Ok(());
        };
        self.target = target;
        info!("route {} resumes toward waypoint {}", self.route_id, self.step);
        if via_turn {
            let angle = ctx.pose.turn_toward(target);
            self.turn(ctx, angle, TurnPurpose::TowardWaypoint);
        } else {
            self.start_moving(ctx);
        }
        Ok(())
    }

    pub fn tick<M: WheelOutput, S: DistanceSensors>(&mut self, ctx: &mut MotionContext<'_, M>, sensors: &mut S) {
        match self.stage {
            RouteStage::Idle | RouteStage::Done => {}
            RouteStage::Waiting { resume_at_ms } if ctx.now_ms >= resume_at_ms => {
                self.awaiting_start = false;
                self.begin_next_waypoint(ctx);
            }
            RouteStage::Waiting { .. } => {}
            RouteStage::Turning { purpose } => match ctx.turn_outcome {
                Some(TurnOutcome::Completed) => self.turn_completed(ctx, purpose),
                Some(TurnOutcome::TimedOut) => {
                    ctx.report(Fault::TurnTimedOut);
                    self.halt(ctx);
                }
                None => {}
            },
            RouteStage::Moving { start, target_pulses } => self.tick_moving(ctx, sensors, start, target_pulses),
        }
    }

    fn tick_moving<M: WheelOutput, S: DistanceSensors>(
        &mut self,
        ctx: &mut MotionContext<'_, M>,
        sensors: &mut S,
        start: WheelPulses,
        target_pulses: i32,
    ) {
        if self.obstacle.is_idle() {
            if ctx.travelled_since(start) >= target_pulses {
                info!("route {} reached waypoint {}", self.route_id, self.current_waypoint());
                self.step += 1;
                self.begin_next_waypoint(ctx);
            } else {
                self.obstacle.check_front(ctx, sensors);
            }
            return;
        }

        match self.obstacle.step(ctx, sensors) {
            AvoidanceStep::Pending => {}
            // leg snapshot is kept; the pulses driven before the stop still count
            AvoidanceStep::Transient => ctx.forward(),
            AvoidanceStep::Finished => {
                self.obstacle.reset();
                self.replan(ctx);
            }
            AvoidanceStep::Aborted => self.halt(ctx),
        }
    }

    /// Faces the next waypoint of the leg, or turns around once the leg is complete
    fn begin_next_waypoint<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>) {
        let routes = self.routes;
        let Some(route) = routes.get(self.route_id as usize) else {
            self.corrupt(ctx);
            return;
        };

        if self.step >= route.waypoints.len().saturating_sub(1) {
            let purpose = match self.direction {
                Direction::Forward => TurnPurpose::EndOfForwardLeg,
                Direction::Return => TurnPurpose::EndOfReturnLeg,
            };
            info!("route {} leg complete, turning around", self.route_id);
            self.turn(ctx, 180.0, purpose);
            return;
        }

        let Some(target) = self.waypoint(route) else {
            self.corrupt(ctx);
            return;
        };
        self.target = target;
        let angle = ctx.pose.turn_toward(target);
        debug!("waypoint {} at ({}, {}), turning {} deg", self.step, target.x, target.y, angle);
        self.turn(ctx, angle, TurnPurpose::TowardWaypoint);
    }

    fn turn_completed<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>, purpose: TurnPurpose) {
        match purpose {
            TurnPurpose::TowardWaypoint => self.start_moving(ctx),
            TurnPurpose::EndOfForwardLeg => {
                info!("route {} waiting for return confirmation", self.route_id);
                self.awaiting_return = true;
                self.stage = RouteStage::Done;
            }
            TurnPurpose::EndOfReturnLeg => {
                info!("route {} done", self.route_id);
                self.active = false;
                self.stage = RouteStage::Done;
            }
        }
    }

    /// Drives the straight-line distance to the target from the current pose
    fn start_moving<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>) {
        let distance = ctx.pose.distance_to(self.target);
        if distance < self.tuning.arrival_epsilon_cm {
            debug!("already at waypoint {}", self.step);
            self.step += 1;
            self.begin_next_waypoint(ctx);
            return;
        }
        let target_pulses = ctx.calibration.cm_to_pulses(distance);
        ctx.forward();
        self.stage = RouteStage::Moving {
            start: ctx.pulses,
            target_pulses,
        };
    }

    /// Picks the original target up again after an avoidance maneuver
    fn replan<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>) {
        let distance = ctx.pose.distance_to(self.target);
        if distance < self.tuning.arrival_epsilon_cm {
            self.step += 1;
            self.begin_next_waypoint(ctx);
            return;
        }
        let angle = ctx.pose.turn_toward(self.target);
        if libm::fabsf(angle) > self.tuning.heading_tolerance_deg {
            self.turn(ctx, angle, TurnPurpose::TowardWaypoint);
        } else {
            self.start_moving(ctx);
        }
    }

    fn turn<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>, angle_deg: f32, purpose: TurnPurpose) {
        match ctx.start_turn(angle_deg) {
            Ok(()) => self.stage = RouteStage::Turning { purpose },
            Err(_) => {
                error!("route {} turn rejected", self.route_id);
                self.halt(ctx);
            }
        }
    }

    fn waypoint(&self, route: &Route) -> Option<Point> {
        let index = waypoint_index(route.waypoints.len(), self.direction, self.step)?;
        route.waypoints.get(index).copied()
    }

    fn corrupt<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>) {
        let index = match self.direction {
            Direction::Forward => self.step.saturating_add(1),
            Direction::Return => self.step,
        };
        ctx.report(Fault::CorruptRoute {
            route_id: self.route_id,
            index,
        });
        self.halt(ctx);
    }

    fn halt<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>) {
        ctx.halt();
        self.stop();
    }
}
