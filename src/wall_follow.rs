//! Wall following
//!
//! Keeps a lateral wall inside a distance band with a proportional two-wheel
//! correction. Exterior corners (a wall ahead) are taken with a quarter turn
//! away from the followed side. Boxed in on all four sensors for longer than
//! the timeout, following gives up.
//!
//! When following was started on top of a route leg, the follower also looks
//! for a way back onto that leg every tick:
//!
//! | front pair | opposite side | action          |
//! |------------|---------------|-----------------|
//! | clear      | clear         | resume forward  |
//! | clear      | wall          | resume forward  |
//! | wall       | clear         | resume via turn |
//!
//! A resume action is latched on one tick and handed to the navigator on the
//! next, which ends following and restarts the route.

use crate::config::WallFollowTuning;
use crate::error::Fault;
use crate::motion::MotionContext;
use crate::motor::WheelOutput;
use crate::route::ResumeLeg;
use crate::sensors::{DistanceSensors, SensorId, Side};
use crate::turn::TurnOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WallFollowState {
    Following,
    Turning,
    /// Walls on all four sensors since `since_ms`
    Stopped { since_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResumeAction {
    Forward,
    ViaTurn,
}

/// What the navigator has to act on after a follower tick
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WallFollowEvent {
    /// Following ended; hand the leg back to the route executor
    Resume { leg: ResumeLeg, action: ResumeAction },
    /// Following ended on its own (boxed in, or a corner turn timed out)
    Ended,
}

/// Wall flags of one sensor sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Walls {
    front_left: bool,
    front_right: bool,
    left: bool,
    right: bool,
}

impl Walls {
    fn front(&self) -> bool {
        self.front_left || self.front_right
    }

    fn all(&self) -> bool {
        self.front_left && self.front_right && self.left && self.right
    }

    fn side(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

/// Resume decision for the current sweep, in priority order
fn resume_action(walls: &Walls, side: Side) -> Option<ResumeAction> {
    let front_clear = !walls.front();
    let opposite_clear = !walls.side(side.opposite());
    if front_clear {
        Some(ResumeAction::Forward)
    } else if opposite_clear {
        Some(ResumeAction::ViaTurn)
    } else {
        None
    }
}

pub struct WallFollower {
    tuning: WallFollowTuning,
    samples: u8,
    active: bool,
    side: Side,
    state: WallFollowState,
    resume_leg: Option<ResumeLeg>,
    pending: Option<ResumeAction>,
}

impl WallFollower {
    pub fn new(tuning: WallFollowTuning, samples: u8) -> Self {
        Self {
            tuning,
            samples,
            active: false,
            side: Side::Left,
            state: WallFollowState::Following,
            resume_leg: None,
            pending: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> WallFollowState {
        self.state
    }

    pub fn pending_resume(&self) -> Option<ResumeAction> {
        self.pending
    }

    pub fn resume_leg(&self) -> Option<ResumeLeg> {
        self.resume_leg
    }

    /// Starts following the wall on `side`, optionally holding a leg to return to
    pub fn start(&mut self, side: Side, resume_leg: Option<ResumeLeg>) {
        info!("wall follow {} start", side);
        self.active = true;
        self.side = side;
        self.state = WallFollowState::Following;
        self.resume_leg = resume_leg;
        self.pending = None;
    }

    /// Ends following; the caller halts the wheels
    pub fn stop(&mut self) {
        if self.active {
            info!("wall follow stopped");
        }
        self.active = false;
        self.state = WallFollowState::Following;
        self.resume_leg = None;
        self.pending = None;
    }

    pub fn tick<M: WheelOutput, S: DistanceSensors>(
        &mut self,
        ctx: &mut MotionContext<'_, M>,
        sensors: &mut S,
    ) -> Option<WallFollowEvent> {
        if !self.active {
            return None;
        }

        if let Some(action) = self.pending.take() {
            let leg = self.resume_leg.take();
            self.stop();
            return leg.map(|leg| {
                info!("wall follow hands back to route {}", leg.route_id);
                WallFollowEvent::Resume { leg, action }
            });
        }

        if self.state == WallFollowState::Turning {
            match ctx.turn_outcome {
                Some(TurnOutcome::Completed) => self.state = WallFollowState::Following,
                Some(TurnOutcome::TimedOut) => {
                    ctx.report(Fault::TurnTimedOut);
                    return self.end(ctx);
                }
                None => {}
            }
            return None;
        }

        let (walls, wall_cm) = self.sweep(sensors);

        if walls.all() {
            match self.state {
                WallFollowState::Stopped { since_ms } => {
                    if ctx.now_ms.saturating_sub(since_ms) >= self.tuning.all_walls_timeout_ms {
                        info!("boxed in, wall follow ends");
                        return self.end(ctx);
                    }
                }
                _ => {
                    debug!("walls all around, holding");
                    ctx.actuator.stop();
                    self.state = WallFollowState::Stopped { since_ms: ctx.now_ms };
                }
            }
            return None;
        }
        self.state = WallFollowState::Following;

        if self.resume_leg.is_some() {
            if let Some(action) = resume_action(&walls, self.side) {
                debug!("resume {} latched", action);
                ctx.actuator.stop();
                self.pending = Some(action);
                return None;
            }
        }

        if walls.front() {
            let angle = -self.side.quarter_turn();
            debug!("wall ahead, turning {} deg", angle);
            ctx.actuator.stop();
            if ctx.start_turn(angle).is_err() {
                return self.end(ctx);
            }
            self.state = WallFollowState::Turning;
            return None;
        }

        self.steer(ctx, wall_cm);
        None
    }

    /// One read per sensor; also returns the distance to the followed wall
    fn sweep<S: DistanceSensors>(&self, sensors: &mut S) -> (Walls, f32) {
        let mut read = |id: SensorId| sensors.sample_cm(id, self.samples);
        let [front_left, front_right, left, right] = SensorId::ALL.map(&mut read);
        let threshold = self.tuning.wall_threshold_cm;
        let walls = Walls {
            front_left: front_left < threshold,
            front_right: front_right < threshold,
            left: left < threshold,
            right: right < threshold,
        };
        let followed = match self.side {
            Side::Left => left,
            Side::Right => right,
        };
        (walls, followed)
    }

    /// Proportional band keeping on the followed wall
    fn steer<M: WheelOutput>(&self, ctx: &mut MotionContext<'_, M>, distance: f32) {
        let base = self.tuning.base_duty;
        let slow = base - self.tuning.correction_duty;

        // slowing a wheel yaws the chassis toward that wheel's side
        let (wall_wheel, far_wheel) = if distance < self.tuning.near_cm {
            (base, slow)
        } else if distance > self.tuning.far_cm {
            (slow, base)
        } else {
            (base, base)
        };
        let (left, right) = match self.side {
            Side::Left => (wall_wheel, far_wheel),
            Side::Right => (far_wheel, wall_wheel),
        };
        // raw duty: the slowed wheel may sit below the duty floor
        let compensation = ctx.actuator.drive_tuning().right_compensation;
        let right = libm::roundf(right as f32 * compensation) as i16;
        ctx.actuator.set_raw_duty(left, right);
    }

    fn end<M: WheelOutput>(&mut self, ctx: &mut MotionContext<'_, M>) -> Option<WallFollowEvent> {
        ctx.halt();
        self.stop();
        Some(WallFollowEvent::Ended)
    }
}
