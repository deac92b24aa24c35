//! Navigation core for a differential-drive mobile robot
//!
//! Pure `no_std` logic shared by the firmware and the host tests:
//! quadrature pulse counting, dead-reckoning odometry, wheel actuation with an
//! optional velocity PID, an encoder-terminated turn primitive, and the
//! behaviours built on top of them (waypoint routes with obstacle avoidance and
//! wall following), all arbitrated by a single [`supervisor::Navigator`].
//!
//! Nothing in here blocks. Every component is advanced by a `tick`-style call
//! from one cooperative control loop; waits are a state plus a timestamp in
//! milliseconds checked on a later tick. Hardware enters through the
//! [`motor::WheelOutput`] and [`sensors::DistanceSensors`] traits and through
//! plain [`encoder::WheelPulses`] snapshots.

#![cfg_attr(not(test), no_std)]

// must stay first so the logging macros are visible to the modules below
mod fmt;

pub mod config;
pub mod diagnostics;
pub mod encoder;
pub mod error;
pub mod motion;
pub mod motor;
pub mod obstacle;
pub mod odometry;
pub mod pid;
pub mod route;
pub mod sensors;
pub mod supervisor;
pub mod turn;
pub mod wall_follow;
