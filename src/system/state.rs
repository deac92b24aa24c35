//! State shared between the encoder edge tasks and the control loop

use amr_nav::config::CalibrationConfig;
use amr_nav::encoder::Encoders;

/// Pulse counters of both wheels
///
/// Written from the edge tasks, read and reset from the control loop; every
/// access goes through a critical section inside [`Encoders`].
pub static ENCODERS: Encoders = Encoders::new(
    CalibrationConfig::DEFAULT.left_inverted,
    CalibrationConfig::DEFAULT.right_inverted,
);
