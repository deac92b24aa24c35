//! Rejections and faults
//!
//! [`NavError`] is returned synchronously to the operator layer and means
//! nothing changed. [`Fault`] is what a running behaviour records when one of
//! its operations ends terminally; it shows up in the navigator status.

/// Reason an operator request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NavError {
    /// A route is already running
    RouteAlreadyActive,
    /// No route with this id in the route table
    UnknownRoute(u8),
    /// Confirm requested but no route is waiting for one
    NothingToConfirm,
    /// An in-place turn owns the wheels right now
    TurnInProgress,
    /// Pulses per revolution must be positive
    InvalidPulsesPerRevolution,
    /// Calibration step requested outside a calibration run
    CalibrationNotRunning,
}

/// Terminal outcome of an automatic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// A turn did not reach its pulse target before the timeout
    TurnTimedOut,
    /// The sideways escape hit its distance cap before the probe cleared
    SafetyCapReached,
    /// The route table produced a waypoint index outside the route
    CorruptRoute { route_id: u8, index: usize },
}
