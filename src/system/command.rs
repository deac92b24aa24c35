//! Operator commands and navigator status
//!
//! Commands are queued on a channel and drained by the control loop at the
//! start of every tick, so they always land between two navigator ticks. The
//! status goes the other way through a signal: only the newest snapshot
//! matters, older ones are overwritten.

use amr_nav::route::Direction;
use amr_nav::sensors::Side;
use amr_nav::supervisor::NavigatorStatus;
use defmt::Format;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

/// Commands waiting for the next control loop tick
static COMMANDS: Channel<CriticalSectionRawMutex, Command, 8> = Channel::new();

/// Latest navigator status
static STATUS: Signal<CriticalSectionRawMutex, NavigatorStatus> = Signal::new();

/// Queues a command for the control loop
pub async fn send(command: Command) {
    COMMANDS.sender().send(command).await;
}

/// Next queued command, if any; never waits
pub fn try_receive() -> Option<Command> {
    COMMANDS.receiver().try_receive().ok()
}

/// Replaces the published status
pub fn publish_status(status: NavigatorStatus) {
    STATUS.signal(status);
}

/// Waits for a status newer than the last one taken
pub async fn wait_status() -> NavigatorStatus {
    STATUS.wait().await
}

/// Operator requests
#[derive(Debug, Clone, Copy, PartialEq, Format)]
pub enum Command {
    /// Start a route after a delay; confirming starts it earlier
    StartRoute {
        route_id: u8,
        direction: Direction,
        delay_ms: u64,
    },
    /// Confirm a pending start or the return leg
    ConfirmRoute,
    /// Stop whatever drives the wheels
    StopAll,
    /// Follow the wall on one side
    WallFollow(Side),
    /// Back to the origin, counters zeroed
    ResetPosition,
    /// Start a revolution capture
    StartCalibration,
    /// Mark a revolution while capturing, otherwise run the motor self-test
    MarkOrSelfTest,
}
