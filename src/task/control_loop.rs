//! Control loop task
//!
//! Owns the [`Navigator`] and runs it on a fixed 10 ms ticker. Each tick:
//!
//! 1. drains the operator command queue
//! 2. takes one atomic snapshot of both pulse counters
//! 3. ticks the navigator with that snapshot, the current time and the sensors
//! 4. publishes the resulting status
//!
//! Nothing in a tick awaits, so a slow tick only delays the next one; the
//! ticker skips ahead instead of bursting to catch up.

use amr_nav::config::RobotConfig;
use amr_nav::supervisor::{ManualCommand, Navigator};
use defmt::{info, warn};
use embassy_time::{Duration, Instant, Ticker};

use crate::system::command::{self, Command};
use crate::system::distance::AnalogDistanceSensors;
use crate::system::motors::DriveTrain;
use crate::system::routes::ROUTES;
use crate::system::state::ENCODERS;
use crate::task::flash_storage::{self, StoredCalibration};

/// Control loop period
const CONTROL_PERIOD: Duration = Duration::from_millis(10);

#[embassy_executor::task]
pub async fn control_loop(drive_train: DriveTrain, mut sensors: AnalogDistanceSensors) {
    let mut config = RobotConfig::default();
    match flash_storage::load_calibration().await {
        Some(stored) => stored.apply(&mut config.calibration),
        None => info!("using default calibration"),
    }
    ENCODERS.apply_calibration(&config.calibration);
    info!("calibration: {}", config.calibration);

    let mut navigator = Navigator::new(
        drive_train,
        config,
        &ROUTES,
        ENCODERS.snapshot(),
        Instant::now().as_millis(),
    );
    let mut ticker = Ticker::every(CONTROL_PERIOD);

    loop {
        ticker.next().await;

        while let Some(command) = command::try_receive() {
            handle_command(&mut navigator, command);
        }

        navigator.tick(ENCODERS.snapshot(), Instant::now().as_millis(), &mut sensors);
        command::publish_status(navigator.status());
    }
}

fn handle_command(navigator: &mut Navigator<DriveTrain>, command: Command) {
    info!("command: {}", command);
    let result = match command {
        Command::StartRoute {
            route_id,
            direction,
            delay_ms,
        } => navigator.start_route(route_id, direction, delay_ms),
        Command::ConfirmRoute => navigator.confirm_route(),
        Command::StopAll => {
            navigator.stop_route();
            navigator.stop_wall_follow();
            navigator.cancel_calibration();
            navigator.manual(ManualCommand::Stop)
        }
        Command::WallFollow(side) => {
            navigator.start_wall_follow(side);
            Ok(())
        }
        Command::ResetPosition => {
            navigator.reset_position(&ENCODERS);
            Ok(())
        }
        Command::StartCalibration => navigator.start_calibration(),
        Command::MarkOrSelfTest if navigator.status().calibrating => match navigator.mark_revolution() {
            Ok(Some(_)) => {
                flash_storage::request_save(StoredCalibration::from_config(&navigator.config().calibration));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        },
        Command::MarkOrSelfTest => navigator.run_self_test(),
    };

    if let Err(e) = result {
        warn!("command {} rejected: {}", command, e);
    }
}
