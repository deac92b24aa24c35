//! RC button handling
//!
//! Turns the four remote control buttons into operator commands.
//!
//! | Button | Press                          | Hold                 |
//! |--------|--------------------------------|----------------------|
//! | A      | start route 0 after 10 s       | confirm route        |
//! | B      | follow the left wall           | follow the right wall|
//! | C      | stop everything                | reset position       |
//! | D      | mark revolution / self-test    | start calibration    |

use amr_nav::route::Direction;
use amr_nav::sensors::Side;
use embassy_futures::join::join4;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::{Input, Level, Pull};
use embassy_time::{Duration, Timer};

use crate::system::command::{self, Command};
use crate::system::resources::RCResources;

/// Button hold threshold (ms)
const HOLD_DURATION: Duration = Duration::from_millis(700);

/// Button debounce delay (ms)
const DEBOUNCE_DURATION: Duration = Duration::from_millis(30);

/// Time to step away from the robot after starting a route from the remote
const ROUTE_START_DELAY_MS: u64 = 10_000;

/// Commands bound to one button
struct Binding {
    press: Command,
    hold: Command,
}

const BUTTON_A: Binding = Binding {
    press: Command::StartRoute {
        route_id: 0,
        direction: Direction::Forward,
        delay_ms: ROUTE_START_DELAY_MS,
    },
    hold: Command::ConfirmRoute,
};

const BUTTON_B: Binding = Binding {
    press: Command::WallFollow(Side::Left),
    hold: Command::WallFollow(Side::Right),
};

const BUTTON_C: Binding = Binding {
    press: Command::StopAll,
    hold: Command::ResetPosition,
};

const BUTTON_D: Binding = Binding {
    press: Command::MarkOrSelfTest,
    hold: Command::StartCalibration,
};

/// Watches all four buttons
#[embassy_executor::task]
pub async fn rc_control(r: RCResources) {
    let mut btn_a = Input::new(r.btn_a, Pull::Down);
    let mut btn_b = Input::new(r.btn_b, Pull::Down);
    let mut btn_c = Input::new(r.btn_c, Pull::Down);
    let mut btn_d = Input::new(r.btn_d, Pull::Down);

    join4(
        handle_button(&mut btn_a, &BUTTON_A),
        handle_button(&mut btn_b, &BUTTON_B),
        handle_button(&mut btn_c, &BUTTON_C),
        handle_button(&mut btn_d, &BUTTON_D),
    )
    .await;
}

/// Sends the press command on a short press, the hold command on a long one
async fn handle_button(button: &mut Input<'static>, binding: &Binding) {
    loop {
        let init_level = debounce(button).await;

        if init_level != Level::High {
            continue;
        };

        match select(Timer::after(HOLD_DURATION), debounce(button)).await {
            Either::First(()) => {
                command::send(binding.hold).await;
                button.wait_for_low().await;
            }
            Either::Second(_) => {
                command::send(binding.press).await;
            }
        };
    }
}

/// Ensures stable button state
async fn debounce(button: &mut Input<'static>) -> Level {
    loop {
        let st_level = button.get_level();
        button.wait_for_any_edge().await;
        Timer::after(DEBOUNCE_DURATION).await;
        let end_level = button.get_level();
        if st_level != end_level {
            break end_level;
        }
    }
}
