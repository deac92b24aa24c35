//! BTS7960 wheel output
//!
//! Each wheel is driven by one BTS7960 half-bridge pair. The pair has two PWM
//! inputs: RPWM drives forward, LPWM drives backward, and only one of them is
//! ever non-zero. Both enable lines are tied high on the board.
//!
//! Both inputs of a wheel sit on the two channels of the same PWM slice, so a
//! direction change is a single register update and can never drive both
//! bridges at once.

use amr_nav::motor::WheelOutput;
use embassy_rp::pwm::{Config, Pwm};

/// PWM carrier frequency; the BTS7960 is rated up to 25 kHz
const PWM_FREQUENCY_HZ: u32 = 20_000;

/// PWM slice configuration for the motor carrier
pub fn pwm_config() -> Config {
    let clock_freq_hz = embassy_rp::clocks::clk_sys_freq();

    // smallest divider that keeps the period within the 16-bit counter
    let divider = ((clock_freq_hz / PWM_FREQUENCY_HZ) / 65535 + 1) as u8;
    let period = (clock_freq_hz / (PWM_FREQUENCY_HZ * divider as u32)) as u16 - 1;

    let mut config = Config::default();
    config.divider = divider.into();
    config.top = period;
    config
}

/// Compare value for a duty magnitude on the `max_duty` scale
fn compare_value(duty: i16, max_duty: i16, top: u16) -> u16 {
    let max_duty = max_duty.max(1) as u32;
    let magnitude = (duty.unsigned_abs() as u32).min(max_duty);
    (magnitude * (top as u32 + 1) / max_duty) as u16
}

/// One BTS7960 on one PWM slice
pub struct Bts7960 {
    pwm: Pwm<'static>,
    config: Config,
    max_duty: i16,
}

impl Bts7960 {
    /// Takes a slice already set up with RPWM on channel A and LPWM on channel B
    pub fn new(pwm: Pwm<'static>, config: Config, max_duty: i16) -> Self {
        let mut driver = Self { pwm, config, max_duty };
        driver.set(0);
        driver
    }

    /// Signed duty; positive drives forward
    pub fn set(&mut self, duty: i16) {
        let compare = compare_value(duty, self.max_duty, self.config.top);
        let (forward, backward) = if duty >= 0 { (compare, 0) } else { (0, compare) };
        self.config.compare_a = forward;
        self.config.compare_b = backward;
        self.pwm.set_config(&self.config);
    }
}

/// Both drive wheels
pub struct DriveTrain {
    pub left: Bts7960,
    pub right: Bts7960,
}

impl WheelOutput for DriveTrain {
    fn set_duty(&mut self, left: i16, right: i16) {
        self.left.set(left);
        self.right.set(right);
    }
}
