//! Hardware Resource Management
//!
//! Splits the RP2350 peripherals into one group per owner so each task gets
//! exactly the pins it drives and nothing else.
//!
//! # Resource Groups
//! - Wheel encoders: quadrature A/B pins per wheel (B is the edge channel)
//! - Motor driver: one PWM slice per BTS7960, RPWM on channel A, LPWM on B
//! - Distance sensors: four analog IR rangers on the ADC pins
//! - Flash: calibration storage in the last sectors of the on-board flash
//! - RC: four remote control buttons

use assign_resources::assign_resources;
use embassy_rp::peripherals;

assign_resources! {
    /// Left wheel quadrature channels
    left_encoder: LeftEncoderResources {
        channel_a: PIN_6,
        channel_b: PIN_7,
    },
    /// Right wheel quadrature channels
    right_encoder: RightEncoderResources {
        channel_a: PIN_8,
        channel_b: PIN_9,
    },
    /// BTS7960 half-bridge pairs
    motor_driver: MotorDriverResources {
        left_slice: PWM_SLICE0,
        left_rpwm_pin: PIN_0,
        left_lpwm_pin: PIN_1,
        right_slice: PWM_SLICE1,
        right_rpwm_pin: PIN_2,
        right_lpwm_pin: PIN_3,
    },
    /// Analog IR distance sensors
    distance_sensors: DistanceSensorResources {
        adc: ADC,
        front_left_pin: PIN_26,
        front_right_pin: PIN_27,
        left_pin: PIN_28,
        right_pin: PIN_29,
    },
    /// On-board flash for calibration data
    flash: FlashResources {
        flash: FLASH,
        dma: DMA_CH0,
    },
    /// Remote control buttons
    rc: RCResources {
        btn_a: PIN_16,
        btn_b: PIN_17,
        btn_c: PIN_10,
        btn_d: PIN_11,
    },
}
