//! Robot firmware entry point
//!
//! Initializes the hardware, hands each task its resources and spawns the
//! control tasks. All navigation logic lives in the `amr_nav` library.

#![no_std]
#![no_main]

use crate::system::distance::AnalogDistanceSensors;
use crate::system::motors::{self, Bts7960, DriveTrain};
use crate::task::{
    control_loop::control_loop,
    encoder_edges::{left_encoder_edges, right_encoder_edges},
    flash_storage::{flash_storage, FLASH_SIZE},
    rc_control::rc_control,
    status_report::status_report,
};
use amr_nav::config::DriveTuning;
use embassy_executor::Spawner;
use embassy_rp::adc::{self, Adc};
use embassy_rp::block::ImageDef;
use embassy_rp::config::Config;
use embassy_rp::flash::Flash;
use embassy_rp::gpio::Pull;
use embassy_rp::pwm::Pwm;
use system::resources::AssignedResources;
use {defmt_rtt as _, panic_probe as _};

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

/// Shared state and hardware adapters
mod system;
/// Task implementations
mod task;

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Config::default());

    // Split the resources into separate groups for each task
    let r = split_resources!(p);

    let max_duty = DriveTuning::default().max_duty;
    let pwm_config = motors::pwm_config();
    let md = r.motor_driver;
    let drive_train = DriveTrain {
        left: Bts7960::new(
            Pwm::new_output_ab(md.left_slice, md.left_rpwm_pin, md.left_lpwm_pin, pwm_config.clone()),
            pwm_config.clone(),
            max_duty,
        ),
        right: Bts7960::new(
            Pwm::new_output_ab(md.right_slice, md.right_rpwm_pin, md.right_lpwm_pin, pwm_config.clone()),
            pwm_config,
            max_duty,
        ),
    };

    let ds = r.distance_sensors;
    let sensors = AnalogDistanceSensors::new(
        Adc::new_blocking(ds.adc, adc::Config::default()),
        [
            adc::Channel::new_pin(ds.front_left_pin, Pull::None),
            adc::Channel::new_pin(ds.front_right_pin, Pull::None),
            adc::Channel::new_pin(ds.left_pin, Pull::None),
            adc::Channel::new_pin(ds.right_pin, Pull::None),
        ],
    );

    let flash = Flash::<_, _, FLASH_SIZE>::new(r.flash.flash, r.flash.dma);

    // Flash first: the control loop waits for the stored calibration
    spawner.spawn(flash_storage(flash)).unwrap();
    // Edge handlers before the control loop so no pulse is missed once it reads
    spawner.spawn(left_encoder_edges(r.left_encoder)).unwrap();
    spawner.spawn(right_encoder_edges(r.right_encoder)).unwrap();
    spawner.spawn(control_loop(drive_train, sensors)).unwrap();
    spawner.spawn(rc_control(r.rc)).unwrap();
    spawner.spawn(status_report()).unwrap();
}
