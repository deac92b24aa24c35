//! Quadrature edge handling
//!
//! One task instance per wheel. Channel B is the edge channel: on every
//! transition both levels are read and handed to the wheel's pulse counter,
//! which decodes the direction and applies the step inside a critical section.

use amr_nav::encoder::PulseCounter;
use defmt::info;
use embassy_rp::gpio::{Input, Pull};

use crate::system::resources::{LeftEncoderResources, RightEncoderResources};
use crate::system::state::ENCODERS;

/// Left wheel edge handler
#[embassy_executor::task]
pub async fn left_encoder_edges(r: LeftEncoderResources) {
    let channel_a = Input::new(r.channel_a, Pull::Up);
    let channel_b = Input::new(r.channel_b, Pull::Up);
    info!("left encoder ready");
    count_edges(channel_a, channel_b, &ENCODERS.left).await;
}

/// Right wheel edge handler
#[embassy_executor::task]
pub async fn right_encoder_edges(r: RightEncoderResources) {
    let channel_a = Input::new(r.channel_a, Pull::Up);
    let channel_b = Input::new(r.channel_b, Pull::Up);
    info!("right encoder ready");
    count_edges(channel_a, channel_b, &ENCODERS.right).await;
}

async fn count_edges(channel_a: Input<'static>, mut channel_b: Input<'static>, counter: &PulseCounter) -> ! {
    loop {
        channel_b.wait_for_any_edge().await;
        counter.on_edge(channel_a.is_high(), channel_b.is_high());
    }
}
