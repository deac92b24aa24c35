//! Periodic status log
//!
//! Stands in for the operator display: logs the newest navigator status at
//! most once per interval. Snapshots published in between are overwritten.

use defmt::info;
use embassy_time::{Duration, Timer};

use crate::system::command;

/// Time between two status lines
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[embassy_executor::task]
pub async fn status_report() {
    loop {
        let status = command::wait_status().await;
        info!(
            "pose ({}, {}) {} deg | {} | route {} {} wp {} | avoid {} | wall {} | duty {} | fault {}",
            status.pose.x,
            status.pose.y,
            status.pose.heading_degrees(),
            status.behaviour,
            status.route_id,
            status.route_stage,
            status.waypoint,
            status.avoidance_phase,
            status.wall_state,
            status.duty,
            status.last_fault
        );
        if status.awaiting_return {
            info!("route {}: waiting for return confirmation", status.route_id);
        }
        Timer::after(REPORT_INTERVAL).await;
    }
}
