//! Firmware-side shared state and hardware adapters
pub mod command;
pub mod distance;
pub mod motors;
pub mod resources;
pub mod routes;
pub mod state;
