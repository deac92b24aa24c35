//! Embassy tasks of the firmware
pub mod control_loop;
pub mod encoder_edges;
pub mod flash_storage;
pub mod rc_control;
pub mod status_report;
