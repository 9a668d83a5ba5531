//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `RefreshController`: Runs refresh cycles on a timer and publishes state

mod refresh_controller;

pub use refresh_controller::{
    ControllerConfig, ControllerError, CycleOutcome, CycleReport, RefreshController,
};
