//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the refresh controller and the port interfaces
//! that define how it reaches price sources and observers.

/// Port interfaces for price sources and state observers.
pub mod ports;

/// Application services for periodic price refresh.
pub mod services;
