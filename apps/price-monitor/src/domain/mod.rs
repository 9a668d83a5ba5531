//! Domain Layer - Core price refresh types.
//!
//! This layer contains the quote and refresh-state types with no I/O.
//! All rules about how a refresh cycle changes the known prices live here.

/// Symbols, tracked symbol sets, and price quotes.
pub mod quote;

/// Refresh state, cycle application, and refresh errors.
pub mod refresh;
