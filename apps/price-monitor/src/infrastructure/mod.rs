//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Flare FTSO registry price source.
pub mod ftso;

/// In-memory price source for demos and tests.
pub mod mock;

/// Refresh state observers that render to the log.
pub mod observers;

/// Configuration loading.
pub mod config;

/// Dashboard API, health check and metrics HTTP endpoint.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
