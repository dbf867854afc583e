//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the feed client,
//! configuration and observability plumbing.

/// Crypto aggregate WebSocket feed client.
pub mod polygon;

/// Output sink adapters.
pub mod output;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing setup.
pub mod telemetry;
