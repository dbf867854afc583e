//! Domain Layer - Aggregate window and emission policy.
//!
//! Pure logic with no I/O: decoding bars, keeping them ordered, and deciding
//! what each print tick emits.

/// Aggregate bar type and its typed decode step.
pub mod aggregate;

/// Ordered window of bars and arrival-order detection.
pub mod window;

/// Per-tick emission decision and line formatting.
pub mod emission;
