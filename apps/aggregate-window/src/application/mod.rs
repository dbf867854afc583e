//! Application Layer - Use cases and port definitions.
//!
//! This layer wires the domain window to the outside world: the queue fed by
//! the feed reader on one side, the output sink on the other.

/// Port interfaces for external systems (output sink).
pub mod ports;

/// Ingest consumer and print scheduler tasks.
pub mod services;
