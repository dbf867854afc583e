#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Aggregate Window - Ordering-Aware Bar Printer
//!
//! Subscribes to a crypto aggregate WebSocket feed for one instrument, keeps
//! every received bar in a window sorted by period start (most recent
//! first), and on a fixed interval prints either the latest bar or, when
//! bars arrived out of order, the whole reordered window.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Bars, the ordered window, and the emission policy
//!   - `aggregate`: Bar type and typed decode
//!   - `window`: Window aggregator, insertion sort, order flag, retention
//!   - `emission`: Per-tick mode selection and line formatting
//!
//! - **Application**: Tasks and port definitions
//!   - `ports`: Output sink interface
//!   - `services`: Ingest consumer and print scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `polygon`: WebSocket feed client
//!   - `output`: Stdout and in-memory sinks
//!   - `config`: Environment and CLI configuration
//!   - `health`, `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! Feed WS ──► FeedClient ──► mpsc queue ──► IngestService ──► WindowAggregator
//!                                                                   │
//!                     stdout ◄── LineSink ◄── PrintScheduler ◄──────┘ (every tick)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Bars, window and emission policy.
pub mod domain;

/// Application layer - Tasks and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::aggregate::{AggregateRecord, DecodeError};
pub use domain::emission::{Emission, EmissionMode, LineFormatter, plan};
pub use domain::window::{IngestReport, RetentionPolicy, SharedWindow, WindowAggregator};

// Application
pub use application::ports::{LineSink, SinkError};
pub use application::services::{
    IngestService, IngestTotals, PrintScheduler, join_until_first_exit,
};

// Infrastructure config
pub use infrastructure::config::{AppConfig, Cli, ConfigError, FeedSettings, WindowSettings};

// Feed client
pub use infrastructure::polygon::{
    ConnectionState, FeedClient, FeedClientConfig, FeedClientError, FeedState,
};

// Output sinks
pub use infrastructure::output::{MemorySink, StdoutSink};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
