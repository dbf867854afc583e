//! Application Services
//!
//! The two tasks that sit around the window:
//!
//! - `IngestService`: drains the frame queue and ingests every frame, in
//!   arrival order. It is the window's only writer.
//! - `PrintScheduler`: on a fixed interval, reads the window and writes the
//!   chosen emission to the output sink.
//!
//! [`join_until_first_exit`] waits on the feed reader and the scheduler and
//! shuts everything down as soon as either one stops.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{LineSink, SinkError};
use crate::domain::emission::{self, Emission, LineFormatter};
use crate::domain::window::{IngestReport, SharedWindow};
use crate::infrastructure::metrics;

// =============================================================================
// Ingest Service
// =============================================================================

/// Running totals kept by the ingest consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestTotals {
    /// Frames taken off the queue.
    pub frames: u64,
    /// Frames that were not valid JSON.
    pub invalid_frames: u64,
    /// Bars added to the window.
    pub accepted: u64,
    /// Elements skipped (missing symbol or malformed).
    pub skipped: u64,
    /// Bars evicted by retention.
    pub evicted: u64,
}

impl IngestTotals {
    fn add(&mut self, report: &IngestReport) {
        self.accepted += report.accepted as u64;
        self.skipped += report.skipped() as u64;
        self.evicted += report.evicted as u64;
    }
}

/// Queue consumer that feeds raw frames into the window.
pub struct IngestService {
    window: SharedWindow,
    frames: mpsc::Receiver<String>,
    totals: IngestTotals,
}

impl IngestService {
    /// Create a consumer for the given queue.
    #[must_use]
    pub fn new(window: SharedWindow, frames: mpsc::Receiver<String>) -> Self {
        Self {
            window,
            frames,
            totals: IngestTotals::default(),
        }
    }

    /// Drain the queue until every sender is gone.
    ///
    /// Frames still queued when the feed reader stops are ingested before
    /// this returns.
    pub async fn run(mut self) -> IngestTotals {
        while let Some(frame) = self.frames.recv().await {
            self.process_frame(&frame);
        }

        tracing::info!(
            frames = self.totals.frames,
            accepted = self.totals.accepted,
            skipped = self.totals.skipped,
            "Ingest queue drained"
        );
        self.totals
    }

    /// Decode and ingest one raw frame.
    ///
    /// Returns `None` when the frame is not valid JSON.
    pub fn process_frame(&mut self, frame: &str) -> Option<IngestReport> {
        self.totals.frames += 1;

        let value: Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping frame that is not valid JSON");
                self.totals.invalid_frames += 1;
                metrics::record_skipped("invalid_frame", 1);
                return None;
            }
        };

        let (report, len, ordered) = {
            let mut window = self.window.write();
            let report = window.ingest(&value);
            (report, window.len(), window.is_order_preserved())
        };

        self.totals.add(&report);
        metrics::record_ingest(&report);
        metrics::set_window_state(len, ordered);

        tracing::trace!(
            accepted = report.accepted,
            skipped = report.skipped(),
            window_len = len,
            order_preserved = ordered,
            "Frame ingested"
        );

        Some(report)
    }

    /// Totals so far.
    #[must_use]
    pub const fn totals(&self) -> IngestTotals {
        self.totals
    }
}

// =============================================================================
// Print Scheduler
// =============================================================================

/// Fixed-interval printer for the window.
pub struct PrintScheduler {
    window: SharedWindow,
    sink: Arc<dyn LineSink>,
    formatter: LineFormatter,
    interval: Duration,
    cancel: CancellationToken,
}

impl PrintScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        window: SharedWindow,
        sink: Arc<dyn LineSink>,
        formatter: LineFormatter,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            window,
            sink,
            formatter,
            interval,
            cancel,
        }
    }

    /// Tick until cancelled.
    ///
    /// The first tick fires one full interval after start.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the output sink fails.
    pub async fn run(self) -> Result<(), SinkError> {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(interval_secs = self.interval.as_secs_f64(), "Print scheduler started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Print scheduler cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.tick()?;
                }
            }
        }
    }

    /// Run one emission against the current window state.
    ///
    /// The order flag is read here, on every call.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the output sink fails.
    pub fn tick(&self) -> Result<Emission, SinkError> {
        let emission = emission::plan(&self.window.read());

        metrics::record_emission(emission.mode, emission.records.len());
        tracing::debug!(
            mode = emission.mode.as_str(),
            lines = emission.records.len(),
            "Print tick"
        );

        if !emission.records.is_empty() {
            let lines = self.formatter.lines(&emission);
            self.sink.write_lines(&lines)?;
        }

        Ok(emission)
    }
}

// =============================================================================
// Supervision
// =============================================================================

/// Wait for the feed reader and the print scheduler.
///
/// Whichever stops first (or an external cancel) cancels `shutdown`, then
/// both handles are awaited. The feed reader dropping its queue sender is
/// what lets the ingest consumer drain and finish.
pub async fn join_until_first_exit<F, S>(
    mut feed: JoinHandle<F>,
    mut scheduler: JoinHandle<S>,
    shutdown: &CancellationToken,
) -> (Result<F, JoinError>, Result<S, JoinError>) {
    tokio::select! {
        result = &mut feed => {
            tracing::debug!("Feed reader stopped");
            shutdown.cancel();
            (result, scheduler.await)
        }
        result = &mut scheduler => {
            tracing::debug!("Print scheduler stopped");
            shutdown.cancel();
            (feed.await, result)
        }
        () = shutdown.cancelled() => (feed.await, scheduler.await),
    }
}
