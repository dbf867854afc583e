//! Aggregate Window
//!
//! Holds the in-flight aggregate bars for one instrument, kept sorted by
//! window start (most recent period first), and tracks whether the feed
//! delivered them already in that order.
//!
//! # Ingest Sequence
//!
//! For each decoded bar:
//!
//! 1. append it to the live window
//! 2. copy the live window into the reference snapshot
//! 3. insertion-sort the live window by `window_start` descending
//! 4. the order flag is `live == snapshot`
//! 5. apply the retention policy
//!
//! The window has a single writer (the ingest consumer). Readers go through
//! the lock that wraps the aggregator, see [`SharedWindow`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::aggregate::{AggregateRecord, DecodeError};

/// Aggregator shared between the ingest consumer and the print scheduler.
pub type SharedWindow = Arc<RwLock<WindowAggregator>>;

// =============================================================================
// Retention
// =============================================================================

/// Bounds on how much history the window keeps.
///
/// Eviction always removes from the tail, i.e. the oldest periods.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RetentionPolicy {
    /// Maximum number of bars held. `None` keeps everything.
    pub max_records: Option<NonZeroUsize>,
    /// Maximum distance, in milliseconds, between the head's window start
    /// and any retained bar's window start. `None` keeps everything.
    pub max_span_ms: Option<f64>,
}

impl RetentionPolicy {
    /// Keep every bar for the lifetime of the process.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_records: None,
            max_span_ms: None,
        }
    }

    /// Keep at most `max` bars.
    #[must_use]
    pub const fn max_records(max: NonZeroUsize) -> Self {
        Self {
            max_records: Some(max),
            max_span_ms: None,
        }
    }

    /// Number of bars to retain out of a sorted window.
    fn retained_len(&self, sorted: &[AggregateRecord]) -> usize {
        let mut keep = sorted.len();

        if let Some(max) = self.max_records {
            keep = keep.min(max.get());
        }

        if let (Some(span), Some(head)) = (self.max_span_ms, sorted.first()) {
            let oldest_allowed = head.window_start - span;
            // Sorted descending, so everything past the first too-old bar is too old.
            let within = sorted[..keep]
                .iter()
                .position(|r| r.window_start < oldest_allowed)
                .unwrap_or(keep);
            keep = within;
        }

        keep
    }
}

// =============================================================================
// Ingest Report
// =============================================================================

/// Outcome of ingesting one raw payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Bars appended to the window.
    pub accepted: usize,
    /// Elements without a symbol.
    pub skipped_missing_symbol: usize,
    /// Elements with missing or non-numeric fields.
    pub skipped_malformed: usize,
    /// Feed status messages.
    pub status_messages: usize,
    /// Bars dropped by the retention policy.
    pub evicted: usize,
}

impl IngestReport {
    /// Total elements that did not become bars, status messages excluded.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped_missing_symbol + self.skipped_malformed
    }
}

// =============================================================================
// Window Aggregator
// =============================================================================

/// Owner of the live window, its reference snapshot and the order flag.
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    live: Vec<AggregateRecord>,
    snapshot: Vec<AggregateRecord>,
    order_preserved: bool,
    retention: RetentionPolicy,
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self::new(RetentionPolicy::unbounded())
    }
}

impl WindowAggregator {
    /// Create an empty window.
    ///
    /// An empty window counts as ordered.
    #[must_use]
    pub const fn new(retention: RetentionPolicy) -> Self {
        Self {
            live: Vec::new(),
            snapshot: Vec::new(),
            order_preserved: true,
            retention,
        }
    }

    /// Wrap the aggregator for sharing across tasks.
    #[must_use]
    pub fn into_shared(self) -> SharedWindow {
        Arc::new(RwLock::new(self))
    }

    /// Ingest a raw decoded payload.
    ///
    /// `raw` is either a single object or an array of objects; each element
    /// is decoded and ingested on its own, in order. Elements that fail to
    /// decode are skipped and counted in the returned report.
    pub fn ingest(&mut self, raw: &Value) -> IngestReport {
        let mut report = IngestReport::default();

        match raw {
            Value::Array(elements) => {
                for element in elements {
                    self.ingest_element(element, &mut report);
                }
            }
            other => self.ingest_element(other, &mut report),
        }

        report
    }

    fn ingest_element(&mut self, element: &Value, report: &mut IngestReport) {
        match AggregateRecord::try_from(element) {
            Ok(record) => {
                report.evicted += self.ingest_record(record);
                report.accepted += 1;
            }
            Err(DecodeError::MissingSymbol) => {
                tracing::debug!("Skipping aggregate without symbol");
                report.skipped_missing_symbol += 1;
            }
            Err(DecodeError::Status { status, message }) => {
                tracing::info!(status = %status, message = %message, "Feed status");
                report.status_messages += 1;
            }
            Err(e @ DecodeError::Malformed(_)) => {
                tracing::warn!(error = %e, "Skipping malformed aggregate");
                report.skipped_malformed += 1;
            }
        }
    }

    /// Ingest one already-decoded bar.
    ///
    /// Returns the number of bars evicted by the retention policy.
    pub fn ingest_record(&mut self, record: AggregateRecord) -> usize {
        self.live.push(record);
        self.snapshot.clone_from(&self.live);
        self.reorder();
        self.order_preserved = self.live == self.snapshot;
        self.apply_retention()
    }

    /// Stable insertion sort of the live window by `window_start`, descending.
    ///
    /// Bars normally arrive nearly in order, where each pass is close to
    /// linear. Ascending input is the worst case at O(n²).
    pub fn reorder(&mut self) {
        for i in 1..self.live.len() {
            let mut j = i;
            // Strict comparison keeps equal starts in arrival order.
            while j > 0 && self.live[j - 1].window_start < self.live[j].window_start {
                self.live.swap(j - 1, j);
                j -= 1;
            }
        }
    }

    fn apply_retention(&mut self) -> usize {
        let keep = self.retention.retained_len(&self.live);
        if keep == self.live.len() {
            return 0;
        }

        let evicted = self.live.split_off(keep);
        // The snapshot is in arrival order; drop the same bars from it.
        for record in &evicted {
            if let Some(pos) = self.snapshot.iter().rposition(|r| r == record) {
                self.snapshot.remove(pos);
            }
        }
        tracing::trace!(
            evicted = evicted.len(),
            retained = keep,
            "Evicted aggregates past retention"
        );
        evicted.len()
    }

    /// Whether the last ingested bar left the window in arrival order.
    #[must_use]
    pub const fn is_order_preserved(&self) -> bool {
        self.order_preserved
    }

    /// Live window, most recent period first.
    #[must_use]
    pub fn records(&self) -> &[AggregateRecord] {
        &self.live
    }

    /// Reference snapshot: the window in arrival order, as it stood before
    /// the last sort pass, minus any bars retention has since evicted.
    ///
    /// Holds the same bars as [`records`](Self::records), possibly in a
    /// different order.
    #[must_use]
    pub fn snapshot(&self) -> &[AggregateRecord] {
        &self.snapshot
    }

    /// Head of the live window.
    #[must_use]
    pub fn head(&self) -> Option<&AggregateRecord> {
        self.live.first()
    }

    /// Number of bars in the live window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether the live window holds no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Active retention policy.
    #[must_use]
    pub const fn retention(&self) -> RetentionPolicy {
        self.retention
    }
}
