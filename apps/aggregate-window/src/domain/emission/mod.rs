//! Emission Policy
//!
//! Decides, from the current window state, what a print tick emits, and
//! renders bars as output lines.
//!
//! | Order flag | Window size | Mode | Lines |
//! |------------|-------------|------|-------|
//! | true | > 1 | [`EmissionMode::Single`] | head only |
//! | true | 0 or 1 | [`EmissionMode::Idle`] | none |
//! | false | any | [`EmissionMode::FullWindow`] | every bar, in window order |

use chrono::{FixedOffset, Offset, SecondsFormat, Utc};

use super::aggregate::{AggregateRecord, epoch_seconds};
use super::window::WindowAggregator;

// =============================================================================
// Emission Plan
// =============================================================================

/// Emission mode chosen for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionMode {
    /// Bars arrived in order: print the most recent period only.
    Single,
    /// Bars arrived out of order: print the whole reordered window.
    FullWindow,
    /// Nothing worth printing yet.
    Idle,
}

impl EmissionMode {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::FullWindow => "full_window",
            Self::Idle => "idle",
        }
    }
}

/// Bars selected for one tick, copied out of the window.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// Chosen mode.
    pub mode: EmissionMode,
    /// Bars to print, in print order.
    pub records: Vec<AggregateRecord>,
}

/// Pick the emission for the window as it is right now.
///
/// Copies the selected bars so the caller can release the window lock
/// before doing any I/O.
#[must_use]
pub fn plan(window: &WindowAggregator) -> Emission {
    if !window.is_order_preserved() {
        return Emission {
            mode: EmissionMode::FullWindow,
            records: window.records().to_vec(),
        };
    }

    match window.head() {
        Some(head) if window.len() > 1 => Emission {
            mode: EmissionMode::Single,
            records: vec![head.clone()],
        },
        _ => Emission {
            mode: EmissionMode::Idle,
            records: Vec::new(),
        },
    }
}

// =============================================================================
// Line Formatting
// =============================================================================

/// Renders bars as output lines in a fixed time zone.
#[derive(Debug, Clone, Copy)]
pub struct LineFormatter {
    offset: FixedOffset,
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self::utc()
    }
}

impl LineFormatter {
    /// Format timestamps in UTC.
    #[must_use]
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Format timestamps at a fixed offset from UTC.
    #[must_use]
    pub const fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// RFC 3339 rendering of a bar's window start, whole seconds.
    ///
    /// `window_start` is epoch milliseconds, reduced to seconds by
    /// [`epoch_seconds`]. Decoded bars are always in range; a hand-built
    /// bar outside it renders as `invalid(<ms>)`.
    #[must_use]
    pub fn timestamp(&self, window_start: f64) -> String {
        epoch_seconds(window_start).map_or_else(
            || format!("invalid({window_start})"),
            |utc| {
                utc.with_timezone(&self.offset)
                    .to_rfc3339_opts(SecondsFormat::Secs, true)
            },
        )
    }

    /// One output line for a bar.
    #[must_use]
    pub fn line(&self, record: &AggregateRecord) -> String {
        format!(
            "\"{}\" - open: {}, close: {}, high: {}, low: {}, volume: {}",
            self.timestamp(record.window_start),
            record.open,
            record.close,
            record.high,
            record.low,
            record.volume_weighted,
        )
    }

    /// Lines for every bar of an emission, in order.
    #[must_use]
    pub fn lines(&self, emission: &Emission) -> Vec<String> {
        emission.records.iter().map(|r| self.line(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn bar(start: f64) -> AggregateRecord {
        AggregateRecord {
            symbol: "BTC-USD".to_string(),
            window_start: start,
            window_end: start + 60_000.0,
            open: Decimal::new(400_665, 1),
            close: Decimal::new(40_100, 0),
            high: Decimal::new(4_015_025, 2),
            low: Decimal::new(40_000, 0),
            volume_weighted: Decimal::new(400_751, 1),
        }
    }

    fn window_of(starts: &[f64]) -> WindowAggregator {
        let mut window = WindowAggregator::default();
        for &start in starts {
            window.ingest_record(bar(start));
        }
        window
    }

    #[test]
    fn empty_window_is_idle() {
        let emission = plan(&WindowAggregator::default());
        assert_eq!(emission.mode, EmissionMode::Idle);
        assert!(emission.records.is_empty());
    }

    #[test]
    fn single_ordered_bar_is_idle() {
        let emission = plan(&window_of(&[100.0]));
        assert_eq!(emission.mode, EmissionMode::Idle);
    }

    #[test]
    fn ordered_window_emits_head() {
        let emission = plan(&window_of(&[100.0, 90.0, 80.0]));
        assert_eq!(emission.mode, EmissionMode::Single);
        assert_eq!(emission.records.len(), 1);
        assert!((emission.records[0].window_start - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unordered_window_emits_everything() {
        let emission = plan(&window_of(&[100.0, 90.0, 80.0, 95.0]));
        assert_eq!(emission.mode, EmissionMode::FullWindow);
        let starts: Vec<f64> = emission.records.iter().map(|r| r.window_start).collect();
        assert_eq!(starts, vec![100.0, 95.0, 90.0, 80.0]);
    }

    #[test]
    fn unordered_pair_emits_both() {
        let emission = plan(&window_of(&[100.0, 200.0]));
        assert_eq!(emission.mode, EmissionMode::FullWindow);
        assert_eq!(emission.records.len(), 2);
    }

    #[test]
    fn timestamp_truncates_sub_second_precision() {
        let formatter = LineFormatter::utc();
        assert_eq!(
            formatter.timestamp(1_610_144_640_999.75),
            "2021-01-08T22:24:00Z"
        );
    }

    #[test]
    fn timestamp_before_epoch_truncates_toward_zero() {
        let formatter = LineFormatter::utc();
        assert_eq!(formatter.timestamp(-1_500.0), "1969-12-31T23:59:59Z");
        assert_eq!(formatter.timestamp(-999.0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn timestamp_respects_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let formatter = LineFormatter::with_offset(offset);
        assert_eq!(
            formatter.timestamp(1_610_144_640_000.0),
            "2021-01-09T00:24:00+02:00"
        );
    }

    #[test]
    fn line_layout() {
        let line = LineFormatter::utc().line(&bar(1_610_144_640_000.0));
        assert_eq!(
            line,
            "\"2021-01-08T22:24:00Z\" - open: 40066.5, close: 40100, high: 40150.25, low: 40000, volume: 40075.1"
        );
    }

    #[test]
    fn mode_labels() {
        assert_eq!(EmissionMode::Single.as_str(), "single");
        assert_eq!(EmissionMode::FullWindow.as_str(), "full_window");
        assert_eq!(EmissionMode::Idle.as_str(), "idle");
    }
}
