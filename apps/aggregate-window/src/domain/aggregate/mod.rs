//! Aggregate Records
//!
//! One bar of market data as delivered by the crypto aggregate feed, plus the
//! typed decode step that turns a loosely-typed JSON element into an
//! [`AggregateRecord`].
//!
//! # Wire Fields
//!
//! The feed uses single-letter keys; the long names are accepted as aliases
//! so test harnesses and file replays can use either form.
//!
//! | Field | Short | Long |
//! |-------|-------|------|
//! | symbol | `pair` | `symbol` |
//! | window start (epoch ms) | `s` | `start` |
//! | window end (epoch ms) | `e` | `end` |
//! | open | `o` | `open` |
//! | close | `c` | `close` |
//! | high | `h` | `high` |
//! | low | `l` | `low` |
//! | volume weighted | `vw` | `volume` |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

// =============================================================================
// Errors
// =============================================================================

/// Reasons a raw element is not turned into an [`AggregateRecord`].
///
/// None of these are fatal; every variant is a skip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Element carries no symbol (`pair` / `symbol`) field.
    #[error("aggregate is missing its symbol field")]
    MissingSymbol,

    /// Element is a feed status/control message rather than a bar.
    #[error("feed status message: {status}")]
    Status {
        /// Status code, e.g. `connected` or `auth_success`.
        status: String,
        /// Human-readable message from the feed.
        message: String,
    },

    /// A required field is missing or not numeric.
    #[error("malformed aggregate: {0}")]
    Malformed(String),
}

impl DecodeError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingSymbol => "missing_symbol",
            Self::Status { .. } => "status",
            Self::Malformed(_) => "malformed",
        }
    }
}

// =============================================================================
// Aggregate Record
// =============================================================================

/// One aggregate bar.
///
/// Equality is field-for-field; it is what the window uses to decide
/// whether a sort pass moved anything.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    /// Traded instrument, e.g. `BTC-USD`.
    pub symbol: String,
    /// Start of the bar period, epoch milliseconds.
    pub window_start: f64,
    /// End of the bar period, epoch milliseconds.
    pub window_end: f64,
    /// Open price.
    pub open: Decimal,
    /// Close price.
    pub close: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Volume weighted price.
    pub volume_weighted: Decimal,
}

/// Short and long key of every numeric field.
const NUMERIC_FIELDS: [(&str, &str); 7] = [
    ("s", "start"),
    ("e", "end"),
    ("o", "open"),
    ("c", "close"),
    ("h", "high"),
    ("l", "low"),
    ("vw", "volume"),
];

/// Instant of an epoch-millisecond value, in whole seconds.
///
/// The fractional millisecond is dropped and the division truncates toward
/// zero, so `-1500.0` is one second before the epoch. `None` when the value
/// is not finite or falls outside the representable date range.
#[must_use]
pub fn epoch_seconds(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = millis.trunc() as i64;
    DateTime::from_timestamp(millis / 1000, 0)
}

/// Numeric part of a bar, decoded in one typed step.
#[derive(Debug, Deserialize)]
struct AggregateFields {
    #[serde(rename = "s", alias = "start")]
    window_start: f64,
    #[serde(rename = "e", alias = "end")]
    window_end: f64,
    #[serde(rename = "o", alias = "open")]
    open: Decimal,
    #[serde(rename = "c", alias = "close")]
    close: Decimal,
    #[serde(rename = "h", alias = "high")]
    high: Decimal,
    #[serde(rename = "l", alias = "low")]
    low: Decimal,
    #[serde(rename = "vw", alias = "volume")]
    volume_weighted: Decimal,
}

impl TryFrom<&Value> for AggregateRecord {
    type Error = DecodeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let Some(object) = value.as_object() else {
            return Err(DecodeError::Malformed(format!(
                "expected object, got {}",
                json_kind(value)
            )));
        };

        if object.get("ev").and_then(Value::as_str) == Some("status") {
            return Err(DecodeError::Status {
                status: string_field(object.get("status")),
                message: string_field(object.get("message")),
            });
        }

        let symbol = match object.get("pair").or_else(|| object.get("symbol")) {
            None | Some(Value::Null) => return Err(DecodeError::MissingSymbol),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(DecodeError::Malformed(format!(
                    "symbol must be a string, got {}",
                    json_kind(other)
                )));
            }
        };

        // Decimal would otherwise accept numeric strings.
        for (short, long) in NUMERIC_FIELDS {
            if let Some(field) = object.get(short).or_else(|| object.get(long))
                && !field.is_number()
            {
                return Err(DecodeError::Malformed(format!(
                    "{short} must be a number, got {}",
                    json_kind(field)
                )));
            }
        }

        let fields = AggregateFields::deserialize(value)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        for (name, millis) in [("s", fields.window_start), ("e", fields.window_end)] {
            if epoch_seconds(millis).is_none() {
                return Err(DecodeError::Malformed(format!(
                    "{name} is not a representable epoch time: {millis}"
                )));
            }
        }

        Ok(Self {
            symbol,
            window_start: fields.window_start,
            window_end: fields.window_end,
            open: fields.open,
            close: fields.close,
            high: fields.high,
            low: fields.low,
            volume_weighted: fields.volume_weighted,
        })
    }
}

fn string_field(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_default()
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
