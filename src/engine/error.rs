//! Engine Errors
//!
//! One taxonomy for every failure the engine can report. Each variant carries
//! a fixed propagation class:
//!
//! | Variant      | Scope      | Handling                                  |
//! |--------------|------------|-------------------------------------------|
//! | `Parse`      | per event  | event skipped                             |
//! | `Domain`     | per event  | valuation or fill skipped                 |
//! | `OutOfOrder` | per event  | event rejected, aligner cursor unchanged  |
//! | `DataGap`    | stream     | generation stops cleanly                  |
//! | `Numeric`    | fatal      | surfaced to caller                        |
//! | `Config`     | fatal      | raised before any event is processed      |

use crate::engine::clock::Nanos;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalError {
    /// Malformed contract identifier.
    Parse { symbol: String, reason: String },
    /// Pricing inputs outside the model's domain.
    Domain { reason: String },
    /// Numerical breakdown (e.g. vega underflow in the volatility solver).
    Numeric { reason: String },
    /// No price bar can be aligned to this timestamp.
    DataGap { timestamp: Nanos, reason: String },
    /// Timestamp earlier than one already consumed.
    OutOfOrder { previous: Nanos, current: Nanos },
    /// Invalid configuration value.
    Config { field: &'static str, reason: String },
}

impl SignalError {
    pub fn parse(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    pub fn domain(reason: impl Into<String>) -> Self {
        Self::Domain {
            reason: reason.into(),
        }
    }

    pub fn numeric(reason: impl Into<String>) -> Self {
        Self::Numeric {
            reason: reason.into(),
        }
    }

    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }

    /// Per-event errors: drop the event and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Domain { .. } | Self::OutOfOrder { .. }
        )
    }

    /// Stream-level stop that still counts as a successful run.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::DataGap { .. })
    }
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { symbol, reason } => {
                write!(f, "parse error for symbol '{}': {}", symbol, reason)
            }
            Self::Domain { reason } => write!(f, "domain error: {}", reason),
            Self::Numeric { reason } => write!(f, "numeric error: {}", reason),
            Self::DataGap { timestamp, reason } => {
                write!(f, "data gap at {}: {}", timestamp, reason)
            }
            Self::OutOfOrder { previous, current } => write!(
                f,
                "out-of-order timestamp: {} arrived after {}",
                current, previous
            ),
            Self::Config { field, reason } => {
                write!(f, "invalid config '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for SignalError {}
