//! As-Of Alignment
//!
//! Maps each quote timestamp to the most recent underlying bar at or before
//! it. The bar series is validated once and shared read-only (`Arc`); each
//! [`TimeAligner`] owns a forward-only cursor into it.
//!
//! # Contract
//!
//! For a quote at `t`, `align(t)` returns index `i` with
//! `bars[i].timestamp <= t < bars[i + 1].timestamp`, or the final bar when `t`
//! is past every bar. The cursor only advances, so a scan over `q` quotes and
//! `b` bars costs `O(q + b)`. A quote earlier than its predecessor is rejected
//! with `OutOfOrder` and leaves the cursor where it was.

use crate::engine::clock::{Nanos, NANOS_PER_SEC};
use crate::engine::error::SignalError;
use crate::engine::events::{Price, PriceBar};
use std::sync::Arc;

/// Strictly time-ascending underlying bars.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    bars: Vec<PriceBar>,
}

impl BarSeries {
    /// Validate ordering. Timestamps must be strictly ascending.
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, SignalError> {
        for pair in bars.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(SignalError::OutOfOrder {
                    previous: pair[0].timestamp,
                    current: pair[1].timestamp,
                });
            }
        }
        Ok(Self { bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PriceBar> {
        self.bars.get(index)
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn first_timestamp(&self) -> Option<Nanos> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<Nanos> {
        self.bars.last().map(|b| b.timestamp)
    }
}

/// Result of aligning one quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    pub bar_index: usize,
    pub bar_timestamp: Nanos,
    /// High/low midpoint of the aligned bar (or its predecessor, see `fell_back`).
    pub spot_reference: Price,
    /// The aligned bar's midpoint was zero and the previous bar's was used.
    pub fell_back: bool,
}

/// Forward-only as-of cursor over a shared [`BarSeries`].
#[derive(Debug, Clone)]
pub struct TimeAligner {
    bars: Arc<BarSeries>,
    cursor: Option<usize>,
    last_quote_ts: Option<Nanos>,
    max_staleness: Option<Nanos>,
}

impl TimeAligner {
    pub fn new(bars: Arc<BarSeries>) -> Self {
        Self {
            bars,
            cursor: None,
            last_quote_ts: None,
            max_staleness: None,
        }
    }

    /// Treat bars older than `secs` at quote time as missing data.
    pub fn with_max_staleness_secs(mut self, secs: Option<u64>) -> Self {
        self.max_staleness = secs.map(|s| (s as i64).saturating_mul(NANOS_PER_SEC));
        self
    }

    /// Index of the most recently aligned bar.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn bars(&self) -> &Arc<BarSeries> {
        &self.bars
    }

    /// Rewind to the start for another pass over the same bars.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.last_quote_ts = None;
    }

    /// Align a quote timestamp to its as-of bar.
    pub fn align(&mut self, quote_ts: Nanos) -> Result<Alignment, SignalError> {
        if let Some(previous) = self.last_quote_ts {
            if quote_ts < previous {
                return Err(SignalError::OutOfOrder {
                    previous,
                    current: quote_ts,
                });
            }
        }

        let first = self.bars.first_timestamp().ok_or_else(|| SignalError::DataGap {
            timestamp: quote_ts,
            reason: "no price bars".into(),
        })?;
        if quote_ts < first {
            return Err(SignalError::DataGap {
                timestamp: quote_ts,
                reason: format!("quote precedes first bar at {}", first),
            });
        }

        let bars = self.bars.bars();
        let mut index = self.cursor.unwrap_or(0);
        while index + 1 < bars.len() && bars[index + 1].timestamp <= quote_ts {
            index += 1;
        }
        self.cursor = Some(index);
        self.last_quote_ts = Some(quote_ts);

        let bar = &bars[index];
        if let Some(max_age) = self.max_staleness {
            if quote_ts - bar.timestamp > max_age {
                return Err(SignalError::DataGap {
                    timestamp: quote_ts,
                    reason: format!(
                        "latest bar at {} is older than {}s",
                        bar.timestamp,
                        max_age / NANOS_PER_SEC
                    ),
                });
            }
        }

        let mid = bar.midpoint();
        if mid != 0.0 {
            return Ok(Alignment {
                bar_index: index,
                bar_timestamp: bar.timestamp,
                spot_reference: mid,
                fell_back: false,
            });
        }

        // Zero-filled bar: use the bar before it.
        match index.checked_sub(1).map(|i| bars[i].midpoint()) {
            Some(prev_mid) if prev_mid != 0.0 => Ok(Alignment {
                bar_index: index,
                bar_timestamp: bar.timestamp,
                spot_reference: prev_mid,
                fell_back: true,
            }),
            _ => Err(SignalError::DataGap {
                timestamp: quote_ts,
                reason: format!("zero-filled bar at {} with no usable predecessor", bar.timestamp),
            }),
        }
    }
}
