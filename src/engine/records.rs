//! Record shapes exchanged with the I/O layer.
//!
//! Quote and bar records arrive with string timestamps (quote receive time in
//! RFC3339, bar bucket labels such as `2024-01-02 09:30:00-05:00`); orders
//! leave as `{datetime, option_symbol, action, order_size}`. Field aliases
//! accept the column names of the raw market-data exports.

use crate::engine::clock::{format_timestamp, parse_bucket_label, parse_timestamp};
use crate::engine::events::{Order, PriceBar, QuoteEvent, Side};
use crate::engine::ledger::PositionSnapshot;
use crate::engine::signal::{RunStop, SignalRun, SignalStats};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    #[serde(alias = "ts_recv")]
    pub timestamp: String,
    pub symbol: String,
    #[serde(alias = "bid_px_00")]
    pub bid_price: f64,
    #[serde(alias = "bid_sz_00")]
    pub bid_size: u64,
    #[serde(alias = "ask_px_00")]
    pub ask_price: f64,
    #[serde(alias = "ask_sz_00")]
    pub ask_size: u64,
}

impl QuoteRecord {
    pub fn to_event(&self) -> Result<QuoteEvent> {
        let timestamp = parse_timestamp(&self.timestamp)
            .ok_or_else(|| anyhow!("invalid quote timestamp '{}'", self.timestamp))?;
        if !(self.bid_price >= 0.0 && self.ask_price >= 0.0) {
            return Err(anyhow!(
                "negative price in quote for {} at {}",
                self.symbol,
                self.timestamp
            ));
        }
        Ok(QuoteEvent::new(
            timestamp,
            self.symbol.clone(),
            self.bid_price,
            self.bid_size,
            self.ask_price,
            self.ask_size,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    #[serde(alias = "timestamp", alias = "date")]
    pub bucket_label: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl BarRecord {
    pub fn to_bar(&self) -> Result<PriceBar> {
        let timestamp = parse_bucket_label(&self.bucket_label)
            .ok_or_else(|| anyhow!("invalid bar label '{}'", self.bucket_label))?;
        Ok(PriceBar::new(
            timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub datetime: String,
    pub option_symbol: String,
    /// `"B"` or `"S"`.
    pub action: String,
    pub order_size: u64,
}

impl From<&Order> for OrderRecord {
    fn from(order: &Order) -> Self {
        Self {
            datetime: format_timestamp(order.timestamp),
            option_symbol: order.symbol.clone(),
            action: order.side.action_code().to_string(),
            order_size: order.quantity,
        }
    }
}

impl OrderRecord {
    pub fn to_order(&self) -> Result<Order> {
        let timestamp = parse_timestamp(&self.datetime)
            .ok_or_else(|| anyhow!("invalid order datetime '{}'", self.datetime))?;
        let side = Side::from_action_code(&self.action)
            .ok_or_else(|| anyhow!("unknown action '{}'", self.action))?;
        Ok(Order {
            timestamp,
            symbol: self.option_symbol.clone(),
            side,
            quantity: self.order_size,
        })
    }
}

/// Convert a batch of quote records, naming the first bad row.
pub fn quotes_from_records(records: &[QuoteRecord]) -> Result<Vec<QuoteEvent>> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| r.to_event().with_context(|| format!("quote row {}", i)))
        .collect()
}

/// Convert a batch of bar records, naming the first bad row.
pub fn bars_from_records(records: &[BarRecord]) -> Result<Vec<PriceBar>> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| r.to_bar().with_context(|| format!("bar row {}", i)))
        .collect()
}

/// Document written by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub orders: Vec<OrderRecord>,
    pub positions: Vec<PositionSnapshot>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub stats: SignalStats,
    pub stop: RunStop,
}

impl From<&SignalRun> for RunReport {
    fn from(run: &SignalRun) -> Self {
        Self {
            orders: run.orders.iter().map(OrderRecord::from).collect(),
            positions: run.positions.clone(),
            realized_pnl: run.total_realized_pnl(),
            unrealized_pnl: run.unrealized_pnl_at_fair_value(),
            stats: run.stats.clone(),
            stop: run.stop,
        }
    }
}
