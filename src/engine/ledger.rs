//! Position Ledger
//!
//! Per-symbol average-cost inventory. Each fill is classified as opening
//! (flat or same direction), reducing (opposite direction, up to a full
//! offset) or flipping (crosses zero). Reductions realize
//! `qty * (price - avg_cost) * sign(position)` and leave the cost basis alone;
//! a flip realizes the full offset then opens the residual at the fill price.
//!
//! Entries are never removed. A flat entry keeps its realized P&L and has no
//! average cost; the next fill restarts the basis.

use crate::engine::clock::Nanos;
use crate::engine::error::SignalError;
use crate::engine::events::{Price, Side, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inventory for one contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Signed net quantity (positive = long).
    pub quantity: i64,
    /// Blended entry price; `None` while flat.
    pub average_cost: Option<Price>,
    pub realized_pnl: f64,
    pub fill_count: u64,
    pub last_fill_at: Option<Nanos>,
}

impl Position {
    #[inline]
    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Apply one fill. Returns the P&L realized by it.
    ///
    /// A quantity that does not fit the signed position, or a resulting
    /// position outside `±i64::MAX`, is a `Domain` error and leaves the
    /// position untouched.
    pub fn apply_fill(&mut self, side: Side, qty: Size, price: Price, now: Nanos) -> Result<f64, SignalError> {
        if qty == 0 {
            return Ok(0.0);
        }
        let qty = i64::try_from(qty)
            .map_err(|_| SignalError::domain(format!("fill quantity {} exceeds position range", qty)))?;
        let signed_qty = side.sign() * qty;
        let old_qty = self.quantity;
        let new_qty = old_qty
            .checked_add(signed_qty)
            .filter(|q| *q != i64::MIN)
            .ok_or_else(|| {
                SignalError::domain(format!("position {} overflows on fill of {}", old_qty, signed_qty))
            })?;
        let mut realized = 0.0;

        if old_qty == 0 || old_qty.signum() == signed_qty.signum() {
            // Opening or adding
            let old_cost = self.average_cost.unwrap_or(0.0) * old_qty.abs() as f64;
            self.average_cost = Some((old_cost + qty as f64 * price) / new_qty.abs() as f64);
            self.quantity = new_qty;
        } else {
            // Reducing, closing or flipping
            let closing_qty = qty.min(old_qty.abs());
            let opening_qty = qty - closing_qty;
            let basis = self.average_cost.unwrap_or(price);

            realized = closing_qty as f64 * (price - basis) * old_qty.signum() as f64;
            self.realized_pnl += realized;
            self.quantity = new_qty;

            if opening_qty > 0 {
                self.average_cost = Some(price);
            } else if self.quantity == 0 {
                self.average_cost = None;
            }
        }

        self.fill_count += 1;
        self.last_fill_at = Some(now);
        Ok(realized)
    }

    /// Mark-to-market P&L of the open quantity.
    pub fn unrealized_pnl(&self, mark: Price) -> f64 {
        mark_to_market(self.quantity, self.average_cost, mark)
    }
}

fn mark_to_market(quantity: i64, average_cost: Option<Price>, mark: Price) -> f64 {
    match average_cost {
        Some(cost) if quantity != 0 => (mark - cost) * quantity as f64,
        _ => 0.0,
    }
}

/// Read-only view of one ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub quantity: i64,
    pub average_cost: Option<Price>,
    pub realized_pnl: f64,
    pub fill_count: u64,
}

impl PositionSnapshot {
    pub fn unrealized_pnl(&self, mark: Price) -> f64 {
        mark_to_market(self.quantity, self.average_cost, mark)
    }

    fn from_position(symbol: &str, position: &Position) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity: position.quantity,
            average_cost: position.average_cost,
            realized_pnl: position.realized_pnl,
            fill_count: position.fill_count,
        }
    }
}

/// All positions of one run, keyed by contract identifier.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: BTreeMap<String, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a fill, creating the entry on first use. Returns realized P&L.
    /// A rejected fill creates no entry.
    pub fn apply_fill(
        &mut self,
        symbol: &str,
        side: Side,
        qty: Size,
        price: Price,
        now: Nanos,
    ) -> Result<f64, SignalError> {
        if qty == 0 {
            return Ok(0.0);
        }
        let position = self.positions.entry(symbol.to_string()).or_default();
        let result = position.apply_fill(side, qty, price, now);
        let net = position.quantity;
        if result.is_err() && position.fill_count == 0 {
            self.positions.remove(symbol);
        }
        let realized = result?;
        tracing::trace!(symbol, ?side, qty, price, realized, net, "fill applied");
        Ok(realized)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// `None` for a symbol that never traded.
    pub fn snapshot(&self, symbol: &str) -> Option<PositionSnapshot> {
        self.positions
            .get(symbol)
            .map(|p| PositionSnapshot::from_position(symbol, p))
    }

    /// Every entry, ordered by symbol.
    pub fn snapshots(&self) -> Vec<PositionSnapshot> {
        self.positions
            .iter()
            .map(|(symbol, p)| PositionSnapshot::from_position(symbol, p))
            .collect()
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }

    /// Unrealized P&L over all open positions, marking each with `mark`.
    /// Symbols `mark` has no price for contribute zero.
    pub fn total_unrealized_pnl(&self, mut mark: impl FnMut(&str) -> Option<Price>) -> f64 {
        self.positions
            .iter()
            .filter(|(_, p)| !p.is_flat())
            .filter_map(|(symbol, p)| mark(symbol).map(|m| p.unrealized_pnl(m)))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Fold another ledger with disjoint symbols into this one.
    pub fn absorb(&mut self, other: PositionLedger) {
        for (symbol, position) in other.positions {
            debug_assert!(!self.positions.contains_key(&symbol), "overlapping ledgers");
            self.positions.insert(symbol, position);
        }
    }
}
