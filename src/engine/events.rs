//! Event Model
//!
//! Input events (option quotes, underlying price bars) and the order signal
//! emitted by the engine. All timestamps are UTC nanoseconds.

use crate::engine::clock::Nanos;
use serde::{Deserialize, Serialize};

/// Price in currency units per contract.
pub type Price = f64;

/// Displayed size or order quantity in whole contracts.
pub type Size = u64;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Signed direction of a fill on net inventory.
    #[inline]
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    /// Single-letter action code used in order files.
    #[inline]
    pub fn action_code(&self) -> &'static str {
        match self {
            Side::Buy => "B",
            Side::Sell => "S",
        }
    }

    pub fn from_action_code(code: &str) -> Option<Self> {
        match code {
            "B" => Some(Side::Buy),
            "S" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

/// Top-of-book quote for one option contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteEvent {
    /// Receive time (UTC nanos).
    pub timestamp: Nanos,
    /// Exchange-style contract identifier, e.g. `SPX   240119C04700000`.
    pub symbol: String,
    pub bid_price: Price,
    pub bid_size: Size,
    pub ask_price: Price,
    pub ask_size: Size,
}

impl QuoteEvent {
    pub fn new(
        timestamp: Nanos,
        symbol: impl Into<String>,
        bid_price: Price,
        bid_size: Size,
        ask_price: Price,
        ask_size: Size,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            bid_price,
            bid_size,
            ask_price,
            ask_size,
        }
    }

    /// Quoted price and size on the side we would trade against.
    #[inline]
    pub fn touch(&self, side: Side) -> (Price, Size) {
        match side {
            Side::Buy => (self.ask_price, self.ask_size),
            Side::Sell => (self.bid_price, self.bid_size),
        }
    }
}

/// One OHLCV bucket of the underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Bucket start (UTC nanos).
    pub timestamp: Nanos,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(timestamp: Nanos, open: Price, high: Price, low: Price, close: Price, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Spot reference for the bucket: high/low midpoint.
    #[inline]
    pub fn midpoint(&self) -> Price {
        (self.high + self.low) / 2.0
    }
}

/// Order signal emitted by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub timestamp: Nanos,
    pub symbol: String,
    pub side: Side,
    pub quantity: Size,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_codes() {
        assert_eq!(Side::Buy.action_code(), "B");
        assert_eq!(Side::Sell.action_code(), "S");
        assert_eq!(Side::from_action_code("S"), Some(Side::Sell));
        assert_eq!(Side::from_action_code("X"), None);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.sign(), -1);
    }

    #[test]
    fn test_touch_and_midpoint() {
        let q = QuoteEvent::new(0, "SPX   240119C04700000", 10.0, 8, 11.0, 12);
        assert_eq!(q.touch(Side::Sell), (10.0, 8));
        assert_eq!(q.touch(Side::Buy), (11.0, 12));

        let bar = PriceBar::new(0, 4700.0, 4710.0, 4690.0, 4705.0, 1e6);
        assert_eq!(bar.midpoint(), 4700.0);
    }
}
