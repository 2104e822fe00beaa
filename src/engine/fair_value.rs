//! Rolling fair value.
//!
//! The tracker keeps the last `N` bar midpoints in a fixed-capacity ring and
//! reports their mean as the spot estimate fed to the pricing model. One
//! sample is pushed per distinct aligned bar; further quotes inside the same
//! bar reuse the current estimate.

use crate::engine::aligner::TimeAligner;
use crate::engine::clock::{year_fraction, Nanos};
use crate::engine::error::SignalError;
use crate::engine::events::Price;
use crate::engine::pricing::PricingModel;
use crate::engine::symbol::ContractTerms;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fair value of one contract at one quote. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValueSample {
    pub symbol: String,
    pub timestamp: Nanos,
    pub spot: Price,
    pub time_to_expiry: f64,
    pub theoretical: Price,
}

impl FairValueSample {
    /// Value `terms` at `timestamp` from a spot estimate.
    ///
    /// Fails with `Domain` when the contract has expired (non-positive time
    /// to expiry) or the inputs are otherwise outside the model's domain.
    pub fn evaluate(
        model: &PricingModel,
        symbol: &str,
        terms: &ContractTerms,
        timestamp: Nanos,
        spot: Price,
    ) -> Result<Self, SignalError> {
        let time_to_expiry = year_fraction(timestamp, terms.expiry, model.config().day_count_basis);
        if time_to_expiry <= 0.0 {
            return Err(SignalError::domain(format!(
                "{} expired on {}",
                symbol, terms.expiry
            )));
        }
        let theoretical =
            model.theoretical_price(terms.option_type, spot, terms.strike(), time_to_expiry)?;
        Ok(Self {
            symbol: symbol.to_string(),
            timestamp,
            spot,
            time_to_expiry,
            theoretical,
        })
    }
}

/// Moving average of per-bar spot references.
#[derive(Debug, Clone)]
pub struct FairValueTracker {
    window: VecDeque<Price>,
    capacity: usize,
    last_bar_index: Option<usize>,
}

impl FairValueTracker {
    /// `capacity` must be at least 1 (enforced by config validation).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            last_bar_index: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Mean of the window, `None` before the first sample.
    pub fn current_spot_estimate(&self) -> Option<Price> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<Price>() / self.window.len() as f64)
    }

    /// Record the spot reference of `bar_index`. Repeats of the last bar
    /// index are ignored. Returns the updated mean.
    pub fn observe(&mut self, bar_index: usize, spot: Price) -> Price {
        if self.last_bar_index != Some(bar_index) {
            if self.window.len() == self.capacity {
                self.window.pop_front();
            }
            self.window.push_back(spot);
            self.last_bar_index = Some(bar_index);
        }
        // Non-empty after the push above or a previous one
        self.current_spot_estimate().unwrap_or(spot)
    }

    /// Align a quote and fold its bar into the window.
    pub fn on_quote(&mut self, aligner: &mut TimeAligner, timestamp: Nanos) -> Result<Price, SignalError> {
        let alignment = aligner.align(timestamp)?;
        Ok(self.observe(alignment.bar_index, alignment.spot_reference))
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.last_bar_index = None;
    }
}
