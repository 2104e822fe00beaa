//! Signal Generation
//!
//! The control loop: a fold over the quote stream with accumulated state
//! `{cursor, window, ledger}`.
//!
//! # Per-quote pipeline
//!
//! 1. Cutoffs (`max_events`, `end_time`) are checked first.
//! 2. The identifier is decoded; a `Parse` error drops the event.
//! 3. The quote is aligned and the spot window updated; `OutOfOrder` drops the
//!    event, `DataGap` ends the run cleanly.
//! 4. Fair value is computed; a `Domain` error (e.g. expired contract) drops
//!    the valuation.
//! 5. [`MispricingRule`] decides; the order is filled at the touch into the
//!    ledger and appended to the output.
//!
//! Steps 1-3 are the *staging* half and only touch global state (cursor and
//! window). Steps 4-5 are the *evaluation* half and only touch symbol-local
//! state (ledger entry, latest fair value). The partitioned runner relies on
//! that split.

use crate::engine::aligner::{BarSeries, TimeAligner};
use crate::engine::clock::{format_timestamp, Nanos};
use crate::engine::config::{EngineConfig, ExecutionMode, SignalConfig};
use crate::engine::error::SignalError;
use crate::engine::events::{Order, Price, QuoteEvent, Side, Size};
use crate::engine::fair_value::{FairValueSample, FairValueTracker};
use crate::engine::ledger::{Position, PositionLedger, PositionSnapshot};
use crate::engine::partition;
use crate::engine::pricing::PricingModel;
use crate::engine::symbol::{ContractTerms, SymbolCodec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Decision rule
// =============================================================================

/// Why an order was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalReason {
    /// Fair value below bid by more than the threshold.
    Overpriced,
    /// Fair value above ask by more than the threshold.
    Underpriced,
    /// Held long marked above its average cost.
    TakeProfit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub side: Side,
    pub quantity: Size,
    /// Touch price the fill is booked at.
    pub price: Price,
    pub reason: SignalReason,
}

/// Threshold rule comparing fair value to the quoted market.
#[derive(Debug, Clone, PartialEq)]
pub struct MispricingRule {
    pub threshold: f64,
    pub min_ask_price: Price,
    pub size_fraction: f64,
    pub min_order_size: Size,
    pub enable_buy: bool,
    pub take_profit: bool,
}

impl MispricingRule {
    pub fn from_config(config: &SignalConfig) -> Self {
        Self {
            threshold: config.mispricing_threshold,
            min_ask_price: config.min_ask_price,
            size_fraction: config.size_fraction,
            min_order_size: config.min_order_size,
            enable_buy: config.enable_buy_signals,
            take_profit: config.take_profit_exit,
        }
    }

    /// Fraction of the displayed size, floored at the minimum. An empty
    /// touch still trades the minimum.
    pub fn order_size(&self, touch_size: Size) -> Size {
        let scaled = (touch_size as f64 * self.size_fraction).floor() as Size;
        scaled.max(self.min_order_size)
    }

    /// Quotes with an ask under the floor never trade.
    #[inline]
    pub fn is_liquid(&self, quote: &QuoteEvent) -> bool {
        quote.ask_price >= self.min_ask_price
    }

    pub fn decide(
        &self,
        quote: &QuoteEvent,
        theoretical: Price,
        position: Option<&Position>,
    ) -> Option<Decision> {
        if !self.is_liquid(quote) {
            return None;
        }

        if self.take_profit {
            if let Some(decision) = self.take_profit_exit(quote, position) {
                return Some(decision);
            }
        }

        if theoretical < quote.bid_price - self.threshold {
            let (price, size) = quote.touch(Side::Sell);
            return Some(Decision {
                side: Side::Sell,
                quantity: self.order_size(size),
                price,
                reason: SignalReason::Overpriced,
            });
        }

        if self.enable_buy && theoretical > quote.ask_price + self.threshold {
            let (price, size) = quote.touch(Side::Buy);
            return Some(Decision {
                side: Side::Buy,
                quantity: self.order_size(size),
                price,
                reason: SignalReason::Underpriced,
            });
        }

        None
    }

    fn take_profit_exit(&self, quote: &QuoteEvent, position: Option<&Position>) -> Option<Decision> {
        let position = position?;
        let cost = position.average_cost?;
        if position.quantity <= 0 || quote.bid_price <= cost || quote.bid_size == 0 {
            return None;
        }
        Some(Decision {
            side: Side::Sell,
            quantity: quote.bid_size.min(position.quantity as Size),
            price: quote.bid_price,
            reason: SignalReason::TakeProfit,
        })
    }
}

// =============================================================================
// Run bookkeeping
// =============================================================================

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStop {
    /// Every quote was consumed.
    Exhausted,
    /// No bar could be aligned to the quote at `at`.
    DataGap { at: Nanos },
    /// `max_events` reached.
    EventLimit,
    /// A quote later than `end_time` arrived.
    TimeCutoff,
}

/// Run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalStats {
    pub events_seen: u64,
    pub events_valued: u64,
    pub parse_errors: u64,
    pub domain_errors: u64,
    pub out_of_order: u64,
    pub illiquid: u64,
    pub orders: u64,
    pub buy_orders: u64,
    pub sell_orders: u64,
    pub take_profit_orders: u64,
}

impl SignalStats {
    /// Add counters from a disjoint partition.
    pub fn merge(&mut self, other: &SignalStats) {
        self.events_seen += other.events_seen;
        self.events_valued += other.events_valued;
        self.parse_errors += other.parse_errors;
        self.domain_errors += other.domain_errors;
        self.out_of_order += other.out_of_order;
        self.illiquid += other.illiquid;
        self.orders += other.orders;
        self.buy_orders += other.buy_orders;
        self.sell_orders += other.sell_orders;
        self.take_profit_orders += other.take_profit_orders;
    }

    pub fn skipped(&self) -> u64 {
        self.parse_errors + self.domain_errors + self.out_of_order
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRun {
    /// Orders in generation order.
    pub orders: Vec<Order>,
    /// Final ledger, sorted by symbol.
    pub positions: Vec<PositionSnapshot>,
    /// Latest fair value per symbol, sorted by symbol.
    pub fair_values: Vec<FairValueSample>,
    /// Every fair value computed, when `collect_samples` is set.
    pub samples: Vec<FairValueSample>,
    pub stats: SignalStats,
    pub stop: RunStop,
}

impl SignalRun {
    pub fn total_realized_pnl(&self) -> f64 {
        self.positions.iter().map(|p| p.realized_pnl).sum()
    }

    /// Open positions marked at their latest fair value.
    pub fn unrealized_pnl_at_fair_value(&self) -> f64 {
        self.positions
            .iter()
            .filter_map(|p| {
                self.fair_values
                    .binary_search_by(|s| s.symbol.as_str().cmp(p.symbol.as_str()))
                    .ok()
                    .map(|i| p.unrealized_pnl(self.fair_values[i].theoretical))
            })
            .sum()
    }

    pub fn position(&self, symbol: &str) -> Option<&PositionSnapshot> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }
}

// =============================================================================
// Staging: decode + align (global state)
// =============================================================================

/// A quote decoded and stamped with the spot estimate in force at its time.
#[derive(Debug, Clone)]
pub struct StagedQuote {
    /// Position in the input stream; breaks timestamp ties on merge.
    pub seq: u64,
    pub quote: QuoteEvent,
    pub terms: ContractTerms,
    pub spot: Price,
}

#[derive(Debug)]
pub(crate) enum Staged {
    Ready(StagedQuote),
    Skipped,
    Stop(RunStop),
}

/// Owns the single forward cursor and the spot window.
#[derive(Debug)]
pub(crate) struct Stager {
    codec: SymbolCodec,
    aligner: TimeAligner,
    tracker: FairValueTracker,
    max_events: Option<u64>,
    end_time: Option<Nanos>,
    pub(crate) stats: SignalStats,
}

impl Stager {
    pub(crate) fn new(config: &EngineConfig, bars: Arc<BarSeries>) -> Self {
        Self {
            codec: SymbolCodec::new(config.symbol.clone()),
            aligner: TimeAligner::new(bars)
                .with_max_staleness_secs(config.signal.max_bar_staleness_secs),
            tracker: FairValueTracker::new(config.signal.window_size),
            max_events: config.limits.max_events,
            end_time: config.limits.end_time_nanos(),
            stats: SignalStats::default(),
        }
    }

    pub(crate) fn stage(&mut self, quote: &QuoteEvent) -> Result<Staged, SignalError> {
        if let Some(max) = self.max_events {
            if self.stats.events_seen >= max {
                info!(max, "event limit reached");
                return Ok(Staged::Stop(RunStop::EventLimit));
            }
        }
        if let Some(end) = self.end_time {
            if quote.timestamp > end {
                info!(at = %format_timestamp(quote.timestamp), "end time reached");
                return Ok(Staged::Stop(RunStop::TimeCutoff));
            }
        }

        let seq = self.stats.events_seen;
        self.stats.events_seen += 1;

        let terms = match self.codec.decode(&quote.symbol) {
            Ok(terms) => terms,
            Err(e) => {
                self.stats.parse_errors += 1;
                debug!(error = %e, "skipping quote");
                return Ok(Staged::Skipped);
            }
        };

        let spot = match self.tracker.on_quote(&mut self.aligner, quote.timestamp) {
            Ok(spot) => spot,
            Err(SignalError::DataGap { timestamp, reason }) => {
                info!(at = %format_timestamp(timestamp), %reason, "no aligned bar, stopping");
                return Ok(Staged::Stop(RunStop::DataGap { at: timestamp }));
            }
            Err(e) if e.is_recoverable() => {
                self.stats.out_of_order += 1;
                debug!(error = %e, symbol = %quote.symbol, "skipping quote");
                return Ok(Staged::Skipped);
            }
            Err(e) => return Err(e),
        };

        Ok(Staged::Ready(StagedQuote {
            seq,
            quote: quote.clone(),
            terms,
            spot,
        }))
    }
}

// =============================================================================
// Evaluation: price + decide + fill (symbol-local state)
// =============================================================================

#[derive(Debug)]
pub(crate) struct Evaluator {
    model: PricingModel,
    rule: MispricingRule,
    collect_samples: bool,
    pub(crate) ledger: PositionLedger,
    pub(crate) orders: Vec<(u64, Order)>,
    pub(crate) latest: BTreeMap<String, FairValueSample>,
    pub(crate) samples: Vec<(u64, FairValueSample)>,
    pub(crate) stats: SignalStats,
}

impl Evaluator {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        Self {
            model: PricingModel::new(config.pricing.clone()),
            rule: MispricingRule::from_config(&config.signal),
            collect_samples: config.signal.collect_samples,
            ledger: PositionLedger::new(),
            orders: Vec::new(),
            latest: BTreeMap::new(),
            samples: Vec::new(),
            stats: SignalStats::default(),
        }
    }

    pub(crate) fn evaluate(&mut self, staged: &StagedQuote) -> Result<Option<Order>, SignalError> {
        let quote = &staged.quote;
        let sample = match FairValueSample::evaluate(
            &self.model,
            &quote.symbol,
            &staged.terms,
            quote.timestamp,
            staged.spot,
        ) {
            Ok(sample) => sample,
            Err(e) if e.is_recoverable() => {
                self.stats.domain_errors += 1;
                debug!(error = %e, symbol = %quote.symbol, "skipping valuation");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.stats.events_valued += 1;

        let theoretical = sample.theoretical;
        if self.collect_samples {
            self.samples.push((staged.seq, sample.clone()));
        }
        self.latest.insert(quote.symbol.clone(), sample);

        if !self.rule.is_liquid(quote) {
            self.stats.illiquid += 1;
            return Ok(None);
        }

        let decision = match self
            .rule
            .decide(quote, theoretical, self.ledger.position(&quote.symbol))
        {
            Some(d) => d,
            None => return Ok(None),
        };

        match self.ledger.apply_fill(
            &quote.symbol,
            decision.side,
            decision.quantity,
            decision.price,
            quote.timestamp,
        ) {
            Ok(_) => {}
            Err(e) if e.is_recoverable() => {
                self.stats.domain_errors += 1;
                warn!(error = %e, symbol = %quote.symbol, "fill rejected, dropping order");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        self.stats.orders += 1;
        match decision.side {
            Side::Buy => self.stats.buy_orders += 1,
            Side::Sell => self.stats.sell_orders += 1,
        }
        if decision.reason == SignalReason::TakeProfit {
            self.stats.take_profit_orders += 1;
        }

        debug!(
            symbol = %quote.symbol,
            side = ?decision.side,
            qty = decision.quantity,
            price = decision.price,
            theoretical,
            reason = ?decision.reason,
            "signal"
        );

        let order = Order {
            timestamp: quote.timestamp,
            symbol: quote.symbol.clone(),
            side: decision.side,
            quantity: decision.quantity,
        };
        self.orders.push((staged.seq, order.clone()));
        Ok(Some(order))
    }
}

// =============================================================================
// Sequential generator
// =============================================================================

/// Sequential signal generator over one globally ordered quote stream.
#[derive(Debug)]
pub struct SignalGenerator {
    stager: Stager,
    evaluator: Evaluator,
    stop: Option<RunStop>,
}

impl SignalGenerator {
    /// Validate `config` and build a generator over `bars`.
    pub fn new(config: &EngineConfig, bars: Arc<BarSeries>) -> Result<Self, SignalError> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "rejecting engine config");
            return Err(e);
        }
        Ok(Self {
            stager: Stager::new(config, bars),
            evaluator: Evaluator::new(config),
            stop: None,
        })
    }

    /// Process one quote. Returns the order it generated, if any.
    ///
    /// Per-event errors are absorbed into the stats; a data gap or cutoff
    /// marks the generator stopped and later quotes are ignored.
    pub fn on_quote(&mut self, quote: &QuoteEvent) -> Result<Option<Order>, SignalError> {
        if self.stop.is_some() {
            return Ok(None);
        }
        match self.stager.stage(quote)? {
            Staged::Ready(staged) => self.evaluator.evaluate(&staged),
            Staged::Skipped => Ok(None),
            Staged::Stop(reason) => {
                self.stop = Some(reason);
                Ok(None)
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_some()
    }

    pub fn stop_reason(&self) -> Option<RunStop> {
        self.stop
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.evaluator.ledger
    }

    pub fn current_spot_estimate(&self) -> Option<Price> {
        self.stager.tracker.current_spot_estimate()
    }

    /// Latest fair value computed for `symbol`.
    pub fn fair_value(&self, symbol: &str) -> Option<&FairValueSample> {
        self.evaluator.latest.get(symbol)
    }

    pub fn stats(&self) -> SignalStats {
        let mut stats = self.stager.stats.clone();
        stats.merge(&self.evaluator.stats);
        stats
    }

    /// Fold every quote, stopping early on a data gap or cutoff.
    pub fn run(mut self, quotes: &[QuoteEvent]) -> Result<SignalRun, SignalError> {
        for quote in quotes {
            self.on_quote(quote)?;
            if self.is_stopped() {
                break;
            }
        }
        Ok(self.finish())
    }

    /// Close the run and collect its output.
    pub fn finish(self) -> SignalRun {
        let stats = self.stats();
        let stop = self.stop.unwrap_or(RunStop::Exhausted);
        let run = SignalRun {
            orders: self.evaluator.orders.into_iter().map(|(_, o)| o).collect(),
            positions: self.evaluator.ledger.snapshots(),
            fair_values: self.evaluator.latest.into_values().collect(),
            samples: self.evaluator.samples.into_iter().map(|(_, s)| s).collect(),
            stats,
            stop,
        };
        log_summary(&run);
        run
    }
}

pub(crate) fn log_summary(run: &SignalRun) {
    info!(
        events = run.stats.events_seen,
        valued = run.stats.events_valued,
        skipped = run.stats.skipped(),
        orders = run.orders.len(),
        positions = run.positions.len(),
        realized_pnl = run.total_realized_pnl(),
        stop = ?run.stop,
        "signal run complete"
    );
}

/// Run in the configured execution mode.
pub fn run_signals(
    config: &EngineConfig,
    bars: Arc<BarSeries>,
    quotes: &[QuoteEvent],
) -> Result<SignalRun, SignalError> {
    match config.execution.mode {
        ExecutionMode::Sequential => SignalGenerator::new(config, bars)?.run(quotes),
        ExecutionMode::Partitioned => partition::run_partitioned(config, bars, quotes),
    }
}
