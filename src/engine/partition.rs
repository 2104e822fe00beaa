//! Symbol-partitioned execution.
//!
//! Runs the same pipeline as [`SignalGenerator`](crate::engine::signal::SignalGenerator)
//! in three passes:
//!
//! 1. **Stage** (sequential): decode, align and stamp every quote with the spot
//!    estimate using the single global cursor and window. Cheap, and the only
//!    pass that touches shared state.
//! 2. **Evaluate** (parallel): each symbol's staged sub-stream is valued and
//!    traded on a rayon worker with its own ledger. The bar series is shared
//!    read-only through `Arc` and never mutated.
//! 3. **Merge**: orders and samples are ordered by `(timestamp, seq)`; ledgers
//!    are disjoint by construction and are unioned.
//!
//! Output is identical to the sequential run on the same input.

use crate::engine::aligner::BarSeries;
use crate::engine::config::EngineConfig;
use crate::engine::error::SignalError;
use crate::engine::events::QuoteEvent;
use crate::engine::ledger::PositionLedger;
use crate::engine::signal::{log_summary, Evaluator, RunStop, SignalRun, StagedQuote, Staged, Stager};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output of pass 1.
#[derive(Debug)]
pub(crate) struct StagedStream {
    /// Staged quotes grouped by symbol, each group in stream order.
    pub(crate) by_symbol: BTreeMap<String, Vec<StagedQuote>>,
    pub(crate) stop: RunStop,
}

/// Pass 1: stage the whole stream sequentially.
pub(crate) fn stage_all(
    stager: &mut Stager,
    quotes: &[QuoteEvent],
) -> Result<StagedStream, SignalError> {
    let mut by_symbol: BTreeMap<String, Vec<StagedQuote>> = BTreeMap::new();
    let mut stop = RunStop::Exhausted;

    for quote in quotes {
        match stager.stage(quote)? {
            Staged::Ready(staged) => {
                by_symbol
                    .entry(staged.quote.symbol.clone())
                    .or_default()
                    .push(staged);
            }
            Staged::Skipped => {}
            Staged::Stop(reason) => {
                stop = reason;
                break;
            }
        }
    }

    Ok(StagedStream { by_symbol, stop })
}

/// Pass 2 for one symbol.
fn evaluate_symbol(config: &EngineConfig, staged: &[StagedQuote]) -> Result<Evaluator, SignalError> {
    let mut evaluator = Evaluator::new(config);
    for quote in staged {
        evaluator.evaluate(quote)?;
    }
    Ok(evaluator)
}

/// Run with one worker task per symbol.
pub fn run_partitioned(
    config: &EngineConfig,
    bars: Arc<BarSeries>,
    quotes: &[QuoteEvent],
) -> Result<SignalRun, SignalError> {
    if let Err(e) = config.validate() {
        warn!(error = %e, "rejecting engine config");
        return Err(e);
    }
    let start = Instant::now();

    let mut stager = Stager::new(config, bars);
    let stream = stage_all(&mut stager, quotes)?;
    debug!(
        symbols = stream.by_symbol.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "staging complete"
    );

    let groups: Vec<&Vec<StagedQuote>> = stream.by_symbol.values().collect();
    let evaluate = || -> Result<Vec<Evaluator>, SignalError> {
        groups
            .par_iter()
            .map(|group| evaluate_symbol(config, group.as_slice()))
            .collect()
    };
    let evaluators = match config.execution.workers {
        Some(workers) => rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SignalError::config("execution.workers", e.to_string()))?
            .install(evaluate)?,
        None => evaluate()?,
    };

    let run = merge(stager, evaluators, stream.stop);
    info!(
        workers = config.execution.workers.unwrap_or_else(rayon::current_num_threads),
        elapsed_us = start.elapsed().as_micros() as u64,
        "partitioned run merged"
    );
    log_summary(&run);
    Ok(run)
}

/// Pass 3: deterministic merge.
fn merge(stager: Stager, evaluators: Vec<Evaluator>, stop: RunStop) -> SignalRun {
    let mut stats = stager.stats;
    let mut ledger = PositionLedger::new();
    let mut orders = Vec::new();
    let mut samples = Vec::new();
    let mut latest = BTreeMap::new();

    for evaluator in evaluators {
        stats.merge(&evaluator.stats);
        ledger.absorb(evaluator.ledger);
        orders.extend(evaluator.orders);
        samples.extend(evaluator.samples);
        latest.extend(evaluator.latest);
    }

    orders.sort_by_key(|(seq, order)| (order.timestamp, *seq));
    samples.sort_by_key(|(seq, sample)| (sample.timestamp, *seq));

    SignalRun {
        orders: orders.into_iter().map(|(_, o)| o).collect(),
        positions: ledger.snapshots(),
        fair_values: latest.into_values().collect(),
        samples: samples.into_iter().map(|(_, s)| s).collect(),
        stats,
        stop,
    }
}
