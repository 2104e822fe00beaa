//! Options Signal Engine
//!
//! Offline mispricing signals for listed options. Given a time-ordered stream
//! of option quotes and a time-ordered series of underlying price bars, the
//! engine values each quoted contract with Black-Scholes, compares the value
//! with the quoted market and emits buy/sell orders, tracking inventory and
//! realized P&L per contract.
//!
//! # Architecture
//!
//! ```text
//!   QuoteEvent ──▶ SymbolCodec ──▶ ContractTerms
//!        │                              │
//!        ▼                              │
//!   TimeAligner ──▶ FairValueTracker    │
//!   (as-of cursor)  (spot window)       │
//!        │                │             │
//!        └───────┬────────┘             │
//!                ▼                      ▼
//!          spot estimate ──▶ PricingModel ──▶ FairValueSample
//!                                              │
//!                                              ▼
//!                                       MispricingRule
//!                                              │
//!                               ┌──────────────┴──────────────┐
//!                               ▼                             ▼
//!                         PositionLedger                    Order
//! ```
//!
//! # Determinism
//!
//! - **Inputs**: quotes and bars are fully materialized and sorted before the
//!   fold begins; nothing blocks on I/O inside the engine.
//! - **Cursor**: the aligner never rewinds; out-of-order quotes are rejected.
//! - **Partitioned mode**: orders merge back by `(timestamp, seq)`, so output is
//!   identical to the sequential fold.

pub mod aligner;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fair_value;
pub mod ledger;
pub mod partition;
pub mod pricing;
pub mod records;
pub mod signal;
pub mod symbol;


pub use aligner::{Alignment, BarSeries, TimeAligner};
pub use clock::{Nanos, NANOS_PER_MILLI, NANOS_PER_SEC};
pub use config::{
    EngineConfig, ExecutionConfig, ExecutionMode, PricingConfig, RunLimits, SignalConfig,
    SymbolConfig,
};
pub use error::SignalError;
pub use events::{OptionType, Order, Price, PriceBar, QuoteEvent, Side, Size};
pub use fair_value::{FairValueSample, FairValueTracker};
pub use ledger::{Position, PositionLedger, PositionSnapshot};
pub use partition::run_partitioned;
pub use pricing::{ImpliedVol, PricingModel};
pub use records::{BarRecord, OrderRecord, QuoteRecord, RunReport};
pub use signal::{
    run_signals, MispricingRule, RunStop, SignalGenerator, SignalReason, SignalRun, SignalStats,
};
pub use symbol::{ContractTerms, SymbolCodec};
