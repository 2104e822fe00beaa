//! Integration tests for the optsignal engine and CLI
//!
//! Library runs go through the public `engine` API with a TOML config written
//! to a temp dir; CLI runs invoke the built binary on JSON fixtures generated
//! on the fly and check the report and exit codes.

use optsignal::engine::records::{bars_from_records, quotes_from_records};
use optsignal::engine::{
    run_signals, BarRecord, BarSeries, EngineConfig, ExecutionMode, OrderRecord, QuoteRecord,
    RunStop, Side, SignalError, SymbolCodec,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

const ATM_CALL: &str = "SPX   250102C00100000";
const ITM_CALL: &str = "SPX   250102C00050000";

fn bar_records() -> Vec<BarRecord> {
    (0..6)
        .map(|h| BarRecord {
            bucket_label: format!("2024-01-02 {:02}:30:00-05:00", 9 + h),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            volume: 1_000.0,
        })
        .collect()
}

fn quote(ts: &str, symbol: &str, bid: f64, bid_size: u64, ask: f64, ask_size: u64) -> QuoteRecord {
    QuoteRecord {
        timestamp: ts.to_string(),
        symbol: symbol.to_string(),
        bid_price: bid,
        bid_size,
        ask_price: ask,
        ask_size,
    }
}

fn quote_records() -> Vec<QuoteRecord> {
    vec![
        quote("2024-01-02T14:31:00.125Z", ATM_CALL, 20.0, 40, 26.0, 40),
        quote("2024-01-02T14:45:00Z", "NOT A SYMBOL", 20.0, 40, 26.0, 40),
        quote("2024-01-02T15:10:00Z", ATM_CALL, 10.0, 40, 26.0, 40),
        quote("2024-01-02T15:40:00Z", ITM_CALL, 29.0, 20, 30.0, 20),
        quote("2024-01-02T16:05:00Z", ITM_CALL, 35.0, 3, 36.0, 3),
        quote("2024-01-02T16:30:00Z", ATM_CALL, 22.0, 9, 24.0, 9),
    ]
}

fn write_json<T: serde::Serialize>(dir: &Path, name: &str, value: &T) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
    path
}

// =============================================================================
// LIBRARY
// =============================================================================

#[test]
fn test_library_run_with_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("optsignal.toml");
    fs::write(
        &config_path,
        r#"
            [signal]
            enable_buy_signals = true
            take_profit_exit = true

            [execution]
            mode = "partitioned"
            workers = 2
        "#,
    )
    .unwrap();

    let config = EngineConfig::load(&config_path).unwrap();
    assert_eq!(config.execution.mode, ExecutionMode::Partitioned);

    let quotes = quotes_from_records(&quote_records()).unwrap();
    let bars = Arc::new(BarSeries::new(bars_from_records(&bar_records()).unwrap()).unwrap());
    let run = run_signals(&config, bars.clone(), &quotes).unwrap();

    // Sell ATM on the rich bid, buy the cheap ITM call, then take profit
    let sides: Vec<(String, Side, u64)> = run
        .orders
        .iter()
        .map(|o| (o.symbol.clone(), o.side, o.quantity))
        .collect();
    assert_eq!(
        sides,
        vec![
            (ATM_CALL.to_string(), Side::Sell, 10),
            (ITM_CALL.to_string(), Side::Buy, 5),
            (ITM_CALL.to_string(), Side::Sell, 3),
        ]
    );
    assert_eq!(run.stats.parse_errors, 1);
    assert_eq!(run.stats.illiquid, 1);
    assert_eq!(run.stop, RunStop::Exhausted);
    assert!((run.total_realized_pnl() - 15.0).abs() < 1e-9);

    // Same answer sequentially
    let mut sequential = config.clone();
    sequential.execution.mode = ExecutionMode::Sequential;
    let again = run_signals(&sequential, bars, &quotes).unwrap();
    assert_eq!(again.orders, run.orders);
    assert_eq!(again.positions, run.positions);
}

#[test]
fn test_config_save_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved.toml");

    let mut config = EngineConfig::default();
    config.symbol.strike_scale = 10_000;
    config.limits.max_events = Some(20_000);
    config.save(&path).unwrap();

    assert_eq!(EngineConfig::load(&path).unwrap(), config);
}

#[test]
fn test_unsorted_bars_rejected() {
    let mut records = bar_records();
    records.swap(1, 2);
    let err = BarSeries::new(bars_from_records(&records).unwrap()).unwrap_err();
    assert!(matches!(err, SignalError::OutOfOrder { .. }));
}

#[test]
fn test_codec_is_public() {
    let terms = SymbolCodec::default().decode(ITM_CALL).unwrap();
    assert_eq!(terms.strike(), 50.0);
}

// =============================================================================
// CLI
// =============================================================================

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_optsignal"))
}

#[test]
fn test_cli_writes_order_report() {
    let dir = tempfile::tempdir().unwrap();
    let quotes = write_json(dir.path(), "quotes.json", &quote_records());
    let bars = write_json(dir.path(), "bars.json", &bar_records());
    let output = dir.path().join("report.json");

    let status = Command::new(binary())
        .arg("--quotes")
        .arg(&quotes)
        .arg("--bars")
        .arg(&bars)
        .arg("--mode")
        .arg("partitioned")
        .arg("--output")
        .arg(&output)
        .env("OPTSIGNAL_CONFIG_PATH", dir.path().join("missing.toml"))
        .status()
        .unwrap();
    assert!(status.success());

    let report: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let orders: Vec<OrderRecord> = serde_json::from_value(report["orders"].clone()).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].option_symbol, ATM_CALL);
    assert_eq!(orders[0].action, "S");
    assert_eq!(orders[0].order_size, 10);
    assert_eq!(orders[0].datetime, "2024-01-02T14:31:00.125000000Z");
    assert_eq!(report["positions"][0]["quantity"], -10);
    assert_eq!(report["stop"], "exhausted");
}

#[test]
fn test_cli_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let quotes = write_json(dir.path(), "quotes.json", &quote_records());
    let bars = write_json(dir.path(), "bars.json", &bar_records());

    let bad_config = dir.path().join("bad.toml");
    fs::write(&bad_config, "[signal]\nwindow_size = 0\n").unwrap();
    let status = Command::new(binary())
        .arg("--quotes")
        .arg(&quotes)
        .arg("--bars")
        .arg(&bars)
        .arg("--config")
        .arg(&bad_config)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));

    let status = Command::new(binary())
        .arg("--quotes")
        .arg(dir.path().join("nope.json"))
        .arg("--bars")
        .arg(&bars)
        .env("OPTSIGNAL_CONFIG_PATH", dir.path().join("missing.toml"))
        .output()
        .unwrap()
        .status;
    assert_eq!(status.code(), Some(3));
}
