//! TradeSim Runner — backtest orchestration on top of `tradesim-core`.
//!
//! This crate provides:
//! - Policies (the consumed interface plus random, buy-and-hold, hold, SMA
//!   crossover and RSI baselines)
//! - Performance metrics over value histories and trade logs
//! - Single-run, multi-run (sequential and rayon-parallel) and random-baseline backtests
//! - Walk-forward analysis over rolling test windows
//! - TOML simulation configuration and CSV bar loading

pub mod backtester;
pub mod config;
pub mod data_loader;
pub mod metrics;
pub mod policy;
pub mod summary;
pub mod walk_forward;

pub use backtester::{
    run_backtest, BacktestError, BacktestResult, Backtester, EpisodeOutcome, MultiRunReport,
};
pub use config::{BacktestConfig, ConfigError, ConfigHash, SimulationConfig};
pub use data_loader::{dataset_hash, load_bars_csv, read_bars_csv, LoadError};
pub use metrics::{BenchmarkComparison, MetricsConfig, PerformanceMetrics};
pub use policy::{
    BuyAndHoldPolicy, HoldPolicy, Policy, RandomPolicy, RsiPolicy, SmaCrossoverPolicy,
};
pub use summary::{FieldStats, RunSummary};
pub use walk_forward::{
    walk_forward_analysis, WalkForwardConfig, WalkForwardReport, WalkForwardSummary,
    WalkForwardWindow, WindowResult,
};
