//! BDD tests for the backtester.
//!
//! These tests verify:
//! - Single runs with baseline and closure policies
//! - SMA crossover and RSI baselines trading long-only and replaying after reset
//! - Ruin truncation surfacing as `EpisodeOutcome::Ruined`
//! - Sequential and parallel multi-runs agreeing run by run
//! - Random baseline benchmarking
//! - Walk-forward window layout and summaries
//! - TOML config + CSV bars driving a full run

use chrono::{Duration, NaiveDate};
use std::io::Write;

use tradesim_core::domain::{MarketBar, PositionSide, TradeKind};
use tradesim_core::env::{Action, ActionDecoder, EnvConfig, EnvError, Observation, TradingEnv};
use tradesim_core::reward::RewardConfig;
use tradesim_core::risk::RiskConfig;
use tradesim_runner::{
    load_bars_csv, run_backtest, BacktestError, Backtester, BuyAndHoldPolicy, EpisodeOutcome,
    HoldPolicy, MetricsConfig, Policy, RandomPolicy, RsiPolicy, SimulationConfig,
    SmaCrossoverPolicy, WalkForwardConfig,
};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn bars(closes: impl IntoIterator<Item = f64>) -> Vec<MarketBar> {
    let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            MarketBar::new(t0 + Duration::hours(i as i64), c, c * 1.01, c * 0.99, c, 1_000.0)
        })
        .collect()
}

fn wave(n: usize) -> Vec<MarketBar> {
    bars((0..n).map(|i| 100.0 + (i as f64 * 0.2).sin() * 8.0 + i as f64 * 0.01))
}

fn env_over(bars: Vec<MarketBar>, risk: RiskConfig) -> TradingEnv {
    let config = EnvConfig {
        window_size: 10,
        ..EnvConfig::default()
    };
    TradingEnv::with_reward_config(bars, config, risk, &RewardConfig::default()).unwrap()
}

// ──────────────────────────────────────────────
// Single runs
// ──────────────────────────────────────────────

#[test]
fn bdd_buy_and_hold_runs_to_completion() {
    // GIVEN an environment over 60 steadily rising bars
    let mut env = env_over(bars((0..60).map(|i| 100.0 + i as f64)), RiskConfig::unrestricted());
    let mut policy = BuyAndHoldPolicy::new(ActionDecoder::Discrete);

    // WHEN the backtest runs
    let result = run_backtest(&mut env, &mut policy, &MetricsConfig::default()).unwrap();

    // THEN every tradable bar is stepped once and one position is held to the end
    assert_eq!(result.outcome, EpisodeOutcome::Completed);
    assert_eq!(result.steps, 60 - 1 - 10);
    assert_eq!(result.portfolio_value_history.len(), result.steps);
    assert_eq!(result.prices.len(), result.steps);
    assert_eq!(result.actions.len(), result.steps);
    assert_eq!(result.trade_log.len(), 1);
    assert_eq!(result.trade_log[0].kind, TradeKind::Open);
    assert!(result.timestamps.windows(2).all(|w| w[0] < w[1]));

    // AND metrics agree with the value history
    let m = &result.performance_metrics;
    let last = *result.portfolio_value_history.last().unwrap();
    assert!((m.final_value - last).abs() < 1e-9);
    assert!((m.total_return - (last - 10_000.0) / 10_000.0).abs() < 1e-12);
    assert!(m.total_return > 0.0);
    assert_eq!(m.max_drawdown, 0.0);
    assert!(m.annualized_return.is_some());
    assert!((m.periods_per_year - 8766.0).abs() < 1e-6);
    assert!(m.benchmark.is_some());
    assert_eq!(result.reward_name, "profit");
}

#[test]
fn bdd_hold_policy_never_trades() {
    let mut env = env_over(wave(80), RiskConfig::default());
    let mut policy = HoldPolicy::new(ActionDecoder::Discrete);

    let result = run_backtest(&mut env, &mut policy, &MetricsConfig::default()).unwrap();

    assert!(result.trade_log.is_empty());
    let m = &result.performance_metrics;
    assert_eq!(m.total_return, 0.0);
    assert_eq!(m.sharpe_ratio, 0.0);
    assert_eq!(m.sortino_ratio, f64::INFINITY);
    assert_eq!(m.profit_factor, 0.0);
    assert_eq!(m.max_drawdown, 0.0);
    assert_eq!(result.trade_statistics.completed_trades, 0);
}

#[test]
fn bdd_closure_policy_round_trips() {
    // GIVEN a closure that buys on even steps and sells on odd ones
    let mut env = env_over(wave(40), RiskConfig::unrestricted());
    let mut policy = |obs: &Observation| {
        if obs.step % 2 == 0 {
            Action::BUY
        } else {
            Action::SELL
        }
    };

    // WHEN it is backtested
    let result = run_backtest(&mut env, &mut policy, &MetricsConfig::default()).unwrap();

    // THEN opens and closes alternate and every close is counted once
    let closes = result.trade_log.iter().filter(|t| t.is_close()).count();
    assert_eq!(result.performance_metrics.completed_trades, closes);
    assert_eq!(result.trade_statistics.completed_trades, closes);
    assert!(closes > 5);
}

fn assert_long_only_round_trips<P: Policy>(policy: &mut P) {
    // GIVEN an oscillating market and a long-only environment
    let env = env_over(wave(240), RiskConfig::unrestricted());
    let mut backtester = Backtester::new(env, MetricsConfig::default());

    // WHEN the same rule-based policy runs twice
    let report = backtester.run_multiple_backtests(policy, 2).unwrap();

    // THEN it trades several round trips, long only, alternating open and close
    let trades = &report.runs[0].trade_log;
    let closes = trades.iter().filter(|t| t.is_close()).count();
    assert!(closes >= 2, "expected round trips, got {closes}");
    assert!(trades.iter().all(|t| t.side == PositionSide::Long));
    assert!(trades
        .iter()
        .enumerate()
        .all(|(i, t)| (t.kind == TradeKind::Open) == (i % 2 == 0)));

    // AND reset clears its history so the second run replays the first
    assert_eq!(report.runs[0].trade_log, report.runs[1].trade_log);
    assert_eq!(report.runs[0].actions, report.runs[1].actions);
}

#[test]
fn bdd_sma_crossover_trades_crosses() {
    let mut policy = SmaCrossoverPolicy::with_periods(ActionDecoder::Discrete, 5, 15);
    assert_long_only_round_trips(&mut policy);
}

#[test]
fn bdd_rsi_trades_extremes() {
    let mut policy = RsiPolicy::new(ActionDecoder::Discrete);
    assert_long_only_round_trips(&mut policy);
}

#[test]
fn bdd_wrong_action_shape_is_an_error() {
    let mut env = env_over(wave(40), RiskConfig::default());
    let mut policy = |_: &Observation| Action::Continuous(0.5);
    let err = run_backtest(&mut env, &mut policy, &MetricsConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        BacktestError::Env(EnvError::ActionMismatch { .. })
    ));
}

#[test]
fn bdd_crash_ends_in_ruin() {
    // GIVEN a full long position and a 90% crash midway
    let closes = (0..40).map(|i| if i < 15 { 100.0 } else { 10.0 });
    let mut env = env_over(bars(closes), RiskConfig::unrestricted());
    let mut policy = BuyAndHoldPolicy::new(ActionDecoder::Discrete);

    // WHEN the backtest runs
    let result = run_backtest(&mut env, &mut policy, &MetricsConfig::default()).unwrap();

    // THEN the episode is truncated at the crash bar
    assert_eq!(result.outcome, EpisodeOutcome::Ruined);
    assert!(result.is_ruined());
    assert_eq!(result.steps, 15 - 10);
    assert!(result.final_value() < 2_000.0);
    assert!(result.performance_metrics.max_drawdown > 0.85);
}

// ──────────────────────────────────────────────
// Multi-run and random baseline
// ──────────────────────────────────────────────

#[test]
fn bdd_parallel_multi_run_matches_sequential() {
    // GIVEN one backtester and seeded random policies
    let env = env_over(wave(120), RiskConfig::default());
    let mut backtester = Backtester::new(env, MetricsConfig::default()).with_master_seed(7);

    // WHEN the same multi-run executes sequentially and in parallel
    let mut policy = RandomPolicy::new(ActionDecoder::Discrete, 0);
    let sequential = backtester.run_multiple_backtests(&mut policy, 6).unwrap();
    let parallel = backtester
        .run_multiple_backtests_parallel(6, |_| RandomPolicy::new(ActionDecoder::Discrete, 99))
        .unwrap();

    // THEN the runs agree one by one
    assert_eq!(sequential.runs.len(), 6);
    assert_eq!(sequential.runs, parallel.runs);
    assert_eq!(sequential.summary, parallel.summary);

    // AND runs use distinct seeds
    let mut seeds: Vec<u64> = sequential.runs.iter().filter_map(|r| r.seed).collect();
    seeds.dedup();
    assert_eq!(seeds.len(), 6);
}

#[test]
fn bdd_random_baseline_summary() {
    let env = env_over(wave(120), RiskConfig::default());
    let backtester = Backtester::new(env, MetricsConfig::default());

    let report = backtester.benchmark_against_random(8).unwrap();

    assert_eq!(report.summary.n_runs, 8);
    let r = &report.summary.total_return;
    assert!(r.worst <= r.best);
    assert_eq!(r.count, 8);
    assert!(r.std >= 0.0);
    let beaten = report.beaten_fraction(r.best + 1.0);
    assert_eq!(beaten, 1.0);
    assert_eq!(report.beaten_fraction(r.worst), 0.0);
}

// ──────────────────────────────────────────────
// Walk-forward
// ──────────────────────────────────────────────

#[test]
fn bdd_walk_forward_six_windows() {
    // GIVEN 1000 bars and train/test/step = 300/100/100
    let data = wave(1000);
    let template = env_over(data[..100].to_vec(), RiskConfig::default());
    let backtester = Backtester::new(template, MetricsConfig::default());
    let mut policy = BuyAndHoldPolicy::new(ActionDecoder::Discrete);

    // WHEN walk-forward analysis runs
    let report = backtester
        .walk_forward_analysis(&data, &mut policy, &WalkForwardConfig::new(300, 100, 100))
        .unwrap();

    // THEN six windows test [300:400] through [800:900]
    assert_eq!(report.summary.n_windows, 6);
    let ranges: Vec<(usize, usize)> = report
        .windows
        .iter()
        .map(|w| (w.window.test_start, w.window.test_end))
        .collect();
    assert_eq!(
        ranges,
        vec![(300, 400), (400, 500), (500, 600), (600, 700), (700, 800), (800, 900)]
    );

    // AND each window is a fresh episode over its own slice
    for w in &report.windows {
        assert_eq!(w.result.steps, 100 - 1 - 10);
        assert_eq!(w.result.timestamps[0], data[w.window.test_start + 11].timestamp);
    }
    assert!((0.0..=1.0).contains(&report.summary.win_rate));
}

#[test]
fn bdd_walk_forward_without_room_fails() {
    let data = wave(300);
    let template = env_over(data.clone(), RiskConfig::default());
    let backtester = Backtester::new(template, MetricsConfig::default());
    let mut policy = HoldPolicy::new(ActionDecoder::Discrete);

    let err = backtester
        .walk_forward_analysis(&data, &mut policy, &WalkForwardConfig::new(250, 50, 10))
        .unwrap_err();
    assert!(matches!(
        err,
        BacktestError::NoWalkForwardWindows {
            bars: 300,
            required: 300
        }
    ));
}

// ──────────────────────────────────────────────
// Config + CSV
// ──────────────────────────────────────────────

#[test]
fn bdd_config_and_csv_drive_a_run() {
    // GIVEN a CSV of 5-minute bars and a TOML config on disk
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("bars.csv");
    let mut csv = std::fs::File::create(&csv_path).unwrap();
    writeln!(csv, "timestamp,open,high,low,close,volume,returns").unwrap();
    for i in 0..50 {
        let close = 100.0 + (i as f64 * 0.3).sin() * 3.0;
        writeln!(
            csv,
            "2024-02-01 {:02}:{:02}:00,{close},{},{},{close},500,{}",
            i / 12,
            (i % 12) * 5,
            close + 0.5,
            close - 0.5,
            (i as f64 * 0.3).cos() * 0.01
        )
        .unwrap();
    }
    drop(csv);

    let config_path = dir.path().join("sim.toml");
    std::fs::write(
        &config_path,
        r#"
timeframe = "5min"

[env]
window_size = 5
decoder = "continuous"
enable_short = true

[reward]
kind = "sharpe"
params = { window = 10.0 }

[backtest]
master_seed = 3
"#,
    )
    .unwrap();

    // WHEN both are loaded and a backtester is built from them
    let config = SimulationConfig::from_file(&config_path).unwrap();
    let data = load_bars_csv(&csv_path).unwrap();
    let mut backtester = config.build_backtester(data.clone()).unwrap();
    let mut policy = RandomPolicy::new(ActionDecoder::Continuous, 5);
    let result = backtester.run_backtest(&mut policy).unwrap();

    // THEN the preset, reward and features are in effect
    assert_eq!(backtester.master_seed(), 3);
    assert_eq!(backtester.env().risk_config().max_trades_per_day, 15);
    assert_eq!(result.reward_name, "sharpe");
    assert!(backtester
        .env()
        .feature_names()
        .iter()
        .any(|f| f == "returns"));
    assert_eq!(result.steps, 50 - 1 - 5);
    assert_eq!(data.len(), 50);
}
