//! Walk-forward analysis — rolling out-of-sample evaluation.
//!
//! Windows start at bar 0 and advance by `step_size` while
//! `start + train_size + test_size < bars`. Each window backtests a fresh
//! episode over its test slice only; the train slice positions the window
//! and is left to an external training loop.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tradesim_core::domain::MarketBar;
use tradesim_core::env::TradingEnv;

use crate::backtester::{run_backtest, BacktestError, BacktestResult};
use crate::metrics::{mean, MetricsConfig};
use crate::policy::Policy;
use crate::summary::FieldStats;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub train_size: usize,
    pub test_size: usize,
    pub step_size: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_size: 1000,
            test_size: 200,
            step_size: 100,
        }
    }
}

impl WalkForwardConfig {
    pub fn new(train_size: usize, test_size: usize, step_size: usize) -> Self {
        Self {
            train_size,
            test_size,
            step_size,
        }
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.test_size == 0 {
            return Err(BacktestError::InvalidWalkForward(
                "test_size must be > 0".into(),
            ));
        }
        if self.step_size == 0 {
            return Err(BacktestError::InvalidWalkForward(
                "step_size must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Bar ranges of every window that fits in `total_bars`.
    pub fn windows(&self, total_bars: usize) -> Vec<WalkForwardWindow> {
        let span = self.train_size + self.test_size;
        if self.step_size == 0 {
            return Vec::new();
        }
        (0..)
            .map(|i| i * self.step_size)
            .take_while(|start| start + span < total_bars)
            .enumerate()
            .map(|(index, start)| WalkForwardWindow {
                index,
                train_start: start,
                train_end: start + self.train_size,
                test_start: start + self.train_size,
                test_end: start + span,
            })
            .collect()
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Bar index ranges of one window (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: WalkForwardWindow,
    pub result: BacktestResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub n_windows: usize,
    pub total_return: FieldStats,
    /// Mean over windows with a finite Sharpe ratio.
    pub mean_sharpe: f64,
    /// Fraction of windows with a positive total return.
    pub win_rate: f64,
}

impl WalkForwardSummary {
    pub fn from_windows(windows: &[WindowResult]) -> Self {
        if windows.is_empty() {
            return Self::default();
        }
        let returns: Vec<f64> = windows.iter().map(|w| w.result.total_return()).collect();
        let sharpes: Vec<f64> = windows
            .iter()
            .map(|w| w.result.performance_metrics.sharpe_ratio)
            .filter(|s| s.is_finite())
            .collect();
        let positive = returns.iter().filter(|r| **r > 0.0).count();
        Self {
            n_windows: windows.len(),
            total_return: FieldStats::from_values(returns.iter().copied(), true),
            mean_sharpe: mean(&sharpes),
            win_rate: positive as f64 / windows.len() as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub windows: Vec<WindowResult>,
    pub summary: WalkForwardSummary,
}

// ─── Analysis ────────────────────────────────────────────────────────

/// Backtest `policy` on each window's test slice of `bars`, reusing the
/// configuration and reward of `template`.
pub fn walk_forward_analysis<P: Policy + ?Sized>(
    template: &TradingEnv,
    bars: &[MarketBar],
    policy: &mut P,
    config: &WalkForwardConfig,
    metrics: &MetricsConfig,
) -> Result<WalkForwardReport, BacktestError> {
    config.validate()?;
    let windows = config.windows(bars.len());
    if windows.is_empty() {
        return Err(BacktestError::NoWalkForwardWindows {
            bars: bars.len(),
            required: config.train_size + config.test_size,
        });
    }
    info!(
        windows = windows.len(),
        train = config.train_size,
        test = config.test_size,
        step = config.step_size,
        "starting walk-forward analysis"
    );

    let mut results = Vec::with_capacity(windows.len());
    for window in windows {
        debug!(
            index = window.index,
            test_start = window.test_start,
            test_end = window.test_end,
            "walk-forward window"
        );
        let mut env = template.with_bars(bars[window.test_start..window.test_end].to_vec())?;
        let result = run_backtest(&mut env, policy, metrics)?;
        results.push(WindowResult { window, result });
    }

    let summary = WalkForwardSummary::from_windows(&results);
    info!(
        windows = summary.n_windows,
        mean_return = summary.total_return.mean,
        win_rate = summary.win_rate,
        "walk-forward analysis finished"
    );
    Ok(WalkForwardReport {
        windows: results,
        summary,
    })
}
