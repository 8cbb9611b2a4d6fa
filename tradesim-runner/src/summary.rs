//! Aggregation of many backtests into mean/std/best/worst summaries.

use serde::{Deserialize, Serialize};

use crate::backtester::BacktestResult;
use crate::metrics::{mean, pop_std};

/// Distribution of one metric across runs. Non-finite values are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub mean: f64,
    pub std: f64,
    pub best: f64,
    pub worst: f64,
    /// Finite samples that entered the statistics.
    pub count: usize,
}

impl FieldStats {
    /// `best`/`worst` are max/min when higher is better, min/max otherwise.
    pub fn from_values(values: impl IntoIterator<Item = f64>, higher_is_better: bool) -> Self {
        let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self::default();
        }
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let (best, worst) = if higher_is_better {
            (max, min)
        } else {
            (min, max)
        };
        Self {
            mean: mean(&finite),
            std: pop_std(&finite),
            best,
            worst,
            count: finite.len(),
        }
    }
}

/// Summary of a multi-run or random benchmark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub n_runs: usize,
    pub ruined_runs: usize,
    pub total_return: FieldStats,
    pub sharpe_ratio: FieldStats,
    pub sortino_ratio: FieldStats,
    pub max_drawdown: FieldStats,
    pub total_reward: FieldStats,
}

impl RunSummary {
    pub fn from_results(results: &[BacktestResult]) -> Self {
        let metric = |f: fn(&BacktestResult) -> f64, higher: bool| {
            FieldStats::from_values(results.iter().map(f), higher)
        };
        Self {
            n_runs: results.len(),
            ruined_runs: results.iter().filter(|r| r.is_ruined()).count(),
            total_return: metric(|r| r.performance_metrics.total_return, true),
            sharpe_ratio: metric(|r| r.performance_metrics.sharpe_ratio, true),
            sortino_ratio: metric(|r| r.performance_metrics.sortino_ratio, true),
            max_drawdown: metric(|r| r.performance_metrics.max_drawdown, false),
            total_reward: metric(|r| r.total_reward, true),
        }
    }
}
