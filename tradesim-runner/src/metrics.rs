//! Performance metrics — pure functions over a value history and trade log.
//!
//! Every metric is a pure function: value history, trades and/or timestamps in,
//! scalar out. `PerformanceMetrics::compute` bundles them for one episode.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tradesim_core::domain::Trade;

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Annualization and risk-free settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Annual risk-free rate, de-annualized per period for Sharpe/Sortino.
    pub risk_free_rate: f64,
    /// Periods per year used when no timestamps are available (daily bars).
    pub fallback_periods_per_year: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            fallback_periods_per_year: 252.0,
        }
    }
}

/// Strategy versus buy-and-hold over the same closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub buy_and_hold_return: f64,
    pub buy_and_hold_final_value: f64,
    pub strategy_return: f64,
    pub strategy_final_value: f64,
    /// Strategy return minus buy-and-hold return.
    pub alpha: f64,
    pub outperformed: bool,
}

/// Aggregate performance metrics for a single episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // Returns
    pub initial_balance: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub total_profit: f64,
    pub annualized_return: Option<f64>,
    pub duration_days: Option<f64>,

    // Risk
    pub volatility: f64,
    pub annualized_volatility: f64,
    pub periods_per_year: f64,
    pub sharpe_ratio: f64,
    /// `f64::INFINITY` when no step return is negative.
    pub sortino_ratio: f64,
    /// `f64::INFINITY` when there is no drawdown.
    pub calmar_ratio: f64,

    // Trading (close trades only)
    pub total_trades: usize,
    pub completed_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_profit: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_win: f64,
    pub max_loss: f64,
    pub profit_factor: f64,

    // Drawdown
    /// Positive fraction, e.g. 0.18 for an 18% peak-to-trough decline.
    pub max_drawdown: f64,
    /// Steps spanned by the longest uninterrupted drawdown.
    pub max_drawdown_duration: usize,

    pub benchmark: Option<BenchmarkComparison>,
}

impl PerformanceMetrics {
    /// Compute all metrics for one episode.
    ///
    /// `values` are post-step portfolio values. `timestamps`, when given, must
    /// line up with `values` and drive annualization.
    pub fn compute(
        values: &[f64],
        trades: &[Trade],
        initial_balance: f64,
        timestamps: Option<&[NaiveDateTime]>,
        config: &MetricsConfig,
    ) -> Self {
        let final_value = values.last().copied().unwrap_or(initial_balance);
        let total = fractional_change(initial_balance, final_value);
        let years = timestamps.and_then(elapsed_years);
        let annualized = years.map(|y| annualized_return(total, y));

        let returns = step_returns(values);
        let ppy = timestamps
            .and_then(periods_per_year)
            .unwrap_or(config.fallback_periods_per_year);
        let volatility = pop_std(&returns);

        let closes: Vec<&Trade> = trades.iter().filter(|t| t.is_close()).collect();
        let profits: Vec<f64> = closes.iter().map(|t| t.pnl()).collect();
        let wins: Vec<f64> = profits.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = profits.iter().copied().filter(|p| *p <= 0.0).collect();

        let max_dd = max_drawdown(values);

        Self {
            initial_balance,
            final_value,
            total_return: total,
            total_profit: final_value - initial_balance,
            annualized_return: annualized,
            duration_days: years.map(|y| y * 365.25),

            volatility,
            annualized_volatility: volatility * ppy.sqrt(),
            periods_per_year: ppy,
            sharpe_ratio: sharpe_ratio(&returns, config.risk_free_rate, ppy),
            sortino_ratio: sortino_ratio(&returns, config.risk_free_rate, ppy),
            calmar_ratio: calmar_ratio(annualized.unwrap_or(total), max_dd),

            total_trades: trades.len(),
            completed_trades: closes.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: ratio_or_zero(wins.len() as f64, closes.len() as f64),
            avg_profit: mean(&profits),
            avg_win: mean(&wins),
            avg_loss: mean(&losses),
            max_win: wins.iter().copied().fold(0.0, f64::max),
            max_loss: losses.iter().copied().fold(0.0, f64::min),
            profit_factor: profit_factor(&profits),

            max_drawdown: max_dd,
            max_drawdown_duration: max_drawdown_duration(values),

            benchmark: None,
        }
    }

    /// Attach a buy-and-hold comparison built from the episode's closes.
    pub fn with_benchmark(mut self, prices: &[f64]) -> Self {
        self.benchmark = compare_to_buy_and_hold(self.final_value, prices, self.initial_balance);
        self
    }
}

// ─── Returns ────────────────────────────────────────────────────────

fn fractional_change(from: f64, to: f64) -> f64 {
    if from <= 0.0 {
        return 0.0;
    }
    (to - from) / from
}

/// Years between the first and last timestamp; `None` without positive elapsed time.
pub fn elapsed_years(timestamps: &[NaiveDateTime]) -> Option<f64> {
    let (first, last) = (timestamps.first()?, timestamps.last()?);
    let seconds = (*last - *first).num_seconds() as f64;
    (seconds > 0.0).then_some(seconds / SECONDS_PER_YEAR)
}

/// Compound a total return over `years` into a per-year rate.
pub fn annualized_return(total_return: f64, years: f64) -> f64 {
    if years <= 0.0 || total_return <= -1.0 {
        return total_return;
    }
    (1.0 + total_return).powf(1.0 / years) - 1.0
}

/// Consecutive percentage changes; 0 where the previous value is not positive.
pub fn step_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| fractional_change(w[0], w[1]))
        .collect()
}

// ─── Risk ───────────────────────────────────────────────────────────

/// Periods per year implied by the average timestamp spacing.
pub fn periods_per_year(timestamps: &[NaiveDateTime]) -> Option<f64> {
    if timestamps.len() < 2 {
        return None;
    }
    let avg_seconds = elapsed_years(timestamps)? * SECONDS_PER_YEAR
        / (timestamps.len() - 1) as f64;
    (avg_seconds > 0.0).then(|| SECONDS_PER_YEAR / avg_seconds)
}

/// Annualized Sharpe: `(mean − rf/ppy) / std × √ppy`, 0 for flat returns.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let std = pop_std(returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean(returns) - risk_free_rate / periods_per_year) / std * periods_per_year.sqrt()
}

/// Annualized Sortino over the std of negative returns.
///
/// `f64::INFINITY` when no return is negative; 0 when the downside std is 0.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return f64::INFINITY;
    }
    let downside_std = pop_std(&downside);
    if downside_std < 1e-15 {
        return 0.0;
    }
    (mean(returns) - risk_free_rate / periods_per_year) / downside_std * periods_per_year.sqrt()
}

/// Return over max drawdown; `f64::INFINITY` without a drawdown.
pub fn calmar_ratio(annual_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown <= 0.0 {
        return f64::INFINITY;
    }
    annual_return / max_drawdown
}

// ─── Trading ────────────────────────────────────────────────────────

/// Gross wins over gross losses of realized P&L.
///
/// 0 without trades or without wins; `f64::INFINITY` when there are wins and
/// no losing magnitude.
pub fn profit_factor(profits: &[f64]) -> f64 {
    let gross_win: f64 = profits.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = profits.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
    if gross_win <= 0.0 {
        return 0.0;
    }
    if gross_loss <= 0.0 {
        return f64::INFINITY;
    }
    gross_win / gross_loss
}

// ─── Drawdown ───────────────────────────────────────────────────────

/// Relative distance below the running maximum at every point.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            if peak > 0.0 {
                (peak - v) / peak
            } else {
                0.0
            }
        })
        .collect()
}

pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdown_series(values).into_iter().fold(0.0, f64::max)
}

/// Longest run of consecutive in-drawdown points, counted as steps spanned.
pub fn max_drawdown_duration(values: &[f64]) -> usize {
    let mut longest = 0usize;
    let mut run = 0usize;
    for dd in drawdown_series(values) {
        if dd > 0.0 {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest.saturating_sub(1)
}

// ─── Benchmark ──────────────────────────────────────────────────────

/// Buy-and-hold over `prices` from the same initial balance. `None` with fewer than two prices.
pub fn compare_to_buy_and_hold(
    strategy_final_value: f64,
    prices: &[f64],
    initial_balance: f64,
) -> Option<BenchmarkComparison> {
    if prices.len() < 2 {
        return None;
    }
    let bah_return = fractional_change(prices[0], prices[prices.len() - 1]);
    let strategy_return = fractional_change(initial_balance, strategy_final_value);
    Some(BenchmarkComparison {
        buy_and_hold_return: bah_return,
        buy_and_hold_final_value: initial_balance * (1.0 + bah_return),
        strategy_return,
        strategy_final_value,
        alpha: strategy_return - bah_return,
        outperformed: strategy_return > bah_return,
    })
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn pop_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn ratio_or_zero(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}
