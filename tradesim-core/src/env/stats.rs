use crate::domain::{PositionSide, Trade};
use serde::{Deserialize, Serialize};

/// Per-episode summary of the trade log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStatistics {
    /// Open and close records.
    pub total_trades: usize,
    /// Close records.
    pub completed_trades: usize,
    pub long_trades: usize,
    pub short_trades: usize,
    pub winning_trades: usize,
    /// Closes with P&L <= 0.
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub avg_profit: f64,
    /// Mean gross price move of closes, in percent.
    pub avg_profit_pct: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub final_portfolio_value: f64,
    pub total_return: f64,
}

impl TradeStatistics {
    pub fn compute(trades: &[Trade], final_value: f64, initial_balance: f64) -> Self {
        let closes: Vec<&Trade> = trades.iter().filter(|t| t.is_close()).collect();
        let total_return = if initial_balance > 0.0 {
            (final_value - initial_balance) / initial_balance
        } else {
            0.0
        };
        let mut stats = Self {
            total_trades: trades.len(),
            completed_trades: closes.len(),
            final_portfolio_value: final_value,
            total_return,
            ..Self::default()
        };
        if closes.is_empty() {
            return stats;
        }

        let profits: Vec<f64> = closes.iter().map(|t| t.pnl()).collect();
        let n = closes.len() as f64;

        stats.long_trades = closes
            .iter()
            .filter(|t| t.side == PositionSide::Long)
            .count();
        stats.short_trades = closes
            .iter()
            .filter(|t| t.side == PositionSide::Short)
            .count();
        stats.winning_trades = profits.iter().filter(|p| **p > 0.0).count();
        stats.losing_trades = closes.len() - stats.winning_trades;
        stats.win_rate = stats.winning_trades as f64 / n;
        stats.total_profit = profits.iter().sum();
        stats.avg_profit = stats.total_profit / n;
        stats.avg_profit_pct =
            closes.iter().map(|t| t.pnl_pct.unwrap_or(0.0)).sum::<f64>() / n * 100.0;
        stats.max_profit = profits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        stats.max_loss = profits.iter().copied().fold(f64::INFINITY, f64::min);
        stats
    }
}
