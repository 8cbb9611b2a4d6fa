//! Weighted blend of profit, volatility and drawdown.

use super::profit::{DEFAULT_HOLD_PENALTY, DEFAULT_OPEN_BONUS};
use super::ratio::DEFAULT_WINDOW;
use super::{pop_std, window_returns, RewardCalculator, RewardContext, StepAction};
use tracing::warn;

const DEFAULT_WEIGHTS: (f64, f64, f64) = (0.5, 0.3, 0.2);
/// Volatility and drawdown are expressed in percent before weighting.
const PENALTY_SCALE: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct MultiObjectiveReward {
    profit_weight: f64,
    risk_weight: f64,
    drawdown_weight: f64,
    window: usize,
    hold_penalty: f64,
    open_bonus: f64,
}

impl Default for MultiObjectiveReward {
    fn default() -> Self {
        let (p, r, d) = DEFAULT_WEIGHTS;
        Self::new(p, r, d, DEFAULT_WINDOW, DEFAULT_HOLD_PENALTY)
    }
}

impl MultiObjectiveReward {
    /// Weights are renormalized to sum to one.
    pub fn new(
        profit_weight: f64,
        risk_weight: f64,
        drawdown_weight: f64,
        window: usize,
        hold_penalty: f64,
    ) -> Self {
        let mut weights = (profit_weight, risk_weight, drawdown_weight);
        let total = weights.0 + weights.1 + weights.2;
        if !(total > 0.0 && total.is_finite()) {
            warn!(
                profit_weight,
                risk_weight,
                drawdown_weight,
                "non-positive reward weights, using defaults"
            );
            weights = DEFAULT_WEIGHTS;
        }
        let total = weights.0 + weights.1 + weights.2;
        Self {
            profit_weight: weights.0 / total,
            risk_weight: weights.1 / total,
            drawdown_weight: weights.2 / total,
            window,
            hold_penalty,
            open_bonus: DEFAULT_OPEN_BONUS,
        }
    }

    pub fn weights(&self) -> (f64, f64, f64) {
        (self.profit_weight, self.risk_weight, self.drawdown_weight)
    }

    fn window_filled(&self, history: &[f64]) -> bool {
        history.len() >= self.window.max(2)
    }

    fn risk_penalty(&self, history: &[f64]) -> f64 {
        if !self.window_filled(history) {
            return 0.0;
        }
        pop_std(&window_returns(history, self.window)) * PENALTY_SCALE
    }

    fn drawdown_penalty(&self, history: &[f64]) -> f64 {
        if !self.window_filled(history) {
            return 0.0;
        }
        let start = history.len().saturating_sub(self.window);
        let mut peak = f64::MIN;
        let mut max_dd = 0.0_f64;
        for &v in &history[start..] {
            peak = peak.max(v);
            if peak > 0.0 {
                max_dd = max_dd.max((peak - v) / peak);
            }
        }
        max_dd * PENALTY_SCALE
    }
}

impl RewardCalculator for MultiObjectiveReward {
    fn name(&self) -> &str {
        "multi_objective"
    }

    fn calculate(&self, ctx: &RewardContext<'_>) -> f64 {
        let history = ctx.portfolio_value_history;
        let Some(profit) = ctx.last_change_pct() else {
            return match ctx.action {
                StepAction::Hold => -self.hold_penalty,
                _ => self.open_bonus,
            };
        };

        let reward = self.profit_weight * profit
            - self.risk_weight * self.risk_penalty(history)
            - self.drawdown_weight * self.drawdown_penalty(history);

        if ctx.action == StepAction::Hold {
            reward - self.hold_penalty
        } else {
            reward
        }
    }
}
