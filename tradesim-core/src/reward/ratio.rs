//! Sharpe and Sortino rewards over a trailing window of the value history.

use super::profit::{profit_term, DEFAULT_HOLD_PENALTY, DEFAULT_OPEN_BONUS};
use super::{mean, pop_std, window_returns, RewardCalculator, RewardContext, StepAction};

pub const DEFAULT_WINDOW: usize = 50;
/// Ratios are multiplied by this before being returned as a reward.
const RATIO_SCALE: f64 = 10.0;
/// Ratio reported by Sortino when the window has gains but no losses.
pub const DEFAULT_NO_DOWNSIDE_RATIO: f64 = 10.0;

/// Parameters shared by both ratio rewards.
#[derive(Debug, Clone)]
pub struct RatioParams {
    /// Risk-free return per step.
    pub risk_free_rate: f64,
    pub window: usize,
    pub hold_penalty: f64,
    pub open_bonus: f64,
}

impl Default for RatioParams {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            window: DEFAULT_WINDOW,
            hold_penalty: DEFAULT_HOLD_PENALTY,
            open_bonus: DEFAULT_OPEN_BONUS,
        }
    }
}

impl RatioParams {
    /// Window returns once history covers the window, otherwise `None`.
    fn returns(&self, ctx: &RewardContext<'_>) -> Option<Vec<f64>> {
        if ctx.portfolio_value_history.len() < self.window.max(2) {
            return None;
        }
        Some(window_returns(ctx.portfolio_value_history, self.window))
    }

    fn finish(&self, ratio: f64, action: StepAction) -> f64 {
        let reward = ratio * RATIO_SCALE;
        if action == StepAction::Hold {
            reward - self.hold_penalty
        } else {
            reward
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharpeReward {
    pub params: RatioParams,
}

impl SharpeReward {
    pub fn new(params: RatioParams) -> Self {
        Self { params }
    }
}

impl RewardCalculator for SharpeReward {
    fn name(&self) -> &str {
        "sharpe"
    }

    fn calculate(&self, ctx: &RewardContext<'_>) -> f64 {
        let p = &self.params;
        let Some(returns) = p.returns(ctx) else {
            return profit_term(ctx, p.hold_penalty, p.open_bonus);
        };
        if returns.len() < 2 {
            return -p.hold_penalty;
        }
        let std = pop_std(&returns);
        let sharpe = if std == 0.0 {
            0.0
        } else {
            (mean(&returns) - p.risk_free_rate) / std
        };
        p.finish(sharpe, ctx.action)
    }
}

#[derive(Debug, Clone)]
pub struct SortinoReward {
    pub params: RatioParams,
    pub no_downside_ratio: f64,
}

impl Default for SortinoReward {
    fn default() -> Self {
        Self {
            params: RatioParams::default(),
            no_downside_ratio: DEFAULT_NO_DOWNSIDE_RATIO,
        }
    }
}

impl SortinoReward {
    pub fn new(params: RatioParams, no_downside_ratio: f64) -> Self {
        Self {
            params,
            no_downside_ratio,
        }
    }
}

impl RewardCalculator for SortinoReward {
    fn name(&self) -> &str {
        "sortino"
    }

    fn calculate(&self, ctx: &RewardContext<'_>) -> f64 {
        let p = &self.params;
        let Some(returns) = p.returns(ctx) else {
            return profit_term(ctx, p.hold_penalty, p.open_bonus);
        };
        if returns.len() < 2 {
            return -p.hold_penalty;
        }
        let mean_return = mean(&returns);
        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();

        let sortino = if downside.is_empty() {
            if mean_return > 0.0 {
                self.no_downside_ratio
            } else {
                0.0
            }
        } else {
            let downside_std = pop_std(&downside);
            if downside_std == 0.0 {
                0.0
            } else {
                (mean_return - p.risk_free_rate) / downside_std
            }
        };
        p.finish(sortino, ctx.action)
    }
}
