use super::{RewardCalculator, RewardContext, StepAction};

pub const DEFAULT_HOLD_PENALTY: f64 = 0.01;
pub const DEFAULT_OPEN_BONUS: f64 = 0.1;

/// Realized value change on closes, a nudge on opens, a penalty otherwise.
#[derive(Debug, Clone)]
pub struct ProfitReward {
    pub hold_penalty: f64,
    pub open_bonus: f64,
}

impl Default for ProfitReward {
    fn default() -> Self {
        Self {
            hold_penalty: DEFAULT_HOLD_PENALTY,
            open_bonus: DEFAULT_OPEN_BONUS,
        }
    }
}

impl ProfitReward {
    pub fn new(hold_penalty: f64, open_bonus: f64) -> Self {
        Self {
            hold_penalty,
            open_bonus,
        }
    }
}

/// Profit formula shared with the ratio rewards' short-history fallback.
pub(crate) fn profit_term(ctx: &RewardContext<'_>, hold_penalty: f64, open_bonus: f64) -> f64 {
    match ctx.action {
        StepAction::Close => ctx.last_change_pct().unwrap_or(-hold_penalty),
        StepAction::Open => open_bonus,
        StepAction::Hold => -hold_penalty,
    }
}

impl RewardCalculator for ProfitReward {
    fn name(&self) -> &str {
        "profit"
    }

    fn calculate(&self, ctx: &RewardContext<'_>) -> f64 {
        profit_term(ctx, self.hold_penalty, self.open_bonus)
    }
}
