use super::{RewardCalculator, RewardContext, StepAction};

pub const DEFAULT_INCREMENTAL_HOLD_PENALTY: f64 = 0.001;

/// Dense reward: value change every step, regardless of action.
#[derive(Debug, Clone)]
pub struct IncrementalReward {
    pub hold_penalty: f64,
}

impl Default for IncrementalReward {
    fn default() -> Self {
        Self {
            hold_penalty: DEFAULT_INCREMENTAL_HOLD_PENALTY,
        }
    }
}

impl RewardCalculator for IncrementalReward {
    fn name(&self) -> &str {
        "incremental"
    }

    fn calculate(&self, ctx: &RewardContext<'_>) -> f64 {
        let Some(change) = ctx.last_change_pct() else {
            return 0.0;
        };
        if ctx.action == StepAction::Hold {
            change - self.hold_penalty
        } else {
            change
        }
    }
}
