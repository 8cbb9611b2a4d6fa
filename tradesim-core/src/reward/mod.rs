//! Reward calculators — turn one step's outcome into a scalar.
//!
//! Every calculator reads the same [`RewardContext`]. The value history holds
//! the portfolio value recorded *before* each action, so `history[t] -
//! history[t-1]` is the change produced by the previous step's action and the
//! bar that followed it.

pub mod factory;
pub mod incremental;
pub mod multi_objective;
pub mod profit;
pub mod ratio;

pub use factory::{available_rewards, create_reward, RewardConfig};
pub use incremental::IncrementalReward;
pub use multi_objective::MultiObjectiveReward;
pub use profit::ProfitReward;
pub use ratio::{SharpeReward, SortinoReward};

use crate::domain::PositionSide;
use serde::{Deserialize, Serialize};

/// What the state machine actually did this step (after risk overrides).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    Hold,
    Open,
    /// Includes forced exits and the close half of a flip.
    Close,
}

/// Inputs to a reward calculation.
#[derive(Debug, Clone, Copy)]
pub struct RewardContext<'a> {
    pub action: StepAction,
    pub side_before: PositionSide,
    pub cash_balance: f64,
    pub holdings: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub initial_balance: f64,
    pub portfolio_value_history: &'a [f64],
}

impl RewardContext<'_> {
    /// `100 × (v[t] − v[t−1]) / initial`, or `None` with fewer than two values.
    pub fn last_change_pct(&self) -> Option<f64> {
        let h = self.portfolio_value_history;
        if h.len() < 2 || self.initial_balance <= 0.0 {
            return None;
        }
        Some((h[h.len() - 1] - h[h.len() - 2]) / self.initial_balance * 100.0)
    }
}

/// A pluggable reward strategy.
pub trait RewardCalculator: Send + Sync {
    fn name(&self) -> &str;

    fn calculate(&self, ctx: &RewardContext<'_>) -> f64;
}

// ─── Shared window helpers ──────────────────────────────────────────

/// Step returns over the trailing `window` values.
pub(crate) fn window_returns(history: &[f64], window: usize) -> Vec<f64> {
    let start = history.len().saturating_sub(window);
    history[start..]
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub(crate) fn pop_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
