//! Reward factory: name + numeric params → boxed calculator.
//!
//! An unknown name is not an error: it logs a warning and yields the
//! profit reward with default parameters.

use super::incremental::{IncrementalReward, DEFAULT_INCREMENTAL_HOLD_PENALTY};
use super::multi_objective::MultiObjectiveReward;
use super::profit::{ProfitReward, DEFAULT_HOLD_PENALTY, DEFAULT_OPEN_BONUS};
use super::ratio::{
    RatioParams, SharpeReward, SortinoReward, DEFAULT_NO_DOWNSIDE_RATIO, DEFAULT_WINDOW,
};
use super::RewardCalculator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Serializable reward selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub kind: String,
    pub params: BTreeMap<String, f64>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self::named("profit")
    }
}

impl RewardConfig {
    pub fn named(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}

/// Names accepted by [`create_reward`].
pub fn available_rewards() -> &'static [&'static str] {
    &["profit", "sharpe", "sortino", "multi", "incremental"]
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn param(config: &RewardConfig, name: &str, default: f64) -> f64 {
    config.params.get(name).copied().unwrap_or(default)
}

fn param_usize(config: &RewardConfig, name: &str, default: usize) -> usize {
    config
        .params
        .get(name)
        .copied()
        .filter(|v| *v >= 0.0)
        .map(|v| v as usize)
        .unwrap_or(default)
}

fn ratio_params(config: &RewardConfig) -> RatioParams {
    RatioParams {
        risk_free_rate: param(config, "risk_free_rate", 0.0),
        window: param_usize(config, "window", DEFAULT_WINDOW),
        hold_penalty: param(config, "hold_penalty", DEFAULT_HOLD_PENALTY),
        open_bonus: param(config, "open_bonus", DEFAULT_OPEN_BONUS),
    }
}

// ─── Factory ─────────────────────────────────────────────────────────

pub fn create_reward(config: &RewardConfig) -> Box<dyn RewardCalculator> {
    match config.kind.as_str() {
        "profit" => Box::new(ProfitReward::new(
            param(config, "hold_penalty", DEFAULT_HOLD_PENALTY),
            param(config, "open_bonus", DEFAULT_OPEN_BONUS),
        )),
        "sharpe" => Box::new(SharpeReward::new(ratio_params(config))),
        "sortino" => Box::new(SortinoReward::new(
            ratio_params(config),
            param(config, "no_downside_ratio", DEFAULT_NO_DOWNSIDE_RATIO),
        )),
        "multi" | "multi_objective" => Box::new(MultiObjectiveReward::new(
            param(config, "profit_weight", 0.5),
            param(config, "risk_weight", 0.3),
            param(config, "drawdown_weight", 0.2),
            param_usize(config, "window", DEFAULT_WINDOW),
            param(config, "hold_penalty", DEFAULT_HOLD_PENALTY),
        )),
        "incremental" => Box::new(IncrementalReward {
            hold_penalty: param(config, "hold_penalty", DEFAULT_INCREMENTAL_HOLD_PENALTY),
        }),
        other => {
            warn!(reward = other, "unknown reward type, using 'profit'");
            Box::new(ProfitReward::default())
        }
    }
}
