use super::action::ActionDecoder;
use super::error::EnvError;
use serde::{Deserialize, Serialize};

/// Observation columns used when none are configured.
pub const DEFAULT_FEATURES: [&str; 11] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "rsi_14",
    "macd",
    "bbands_upper",
    "bbands_lower",
    "returns",
    "volatility",
];

/// Episode parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub initial_balance: f64,
    /// Fraction of notional charged on entry and on exit.
    pub commission: f64,
    /// Bars of history in each observation; also the first tradable step.
    pub window_size: usize,
    /// Value at or below `initial_balance * ruin_fraction` truncates the episode.
    pub ruin_fraction: f64,
    pub enable_short: bool,
    /// Upper bound on the size a directional action may request.
    pub max_position_size: f64,
    /// Observation columns; missing ones are skipped.
    pub features: Vec<String>,
    pub decoder: ActionDecoder,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            commission: 0.001,
            window_size: 50,
            ruin_fraction: 0.2,
            enable_short: false,
            max_position_size: 1.0,
            features: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
            decoder: ActionDecoder::Discrete,
        }
    }
}

impl EnvConfig {
    /// Continuous single-value control with long and short positions.
    pub fn continuous() -> Self {
        Self {
            decoder: ActionDecoder::Continuous,
            ruin_fraction: 0.5,
            enable_short: true,
            ..Self::default()
        }
    }

    /// Direction/size/stop control with long and short positions.
    pub fn directional() -> Self {
        Self {
            decoder: ActionDecoder::DirectionSizeStop,
            ruin_fraction: 0.1,
            enable_short: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EnvError> {
        if !(self.initial_balance > 0.0 && self.initial_balance.is_finite()) {
            return Err(EnvError::InvalidConfig(
                "initial_balance must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.commission) {
            return Err(EnvError::InvalidConfig("commission must be in [0, 1)".into()));
        }
        if self.window_size == 0 {
            return Err(EnvError::InvalidConfig("window_size must be >= 1".into()));
        }
        if !(0.0..1.0).contains(&self.ruin_fraction) {
            return Err(EnvError::InvalidConfig(
                "ruin_fraction must be in [0, 1)".into(),
            ));
        }
        if !(self.max_position_size > 0.0 && self.max_position_size <= 1.0) {
            return Err(EnvError::InvalidConfig(
                "max_position_size must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}
