//! Risk configuration: sizing bounds, exit triggers, portfolio limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskConfigError {
    #[error("unknown timeframe '{0}' (available: 1min, 5min, 15min, 1h, 4h, 1d)")]
    UnknownTimeframe(String),

    #[error("invalid risk parameter '{name}': {reason}")]
    InvalidParam { name: &'static str, reason: String },
}

/// Bar interval a preset is calibrated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1min")]
    Min1,
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "15min")]
    Min15,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::Min1,
        Timeframe::Min5,
        Timeframe::Min15,
        Timeframe::Hour1,
        Timeframe::Hour4,
        Timeframe::Day1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Min1 => "1min",
            Timeframe::Min5 => "5min",
            Timeframe::Min15 => "15min",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = RiskConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| RiskConfigError::UnknownTimeframe(s.to_string()))
    }
}

/// Volatility-dependent position scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityScaling {
    pub enabled: bool,
    /// Bars of close-to-close returns used when no `volatility` feature is present.
    pub lookback: usize,
    /// Volatility regarded as normal. Below 70% of it counts as low, above 130% as high.
    pub reference_volatility: f64,
    pub low_vol_multiplier: f64,
    pub high_vol_multiplier: f64,
}

impl Default for VolatilityScaling {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback: 288,
            reference_volatility: 0.047,
            low_vol_multiplier: 1.5,
            high_vol_multiplier: 0.5,
        }
    }
}

/// Immutable parameter bundle shared by the risk manager for one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_position_pct: f64,
    pub min_position_pct: f64,

    pub use_stop_loss: bool,
    pub stop_loss_pct: f64,
    pub use_take_profit: bool,
    pub take_profit_pct: f64,

    pub use_trailing_stop: bool,
    pub trailing_stop_pct: f64,
    pub trailing_activation_pct: f64,

    pub max_drawdown_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_trades_per_day: u32,
    pub min_trade_interval_bars: u32,

    pub volatility_scaling: VolatilityScaling,
    pub max_risk_per_trade_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_pct: 0.25,
            min_position_pct: 0.10,
            use_stop_loss: true,
            stop_loss_pct: 0.10,
            use_take_profit: true,
            take_profit_pct: 0.20,
            use_trailing_stop: true,
            trailing_stop_pct: 0.05,
            trailing_activation_pct: 0.08,
            max_drawdown_pct: 0.20,
            max_daily_loss_pct: 0.08,
            max_trades_per_day: 15,
            min_trade_interval_bars: 6,
            volatility_scaling: VolatilityScaling::default(),
            max_risk_per_trade_pct: 0.02,
        }
    }
}

impl RiskConfig {
    /// No exit triggers, no portfolio limits, every open commits the full balance.
    pub fn unrestricted() -> Self {
        Self {
            max_position_pct: 1.0,
            min_position_pct: 1.0,
            use_stop_loss: false,
            stop_loss_pct: 0.0,
            use_take_profit: false,
            take_profit_pct: 0.0,
            use_trailing_stop: false,
            trailing_stop_pct: 0.0,
            trailing_activation_pct: 0.0,
            max_drawdown_pct: f64::MAX,
            max_daily_loss_pct: f64::MAX,
            max_trades_per_day: u32::MAX,
            min_trade_interval_bars: 0,
            volatility_scaling: VolatilityScaling {
                enabled: false,
                ..VolatilityScaling::default()
            },
            max_risk_per_trade_pct: 1.0,
        }
    }

    /// Preset calibrated for a bar interval.
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        // (max_pos, min_pos, stop, tp, trail, activation, max_dd, daily, trades, interval, lookback)
        let (max_pos, min_pos, stop, tp, trail, act, max_dd, daily, trades, interval, lookback) =
            match timeframe {
                Timeframe::Min1 => (0.15, 0.05, 0.03, 0.05, 0.02, 0.03, 0.15, 0.05, 30, 5, 60),
                Timeframe::Min5 => (0.25, 0.10, 0.08, 0.15, 0.04, 0.06, 0.20, 0.08, 15, 6, 288),
                Timeframe::Min15 => (0.30, 0.10, 0.10, 0.20, 0.05, 0.08, 0.20, 0.08, 10, 4, 96),
                Timeframe::Hour1 => (0.35, 0.15, 0.12, 0.25, 0.06, 0.10, 0.25, 0.10, 5, 4, 24),
                Timeframe::Hour4 => (0.40, 0.20, 0.15, 0.30, 0.08, 0.12, 0.25, 0.12, 3, 3, 42),
                Timeframe::Day1 => (0.50, 0.25, 0.20, 0.40, 0.10, 0.15, 0.30, 0.15, 1, 3, 30),
            };
        Self {
            max_position_pct: max_pos,
            min_position_pct: min_pos,
            stop_loss_pct: stop,
            take_profit_pct: tp,
            trailing_stop_pct: trail,
            trailing_activation_pct: act,
            max_drawdown_pct: max_dd,
            max_daily_loss_pct: daily,
            max_trades_per_day: trades,
            min_trade_interval_bars: interval,
            volatility_scaling: VolatilityScaling {
                lookback,
                ..VolatilityScaling::default()
            },
            ..Self::default()
        }
    }

    /// Preset lookup by timeframe name ("1min", "5min", "15min", "1h", "4h", "1d").
    pub fn for_timeframe_str(timeframe: &str) -> Result<Self, RiskConfigError> {
        Ok(Self::for_timeframe(timeframe.parse()?))
    }

    pub fn validate(&self) -> Result<(), RiskConfigError> {
        fn invalid(name: &'static str, reason: impl Into<String>) -> RiskConfigError {
            RiskConfigError::InvalidParam {
                name,
                reason: reason.into(),
            }
        }

        if !(self.max_position_pct > 0.0 && self.max_position_pct <= 1.0) {
            return Err(invalid("max_position_pct", "must be in (0, 1]"));
        }
        if !(self.min_position_pct >= 0.0 && self.min_position_pct <= self.max_position_pct) {
            return Err(invalid(
                "min_position_pct",
                "must be in [0, max_position_pct]",
            ));
        }
        for (name, value) in [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("trailing_activation_pct", self.trailing_activation_pct),
            ("max_risk_per_trade_pct", self.max_risk_per_trade_pct),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(invalid(name, format!("must be finite and >= 0, got {value}")));
            }
        }
        if !(0.0..1.0).contains(&self.trailing_stop_pct) {
            return Err(invalid("trailing_stop_pct", "must be in [0, 1)"));
        }
        if self.use_stop_loss && self.stop_loss_pct <= 0.0 {
            return Err(invalid("stop_loss_pct", "must be > 0 when stop-loss is enabled"));
        }
        if self.use_take_profit && self.take_profit_pct <= 0.0 {
            return Err(invalid(
                "take_profit_pct",
                "must be > 0 when take-profit is enabled",
            ));
        }
        if self.max_drawdown_pct <= 0.0 || self.max_daily_loss_pct <= 0.0 {
            return Err(invalid(
                "max_drawdown_pct",
                "portfolio loss limits must be > 0",
            ));
        }
        let vs = &self.volatility_scaling;
        if vs.enabled {
            if vs.lookback < 2 {
                return Err(invalid("volatility_scaling.lookback", "must be >= 2"));
            }
            if vs.reference_volatility <= 0.0
                || vs.low_vol_multiplier <= 0.0
                || vs.high_vol_multiplier <= 0.0
            {
                return Err(invalid(
                    "volatility_scaling",
                    "reference volatility and multipliers must be > 0",
                ));
            }
        }
        Ok(())
    }
}
