//! Serializable simulation configuration loaded from TOML.
//!
//! ```toml
//! timeframe = "1h"          # risk preset, used when [risk] is absent
//!
//! [env]
//! initial_balance = 10000.0
//! decoder = "continuous"
//!
//! [reward]
//! kind = "sharpe"
//! params = { window = 30.0 }
//!
//! [backtest]
//! n_runs = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use tradesim_core::domain::MarketBar;
use tradesim_core::env::{EnvConfig, EnvError, TradingEnv};
use tradesim_core::reward::RewardConfig;
use tradesim_core::risk::{RiskConfig, RiskConfigError, Timeframe};

use crate::backtester::{Backtester, DEFAULT_MASTER_SEED};
use crate::metrics::MetricsConfig;
use crate::walk_forward::WalkForwardConfig;

/// Content hash identifying a configuration.
pub type ConfigHash = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Risk(#[from] RiskConfigError),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Multi-run and walk-forward settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub n_runs: usize,
    pub master_seed: u64,
    pub parallel: bool,
    pub walk_forward: WalkForwardConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            n_runs: 10,
            master_seed: DEFAULT_MASTER_SEED,
            parallel: true,
            walk_forward: WalkForwardConfig::default(),
        }
    }
}

/// Everything needed to reproduce a simulation over a given bar set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Timeframe the risk settings were derived from, if a preset was used.
    pub timeframe: Option<Timeframe>,
    pub env: EnvConfig,
    pub risk: RiskConfig,
    pub reward: RewardConfig,
    pub metrics: MetricsConfig,
    pub backtest: BacktestConfig,
}

/// On-disk shape: `[risk]` is optional so a `timeframe` preset can fill it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSimulationConfig {
    timeframe: Option<Timeframe>,
    env: EnvConfig,
    risk: Option<RiskConfig>,
    reward: RewardConfig,
    metrics: MetricsConfig,
    backtest: BacktestConfig,
}

impl SimulationConfig {
    /// Defaults with the risk preset for `timeframe`.
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        Self {
            timeframe: Some(timeframe),
            risk: RiskConfig::for_timeframe(timeframe),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawSimulationConfig = toml::from_str(text)?;
        let risk = match (raw.risk, raw.timeframe) {
            (Some(risk), _) => risk,
            (None, Some(tf)) => RiskConfig::for_timeframe(tf),
            (None, None) => RiskConfig::default(),
        };
        let config = Self {
            timeframe: raw.timeframe,
            env: raw.env,
            risk,
            reward: raw.reward,
            metrics: raw.metrics,
            backtest: raw.backtest,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.env.validate()?;
        self.risk.validate()?;
        self.backtest
            .walk_forward
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !self.metrics.fallback_periods_per_year.is_finite()
            || self.metrics.fallback_periods_per_year <= 0.0
        {
            return Err(ConfigError::Invalid(
                "metrics.fallback_periods_per_year must be positive".into(),
            ));
        }
        Ok(())
    }

    /// BLAKE3 of the canonical JSON encoding. Equal configs hash equal.
    pub fn config_hash(&self) -> Result<ConfigHash, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Environment over `bars` with this configuration's reward.
    pub fn build_env(&self, bars: impl Into<Arc<[MarketBar]>>) -> Result<TradingEnv, ConfigError> {
        Ok(TradingEnv::with_reward_config(
            bars,
            self.env.clone(),
            self.risk.clone(),
            &self.reward,
        )?)
    }

    pub fn build_backtester(
        &self,
        bars: impl Into<Arc<[MarketBar]>>,
    ) -> Result<Backtester, ConfigError> {
        let env = self.build_env(bars)?;
        Ok(Backtester::new(env, self.metrics.clone()).with_master_seed(self.backtest.master_seed))
    }
}
