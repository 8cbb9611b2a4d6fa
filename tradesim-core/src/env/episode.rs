//! TradingEnv — the position/episode state machine.
//!
//! Each `step` runs in a fixed order:
//! 1. record the pre-action value
//! 2. day/peak bookkeeping and exit triggers (a forced close wins over the action)
//! 3. permission check for any open
//! 4. execution (close, flip or open) with commission
//! 5. reward
//! 6. advance one bar and evaluate terminal conditions

use super::action::{Action, Intent, Target};
use super::config::EnvConfig;
use super::error::EnvError;
use super::observation::{portfolio_features, NormalizedFeatures, Observation};
use super::stats::TradeStatistics;
use crate::domain::{CloseReason, MarketBar, PortfolioState, PositionSide, Trade};
use crate::reward::{create_reward, RewardCalculator, RewardConfig, RewardContext, StepAction};
use crate::risk::{
    estimate_volatility, DenyReason, RiskConfig, RiskManager, RiskStatus, TradePermission,
};
use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Typed per-step info payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Index of the bar the portfolio is valued at.
    pub step: usize,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub cash_balance: f64,
    pub holdings: f64,
    pub side: PositionSide,
    pub position_fraction: f64,
    pub portfolio_value: f64,
    pub total_return: f64,
    pub total_reward: f64,
    pub trade_count: usize,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    /// What was executed in the step that produced this info.
    pub executed: StepAction,
    pub forced_close: Option<CloseReason>,
    pub rejected_open: Option<DenyReason>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    /// End of the bar sequence.
    pub terminated: bool,
    /// Simulated ruin.
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Single-asset trading episode over a fixed bar sequence.
///
/// Clones share the bar data and normalized features.
#[derive(Clone)]
pub struct TradingEnv {
    bars: Arc<[MarketBar]>,
    features: Arc<NormalizedFeatures>,
    config: EnvConfig,
    risk: RiskManager,
    reward: Arc<dyn RewardCalculator>,

    portfolio: PortfolioState,
    current_step: usize,
    value_history: Vec<f64>,
    trades: Vec<Trade>,
    total_reward: f64,
    done: bool,
    rng: StdRng,
}

impl std::fmt::Debug for TradingEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEnv")
            .field("bars", &self.bars.len())
            .field("features", &self.features.names())
            .field("reward", &self.reward.name())
            .field("current_step", &self.current_step)
            .field("portfolio", &self.portfolio)
            .finish()
    }
}

impl TradingEnv {
    /// Validate data and configuration and build an episode positioned at reset.
    pub fn new(
        bars: impl Into<Arc<[MarketBar]>>,
        config: EnvConfig,
        risk: RiskConfig,
        reward: Arc<dyn RewardCalculator>,
    ) -> Result<Self, EnvError> {
        let bars: Arc<[MarketBar]> = bars.into();
        config.validate()?;
        risk.validate()?;
        validate_bars(&bars, config.window_size)?;

        let features = NormalizedFeatures::build(&bars, &config.features);
        if features.is_empty() {
            return Err(EnvError::NoFeatures);
        }

        info!(
            bars = bars.len(),
            features = features.names().len(),
            decoder = config.decoder.name(),
            reward = reward.name(),
            "trading environment ready"
        );

        let initial_balance = config.initial_balance;
        let window_size = config.window_size;
        Ok(Self {
            bars,
            features: Arc::new(features),
            risk: RiskManager::new(risk, initial_balance),
            reward,
            portfolio: PortfolioState::new(initial_balance),
            current_step: window_size,
            value_history: Vec::new(),
            trades: Vec::new(),
            total_reward: 0.0,
            done: false,
            rng: StdRng::seed_from_u64(0),
            config,
        })
    }

    /// Build with a reward selected by name.
    pub fn with_reward_config(
        bars: impl Into<Arc<[MarketBar]>>,
        config: EnvConfig,
        risk: RiskConfig,
        reward: &RewardConfig,
    ) -> Result<Self, EnvError> {
        Self::new(bars, config, risk, Arc::from(create_reward(reward)))
    }

    /// Fresh episode over other bars with the same configuration and reward.
    pub fn with_bars(&self, bars: impl Into<Arc<[MarketBar]>>) -> Result<Self, EnvError> {
        Self::new(
            bars,
            self.config.clone(),
            self.risk.config().clone(),
            Arc::clone(&self.reward),
        )
    }

    // ─── Episode control ─────────────────────────────────────────────

    /// Restore the initial state. A seed reseeds [`TradingEnv::sample_action`].
    pub fn reset(&mut self, seed: Option<u64>) -> (Observation, StepInfo) {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        let initial_balance = self.config.initial_balance;
        self.portfolio = PortfolioState::new(initial_balance);
        self.risk.reset(initial_balance);
        self.current_step = self.config.window_size;
        self.value_history.clear();
        self.trades.clear();
        self.total_reward = 0.0;
        self.done = false;

        let info = self.info(StepAction::Hold, None, None);
        (self.observation(), info)
    }

    pub fn step(&mut self, action: &Action) -> Result<StepOutcome, EnvError> {
        if self.done {
            return Err(EnvError::EpisodeFinished);
        }
        let intent = self.config.decoder.decode(
            action,
            self.config.enable_short,
            self.config.max_position_size,
        )?;

        let bars = Arc::clone(&self.bars);
        let step = self.current_step;
        let bar = &bars[step];
        let price = bar.close;

        let value_before = self.portfolio.value(price);
        self.value_history.push(value_before);
        let side_before = self.portfolio.side;

        self.risk.update_day(bar.timestamp, value_before);
        self.risk.update_peak(value_before);

        let forced_close = if self.portfolio.is_flat() {
            None
        } else {
            self.risk.on_price_update(&mut self.portfolio, price)
        };

        let (executed, rejected_open) = match forced_close {
            Some(reason) => {
                debug!(step, price, %reason, "forced close");
                self.close_position(step, bar, reason);
                (StepAction::Close, None)
            }
            None => self.execute(step, bar, &intent),
        };

        let ctx = RewardContext {
            action: executed,
            side_before,
            cash_balance: self.portfolio.cash_balance,
            holdings: self.portfolio.holdings,
            entry_price: self.portfolio.entry_price,
            current_price: price,
            initial_balance: self.config.initial_balance,
            portfolio_value_history: &self.value_history,
        };
        let reward = self.reward.calculate(&ctx);
        self.total_reward += reward;

        self.current_step += 1;
        let value = self.portfolio_value();
        let terminated = self.current_step >= self.bars.len() - 1;
        let truncated = value <= self.config.initial_balance * self.config.ruin_fraction;
        self.done = terminated || truncated;

        if truncated {
            info!(step = self.current_step, value, "episode truncated by ruin");
        }

        Ok(StepOutcome {
            observation: self.observation(),
            reward,
            terminated,
            truncated,
            info: self.info(executed, forced_close, rejected_open),
        })
    }

    /// Apply the decoded intent. Returns the executed action and any refused open.
    fn execute(
        &mut self,
        step: usize,
        bar: &MarketBar,
        intent: &Intent,
    ) -> (StepAction, Option<DenyReason>) {
        let current = self.portfolio.side;
        let target = match intent.target {
            Target::Keep => return (StepAction::Hold, None),
            Target::Side(side) if side == current => return (StepAction::Hold, None),
            Target::Side(side) => side,
        };

        if target == PositionSide::Flat {
            self.close_position(step, bar, CloseReason::Signal);
            return (StepAction::Close, None);
        }

        let flipping = !current.is_flat();
        if flipping {
            self.close_position(step, bar, CloseReason::Flip);
        }
        let executed_close = if flipping {
            StepAction::Close
        } else {
            StepAction::Hold
        };

        let value_now = self.portfolio.value(bar.close);
        match self.risk.can_open_trade(value_now, step) {
            TradePermission::Allowed => {
                if self.open_position(step, bar, target, intent) {
                    if flipping {
                        (StepAction::Close, None)
                    } else {
                        (StepAction::Open, None)
                    }
                } else {
                    (executed_close, None)
                }
            }
            TradePermission::Denied(reason) => {
                debug!(step, %reason, side = ?target, "open rejected");
                (executed_close, Some(reason))
            }
        }
    }

    fn open_position(
        &mut self,
        step: usize,
        bar: &MarketBar,
        side: PositionSide,
        intent: &Intent,
    ) -> bool {
        let stop_pct = self.risk.effective_stop_pct(intent.stop_override);
        let volatility = self.volatility_estimate(step);
        let mut fraction = self.risk.position_size_for_stop(volatility, stop_pct);
        fraction = fraction.min(intent.size_cap.unwrap_or(self.config.max_position_size));
        if fraction <= 0.0 {
            return false;
        }

        let price = bar.close;
        let Some(quantity) = self
            .portfolio
            .open(side, price, fraction, self.config.commission)
        else {
            return false;
        };
        self.risk
            .on_trade_open(&mut self.portfolio, step, intent.stop_override);
        self.trades.push(Trade::open(
            step,
            bar.timestamp,
            side,
            price,
            quantity,
            fraction,
        ));
        debug!(step, ?side, price, quantity, fraction, "opened position");
        true
    }

    fn close_position(&mut self, step: usize, bar: &MarketBar, reason: CloseReason) {
        let price = bar.close;
        let Some(closed) = self.portfolio.close(price, self.config.commission) else {
            return;
        };
        self.risk.on_trade_close();
        self.trades.push(Trade::close(
            step,
            bar.timestamp,
            closed.side,
            price,
            closed.quantity,
            closed.realized_pnl,
            closed.pnl_pct,
            reason,
        ));
        debug!(
            step,
            side = ?closed.side,
            price,
            pnl = closed.realized_pnl,
            %reason,
            "closed position"
        );
    }

    /// Bar `volatility` feature if present, else std of recent close returns.
    fn volatility_estimate(&self, step: usize) -> Option<f64> {
        let scaling = &self.risk.config().volatility_scaling;
        if !scaling.enabled {
            return None;
        }
        if let Some(v) = self.bars[step].feature("volatility") {
            return Some(v);
        }
        let start = (step + 1).saturating_sub(scaling.lookback + 1);
        let closes: Vec<f64> = self.bars[start..=step].iter().map(|b| b.close).collect();
        estimate_volatility(&closes, scaling.lookback)
    }

    /// Random action of the configured decoder's shape.
    pub fn sample_action(&mut self) -> Action {
        self.config.decoder.sample(&mut self.rng)
    }

    // ─── Views ───────────────────────────────────────────────────────

    pub fn observation(&self) -> Observation {
        let price = self.current_price();
        Observation {
            market: self
                .features
                .window(self.current_step, self.config.window_size)
                .to_vec(),
            portfolio: portfolio_features(&self.portfolio, price, self.config.initial_balance),
            step: self.current_step,
            close: price,
        }
    }

    fn info(
        &self,
        executed: StepAction,
        forced_close: Option<CloseReason>,
        rejected_open: Option<DenyReason>,
    ) -> StepInfo {
        let bar = self.current_bar();
        let value = self.portfolio_value();
        StepInfo {
            step: self.current_step,
            timestamp: bar.timestamp,
            price: bar.close,
            cash_balance: self.portfolio.cash_balance,
            holdings: self.portfolio.holdings,
            side: self.portfolio.side,
            position_fraction: self.portfolio.position_fraction,
            portfolio_value: value,
            total_return: (value - self.config.initial_balance) / self.config.initial_balance,
            total_reward: self.total_reward,
            trade_count: self.trades.len(),
            stop_loss_price: self.portfolio.stop_loss_price,
            take_profit_price: self.portfolio.take_profit_price,
            executed,
            forced_close,
            rejected_open,
        }
    }

    pub fn get_trade_statistics(&self) -> TradeStatistics {
        TradeStatistics::compute(
            &self.trades,
            self.portfolio_value(),
            self.config.initial_balance,
        )
    }

    pub fn risk_status(&self) -> RiskStatus {
        self.risk.status(&self.portfolio, self.portfolio_value())
    }

    pub fn portfolio_value(&self) -> f64 {
        self.portfolio.value(self.current_price())
    }

    pub fn current_bar(&self) -> &MarketBar {
        &self.bars[self.current_step]
    }

    pub fn current_price(&self) -> f64 {
        self.current_bar().close
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Pre-action values, one per step taken.
    pub fn value_history(&self) -> &[f64] {
        &self.value_history
    }

    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    pub fn bars(&self) -> &Arc<[MarketBar]> {
        &self.bars
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn risk_config(&self) -> &RiskConfig {
        self.risk.config()
    }

    pub fn reward_name(&self) -> &str {
        self.reward.name()
    }

    pub fn feature_names(&self) -> &[String] {
        self.features.names()
    }

    /// Length of [`Observation::to_vec`].
    pub fn observation_len(&self) -> usize {
        self.features.names().len() * self.config.window_size
            + super::observation::PORTFOLIO_FEATURES
    }
}

fn validate_bars(bars: &[MarketBar], window_size: usize) -> Result<(), EnvError> {
    if bars.is_empty() {
        return Err(EnvError::EmptyData);
    }
    let required = window_size + 2;
    if bars.len() < required {
        return Err(EnvError::InsufficientBars {
            bars: bars.len(),
            required,
        });
    }
    for (index, bar) in bars.iter().enumerate() {
        bar.validate()
            .map_err(|source| EnvError::InvalidBar { index, source })?;
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(EnvError::NonIncreasingTimestamp { index });
        }
    }
    Ok(())
}
