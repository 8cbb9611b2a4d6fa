//! RiskManager — per-episode sizing, trade permission and exit triggers.
//!
//! The manager owns only portfolio-level bookkeeping (peak, day, cadence).
//! Position-scoped levels (stop, take-profit, trailing high) live on the
//! [`PortfolioState`] the state machine passes in, so the two can never drift.

use super::config::RiskConfig;
use crate::domain::{CloseReason, PortfolioState, PositionSide};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this fraction of the reference volatility, conditions count as calm.
const LOW_VOL_RATIO: f64 = 0.7;
/// Above this fraction of the reference volatility, conditions count as turbulent.
const HIGH_VOL_RATIO: f64 = 1.3;

/// Portfolio-level risk state, reset at episode start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskManagerState {
    pub peak_balance: f64,
    pub daily_start_balance: f64,
    pub current_day: Option<NaiveDate>,
    pub trades_today: u32,
    /// Step of the most recent open.
    pub last_trade_step: Option<usize>,
    /// Stop distance in force for the open position (a per-trade override or the configured one).
    pub active_stop_pct: Option<f64>,
}

impl RiskManagerState {
    fn new(initial_balance: f64) -> Self {
        Self {
            peak_balance: initial_balance,
            daily_start_balance: initial_balance,
            current_day: None,
            trades_today: 0,
            last_trade_step: None,
            active_stop_pct: None,
        }
    }
}

/// Why an open was refused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DenyReason {
    MaxDrawdown { drawdown: f64 },
    DailyLoss { daily_pnl: f64 },
    TradeLimit { trades_today: u32 },
    MinInterval { elapsed: usize, required: u32 },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::MaxDrawdown { drawdown } => {
                write!(f, "max drawdown reached ({:.1}%)", drawdown * 100.0)
            }
            DenyReason::DailyLoss { daily_pnl } => {
                write!(f, "max daily loss reached ({:.1}%)", daily_pnl * 100.0)
            }
            DenyReason::TradeLimit { trades_today } => {
                write!(f, "max trades per day reached ({trades_today})")
            }
            DenyReason::MinInterval { elapsed, required } => {
                write!(f, "min trade interval ({elapsed}/{required} bars)")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradePermission {
    Allowed,
    Denied(DenyReason),
}

impl TradePermission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, TradePermission::Allowed)
    }
}

impl fmt::Display for TradePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradePermission::Allowed => f.write_str("OK"),
            TradePermission::Denied(reason) => reason.fmt(f),
        }
    }
}

/// Snapshot for the info payload and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    pub drawdown: f64,
    pub daily_pnl: f64,
    pub trades_today: u32,
    pub trailing_active: bool,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    state: RiskManagerState,
}

impl RiskManager {
    pub fn new(config: RiskConfig, initial_balance: f64) -> Self {
        Self {
            config,
            state: RiskManagerState::new(initial_balance),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn state(&self) -> &RiskManagerState {
        &self.state
    }

    pub fn reset(&mut self, initial_balance: f64) {
        self.state = RiskManagerState::new(initial_balance);
    }

    // ─── Bookkeeping ─────────────────────────────────────────────────

    /// Roll the trading day when the timestamp's date changes.
    pub fn update_day(&mut self, timestamp: NaiveDateTime, balance: f64) {
        let day = timestamp.date();
        if self.state.current_day != Some(day) {
            self.state.current_day = Some(day);
            self.state.daily_start_balance = balance;
            self.state.trades_today = 0;
        }
    }

    pub fn update_peak(&mut self, balance: f64) {
        if balance > self.state.peak_balance {
            self.state.peak_balance = balance;
        }
    }

    /// Drawdown from peak as a non-positive fraction.
    pub fn current_drawdown(&self, balance: f64) -> f64 {
        if self.state.peak_balance <= 0.0 {
            return 0.0;
        }
        (balance - self.state.peak_balance) / self.state.peak_balance
    }

    pub fn daily_pnl(&self, balance: f64) -> f64 {
        if self.state.daily_start_balance <= 0.0 {
            return 0.0;
        }
        (balance - self.state.daily_start_balance) / self.state.daily_start_balance
    }

    // ─── Sizing ──────────────────────────────────────────────────────

    /// Fraction of cash to commit, using the configured stop distance.
    pub fn calculate_position_size(&self, volatility: Option<f64>) -> f64 {
        self.position_size_for_stop(volatility, self.effective_stop_pct(None))
    }

    /// Stop distance a new position arms: a positive override wins, then the
    /// configured stop when enabled.
    pub fn effective_stop_pct(&self, stop_override: Option<f64>) -> Option<f64> {
        stop_override
            .filter(|d| *d > 0.0)
            .or_else(|| self.config.use_stop_loss.then_some(self.config.stop_loss_pct))
    }

    /// Fraction of cash to commit when the position will arm `stop_pct`.
    ///
    /// Without a stop the risk cap does not apply.
    pub fn position_size_for_stop(&self, volatility: Option<f64>, stop_pct: Option<f64>) -> f64 {
        let cfg = &self.config;
        let mut base_size = cfg.max_position_pct;

        let vs = &cfg.volatility_scaling;
        if let (true, Some(vol)) = (vs.enabled, volatility) {
            if vol < vs.reference_volatility * LOW_VOL_RATIO {
                base_size *= vs.low_vol_multiplier;
            } else if vol > vs.reference_volatility * HIGH_VOL_RATIO {
                base_size *= vs.high_vol_multiplier;
            }
        }

        let risk_based_size = match stop_pct {
            Some(pct) if pct > 0.0 => cfg.max_risk_per_trade_pct / pct,
            _ => f64::INFINITY,
        };

        base_size
            .min(risk_based_size)
            .min(cfg.max_position_pct)
            .max(cfg.min_position_pct)
    }

    // ─── Permission ──────────────────────────────────────────────────

    pub fn can_open_trade(&self, balance: f64, step: usize) -> TradePermission {
        let checks = [
            self.check_drawdown(balance),
            self.check_daily_loss(balance),
            self.check_trade_limit(),
            self.check_min_interval(step),
        ];
        checks
            .into_iter()
            .find(|p| !p.is_allowed())
            .unwrap_or(TradePermission::Allowed)
    }

    pub fn check_drawdown(&self, balance: f64) -> TradePermission {
        let drawdown = self.current_drawdown(balance);
        if drawdown < -self.config.max_drawdown_pct {
            TradePermission::Denied(DenyReason::MaxDrawdown { drawdown })
        } else {
            TradePermission::Allowed
        }
    }

    pub fn check_daily_loss(&self, balance: f64) -> TradePermission {
        let daily_pnl = self.daily_pnl(balance);
        if daily_pnl < -self.config.max_daily_loss_pct {
            TradePermission::Denied(DenyReason::DailyLoss { daily_pnl })
        } else {
            TradePermission::Allowed
        }
    }

    pub fn check_trade_limit(&self) -> TradePermission {
        if self.state.trades_today >= self.config.max_trades_per_day {
            TradePermission::Denied(DenyReason::TradeLimit {
                trades_today: self.state.trades_today,
            })
        } else {
            TradePermission::Allowed
        }
    }

    pub fn check_min_interval(&self, step: usize) -> TradePermission {
        let Some(last) = self.state.last_trade_step else {
            return TradePermission::Allowed;
        };
        let elapsed = step.saturating_sub(last);
        let required = self.config.min_trade_interval_bars;
        if elapsed < required as usize {
            TradePermission::Denied(DenyReason::MinInterval { elapsed, required })
        } else {
            TradePermission::Allowed
        }
    }

    // ─── Position lifecycle ──────────────────────────────────────────

    /// Record an open and arm the position's exit levels.
    ///
    /// `stop_override` replaces the configured stop distance for this position.
    pub fn on_trade_open(
        &mut self,
        position: &mut PortfolioState,
        step: usize,
        stop_override: Option<f64>,
    ) {
        self.state.trades_today += 1;
        self.state.last_trade_step = Some(step);

        let entry = position.entry_price;
        let sign = position.side.sign();
        position.highest_price_since_entry = entry;
        position.trailing_active = false;

        let stop_pct = self.effective_stop_pct(stop_override);
        self.state.active_stop_pct = stop_pct;
        position.stop_loss_price = stop_pct.map(|pct| entry * (1.0 - sign * pct));
        position.take_profit_price = self
            .config
            .use_take_profit
            .then(|| entry * (1.0 + sign * self.config.take_profit_pct));
    }

    pub fn on_trade_close(&mut self) {
        self.state.active_stop_pct = None;
    }

    /// Track the favorable extreme and test exit triggers at `price`.
    ///
    /// Order: stop-loss, take-profit, trailing stop. Trailing applies to longs only.
    pub fn on_price_update(
        &mut self,
        position: &mut PortfolioState,
        price: f64,
    ) -> Option<CloseReason> {
        if position.is_flat() || position.entry_price <= 0.0 {
            return None;
        }
        if price > position.highest_price_since_entry {
            position.highest_price_since_entry = price;
        }

        let pnl_pct = position.side.pnl_pct(position.entry_price, price);

        if let Some(stop_pct) = self.state.active_stop_pct {
            if pnl_pct <= -stop_pct {
                return Some(CloseReason::StopLoss);
            }
        }
        if self.config.use_take_profit && pnl_pct >= self.config.take_profit_pct {
            return Some(CloseReason::TakeProfit);
        }

        if self.config.use_trailing_stop && position.side == PositionSide::Long {
            if pnl_pct >= self.config.trailing_activation_pct {
                position.trailing_active = true;
            }
            if position.trailing_active {
                let trail_price =
                    position.highest_price_since_entry * (1.0 - self.config.trailing_stop_pct);
                // Only ever tightens
                position.stop_loss_price = Some(
                    position
                        .stop_loss_price
                        .map_or(trail_price, |stop| stop.max(trail_price)),
                );
                if price <= trail_price {
                    return Some(CloseReason::TrailingStop);
                }
            }
        }
        None
    }

    pub fn status(&self, position: &PortfolioState, balance: f64) -> RiskStatus {
        RiskStatus {
            drawdown: self.current_drawdown(balance),
            daily_pnl: self.daily_pnl(balance),
            trades_today: self.state.trades_today,
            trailing_active: position.trailing_active,
            stop_loss_price: position.stop_loss_price,
            take_profit_price: position.take_profit_price,
        }
    }
}

/// Population std of close-to-close returns over the trailing `lookback` returns.
///
/// `None` until `lookback + 1` closes are available.
pub fn estimate_volatility(closes: &[f64], lookback: usize) -> Option<f64> {
    if lookback < 2 || closes.len() < lookback + 1 {
        return None;
    }
    let window = &closes[closes.len() - lookback - 1..];
    let returns: Vec<f64> = window
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::config::VolatilityScaling;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn open_long(rm: &mut RiskManager, entry: f64, step: usize) -> PortfolioState {
        let mut p = PortfolioState::new(10_000.0);
        p.open(PositionSide::Long, entry, 0.25, 0.0).unwrap();
        rm.on_trade_open(&mut p, step, None);
        p
    }

    // ── Sizing ──

    #[test]
    fn default_size_is_capped_by_risk_budget() {
        // base 0.25, risk-based 0.02 / 0.10 = 0.20
        let rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        assert!((rm.calculate_position_size(None) - 0.20).abs() < 1e-12);
    }

    #[test]
    fn high_volatility_halves_size_but_respects_floor() {
        let rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        // 0.25 * 0.5 = 0.125, min(0.125, 0.2) = 0.125 >= floor 0.10
        assert!((rm.calculate_position_size(Some(0.10)) - 0.125).abs() < 1e-12);

        let cfg = RiskConfig {
            volatility_scaling: VolatilityScaling {
                high_vol_multiplier: 0.1,
                ..VolatilityScaling::default()
            },
            ..RiskConfig::default()
        };
        let rm = RiskManager::new(cfg, 10_000.0);
        assert!((rm.calculate_position_size(Some(0.10)) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn low_volatility_cannot_exceed_max() {
        let cfg = RiskConfig {
            max_risk_per_trade_pct: 0.10,
            ..RiskConfig::default()
        };
        let rm = RiskManager::new(cfg, 10_000.0);
        // 0.25 * 1.5 = 0.375, clamped to max 0.25
        assert!((rm.calculate_position_size(Some(0.001)) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn unrestricted_sizes_full_balance() {
        let rm = RiskManager::new(RiskConfig::unrestricted(), 10_000.0);
        assert_eq!(rm.calculate_position_size(Some(0.5)), 1.0);
    }

    #[test]
    fn wider_stop_override_shrinks_size() {
        let rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        // 0.02 / 0.2 = 0.1
        assert!((rm.position_size_for_stop(None, Some(0.2)) - 0.10).abs() < 1e-12);
    }

    // ── Permission ──

    #[test]
    fn drawdown_beyond_limit_denies() {
        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        rm.update_peak(12_000.0);
        assert!(rm.check_drawdown(9_700.0).is_allowed());
        let p = rm.check_drawdown(9_500.0);
        assert!(matches!(
            p,
            TradePermission::Denied(DenyReason::MaxDrawdown { .. })
        ));
        assert!(p.to_string().starts_with("max drawdown reached"));
    }

    #[test]
    fn daily_loss_beyond_limit_denies() {
        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        rm.update_day(ts(2, 9), 10_000.0);
        assert!(rm.check_daily_loss(9_300.0).is_allowed());
        assert!(!rm.check_daily_loss(9_100.0).is_allowed());
    }

    #[test]
    fn trade_limit_resets_on_new_day() {
        let cfg = RiskConfig {
            max_trades_per_day: 2,
            min_trade_interval_bars: 0,
            ..RiskConfig::default()
        };
        let mut rm = RiskManager::new(cfg, 10_000.0);
        rm.update_day(ts(2, 9), 10_000.0);
        open_long(&mut rm, 100.0, 1);
        open_long(&mut rm, 100.0, 2);
        assert_eq!(
            rm.check_trade_limit(),
            TradePermission::Denied(DenyReason::TradeLimit { trades_today: 2 })
        );

        rm.update_day(ts(2, 15), 10_000.0);
        assert!(!rm.check_trade_limit().is_allowed());

        rm.update_day(ts(3, 9), 10_000.0);
        assert!(rm.check_trade_limit().is_allowed());
    }

    #[test]
    fn min_interval_counts_bars_since_last_open() {
        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        assert!(rm.check_min_interval(0).is_allowed());
        open_long(&mut rm, 100.0, 50);
        assert_eq!(
            rm.check_min_interval(55),
            TradePermission::Denied(DenyReason::MinInterval {
                elapsed: 5,
                required: 6
            })
        );
        assert!(rm.check_min_interval(56).is_allowed());
    }

    #[test]
    fn can_open_trade_reports_first_failing_check() {
        let cfg = RiskConfig {
            max_trades_per_day: 0,
            ..RiskConfig::default()
        };
        let rm = RiskManager::new(cfg, 10_000.0);
        assert!(matches!(
            rm.can_open_trade(10_000.0, 100),
            TradePermission::Denied(DenyReason::TradeLimit { .. })
        ));
        let rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        assert_eq!(rm.can_open_trade(10_000.0, 100), TradePermission::Allowed);
    }

    #[test]
    fn peak_never_decreases() {
        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        rm.update_peak(11_000.0);
        rm.update_peak(9_000.0);
        assert_eq!(rm.state().peak_balance, 11_000.0);
    }

    // ── Triggers ──

    #[test]
    fn stop_loss_triggers_at_threshold() {
        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        let mut p = open_long(&mut rm, 100.0, 10);
        assert!((p.stop_loss_price.unwrap() - 90.0).abs() < 1e-9);
        assert!((p.take_profit_price.unwrap() - 120.0).abs() < 1e-9);
        assert_eq!(rm.on_price_update(&mut p, 95.0), None);
        assert_eq!(rm.on_price_update(&mut p, 89.0), Some(CloseReason::StopLoss));
    }

    #[test]
    fn take_profit_triggers() {
        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        let mut p = open_long(&mut rm, 100.0, 10);
        assert_eq!(
            rm.on_price_update(&mut p, 121.0),
            Some(CloseReason::TakeProfit)
        );
    }

    #[test]
    fn trailing_stop_after_activation() {
        let cfg = RiskConfig {
            take_profit_pct: 0.50,
            ..RiskConfig::default()
        };
        let mut rm = RiskManager::new(cfg, 10_000.0);
        let mut p = open_long(&mut rm, 100.0, 10);

        assert_eq!(rm.on_price_update(&mut p, 120.0), None);
        assert!(p.trailing_active);
        assert_eq!(p.highest_price_since_entry, 120.0);
        assert_eq!(
            rm.on_price_update(&mut p, 113.0),
            Some(CloseReason::TrailingStop)
        );
    }

    #[test]
    fn trailing_stop_level_only_tightens() {
        let cfg = RiskConfig {
            take_profit_pct: 0.50,
            ..RiskConfig::default()
        };
        let mut rm = RiskManager::new(cfg, 10_000.0);
        let mut p = open_long(&mut rm, 100.0, 10);
        rm.on_price_update(&mut p, 110.0);
        let first = p.stop_loss_price.unwrap();
        rm.on_price_update(&mut p, 108.0);
        assert_eq!(p.stop_loss_price.unwrap(), first);
        rm.on_price_update(&mut p, 115.0);
        assert!(p.stop_loss_price.unwrap() > first);
    }

    #[test]
    fn loose_trail_keeps_the_fixed_stop() {
        // Trail level 101 × 0.8 = 80.8 sits below the fixed stop at 90
        let cfg = RiskConfig {
            take_profit_pct: 0.50,
            trailing_activation_pct: 0.01,
            trailing_stop_pct: 0.20,
            ..RiskConfig::default()
        };
        let mut rm = RiskManager::new(cfg, 10_000.0);
        let mut p = open_long(&mut rm, 100.0, 0);
        assert_eq!(rm.on_price_update(&mut p, 101.0), None);
        assert!(p.trailing_active);
        assert!((p.stop_loss_price.unwrap() - 90.0).abs() < 1e-9);

        // 130 × 0.8 = 104 tightens past the fixed stop
        rm.on_price_update(&mut p, 130.0);
        assert!((p.stop_loss_price.unwrap() - 104.0).abs() < 1e-9);
    }

    #[test]
    fn stop_override_sizes_and_arms_without_configured_stop() {
        let cfg = RiskConfig {
            use_stop_loss: false,
            ..RiskConfig::default()
        };
        let mut rm = RiskManager::new(cfg, 10_000.0);
        assert_eq!(rm.effective_stop_pct(None), None);
        assert_eq!(rm.effective_stop_pct(Some(0.0)), None);
        assert_eq!(rm.effective_stop_pct(Some(0.2)), Some(0.2));

        // No stop: only the position bounds apply
        assert!((rm.calculate_position_size(None) - 0.25).abs() < 1e-12);
        // 0.02 / 0.2 = 0.1, the same stop the open then arms
        let stop = rm.effective_stop_pct(Some(0.2));
        assert!((rm.position_size_for_stop(None, stop) - 0.10).abs() < 1e-12);

        let mut p = PortfolioState::new(10_000.0);
        p.open(PositionSide::Long, 100.0, 0.1, 0.0).unwrap();
        rm.on_trade_open(&mut p, 0, Some(0.2));
        assert!((p.stop_loss_price.unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn short_stop_triggers_on_rally_and_never_trails() {
        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        let mut p = PortfolioState::new(10_000.0);
        p.open(PositionSide::Short, 100.0, 0.2, 0.0).unwrap();
        rm.on_trade_open(&mut p, 0, None);
        assert!((p.stop_loss_price.unwrap() - 110.0).abs() < 1e-9);
        assert!((p.take_profit_price.unwrap() - 80.0).abs() < 1e-9);

        // 9% favorable move would activate trailing on a long
        assert_eq!(rm.on_price_update(&mut p, 91.0), None);
        assert!(!p.trailing_active);
        assert_eq!(rm.on_price_update(&mut p, 111.0), Some(CloseReason::StopLoss));
    }

    #[test]
    fn stop_override_replaces_configured_distance() {
        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0);
        let mut p = PortfolioState::new(10_000.0);
        p.open(PositionSide::Long, 100.0, 0.2, 0.0).unwrap();
        rm.on_trade_open(&mut p, 0, Some(0.03));
        assert!((p.stop_loss_price.unwrap() - 97.0).abs() < 1e-9);
        assert_eq!(rm.on_price_update(&mut p, 96.5), Some(CloseReason::StopLoss));
    }

    #[test]
    fn disabled_triggers_never_fire() {
        let mut rm = RiskManager::new(RiskConfig::unrestricted(), 10_000.0);
        let mut p = open_long(&mut rm, 100.0, 0);
        assert_eq!(p.stop_loss_price, None);
        assert_eq!(rm.on_price_update(&mut p, 10.0), None);
        assert_eq!(rm.on_price_update(&mut p, 1_000.0), None);
    }

    // ── Volatility ──

    #[test]
    fn volatility_needs_full_lookback() {
        assert_eq!(estimate_volatility(&[100.0, 101.0], 2), None);
        let v = estimate_volatility(&[100.0, 110.0, 99.0], 2).unwrap();
        // returns 0.1 and -0.1 → population std 0.1
        assert!((v - 0.1).abs() < 1e-12);
    }

    #[test]
    fn constant_prices_have_zero_volatility() {
        let closes = vec![50.0; 10];
        assert_eq!(estimate_volatility(&closes, 5), Some(0.0));
    }
}
