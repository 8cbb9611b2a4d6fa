//! Policies: anything that maps an observation to an action.
//!
//! Trained agents live outside this workspace; they plug in through
//! [`Policy`] or as a plain closure. The baselines here are used for
//! benchmarking and tests.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use tradesim_core::env::{Action, ActionDecoder, Observation};

/// Observation → action mapping driven by the backtester.
pub trait Policy {
    fn act(&mut self, observation: &Observation) -> Action;

    /// Called before every episode with that episode's policy seed.
    fn reset(&mut self, _seed: Option<u64>) {}
}

impl<F> Policy for F
where
    F: FnMut(&Observation) -> Action,
{
    fn act(&mut self, observation: &Observation) -> Action {
        self(observation)
    }
}

/// "Go long" in the decoder's action shape.
pub fn long_action(decoder: ActionDecoder) -> Action {
    match decoder {
        ActionDecoder::Discrete => Action::BUY,
        ActionDecoder::Continuous => Action::Continuous(1.0),
        ActionDecoder::DirectionSizeStop => Action::Directional {
            direction: 1.0,
            size: 1.0,
            stop_distance: 0.0,
        },
    }
}

/// "Do nothing" in the decoder's action shape. For direction/size/stop this
/// targets flat, which is a no-op while no position is open.
pub fn hold_action(decoder: ActionDecoder) -> Action {
    match decoder {
        ActionDecoder::Discrete => Action::HOLD,
        ActionDecoder::Continuous => Action::Continuous(0.0),
        ActionDecoder::DirectionSizeStop => Action::Directional {
            direction: 0.0,
            size: 0.0,
            stop_distance: 0.0,
        },
    }
}

/// "Get out" in the decoder's action shape. Targets flat when shorting is
/// disabled; the direction/size/stop shape always targets flat.
pub fn exit_action(decoder: ActionDecoder) -> Action {
    match decoder {
        ActionDecoder::Discrete => Action::SELL,
        ActionDecoder::Continuous => Action::Continuous(-1.0),
        ActionDecoder::DirectionSizeStop => Action::Directional {
            direction: 0.0,
            size: 0.0,
            stop_distance: 0.0,
        },
    }
}

fn is_long(observation: &Observation) -> bool {
    observation.portfolio[0] > 0.0
}

// ─── Baselines ───────────────────────────────────────────────────────

/// Uniformly random actions of the decoder's shape.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    decoder: ActionDecoder,
    seed: u64,
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(decoder: ActionDecoder, seed: u64) -> Self {
        Self {
            decoder,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, _observation: &Observation) -> Action {
        self.decoder.sample(&mut self.rng)
    }

    /// Reseed; `None` replays the construction seed.
    fn reset(&mut self, seed: Option<u64>) {
        self.rng = StdRng::seed_from_u64(seed.unwrap_or(self.seed));
    }
}

/// Buys on the first step and keeps requesting long.
#[derive(Debug, Clone, Copy)]
pub struct BuyAndHoldPolicy {
    decoder: ActionDecoder,
}

impl BuyAndHoldPolicy {
    pub fn new(decoder: ActionDecoder) -> Self {
        Self { decoder }
    }
}

impl Policy for BuyAndHoldPolicy {
    fn act(&mut self, _observation: &Observation) -> Action {
        long_action(self.decoder)
    }
}

/// Never trades.
#[derive(Debug, Clone, Copy)]
pub struct HoldPolicy {
    decoder: ActionDecoder,
}

impl HoldPolicy {
    pub fn new(decoder: ActionDecoder) -> Self {
        Self { decoder }
    }
}

impl Policy for HoldPolicy {
    fn act(&mut self, _observation: &Observation) -> Action {
        hold_action(self.decoder)
    }
}

// ─── Rule-based baselines ────────────────────────────────────────────

pub const DEFAULT_FAST_PERIOD: usize = 20;
pub const DEFAULT_SLOW_PERIOD: usize = 50;

/// Moving-average crossover: long on a golden cross, out on a death cross.
///
/// Keeps its own close history from [`Observation::close`]. Holds until
/// `slow_period + 1` closes have been seen; the first comparable bar only
/// records which average is on top.
#[derive(Debug, Clone)]
pub struct SmaCrossoverPolicy {
    decoder: ActionDecoder,
    fast_period: usize,
    slow_period: usize,
    closes: VecDeque<f64>,
    fast_above_slow: Option<bool>,
}

impl SmaCrossoverPolicy {
    pub fn new(decoder: ActionDecoder) -> Self {
        Self::with_periods(decoder, DEFAULT_FAST_PERIOD, DEFAULT_SLOW_PERIOD)
    }

    /// Periods are clamped so that `1 <= fast <= slow`.
    pub fn with_periods(decoder: ActionDecoder, fast_period: usize, slow_period: usize) -> Self {
        let slow_period = slow_period.max(1);
        Self {
            decoder,
            fast_period: fast_period.clamp(1, slow_period),
            slow_period,
            closes: VecDeque::with_capacity(slow_period + 1),
            fast_above_slow: None,
        }
    }

    fn tail_mean(&self, period: usize) -> f64 {
        self.closes.iter().rev().take(period).sum::<f64>() / period as f64
    }
}

impl Policy for SmaCrossoverPolicy {
    fn act(&mut self, observation: &Observation) -> Action {
        self.closes.push_back(observation.close);
        if self.closes.len() > self.slow_period + 1 {
            self.closes.pop_front();
        }
        if self.closes.len() <= self.slow_period {
            return hold_action(self.decoder);
        }

        let above = self.tail_mean(self.fast_period) > self.tail_mean(self.slow_period);
        let previous = self.fast_above_slow.replace(above);
        match previous {
            Some(false) if above => long_action(self.decoder),
            Some(true) if !above => exit_action(self.decoder),
            _ => hold_action(self.decoder),
        }
    }

    fn reset(&mut self, _seed: Option<u64>) {
        self.closes.clear();
        self.fast_above_slow = None;
    }
}

pub const DEFAULT_RSI_PERIOD: usize = 14;
pub const DEFAULT_OVERSOLD: f64 = 30.0;
pub const DEFAULT_OVERBOUGHT: f64 = 70.0;

/// RSI mean reversion: buy when oversold and flat, exit when overbought and long.
///
/// RSI uses simple averages of gains and losses over the last `period`
/// close changes; no losses reads as 100.
#[derive(Debug, Clone)]
pub struct RsiPolicy {
    decoder: ActionDecoder,
    period: usize,
    oversold: f64,
    overbought: f64,
    closes: VecDeque<f64>,
}

impl RsiPolicy {
    pub fn new(decoder: ActionDecoder) -> Self {
        Self::with_levels(decoder, DEFAULT_RSI_PERIOD, DEFAULT_OVERSOLD, DEFAULT_OVERBOUGHT)
    }

    pub fn with_levels(
        decoder: ActionDecoder,
        period: usize,
        oversold: f64,
        overbought: f64,
    ) -> Self {
        let period = period.max(1);
        Self {
            decoder,
            period,
            oversold,
            overbought,
            closes: VecDeque::with_capacity(period + 1),
        }
    }

    /// `None` until `period + 1` closes have been seen.
    pub fn rsi(&self) -> Option<f64> {
        if self.closes.len() <= self.period {
            return None;
        }
        let (gains, losses) = self
            .closes
            .iter()
            .zip(self.closes.iter().skip(1))
            .map(|(prev, next)| next - prev)
            .fold((0.0, 0.0), |(g, l), delta| {
                if delta > 0.0 {
                    (g + delta, l)
                } else {
                    (g, l - delta)
                }
            });
        if losses == 0.0 {
            return Some(100.0);
        }
        Some(100.0 - 100.0 / (1.0 + gains / losses))
    }
}

impl Policy for RsiPolicy {
    fn act(&mut self, observation: &Observation) -> Action {
        self.closes.push_back(observation.close);
        if self.closes.len() > self.period + 1 {
            self.closes.pop_front();
        }
        let Some(rsi) = self.rsi() else {
            return hold_action(self.decoder);
        };

        let long = is_long(observation);
        if rsi < self.oversold && !long {
            long_action(self.decoder)
        } else if rsi > self.overbought && long {
            exit_action(self.decoder)
        } else {
            hold_action(self.decoder)
        }
    }

    fn reset(&mut self, _seed: Option<u64>) {
        self.closes.clear();
    }
}
