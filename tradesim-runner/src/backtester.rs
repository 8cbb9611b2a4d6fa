//! Backtester — drives a policy through episodes and collects results.
//!
//! A single run resets the environment, loops act → step until the episode
//! terminates or is truncated by ruin, then hands the post-step value history
//! and trade log to [`PerformanceMetrics`]. Multi-runs derive per-run seeds
//! from a master seed so sequential and parallel execution agree run by run.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use tradesim_core::domain::{MarketBar, Trade};
use tradesim_core::env::{Action, EnvError, TradeStatistics, TradingEnv};
use tradesim_core::rng::RngHierarchy;

use crate::metrics::{MetricsConfig, PerformanceMetrics};
use crate::policy::{Policy, RandomPolicy};
use crate::summary::RunSummary;
use crate::walk_forward::{walk_forward_analysis, WalkForwardConfig, WalkForwardReport};

pub const DEFAULT_MASTER_SEED: u64 = 42;

const EPISODE_LABEL: &str = "episode";
const POLICY_LABEL: &str = "policy";

/// Errors from running backtests.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("environment error: {0}")]
    Env(#[from] EnvError),

    #[error("invalid walk-forward config: {0}")]
    InvalidWalkForward(String),

    #[error("no walk-forward window fits: {bars} bars, each window needs more than {required}")]
    NoWalkForwardWindows { bars: usize, required: usize },
}

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    /// Reached the end of the bar sequence.
    Completed,
    /// Truncated by the ruin threshold.
    Ruined,
}

/// Everything collected from one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub steps: usize,
    pub total_reward: f64,
    pub outcome: EpisodeOutcome,
    /// Environment seed the episode was reset with.
    pub seed: Option<u64>,
    pub reward_name: String,
    pub actions: Vec<Action>,
    /// Post-step portfolio values, one per step.
    pub portfolio_value_history: Vec<f64>,
    /// Close at the bar each post-step value is marked at.
    pub prices: Vec<f64>,
    pub timestamps: Vec<NaiveDateTime>,
    pub trade_log: Vec<Trade>,
    pub trade_statistics: TradeStatistics,
    pub performance_metrics: PerformanceMetrics,
}

impl BacktestResult {
    pub fn is_ruined(&self) -> bool {
        self.outcome == EpisodeOutcome::Ruined
    }

    pub fn total_return(&self) -> f64 {
        self.performance_metrics.total_return
    }

    pub fn final_value(&self) -> f64 {
        self.performance_metrics.final_value
    }
}

/// Runs of a multi-run or random benchmark, ordered by run index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiRunReport {
    pub runs: Vec<BacktestResult>,
    pub summary: RunSummary,
}

impl MultiRunReport {
    pub fn from_runs(runs: Vec<BacktestResult>) -> Self {
        let summary = RunSummary::from_results(&runs);
        Self { runs, summary }
    }

    /// Fraction of runs whose total return is strictly below `total_return`.
    pub fn beaten_fraction(&self, total_return: f64) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        let beaten = self
            .runs
            .iter()
            .filter(|r| r.total_return() < total_return)
            .count();
        beaten as f64 / self.runs.len() as f64
    }
}

// ─── Single episode ──────────────────────────────────────────────────

/// Run one episode from a fresh reset.
pub fn run_backtest<P: Policy + ?Sized>(
    env: &mut TradingEnv,
    policy: &mut P,
    metrics: &MetricsConfig,
) -> Result<BacktestResult, BacktestError> {
    run_episode(env, policy, metrics, None, None)
}

fn run_episode<P: Policy + ?Sized>(
    env: &mut TradingEnv,
    policy: &mut P,
    metrics: &MetricsConfig,
    env_seed: Option<u64>,
    policy_seed: Option<u64>,
) -> Result<BacktestResult, BacktestError> {
    policy.reset(policy_seed);
    let (mut observation, _) = env.reset(env_seed);

    let capacity = env.bars().len().saturating_sub(env.current_step());
    let mut actions = Vec::with_capacity(capacity);
    let mut values = Vec::with_capacity(capacity);
    let mut prices = Vec::with_capacity(capacity);
    let mut timestamps = Vec::with_capacity(capacity);
    let mut total_reward = 0.0;

    let outcome = loop {
        let action = policy.act(&observation);
        let out = env.step(&action)?;

        total_reward += out.reward;
        actions.push(action);
        values.push(out.info.portfolio_value);
        prices.push(out.info.price);
        timestamps.push(out.info.timestamp);
        observation = out.observation;

        if out.truncated {
            break EpisodeOutcome::Ruined;
        }
        if out.terminated {
            break EpisodeOutcome::Completed;
        }
    };

    let initial_balance = env.config().initial_balance;
    let performance_metrics = PerformanceMetrics::compute(
        &values,
        env.trades(),
        initial_balance,
        Some(timestamps.as_slice()),
        metrics,
    )
    .with_benchmark(&prices);

    let result = BacktestResult {
        steps: values.len(),
        total_reward,
        outcome,
        seed: env_seed,
        reward_name: env.reward_name().to_string(),
        actions,
        portfolio_value_history: values,
        prices,
        timestamps,
        trade_log: env.trades().to_vec(),
        trade_statistics: env.get_trade_statistics(),
        performance_metrics,
    };

    info!(
        steps = result.steps,
        total_return = result.total_return(),
        trades = result.trade_log.len(),
        outcome = ?result.outcome,
        "backtest finished"
    );
    Ok(result)
}

// ─── Backtester ──────────────────────────────────────────────────────

/// Owns a template environment and the metrics settings for its runs.
#[derive(Debug, Clone)]
pub struct Backtester {
    env: TradingEnv,
    metrics: MetricsConfig,
    seeds: RngHierarchy,
}

impl Backtester {
    pub fn new(env: TradingEnv, metrics: MetricsConfig) -> Self {
        Self {
            env,
            metrics,
            seeds: RngHierarchy::new(DEFAULT_MASTER_SEED),
        }
    }

    pub fn with_master_seed(mut self, master_seed: u64) -> Self {
        self.seeds = RngHierarchy::new(master_seed);
        self
    }

    pub fn env(&self) -> &TradingEnv {
        &self.env
    }

    pub fn metrics_config(&self) -> &MetricsConfig {
        &self.metrics
    }

    pub fn master_seed(&self) -> u64 {
        self.seeds.master_seed()
    }

    fn seeds_for(&self, run: usize) -> (u64, u64) {
        (
            self.seeds.sub_seed(EPISODE_LABEL, run as u64),
            self.seeds.sub_seed(POLICY_LABEL, run as u64),
        )
    }

    pub fn run_backtest<P: Policy + ?Sized>(
        &mut self,
        policy: &mut P,
    ) -> Result<BacktestResult, BacktestError> {
        run_backtest(&mut self.env, policy, &self.metrics)
    }

    /// `n` fresh episodes, reseeding environment and policy for each run.
    pub fn run_multiple_backtests<P: Policy + ?Sized>(
        &mut self,
        policy: &mut P,
        n: usize,
    ) -> Result<MultiRunReport, BacktestError> {
        info!(runs = n, master_seed = self.master_seed(), "starting multi-run");
        let mut runs = Vec::with_capacity(n);
        for i in 0..n {
            let (env_seed, policy_seed) = self.seeds_for(i);
            runs.push(run_episode(
                &mut self.env,
                policy,
                &self.metrics,
                Some(env_seed),
                Some(policy_seed),
            )?);
        }
        Ok(self.finish_multi_run(runs))
    }

    /// Parallel multi-run: each run gets its own environment clone and a
    /// policy from `make_policy(run_index)`. Runs use the same seeds as
    /// [`Backtester::run_multiple_backtests`].
    pub fn run_multiple_backtests_parallel<P, F>(
        &self,
        n: usize,
        make_policy: F,
    ) -> Result<MultiRunReport, BacktestError>
    where
        P: Policy,
        F: Fn(usize) -> P + Sync,
    {
        info!(runs = n, master_seed = self.master_seed(), "starting parallel multi-run");
        let runs = (0..n)
            .into_par_iter()
            .map(|i| {
                let (env_seed, policy_seed) = self.seeds_for(i);
                let mut env = self.env.clone();
                let mut policy = make_policy(i);
                run_episode(
                    &mut env,
                    &mut policy,
                    &self.metrics,
                    Some(env_seed),
                    Some(policy_seed),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.finish_multi_run(runs))
    }

    /// Baseline: `n` parallel runs of seeded uniformly random policies.
    pub fn benchmark_against_random(&self, n: usize) -> Result<MultiRunReport, BacktestError> {
        let decoder = self.env.config().decoder;
        let report = self.run_multiple_backtests_parallel(n, |i| {
            RandomPolicy::new(decoder, i as u64)
        })?;
        info!(
            runs = n,
            mean_return = report.summary.total_return.mean,
            std_return = report.summary.total_return.std,
            "random baseline"
        );
        Ok(report)
    }

    /// Walk-forward evaluation over `bars` with this backtester's environment
    /// configuration and reward.
    pub fn walk_forward_analysis<P: Policy + ?Sized>(
        &self,
        bars: &[MarketBar],
        policy: &mut P,
        config: &WalkForwardConfig,
    ) -> Result<WalkForwardReport, BacktestError> {
        walk_forward_analysis(&self.env, bars, policy, config, &self.metrics)
    }

    fn finish_multi_run(&self, runs: Vec<BacktestResult>) -> MultiRunReport {
        let report = MultiRunReport::from_runs(runs);
        info!(
            runs = report.summary.n_runs,
            mean_return = report.summary.total_return.mean,
            std_return = report.summary.total_return.std,
            ruined = report.summary.ruined_runs,
            "multi-run finished"
        );
        report
    }
}
