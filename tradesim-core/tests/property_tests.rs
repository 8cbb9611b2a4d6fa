//! Property tests for episode invariants.
//!
//! Uses proptest to verify, over random price paths and action sequences for
//! every action decoder:
//! 1. Value identity — portfolio value equals cash plus marked holdings
//! 2. Flat invariant — no holdings or exit levels without a position
//! 3. Reset idempotence — reset after any episode replays the first observation
//! 4. Trade pairing — every close follows an open of the same side

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use tradesim_core::domain::{MarketBar, PositionSide, TradeKind};
use tradesim_core::env::{Action, EnvConfig, TradingEnv};
use tradesim_core::reward::{available_rewards, RewardConfig};
use tradesim_core::risk::RiskConfig;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_returns() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.08..0.08_f64, 12..60)
}

fn arb_discrete() -> impl Strategy<Value = Action> {
    prop_oneof![Just(Action::HOLD), Just(Action::BUY), Just(Action::SELL)]
}

fn arb_continuous() -> impl Strategy<Value = Action> {
    prop_oneof![
        -1.0..=1.0_f64,
        prop::sample::select(vec![-1.0, -0.34, -0.33, 0.0, 0.33, 0.34, 1.0]),
    ]
    .prop_map(Action::Continuous)
}

fn arb_directional() -> impl Strategy<Value = Action> {
    let direction = prop_oneof![
        -1.0..=1.0_f64,
        prop::sample::select(vec![-1.0, -0.31, -0.3, 0.0, 0.3, 0.31, 1.0]),
    ];
    let size = prop_oneof![0.0..=1.0_f64, Just(0.0), Just(1.0)];
    let stop_distance = prop_oneof![0.0..=0.2_f64, Just(0.0), Just(0.2)];
    (direction, size, stop_distance).prop_map(|(direction, size, stop_distance)| {
        Action::Directional {
            direction,
            size,
            stop_distance,
        }
    })
}

/// Decoder preset paired with actions of the matching shape.
fn arb_episode() -> impl Strategy<Value = (EnvConfig, Vec<Action>)> {
    prop_oneof![
        prop::collection::vec(arb_discrete(), 1..80).prop_map(|a| (EnvConfig::default(), a)),
        prop::collection::vec(arb_continuous(), 1..80).prop_map(|a| (EnvConfig::continuous(), a)),
        prop::collection::vec(arb_directional(), 1..80)
            .prop_map(|a| (EnvConfig::directional(), a)),
    ]
}

fn arb_risk() -> impl Strategy<Value = RiskConfig> {
    prop_oneof![
        Just(RiskConfig::default()),
        Just(RiskConfig::unrestricted()),
        Just(RiskConfig {
            min_trade_interval_bars: 0,
            max_trades_per_day: 1_000,
            ..RiskConfig::default()
        }),
    ]
}

// ── Helpers ──────────────────────────────────────────────────────────

fn path_bars(returns: &[f64]) -> Vec<MarketBar> {
    let t0 = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut close = 100.0;
    let mut bars = Vec::with_capacity(returns.len());
    for (i, r) in returns.iter().enumerate() {
        let open = close;
        close *= 1.0 + r;
        bars.push(MarketBar::new(
            t0 + Duration::minutes(15 * i as i64),
            open,
            open.max(close),
            open.min(close),
            close,
            500.0 + i as f64,
        ));
    }
    bars
}

fn build(
    returns: &[f64],
    preset: EnvConfig,
    risk: RiskConfig,
    enable_short: bool,
    reward: &str,
) -> TradingEnv {
    let config = EnvConfig {
        window_size: 4,
        enable_short,
        ..preset
    };
    TradingEnv::with_reward_config(path_bars(returns), config, risk, &RewardConfig::named(reward))
        .unwrap()
}

// ── 1 & 2. Accounting invariants ─────────────────────────────────────

proptest! {
    #[test]
    fn value_identity_and_flat_invariant(
        returns in arb_returns(),
        (preset, actions) in arb_episode(),
        risk in arb_risk(),
        enable_short in any::<bool>(),
    ) {
        let mut env = build(&returns, preset, risk, enable_short, "profit");
        env.reset(None);

        for a in actions {
            if env.is_done() {
                break;
            }
            let out = env.step(&a).unwrap();
            let p = env.portfolio();
            let marked = p.cash_balance + p.holdings * out.info.price;
            prop_assert!((out.info.portfolio_value - marked).abs() < 1e-6);
            prop_assert!(out.reward.is_finite());

            match p.side {
                PositionSide::Flat => {
                    prop_assert_eq!(p.holdings, 0.0);
                    prop_assert!(p.stop_loss_price.is_none());
                    prop_assert!(p.take_profit_price.is_none());
                    prop_assert!(!p.trailing_active);
                }
                PositionSide::Long => prop_assert!(p.holdings > 0.0),
                PositionSide::Short => {
                    prop_assert!(enable_short);
                    prop_assert!(p.holdings < 0.0);
                }
            }
            prop_assert!(p.is_consistent());
            prop_assert_eq!(env.value_history().len(), out.info.step - 4);
        }
    }
}

// ── 3. Reset idempotence ─────────────────────────────────────────────

proptest! {
    #[test]
    fn reset_replays_initial_state(
        returns in arb_returns(),
        (preset, actions) in arb_episode(),
        reward_idx in 0usize..5,
    ) {
        let reward = available_rewards()[reward_idx % available_rewards().len()];
        let mut env = build(&returns, preset, RiskConfig::unrestricted(), true, reward);
        let (obs0, info0) = env.reset(Some(3));

        for a in actions {
            if env.is_done() {
                break;
            }
            env.step(&a).unwrap();
        }

        let (obs1, info1) = env.reset(Some(3));
        prop_assert_eq!(obs0, obs1);
        prop_assert_eq!(info0, info1);
        prop_assert_eq!(env.total_reward(), 0.0);
        prop_assert!(env.trades().is_empty());
    }
}

// ── 4. Trade pairing ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn closes_follow_matching_opens(
        returns in arb_returns(),
        (preset, actions) in arb_episode(),
        risk in arb_risk(),
    ) {
        let mut env = build(&returns, preset, risk, true, "profit");
        env.reset(None);
        for a in actions {
            if env.is_done() {
                break;
            }
            env.step(&a).unwrap();
        }

        let mut open_side: Option<PositionSide> = None;
        for trade in env.trades() {
            match trade.kind {
                TradeKind::Open => {
                    prop_assert!(open_side.is_none());
                    open_side = Some(trade.side);
                }
                TradeKind::Close => {
                    prop_assert_eq!(open_side, Some(trade.side));
                    prop_assert!(trade.realized_pnl.is_some());
                    open_side = None;
                }
            }
        }
        prop_assert_eq!(open_side.unwrap_or(PositionSide::Flat), env.portfolio().side);
    }
}
