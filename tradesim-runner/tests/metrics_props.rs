//! Property tests for metric functions.
//!
//! 1. Drawdown depth stays in [0, 1) for positive value paths
//! 2. Drawdown duration never exceeds the path length
//! 3. Profit factor sentinels depend only on the signs present
//! 4. Summary best/worst bracket every finite sample

use proptest::prelude::*;
use tradesim_runner::metrics::{
    drawdown_series, max_drawdown, max_drawdown_duration, profit_factor, step_returns,
};
use tradesim_runner::FieldStats;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_values() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..10_000.0_f64, 1..200)
}

fn arb_profits() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-500.0..500.0_f64, 0..50)
}

// ── 1 & 2. Drawdown ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn drawdown_is_bounded(values in arb_values()) {
        let dd = max_drawdown(&values);
        prop_assert!((0.0..1.0).contains(&dd));
        prop_assert!(drawdown_series(&values).iter().all(|d| *d <= dd));
        prop_assert!(max_drawdown_duration(&values) < values.len());
        prop_assert_eq!(step_returns(&values).len(), values.len() - 1);
    }

    #[test]
    fn monotone_paths_have_no_drawdown(mut values in arb_values()) {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        prop_assert_eq!(max_drawdown(&values), 0.0);
        prop_assert_eq!(max_drawdown_duration(&values), 0);
    }
}

// ── 3. Profit factor ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn profit_factor_sentinels(profits in arb_profits()) {
        let pf = profit_factor(&profits);
        let has_win = profits.iter().any(|p| *p > 0.0);
        let has_loss = profits.iter().any(|p| *p < 0.0);
        match (has_win, has_loss) {
            (false, _) => prop_assert_eq!(pf, 0.0),
            (true, false) => prop_assert_eq!(pf, f64::INFINITY),
            (true, true) => prop_assert!(pf.is_finite() && pf > 0.0),
        }
    }
}

// ── 4. Summary stats ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn best_and_worst_bracket_samples(values in arb_profits(), higher in any::<bool>()) {
        let stats = FieldStats::from_values(values.iter().copied(), higher);
        prop_assert_eq!(stats.count, values.len());
        let (lo, hi) = if higher { (stats.worst, stats.best) } else { (stats.best, stats.worst) };
        for v in &values {
            prop_assert!(lo <= *v && *v <= hi);
        }
        prop_assert!(stats.std >= 0.0);
    }
}
