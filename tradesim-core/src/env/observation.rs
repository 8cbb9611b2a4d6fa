//! Observation building: min-max normalized market window + portfolio features.

use crate::domain::{MarketBar, PortfolioState};
use serde::{Deserialize, Serialize};

pub const PORTFOLIO_FEATURES: usize = 7;

/// What a policy sees before acting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// `window × features`, row-major, each column scaled to [-1, 1].
    pub market: Vec<f64>,
    /// side, position fraction, cash/initial, |holdings|, total return,
    /// value/initial, stop distance.
    pub portfolio: [f64; PORTFOLIO_FEATURES],
    pub step: usize,
    /// Close of the bar the next action will execute at.
    pub close: f64,
}

impl Observation {
    pub fn len(&self) -> usize {
        self.market.len() + PORTFOLIO_FEATURES
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat vector, market window first.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(self.len());
        v.extend_from_slice(&self.market);
        v.extend_from_slice(&self.portfolio);
        v
    }
}

/// Feature columns scaled to [-1, 1] over the whole episode.
#[derive(Debug, Clone)]
pub struct NormalizedFeatures {
    names: Vec<String>,
    /// `bars × names`, row-major.
    values: Vec<f64>,
}

impl NormalizedFeatures {
    /// Keep the requested columns present on every bar and normalize them.
    ///
    /// A constant column maps to 0.
    pub fn build(bars: &[MarketBar], requested: &[String]) -> Self {
        let names: Vec<String> = requested
            .iter()
            .filter(|name| bars.iter().all(|b| b.column(name).is_some()))
            .cloned()
            .collect();

        let n = names.len();
        let mut values = vec![0.0; bars.len() * n];
        for (j, name) in names.iter().enumerate() {
            let column: Vec<f64> = bars
                .iter()
                .map(|b| b.column(name).unwrap_or(0.0))
                .collect();
            let min = column.iter().copied().fold(f64::INFINITY, f64::min);
            let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max > min {
                for (i, v) in column.iter().enumerate() {
                    values[i * n + j] = 2.0 * (v - min) / (max - min) - 1.0;
                }
            }
        }
        Self { names, values }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Rows `[end - window, end)` flattened.
    pub fn window(&self, end: usize, window: usize) -> &[f64] {
        let n = self.names.len();
        &self.values[(end - window) * n..end * n]
    }
}

pub(crate) fn portfolio_features(
    portfolio: &PortfolioState,
    price: f64,
    initial_balance: f64,
) -> [f64; PORTFOLIO_FEATURES] {
    let value = portfolio.value(price);
    let stop_distance = match portfolio.stop_loss_price {
        Some(stop) if price > 0.0 => stop / price - 1.0,
        _ => 0.0,
    };
    [
        portfolio.side.sign(),
        portfolio.position_fraction,
        portfolio.cash_balance / initial_balance,
        portfolio.holdings.abs(),
        (value - initial_balance) / initial_balance,
        value / initial_balance,
        stop_distance,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<MarketBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                MarketBar::new(
                    start + chrono::Duration::minutes(5 * i as i64),
                    *c,
                    *c,
                    *c,
                    *c,
                    1_000.0,
                )
            })
            .collect()
    }

    #[test]
    fn missing_columns_are_skipped() {
        let b = bars(&[1.0, 2.0, 3.0]);
        let requested = vec!["close".to_string(), "rsi_14".to_string()];
        let f = NormalizedFeatures::build(&b, &requested);
        assert_eq!(f.names(), &["close".to_string()]);
    }

    #[test]
    fn columns_scale_to_unit_range() {
        let b = bars(&[10.0, 15.0, 20.0]);
        let f = NormalizedFeatures::build(&b, &["close".to_string(), "volume".to_string()]);
        // close: -1, 0, 1; volume constant → 0
        assert_eq!(f.window(3, 3), &[-1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(f.window(2, 1), &[0.0, 0.0]);
    }

    #[test]
    fn flat_portfolio_features() {
        let p = PortfolioState::new(10_000.0);
        let feats = portfolio_features(&p, 50.0, 10_000.0);
        assert_eq!(feats, [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
    }
}
