//! MarketBar — one timestamped OHLCV sample plus precomputed indicator values.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from validating a single bar.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("field '{field}' is not finite")]
    NonFinite { field: String },

    #[error("close price must be positive, got {0}")]
    NonPositiveClose(f64),
}

/// OHLCV bar for one interval.
///
/// `features` carries indicator columns computed upstream (RSI, MACD,
/// volatility, ...). The core only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
}

impl MarketBar {
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            features: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach an indicator value.
    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    /// Look up a column by name: OHLCV first, then features.
    pub fn column(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume),
            other => self.feature(other),
        }
    }

    /// Check that OHLCV and feature values are finite and the close is tradable.
    pub fn validate(&self) -> Result<(), BarError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(BarError::NonFinite {
                    field: field.to_string(),
                });
            }
        }
        if let Some((name, _)) = self.features.iter().find(|(_, v)| !v.is_finite()) {
            return Err(BarError::NonFinite {
                field: name.clone(),
            });
        }
        if self.close <= 0.0 {
            return Err(BarError::NonPositiveClose(self.close));
        }
        Ok(())
    }
}
