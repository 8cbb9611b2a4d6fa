//! Risk management: sizing, trade permission, stop/target/trailing exits.

pub mod config;
pub mod manager;

pub use config::{RiskConfig, RiskConfigError, Timeframe, VolatilityScaling};
pub use manager::{
    estimate_volatility, DenyReason, RiskManager, RiskManagerState, RiskStatus, TradePermission,
};
