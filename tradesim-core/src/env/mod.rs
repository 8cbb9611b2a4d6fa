//! Trading environment: one state machine, pluggable action decoding.

pub mod action;
pub mod config;
pub mod episode;
pub mod error;
pub mod observation;
pub mod stats;

pub use action::{Action, ActionDecoder, DiscreteAction, Intent, Target};
pub use config::{EnvConfig, DEFAULT_FEATURES};
pub use episode::{StepInfo, StepOutcome, TradingEnv};
pub use error::EnvError;
pub use observation::{Observation, PORTFOLIO_FEATURES};
pub use stats::TradeStatistics;
