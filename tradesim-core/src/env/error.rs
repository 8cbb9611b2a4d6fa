use crate::domain::BarError;
use crate::risk::RiskConfigError;
use thiserror::Error;

/// Errors from building or driving a [`super::TradingEnv`].
///
/// Everything except `EpisodeFinished` and `ActionMismatch` is raised at
/// construction, before an episode can start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("no market data supplied")]
    EmptyData,

    #[error("need at least {required} bars (window + 2), got {bars}")]
    InsufficientBars { bars: usize, required: usize },

    #[error("bar {index} is malformed")]
    InvalidBar {
        index: usize,
        #[source]
        source: BarError,
    },

    #[error("bar {index} does not have a strictly increasing timestamp")]
    NonIncreasingTimestamp { index: usize },

    #[error("none of the requested observation features are present in the data")]
    NoFeatures,

    #[error("invalid environment config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Risk(#[from] RiskConfigError),

    #[error("{decoder} decoder cannot interpret a {action} action")]
    ActionMismatch {
        decoder: &'static str,
        action: &'static str,
    },

    #[error("action contains a non-finite value")]
    NonFiniteAction,

    #[error("episode has finished; call reset() first")]
    EpisodeFinished,
}
