//! Actions and the decoders that turn them into trading intent.
//!
//! One state machine serves every action shape: the decoder is the only part
//! that differs between discrete, continuous and direction/size/stop control.

use super::error::EnvError;
use crate::domain::PositionSide;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscreteAction {
    Hold,
    Buy,
    Sell,
}

/// A policy's requested action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Discrete(DiscreteAction),
    /// Single value in [-1, 1].
    Continuous(f64),
    /// `direction ∈ [-1, 1]`, `size ∈ [0, 1]`, `stop_distance ∈ [0, 0.2]`.
    Directional {
        direction: f64,
        size: f64,
        stop_distance: f64,
    },
}

impl Action {
    pub const HOLD: Action = Action::Discrete(DiscreteAction::Hold);
    pub const BUY: Action = Action::Discrete(DiscreteAction::Buy);
    pub const SELL: Action = Action::Discrete(DiscreteAction::Sell);

    fn kind(&self) -> &'static str {
        match self {
            Action::Discrete(_) => "discrete",
            Action::Continuous(_) => "continuous",
            Action::Directional { .. } => "directional",
        }
    }
}

/// Which side the policy wants to end the step on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Keep whatever is open.
    Keep,
    Side(PositionSide),
}

/// Decoded action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intent {
    pub target: Target,
    /// Upper bound on the committed fraction requested by the action.
    pub size_cap: Option<f64>,
    /// Stop distance for a position opened by this action.
    pub stop_override: Option<f64>,
}

impl Intent {
    fn target(target: Target) -> Self {
        Self {
            target,
            size_cap: None,
            stop_override: None,
        }
    }
}

pub const CONTINUOUS_THRESHOLD: f64 = 0.33;
pub const DIRECTION_THRESHOLD: f64 = 0.3;
pub const MAX_STOP_DISTANCE: f64 = 0.2;

/// Action-decoding strategy of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDecoder {
    /// Hold / Buy / Sell.
    #[default]
    Discrete,
    /// One value; `> 0.33` buys, `< -0.33` sells.
    Continuous,
    /// Direction, size and stop distance; the middle band of direction closes.
    DirectionSizeStop,
}

impl ActionDecoder {
    pub fn name(self) -> &'static str {
        match self {
            ActionDecoder::Discrete => "discrete",
            ActionDecoder::Continuous => "continuous",
            ActionDecoder::DirectionSizeStop => "direction_size_stop",
        }
    }

    /// Decode `action`. Buy targets Long; Sell targets Short when shorting
    /// is enabled and Flat otherwise.
    pub fn decode(
        self,
        action: &Action,
        enable_short: bool,
        max_position_size: f64,
    ) -> Result<Intent, EnvError> {
        let sell_side = if enable_short {
            PositionSide::Short
        } else {
            PositionSide::Flat
        };
        let discrete = |a: DiscreteAction| match a {
            DiscreteAction::Hold => Target::Keep,
            DiscreteAction::Buy => Target::Side(PositionSide::Long),
            DiscreteAction::Sell => Target::Side(sell_side),
        };

        match (self, *action) {
            (ActionDecoder::Discrete, Action::Discrete(a)) => Ok(Intent::target(discrete(a))),
            (ActionDecoder::Continuous, Action::Continuous(v)) => {
                if !v.is_finite() {
                    return Err(EnvError::NonFiniteAction);
                }
                let a = if v > CONTINUOUS_THRESHOLD {
                    DiscreteAction::Buy
                } else if v < -CONTINUOUS_THRESHOLD {
                    DiscreteAction::Sell
                } else {
                    DiscreteAction::Hold
                };
                Ok(Intent::target(discrete(a)))
            }
            (
                ActionDecoder::DirectionSizeStop,
                Action::Directional {
                    direction,
                    size,
                    stop_distance,
                },
            ) => {
                if !(direction.is_finite() && size.is_finite() && stop_distance.is_finite()) {
                    return Err(EnvError::NonFiniteAction);
                }
                let side = if direction > DIRECTION_THRESHOLD {
                    PositionSide::Long
                } else if direction < -DIRECTION_THRESHOLD {
                    sell_side
                } else {
                    PositionSide::Flat
                };
                let stop = stop_distance.clamp(0.0, MAX_STOP_DISTANCE);
                Ok(Intent {
                    target: Target::Side(side),
                    size_cap: Some(size.clamp(0.0, max_position_size)),
                    stop_override: (stop > 0.0).then_some(stop),
                })
            }
            (decoder, other) => Err(EnvError::ActionMismatch {
                decoder: decoder.name(),
                action: other.kind(),
            }),
        }
    }

    /// Uniform random action of this decoder's shape.
    pub fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> Action {
        match self {
            ActionDecoder::Discrete => {
                let a = match rng.gen_range(0..3) {
                    0 => DiscreteAction::Hold,
                    1 => DiscreteAction::Buy,
                    _ => DiscreteAction::Sell,
                };
                Action::Discrete(a)
            }
            ActionDecoder::Continuous => Action::Continuous(rng.gen_range(-1.0..=1.0)),
            ActionDecoder::DirectionSizeStop => Action::Directional {
                direction: rng.gen_range(-1.0..=1.0),
                size: rng.gen_range(0.0..=1.0),
                stop_distance: rng.gen_range(0.0..=MAX_STOP_DISTANCE),
            },
        }
    }
}
