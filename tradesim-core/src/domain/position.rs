use serde::{Deserialize, Serialize};

/// Direction of the single open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl PositionSide {
    pub fn is_flat(self) -> bool {
        self == PositionSide::Flat
    }

    /// +1 for long, -1 for short, 0 when flat.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Flat => 0.0,
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            PositionSide::Flat => PositionSide::Flat,
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    /// Fractional price move in the position's favor.
    ///
    /// Positive when a long sees price rise or a short sees price fall.
    pub fn pnl_pct(self, entry_price: f64, price: f64) -> f64 {
        if entry_price <= 0.0 {
            return 0.0;
        }
        (price - entry_price) / entry_price * self.sign()
    }
}
