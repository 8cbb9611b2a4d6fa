//! Trade — immutable record of one open or close event.

use super::position::PositionSide;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Open,
    Close,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    /// The policy asked for it.
    Signal,
    /// First half of a long/short reversal.
    Flip,
    StopLoss,
    TakeProfit,
    TrailingStop,
}

impl CloseReason {
    /// True for closes forced by the risk manager.
    pub fn is_forced(self) -> bool {
        matches!(
            self,
            CloseReason::StopLoss | CloseReason::TakeProfit | CloseReason::TrailingStop
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Signal => "signal",
            CloseReason::Flip => "flip",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TakeProfit => "take_profit",
            CloseReason::TrailingStop => "trailing_stop",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub step: usize,
    pub timestamp: NaiveDateTime,
    pub kind: TradeKind,
    pub side: PositionSide,
    pub price: f64,
    pub quantity: f64,
    /// Fraction of cash committed (opens only).
    pub position_fraction: Option<f64>,
    /// Net P&L (closes only).
    pub realized_pnl: Option<f64>,
    /// Gross price move in the position's favor (closes only).
    pub pnl_pct: Option<f64>,
    pub close_reason: Option<CloseReason>,
}

impl Trade {
    pub fn open(
        step: usize,
        timestamp: NaiveDateTime,
        side: PositionSide,
        price: f64,
        quantity: f64,
        position_fraction: f64,
    ) -> Self {
        Self {
            step,
            timestamp,
            kind: TradeKind::Open,
            side,
            price,
            quantity,
            position_fraction: Some(position_fraction),
            realized_pnl: None,
            pnl_pct: None,
            close_reason: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn close(
        step: usize,
        timestamp: NaiveDateTime,
        side: PositionSide,
        price: f64,
        quantity: f64,
        realized_pnl: f64,
        pnl_pct: f64,
        reason: CloseReason,
    ) -> Self {
        Self {
            step,
            timestamp,
            kind: TradeKind::Close,
            side,
            price,
            quantity,
            position_fraction: None,
            realized_pnl: Some(realized_pnl),
            pnl_pct: Some(pnl_pct),
            close_reason: Some(reason),
        }
    }

    pub fn is_close(&self) -> bool {
        self.kind == TradeKind::Close
    }

    /// Net P&L of a close, 0 for opens.
    pub fn pnl(&self) -> f64 {
        self.realized_pnl.unwrap_or(0.0)
    }

    pub fn is_winner(&self) -> bool {
        self.is_close() && self.pnl() > 0.0
    }
}
