//! PortfolioState — cash, the signed holding and the risk levels of the open position.
//!
//! This is the only place where commission-adjusted long/short accounting
//! happens. Valuation is `cash_balance + holdings * price` everywhere; the
//! state machine, the info payload and the backtester all call [`PortfolioState::value`].

use super::position::PositionSide;
use serde::{Deserialize, Serialize};

/// Tolerance used when checking the flat invariant.
const FLAT_EPSILON: f64 = 1e-12;

/// Cash and position state of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash_balance: f64,
    /// Signed quantity: positive = long, negative = short.
    pub holdings: f64,
    pub side: PositionSide,
    pub entry_price: f64,
    /// Cash committed at entry (long) or net credit received at entry (short).
    pub entry_notional: f64,
    /// Fraction of cash committed when the position was opened.
    pub position_fraction: f64,
    pub highest_price_since_entry: f64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub trailing_active: bool,
}

/// Outcome of liquidating a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedPosition {
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    /// P&L net of commission on both legs.
    pub realized_pnl: f64,
    /// Gross price move in the position's favor.
    pub pnl_pct: f64,
}

impl PortfolioState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            cash_balance: initial_balance,
            holdings: 0.0,
            side: PositionSide::Flat,
            entry_price: 0.0,
            entry_notional: 0.0,
            position_fraction: 0.0,
            highest_price_since_entry: 0.0,
            stop_loss_price: None,
            take_profit_price: None,
            trailing_active: false,
        }
    }

    /// Mark-to-market value at `price`.
    pub fn value(&self, price: f64) -> f64 {
        self.cash_balance + self.holdings * price
    }

    pub fn is_flat(&self) -> bool {
        self.side.is_flat()
    }

    /// `side == Flat ⇔ holdings == 0 ⇔ entry_price == 0`.
    pub fn is_consistent(&self) -> bool {
        let flat = self.side.is_flat();
        let no_holdings = self.holdings.abs() <= FLAT_EPSILON;
        let no_entry = self.entry_price == 0.0;
        flat == no_holdings && flat == no_entry
    }

    /// Unrealized P&L of the open position at `price`, net of the entry commission.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Flat => 0.0,
            PositionSide::Long => self.holdings * price - self.entry_notional,
            PositionSide::Short => self.entry_notional - self.holdings.abs() * price,
        }
    }

    /// Open a position from flat, committing `fraction` of the cash balance.
    ///
    /// Returns the absolute quantity, or `None` when nothing could be opened
    /// (already in a position, no cash, non-positive fraction or price, or a
    /// quantity too small to hold).
    pub fn open(
        &mut self,
        side: PositionSide,
        price: f64,
        fraction: f64,
        commission: f64,
    ) -> Option<f64> {
        if !self.is_flat() || side.is_flat() || price <= 0.0 || fraction <= 0.0 {
            return None;
        }
        if self.cash_balance <= 0.0 {
            return None;
        }
        let notional = self.cash_balance * fraction.min(1.0);
        let quantity = match side {
            PositionSide::Long => notional * (1.0 - commission) / price,
            _ => notional / price,
        };
        if quantity <= FLAT_EPSILON {
            return None;
        }
        match side {
            PositionSide::Long => {
                self.cash_balance -= notional;
                self.holdings = quantity;
                self.entry_notional = notional;
            }
            PositionSide::Short => {
                let credit = notional * (1.0 - commission);
                self.cash_balance += credit;
                self.holdings = -quantity;
                self.entry_notional = credit;
            }
            PositionSide::Flat => return None,
        }

        self.side = side;
        self.entry_price = price;
        self.position_fraction = fraction.min(1.0);
        self.highest_price_since_entry = price;
        self.trailing_active = false;
        Some(quantity)
    }

    /// Liquidate the whole position at `price` and restore the flat state.
    pub fn close(&mut self, price: f64, commission: f64) -> Option<ClosedPosition> {
        let side = self.side;
        let quantity = self.holdings.abs();
        let realized_pnl = match side {
            PositionSide::Flat => return None,
            PositionSide::Long => {
                let proceeds = quantity * price * (1.0 - commission);
                self.cash_balance += proceeds;
                proceeds - self.entry_notional
            }
            PositionSide::Short => {
                let cover_cost = quantity * price * (1.0 + commission);
                self.cash_balance -= cover_cost;
                self.entry_notional - cover_cost
            }
        };
        let closed = ClosedPosition {
            side,
            quantity,
            entry_price: self.entry_price,
            realized_pnl,
            pnl_pct: side.pnl_pct(self.entry_price, price),
        };
        self.clear_position();
        Some(closed)
    }

    fn clear_position(&mut self) {
        self.holdings = 0.0;
        self.side = PositionSide::Flat;
        self.entry_price = 0.0;
        self.entry_notional = 0.0;
        self.position_fraction = 0.0;
        self.highest_price_since_entry = 0.0;
        self.stop_loss_price = None;
        self.take_profit_price = None;
        self.trailing_active = false;
    }
}
