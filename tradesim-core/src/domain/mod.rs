//! Domain types shared by the risk manager, reward calculators and environment.

pub mod bar;
pub mod portfolio;
pub mod position;
pub mod trade;

pub use bar::{BarError, MarketBar};
pub use portfolio::{ClosedPosition, PortfolioState};
pub use position::PositionSide;
pub use trade::{CloseReason, Trade, TradeKind};
