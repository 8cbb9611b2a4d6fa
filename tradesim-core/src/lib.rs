//! TradeSim Core — trading simulation and risk/reward engine.
//!
//! This crate contains the single-asset episode machinery:
//! - Domain types (bars, portfolio state, trades)
//! - Risk manager (sizing, trade permission, stop/target/trailing exits)
//! - Pluggable reward calculators with a name-based factory
//! - Trading environment: one state machine, three action decoders
//! - Deterministic seed hierarchy for repeated runs

pub mod domain;
pub mod env;
pub mod reward;
pub mod risk;
pub mod rng;
