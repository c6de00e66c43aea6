//! Deterministic position management.
//!
//! The monitor walks every open position's exit ladder each cycle; the
//! executor is the only component that talks to the brokerage for order
//! placement and the only one allowed to close a position. No discretionary
//! logic in this crate — all rules are mechanical.

pub mod executor;
pub mod monitor;

pub use executor::{ExecutionResult, TradeExecutor};
pub use monitor::{evaluate_exit, ExitDecision, PositionMonitor};
