//! Brokerage capability adapters.
//!
//! The engine talks to [`autopilot_core::traits::Brokerage`]; this crate
//! supplies the adapters around it. Retry and timeout policy is centralized
//! here so scanner and monitor logic stays free of retry semantics.

pub mod paper;
pub mod retry;

pub use paper::{FillBehavior, PaperBrokerage};
pub use retry::{RetryPolicy, RetryingBrokerage};
