//! Engine error taxonomy.
//!
//! Only conditions that interrupt processing are errors. Short price history
//! degrades to a neutral signal and a risk rejection is a normal verdict;
//! neither appears here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Broker/network call timed out or failed. The affected automation is
    /// skipped for this cycle and retried on the next one.
    #[error("transient broker failure: {0}")]
    Transient(String),

    /// Malformed automation parameters. The automation is auto-paused and a
    /// critical alert raised; it never reaches the scanner.
    #[error("fatal configuration for automation {automation_id}: {reason}")]
    FatalConfig { automation_id: i64, reason: String },

    /// Broker fill status unknown. The order is held as pending
    /// verification and reconciled next cycle.
    #[error("ambiguous execution for order {order_id}")]
    ExecutionAmbiguous { order_id: String },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    /// True when the next cycle may simply retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
