//! Scan diagnostics — the structured record of why an automation did or did
//! not trade this cycle. A first-class output of the scanner, not debug data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::OptionContract;

/// Outcome of one automation's scan within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ScanOutcome {
    /// A candidate order was proposed (it may still be risk-rejected).
    Candidate { contract: OptionContract },
    /// The scan stopped before proposing a trade.
    Blocked { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDiagnostic {
    pub automation_id: i64,
    pub user_id: i64,
    pub cycle_at: DateTime<Utc>,
    pub outcome: ScanOutcome,
    /// Free-form elaboration (signal confidence, filter counts, risk verdict).
    pub detail: String,
}

impl ScanDiagnostic {
    #[must_use]
    pub fn blocked(
        automation_id: i64,
        user_id: i64,
        cycle_at: DateTime<Utc>,
        reason: &str,
        detail: String,
    ) -> Self {
        Self {
            automation_id,
            user_id,
            cycle_at,
            outcome: ScanOutcome::Blocked {
                reason: reason.to_string(),
            },
            detail,
        }
    }

    #[must_use]
    pub fn candidate(
        automation_id: i64,
        user_id: i64,
        cycle_at: DateTime<Utc>,
        contract: OptionContract,
        detail: String,
    ) -> Self {
        Self {
            automation_id,
            user_id,
            cycle_at,
            outcome: ScanOutcome::Candidate { contract },
            detail,
        }
    }

    /// The block reason, if this scan was blocked.
    #[must_use]
    pub fn block_reason(&self) -> Option<&str> {
        match &self.outcome {
            ScanOutcome::Blocked { reason } => Some(reason),
            ScanOutcome::Candidate { .. } => None,
        }
    }
}
