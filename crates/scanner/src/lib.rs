//! Opportunity scanning and pre-trade risk gating.
//!
//! The scanner proposes at most one candidate order per automation per
//! cycle, always paired with a diagnostic explaining the outcome. The risk
//! validator is the mandatory gate between any proposal and the executor.

pub mod risk;
pub mod scan;

pub use risk::{PortfolioSnapshot, RiskValidator, Verdict};
pub use scan::{OpportunityScanner, ScanResult};
