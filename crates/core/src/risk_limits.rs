//! Per-user risk ceilings. Read-only input to the risk validator; only the
//! user (or an explicit settings action) may change them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub user_id: i64,
    /// Absolute portfolio delta ceiling, in share-equivalents.
    pub max_portfolio_delta: Decimal,
    /// Absolute portfolio theta ceiling, dollars per day.
    pub max_portfolio_theta: Decimal,
    /// Absolute portfolio vega ceiling, dollars per vol point.
    pub max_portfolio_vega: Decimal,
    /// Largest single position as a percentage of account equity.
    pub max_position_size_pct: Decimal,
    /// Aggregate capital at risk as a percentage of account equity.
    pub max_portfolio_exposure_pct: Decimal,
    pub max_open_positions: usize,
    /// Daily realized-loss ceiling as a percentage of account equity.
    pub max_daily_loss_pct: Decimal,
}

impl RiskLimits {
    /// Conservative defaults for a newly provisioned user.
    #[must_use]
    pub fn default_for(user_id: i64) -> Self {
        Self {
            user_id,
            max_portfolio_delta: Decimal::from(500),
            max_portfolio_theta: Decimal::from(200),
            max_portfolio_vega: Decimal::from(1000),
            max_position_size_pct: Decimal::from(5),
            max_portfolio_exposure_pct: Decimal::from(20),
            max_open_positions: 10,
            max_daily_loss_pct: Decimal::from(3),
        }
    }
}
