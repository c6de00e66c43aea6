//! User-owned strategy configuration records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Strategy type an automation trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    LongCall,
    LongPut,
    CoveredCall,
    CashSecuredPut,
}

impl StrategyKind {
    /// Premium-selling strategies profit from elevated implied volatility.
    #[must_use]
    pub const fn is_premium_selling(self) -> bool {
        matches!(self, Self::CoveredCall | Self::CashSecuredPut)
    }
}

/// Active/paused state of an automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationState {
    Active,
    Paused,
}

/// Trailing stop parameters. Armed once the position gains
/// `activation_pct`, then closes on a pullback of `trail_pct` from the peak.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingStop {
    pub activation_pct: Decimal,
    pub trail_pct: Decimal,
}

/// A user-defined strategy rule set the engine scans on every cycle.
///
/// Mutated by the user (edits, pause/resume) and by the engine
/// (`execution_count`, `last_executed`); never by two cycles at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub symbol: String,
    pub strategy: StrategyKind,
    /// Minimum signal confidence required to trade, in [0, 1].
    pub min_confidence: f64,
    /// Contracts per entry.
    pub quantity: u32,
    pub min_dte: i64,
    pub max_dte: i64,
    /// Target delta band, by absolute value.
    pub min_delta: f64,
    pub max_delta: f64,
    pub min_volume: u64,
    pub min_open_interest: u64,
    pub max_spread_pct: Decimal,
    pub profit_target_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub max_hold_days: i64,
    /// Close positions once DTE falls to this floor.
    pub min_dte_exit: i64,
    pub trailing_stop: Option<TrailingStop>,
    pub allow_multiple_positions: bool,
    pub state: AutomationState,
    pub execution_count: u32,
    pub last_executed: Option<DateTime<Utc>>,
}

impl Automation {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == AutomationState::Active
    }

    /// Validates parameter ranges at load time.
    ///
    /// A violation is a fatal-configuration condition: the automation must be
    /// auto-paused and a critical alert raised before it reaches the scanner.
    ///
    /// # Errors
    /// Returns the first violated constraint as a message.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            ));
        }
        if self.quantity == 0 {
            return Err("quantity must be at least 1".to_string());
        }
        if self.min_dte < 0 || self.max_dte < self.min_dte {
            return Err(format!(
                "DTE range must satisfy 0 <= min <= max, got {}..{}",
                self.min_dte, self.max_dte
            ));
        }
        if !(0.0..=1.0).contains(&self.min_delta)
            || !(0.0..=1.0).contains(&self.max_delta)
            || self.max_delta < self.min_delta
        {
            return Err(format!(
                "delta range must satisfy 0 <= min <= max <= 1, got {}..{}",
                self.min_delta, self.max_delta
            ));
        }
        if self.max_spread_pct <= Decimal::ZERO {
            return Err("max_spread_pct must be positive".to_string());
        }
        if self.profit_target_pct <= Decimal::ZERO {
            return Err("profit_target_pct must be positive".to_string());
        }
        if self.stop_loss_pct <= Decimal::ZERO {
            return Err("stop_loss_pct must be positive".to_string());
        }
        if self.max_hold_days <= 0 {
            return Err("max_hold_days must be positive".to_string());
        }
        if self.min_dte_exit < 0 {
            return Err("min_dte_exit must not be negative".to_string());
        }
        if let Some(ts) = &self.trailing_stop {
            if ts.activation_pct <= Decimal::ZERO || ts.trail_pct <= Decimal::ZERO {
                return Err("trailing stop percentages must be positive".to_string());
            }
        }
        Ok(())
    }
}
