//! Open and closed option positions and their lifecycle.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contracts::{OptionContract, OptionGreeks};

/// Freeze window after entry during which price refresh and exit evaluation
/// are suspended, so a stale first tick cannot trigger a false exit.
pub const COOLDOWN_SECS: i64 = 5 * 60;

/// [`COOLDOWN_SECS`] as a [`Duration`].
#[must_use]
pub fn cooldown_window() -> Duration {
    Duration::seconds(COOLDOWN_SECS)
}

/// Position lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Cooldown,
    Monitoring,
    Closed,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    ProfitTarget1,
    ProfitTarget2,
    TrailingStop,
    MaxHoldDays,
    DteExit,
    ExpiredWorthless,
    Manual,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StopLoss => "stop_loss",
            Self::ProfitTarget1 => "profit_target_1",
            Self::ProfitTarget2 => "profit_target_2",
            Self::TrailingStop => "trailing_stop",
            Self::MaxHoldDays => "max_hold_days",
            Self::DteExit => "dte_exit",
            Self::ExpiredWorthless => "expired_worthless",
            Self::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

/// One options holding, open or closed.
///
/// The automation back-reference is weak: deleting an automation detaches
/// future monitoring but keeps the historical position record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub automation_id: Option<i64>,
    pub user_id: i64,
    pub contract: OptionContract,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    /// Highest price seen since entry; drives the trailing stop.
    pub peak_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub greeks: OptionGreeks,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

impl Position {
    /// Opens a new position in the cooldown state.
    #[must_use]
    pub fn open(
        id: i64,
        automation_id: Option<i64>,
        user_id: i64,
        contract: OptionContract,
        quantity: u32,
        entry_price: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            automation_id,
            user_id,
            contract,
            quantity,
            entry_price,
            current_price: entry_price,
            peak_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            greeks: OptionGreeks::default(),
            status: PositionStatus::Cooldown,
            opened_at,
            closed_at: None,
            close_reason: None,
        }
    }

    /// True while the post-entry cooldown window has not elapsed.
    #[must_use]
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.status == PositionStatus::Cooldown && now < self.opened_at + cooldown_window()
    }

    pub fn is_open(&self) -> bool {
        self.status != PositionStatus::Closed
    }

    /// Total premium paid (or received) at entry.
    pub fn cost_basis(&self) -> Decimal {
        self.entry_price * self.contract.multiplier * Decimal::from(self.quantity)
    }

    /// Unrealized P&L as a percentage of cost basis.
    pub fn pnl_pct(&self) -> Decimal {
        let basis = self.cost_basis();
        if basis.is_zero() {
            return Decimal::ZERO;
        }
        (self.unrealized_pnl / basis) * Decimal::from(100)
    }

    /// Refreshes mark price, peak, and unrealized P&L.
    pub fn mark(&mut self, price: Decimal, greeks: OptionGreeks) {
        self.current_price = price;
        if price > self.peak_price {
            self.peak_price = price;
        }
        self.greeks = greeks;
        self.unrealized_pnl =
            (price - self.entry_price) * self.contract.multiplier * Decimal::from(self.quantity);
    }

    pub fn days_held(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_days()
    }

    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        self.contract.days_to_expiry(today)
    }
}
