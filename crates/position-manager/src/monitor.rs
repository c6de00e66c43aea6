//! Exit-rule evaluation for open positions.
//!
//! State machine per position: cooldown -> monitoring -> closed. While
//! monitoring, the exit ladder runs in priority order and the first match
//! wins, so a position emits at most one exit order per cycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use autopilot_core::automation::Automation;
use autopilot_core::order::TradeOrder;
use autopilot_core::position::{CloseReason, Position, PositionStatus};

/// Positions past their first profit target close the remaining contracts
/// at this multiple of the target.
pub const PROFIT_TARGET_2_MULTIPLE: Decimal = Decimal::TWO;

/// What the ladder decided for one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitDecision {
    pub quantity: u32,
    pub reason: CloseReason,
}

/// Walks the exit ladder for one position. `None` means hold.
///
/// Detached positions (automation deleted) are only force-closed on expiry;
/// every rule-based exit needs the owning automation's parameters.
#[must_use]
pub fn evaluate_exit(
    position: &Position,
    automation: Option<&Automation>,
    now: DateTime<Utc>,
) -> Option<ExitDecision> {
    if position.in_cooldown(now) || !position.is_open() {
        return None;
    }

    let today = now.date_naive();

    // Expired contracts cannot trade; anything the ladder missed before
    // expiry is force-closed at zero.
    if position.days_to_expiry(today) < 0 {
        warn!(
            position_id = position.id,
            contract = position.contract.display_name(),
            "position expired worthless"
        );
        return Some(ExitDecision {
            quantity: position.quantity,
            reason: CloseReason::ExpiredWorthless,
        });
    }

    let automation = automation?;
    let pnl_pct = position.pnl_pct();

    // 1. Stop loss.
    if -pnl_pct >= automation.stop_loss_pct {
        return Some(ExitDecision {
            quantity: position.quantity,
            reason: CloseReason::StopLoss,
        });
    }

    // 2. Second profit target: close everything.
    if pnl_pct >= automation.profit_target_pct * PROFIT_TARGET_2_MULTIPLE {
        return Some(ExitDecision {
            quantity: position.quantity,
            reason: CloseReason::ProfitTarget2,
        });
    }

    // 3. First profit target: scale out half when there is something to
    //    scale, otherwise close.
    if pnl_pct >= automation.profit_target_pct {
        let quantity = if position.quantity > 1 {
            position.quantity / 2
        } else {
            position.quantity
        };
        return Some(ExitDecision {
            quantity,
            reason: CloseReason::ProfitTarget1,
        });
    }

    // 4. Trailing stop, once armed by the activation gain.
    if let Some(ts) = &automation.trailing_stop {
        let hundred = Decimal::from(100);
        let armed = position.peak_price
            >= position.entry_price * (Decimal::ONE + ts.activation_pct / hundred);
        let pullback_floor =
            position.peak_price * (Decimal::ONE - ts.trail_pct / hundred);
        if armed && position.current_price <= pullback_floor {
            return Some(ExitDecision {
                quantity: position.quantity,
                reason: CloseReason::TrailingStop,
            });
        }
    }

    // 5. Held too long.
    if position.days_held(now) >= automation.max_hold_days {
        return Some(ExitDecision {
            quantity: position.quantity,
            reason: CloseReason::MaxHoldDays,
        });
    }

    // 6. Too close to expiry.
    if position.days_to_expiry(today) <= automation.min_dte_exit {
        return Some(ExitDecision {
            quantity: position.quantity,
            reason: CloseReason::DteExit,
        });
    }

    None
}

/// Per-cycle monitor pass: transitions cooldown positions whose window has
/// elapsed and converts exit decisions into closing orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionMonitor;

impl PositionMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Promotes a cooldown position to monitoring once its window elapses.
    /// Returns true when the status changed.
    pub fn advance_state(&self, position: &mut Position, now: DateTime<Utc>) -> bool {
        if position.status == PositionStatus::Cooldown && !position.in_cooldown(now) {
            position.status = PositionStatus::Monitoring;
            info!(position_id = position.id, "cooldown elapsed, monitoring");
            return true;
        }
        false
    }

    /// Builds the closing order for a decided exit.
    #[must_use]
    pub fn exit_order(&self, position: &Position, decision: &ExitDecision) -> TradeOrder {
        info!(
            position_id = position.id,
            contract = position.contract.display_name(),
            reason = %decision.reason,
            quantity = decision.quantity,
            "exit triggered"
        );
        TradeOrder::exit(
            position.id,
            position.automation_id,
            position.contract.clone(),
            decision.quantity,
            decision.reason,
        )
    }
}
