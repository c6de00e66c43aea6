//! Pre-trade risk validation.
//!
//! Every candidate order passes through [`RiskValidator::validate`] before
//! it may reach the executor. Checks run in a fixed order and short-circuit
//! on the first failure.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use autopilot_core::contracts::OptionGreeks;
use autopilot_core::order::{OrderSide, TradeOrder};
use autopilot_core::position::Position;
use autopilot_core::risk_limits::RiskLimits;

/// Stable rejection reason codes.
pub mod reasons {
    pub const INSUFFICIENT_BUYING_POWER: &str = "insufficient_buying_power";
    pub const MAX_POSITION_SIZE: &str = "max_position_size";
    pub const MAX_PORTFOLIO_EXPOSURE: &str = "max_portfolio_exposure";
    pub const MAX_PORTFOLIO_DELTA: &str = "max_portfolio_delta";
    pub const MAX_PORTFOLIO_THETA: &str = "max_portfolio_theta";
    pub const MAX_PORTFOLIO_VEGA: &str = "max_portfolio_vega";
    pub const MAX_OPEN_POSITIONS: &str = "max_open_positions";
    pub const DAILY_LOSS_LIMIT: &str = "daily_loss_limit";
}

/// Account state read once at cycle start and treated as immutable for the
/// duration of the cycle.
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub user_id: i64,
    pub account_equity: Decimal,
    pub buying_power: Decimal,
    pub open_positions: Vec<Position>,
    pub daily_realized_pnl: Decimal,
}

impl PortfolioSnapshot {
    /// Aggregate capital at risk across open positions.
    pub fn capital_at_risk(&self) -> Decimal {
        self.open_positions.iter().map(Position::cost_basis).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    Approved,
    Rejected { reason: String, detail: String },
}

impl Verdict {
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    fn rejected(reason: &str, detail: String) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            detail,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskValidator;

impl RiskValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Gates a candidate entry order against the user's limits.
    #[must_use]
    pub fn validate(
        &self,
        order: &TradeOrder,
        greeks: &OptionGreeks,
        limits: &RiskLimits,
        snapshot: &PortfolioSnapshot,
    ) -> Verdict {
        let cost = order_capital_at_risk(order);

        if cost > snapshot.buying_power {
            return Verdict::rejected(
                reasons::INSUFFICIENT_BUYING_POWER,
                format!("needs {cost}, buying power {}", snapshot.buying_power),
            );
        }

        let equity = snapshot.account_equity;
        if equity > Decimal::ZERO {
            let position_pct = cost / equity * Decimal::from(100);
            if position_pct > limits.max_position_size_pct {
                return Verdict::rejected(
                    reasons::MAX_POSITION_SIZE,
                    format!(
                        "position is {position_pct:.2}% of equity, limit {}%",
                        limits.max_position_size_pct
                    ),
                );
            }

            let exposure_pct =
                (snapshot.capital_at_risk() + cost) / equity * Decimal::from(100);
            if exposure_pct > limits.max_portfolio_exposure_pct {
                return Verdict::rejected(
                    reasons::MAX_PORTFOLIO_EXPOSURE,
                    format!(
                        "exposure would be {exposure_pct:.2}% of equity, limit {}%",
                        limits.max_portfolio_exposure_pct
                    ),
                );
            }
        }

        if let Some(verdict) = self.check_greeks(order, greeks, limits, snapshot) {
            return verdict;
        }

        if snapshot.open_positions.len() >= limits.max_open_positions {
            return Verdict::rejected(
                reasons::MAX_OPEN_POSITIONS,
                format!(
                    "{} positions open, limit {}",
                    snapshot.open_positions.len(),
                    limits.max_open_positions
                ),
            );
        }

        if equity > Decimal::ZERO && snapshot.daily_realized_pnl < Decimal::ZERO {
            let loss_pct = -snapshot.daily_realized_pnl / equity * Decimal::from(100);
            if loss_pct >= limits.max_daily_loss_pct {
                return Verdict::rejected(
                    reasons::DAILY_LOSS_LIMIT,
                    format!(
                        "daily loss {loss_pct:.2}% of equity, ceiling {}%",
                        limits.max_daily_loss_pct
                    ),
                );
            }
        }

        debug!(
            client_order_id = order.client_order_id,
            cost = %cost,
            "order approved"
        );
        Verdict::Approved
    }

    fn check_greeks(
        &self,
        order: &TradeOrder,
        greeks: &OptionGreeks,
        limits: &RiskLimits,
        snapshot: &PortfolioSnapshot,
    ) -> Option<Verdict> {
        let mult = order
            .contract
            .multiplier
            .to_f64()
            .unwrap_or(100.0);
        let qty = f64::from(order.quantity);
        let sign = match order.side {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        };

        let mut delta = sign * greeks.delta * qty * mult;
        let mut theta = sign * greeks.theta * qty * mult;
        let mut vega = sign * greeks.vega * qty * mult;
        for pos in &snapshot.open_positions {
            let pmult = pos.contract.multiplier.to_f64().unwrap_or(100.0);
            let pqty = f64::from(pos.quantity);
            delta += pos.greeks.delta * pqty * pmult;
            theta += pos.greeks.theta * pqty * pmult;
            vega += pos.greeks.vega * pqty * pmult;
        }

        let checks = [
            (delta, limits.max_portfolio_delta, reasons::MAX_PORTFOLIO_DELTA, "delta"),
            (theta, limits.max_portfolio_theta, reasons::MAX_PORTFOLIO_THETA, "theta"),
            (vega, limits.max_portfolio_vega, reasons::MAX_PORTFOLIO_VEGA, "vega"),
        ];
        for (projected, ceiling, reason, name) in checks {
            let ceiling = ceiling.to_f64().unwrap_or(f64::MAX);
            if projected.abs() > ceiling {
                return Some(Verdict::rejected(
                    reason,
                    format!("projected {name} {projected:.1} exceeds ceiling {ceiling:.1}"),
                ));
            }
        }
        None
    }
}

/// Capital a new order puts at risk: premium paid for long entries, the
/// secured notional for short entries.
fn order_capital_at_risk(order: &TradeOrder) -> Decimal {
    let qty = Decimal::from(order.quantity);
    match order.side {
        OrderSide::Buy => {
            order.limit_price.unwrap_or(Decimal::ZERO) * order.contract.multiplier * qty
        }
        OrderSide::Sell => order.contract.strike * order.contract.multiplier * qty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::contracts::{OptionContract, OptionRight};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn contract() -> OptionContract {
        OptionContract::new(
            "NVDA",
            NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            dec!(140),
            OptionRight::Call,
        )
    }

    fn order(quantity: u32, limit: Decimal) -> TradeOrder {
        TradeOrder::entry(1, OrderSide::Buy, contract(), quantity, limit)
    }

    fn greeks() -> OptionGreeks {
        OptionGreeks {
            delta: 0.45,
            gamma: 0.01,
            theta: -0.05,
            vega: 0.10,
        }
    }

    fn snapshot(open: Vec<Position>) -> PortfolioSnapshot {
        PortfolioSnapshot {
            user_id: 7,
            account_equity: dec!(100000),
            buying_power: dec!(50000),
            open_positions: open,
            daily_realized_pnl: Decimal::ZERO,
        }
    }

    fn open_position(entry: Decimal, quantity: u32) -> Position {
        let mut pos = Position::open(1, Some(1), 7, contract(), quantity, entry, Utc::now());
        pos.greeks = greeks();
        pos
    }

    #[test]
    fn modest_order_is_approved() {
        let verdict = RiskValidator::new().validate(
            &order(1, dec!(2.10)),
            &greeks(),
            &RiskLimits::default_for(7),
            &snapshot(vec![]),
        );
        assert!(verdict.is_approved());
    }

    #[test]
    fn buying_power_checked_first() {
        let mut snap = snapshot(vec![]);
        snap.buying_power = dec!(100);
        let verdict = RiskValidator::new().validate(
            &order(1, dec!(2.10)),
            &greeks(),
            &RiskLimits::default_for(7),
            &snap,
        );
        match verdict {
            Verdict::Rejected { reason, .. } => {
                assert_eq!(reason, reasons::INSUFFICIENT_BUYING_POWER);
            }
            Verdict::Approved => panic!("expected rejection"),
        }
    }

    #[test]
    fn oversized_position_rejected() {
        // 60 contracts at $10 = $60k premium on $100k equity = 60% > 5%.
        let verdict = RiskValidator::new().validate(
            &order(60, dec!(10)),
            &greeks(),
            &RiskLimits::default_for(7),
            &snapshot(vec![]),
        );
        match verdict {
            Verdict::Rejected { reason, .. } => assert_eq!(reason, reasons::MAX_POSITION_SIZE),
            Verdict::Approved => panic!("expected rejection"),
        }
    }

    #[test]
    fn aggregate_exposure_rejected() {
        // Existing positions already carry $18k at risk; a $4k order pushes
        // past the 20% ($20k) portfolio ceiling.
        let existing = vec![
            open_position(dec!(45), 2), // 45 * 100 * 2 = $9k
            open_position(dec!(45), 2),
        ];
        let verdict = RiskValidator::new().validate(
            &order(20, dec!(2)), // $4k, within 5% position cap
            &greeks(),
            &RiskLimits::default_for(7),
            &snapshot(existing),
        );
        match verdict {
            Verdict::Rejected { reason, .. } => {
                assert_eq!(reason, reasons::MAX_PORTFOLIO_EXPOSURE);
            }
            Verdict::Approved => panic!("expected rejection"),
        }
    }

    #[test]
    fn exposure_rejection_is_monotonic_as_ceiling_falls() {
        let existing = vec![open_position(dec!(45), 2)];
        let order = order(10, dec!(2));
        let mut rejected_seen = false;

        for ceiling in [30, 20, 13, 9, 5, 1, 0] {
            let mut limits = RiskLimits::default_for(7);
            limits.max_portfolio_exposure_pct = Decimal::from(ceiling);
            limits.max_portfolio_delta = Decimal::from(10_000);
            let verdict = RiskValidator::new().validate(
                &order,
                &greeks(),
                &limits,
                &snapshot(existing.clone()),
            );
            if rejected_seen {
                assert!(
                    !verdict.is_approved(),
                    "approved again at ceiling {ceiling}%"
                );
            }
            if !verdict.is_approved() {
                rejected_seen = true;
            }
        }
        assert!(rejected_seen);
    }

    #[test]
    fn max_open_positions_rejected() {
        let existing = vec![
            open_position(dec!(2), 1),
            open_position(dec!(2), 1),
            open_position(dec!(2), 1),
        ];
        let mut limits = RiskLimits::default_for(7);
        limits.max_open_positions = 3;
        let verdict = RiskValidator::new().validate(
            &order(1, dec!(2.10)),
            &greeks(),
            &limits,
            &snapshot(existing),
        );
        match verdict {
            Verdict::Rejected { reason, .. } => assert_eq!(reason, reasons::MAX_OPEN_POSITIONS),
            Verdict::Approved => panic!("expected rejection"),
        }
    }

    #[test]
    fn daily_loss_ceiling_blocks_new_entries() {
        let mut snap = snapshot(vec![]);
        snap.daily_realized_pnl = dec!(-3500); // 3.5% of $100k, ceiling 3%
        let verdict = RiskValidator::new().validate(
            &order(1, dec!(2.10)),
            &greeks(),
            &RiskLimits::default_for(7),
            &snap,
        );
        match verdict {
            Verdict::Rejected { reason, .. } => assert_eq!(reason, reasons::DAILY_LOSS_LIMIT),
            Verdict::Approved => panic!("expected rejection"),
        }
    }

    #[test]
    fn delta_ceiling_rejected() {
        let mut limits = RiskLimits::default_for(7);
        limits.max_portfolio_delta = dec!(40);
        // 1 contract at delta 0.45 = 45 share-equivalents > 40.
        let verdict = RiskValidator::new().validate(
            &order(1, dec!(2.10)),
            &greeks(),
            &limits,
            &snapshot(vec![]),
        );
        match verdict {
            Verdict::Rejected { reason, .. } => {
                assert_eq!(reason, reasons::MAX_PORTFOLIO_DELTA);
            }
            Verdict::Approved => panic!("expected rejection"),
        }
    }

    #[test]
    fn daily_profit_never_triggers_loss_limit() {
        let mut snap = snapshot(vec![]);
        snap.daily_realized_pnl = dec!(5000);
        let verdict = RiskValidator::new().validate(
            &order(1, dec!(2.10)),
            &greeks(),
            &RiskLimits::default_for(7),
            &snap,
        );
        assert!(verdict.is_approved());
    }
}
