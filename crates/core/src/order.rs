//! Trade orders handed from the scanner/monitor to the executor, and the
//! broker outcomes they resolve to.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contracts::OptionContract;
use crate::position::CloseReason;

/// Whether the order opens a new position or closes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// A transient order request. Consumed and discarded once the brokerage
/// returns a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOrder {
    /// Engine-assigned id. Lets an ambiguous placement be reconciled later
    /// even when the broker never returned its own id.
    pub client_order_id: String,
    pub action: OrderAction,
    pub side: OrderSide,
    pub contract: OptionContract,
    pub quantity: u32,
    /// Limit price intent; `None` means market.
    pub limit_price: Option<Decimal>,
    pub automation_id: Option<i64>,
    /// Set on closing orders.
    pub position_id: Option<i64>,
    /// Set on closing orders: which exit rule fired.
    pub close_reason: Option<CloseReason>,
}

impl TradeOrder {
    /// An opening order proposed by the scanner for an automation.
    #[must_use]
    pub fn entry(
        automation_id: i64,
        side: OrderSide,
        contract: OptionContract,
        quantity: u32,
        limit_price: Decimal,
    ) -> Self {
        Self {
            client_order_id: uuid::Uuid::new_v4().to_string(),
            action: OrderAction::Open,
            side,
            contract,
            quantity,
            limit_price: Some(limit_price),
            automation_id: Some(automation_id),
            position_id: None,
            close_reason: None,
        }
    }

    /// A closing order requested by the position monitor.
    #[must_use]
    pub fn exit(
        position_id: i64,
        automation_id: Option<i64>,
        contract: OptionContract,
        quantity: u32,
        reason: CloseReason,
    ) -> Self {
        Self {
            client_order_id: uuid::Uuid::new_v4().to_string(),
            action: OrderAction::Close,
            side: OrderSide::Sell,
            contract,
            quantity,
            limit_price: None,
            automation_id,
            position_id: Some(position_id),
            close_reason: Some(reason),
        }
    }
}

/// A confirmed fill from the brokerage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub contract: OptionContract,
    pub side: OrderSide,
    pub quantity: u32,
    pub avg_fill_price: Decimal,
    pub commission: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// Broker response to an order placement or status query.
///
/// `Pending` is the ambiguous case (timeout, partial fill, unknown status):
/// the executor must hold the order for verification, never assume a fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderOutcome {
    Filled(Fill),
    Pending { order_id: String },
    Rejected { reason: String },
}

/// An order awaiting fill verification, carried across cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: String,
    pub user_id: i64,
    pub order: TradeOrder,
    pub submitted_at: DateTime<Utc>,
}
