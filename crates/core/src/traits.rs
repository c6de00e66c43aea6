//! Seam traits for external capabilities: brokerage, persistence, and the
//! notification sink.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::alert::Alert;
use crate::automation::Automation;
use crate::contracts::{Bar, OptionChain, OptionContract, OptionQuote};
use crate::diagnostics::ScanDiagnostic;
use crate::order::{OrderOutcome, PendingOrder, TradeOrder};
use crate::position::Position;
use crate::risk_limits::RiskLimits;

/// External brokerage capability. Calls are synchronous-with-timeout from
/// the engine's perspective; retry policy lives in the adapter, not here.
#[async_trait]
pub trait Brokerage: Send + Sync {
    async fn option_chain(&self, symbol: &str) -> Result<OptionChain>;
    /// Current quote for a single option contract (marks open positions).
    async fn option_quote(&self, contract: &OptionContract) -> Result<OptionQuote>;
    async fn quote(&self, symbol: &str) -> Result<Decimal>;
    async fn price_history(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>>;
    /// Trailing daily implied-volatility series for the underlying.
    async fn iv_history(&self, symbol: &str, lookback: usize) -> Result<Vec<f64>>;
    async fn place_order(&self, order: &TradeOrder) -> Result<OrderOutcome>;
    /// Re-query the status of a previously submitted order.
    async fn order_status(&self, order_id: &str) -> Result<OrderOutcome>;
    /// Account buying power available for new positions.
    async fn buying_power(&self, user_id: i64) -> Result<Decimal>;
    /// Net liquidation value of the account.
    async fn account_equity(&self, user_id: i64) -> Result<Decimal>;
}

/// Persistence capability, keyed by user id and primary id. Each call is a
/// transactional read-modify-write on one entity.
#[async_trait]
pub trait Store: Send + Sync {
    async fn automations(&self, user_id: i64) -> Result<Vec<Automation>>;
    async fn save_automation(&self, automation: &Automation) -> Result<()>;

    async fn open_positions(&self, user_id: i64) -> Result<Vec<Position>>;
    async fn save_position(&self, position: &Position) -> Result<()>;
    /// Allocates an id and persists a new position.
    async fn insert_position(&self, position: Position) -> Result<Position>;

    async fn risk_limits(&self, user_id: i64) -> Result<RiskLimits>;

    async fn pending_orders(&self, user_id: i64) -> Result<Vec<PendingOrder>>;
    async fn save_pending_order(&self, pending: &PendingOrder) -> Result<()>;
    async fn remove_pending_order(&self, order_id: &str) -> Result<()>;

    async fn save_alert(&self, alert: Alert) -> Result<()>;

    async fn save_diagnostic(&self, diagnostic: &ScanDiagnostic) -> Result<()>;
    async fn diagnostic(&self, automation_id: i64) -> Result<Option<ScanDiagnostic>>;

    /// Realized P&L for the current trading day, for the daily-loss gate.
    async fn daily_realized_pnl(&self, user_id: i64) -> Result<Decimal>;
}

/// Fire-and-forget alert delivery. Failure is logged by implementations and
/// never propagated into trade or position state.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, alert: &Alert);
}
