//! Order execution and fill bookkeeping.
//!
//! The executor is the single path to the brokerage for placements and the
//! single writer of position open/close state. Ambiguous broker responses
//! become pending-verification records reconciled on the next cycle;
//! positions are never created from unconfirmed fills.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use autopilot_core::alert::{Alert, AlertKind, AlertPriority};
use autopilot_core::automation::Automation;
use autopilot_core::order::{Fill, OrderAction, OrderOutcome, PendingOrder, TradeOrder};
use autopilot_core::position::{Position, PositionStatus};
use autopilot_core::traits::{Brokerage, NotificationSink, Store};

/// Terminal state of one execution attempt.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    Opened(Position),
    Closed(Position),
    Pending(String),
    Rejected(String),
}

pub struct TradeExecutor {
    brokerage: Arc<dyn Brokerage>,
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
}

impl TradeExecutor {
    #[must_use]
    pub fn new(
        brokerage: Arc<dyn Brokerage>,
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            brokerage,
            store,
            sink,
        }
    }

    /// Places an approved entry order and records the resulting position.
    ///
    /// # Errors
    /// Returns an error on transient broker or storage failure.
    pub async fn execute_entry(
        &self,
        order: &TradeOrder,
        automation: &Automation,
        now: DateTime<Utc>,
    ) -> Result<ExecutionResult> {
        match self.brokerage.place_order(order).await? {
            OrderOutcome::Filled(fill) => {
                let position = self.apply_open_fill(order, &fill, automation, now).await?;
                Ok(ExecutionResult::Opened(position))
            }
            OrderOutcome::Pending { order_id } => {
                self.hold_for_verification(order, &order_id, automation.user_id, now)
                    .await?;
                Ok(ExecutionResult::Pending(order_id))
            }
            OrderOutcome::Rejected { reason } => {
                warn!(
                    automation_id = automation.id,
                    reason, "entry order rejected by broker"
                );
                Ok(ExecutionResult::Rejected(reason))
            }
        }
    }

    /// Places a closing order decided by the position monitor.
    ///
    /// # Errors
    /// Returns an error on transient broker or storage failure.
    pub async fn execute_exit(
        &self,
        order: &TradeOrder,
        position: &Position,
        now: DateTime<Utc>,
    ) -> Result<ExecutionResult> {
        match self.brokerage.place_order(order).await? {
            OrderOutcome::Filled(fill) => {
                let position = self.apply_close_fill(order, &fill, position.clone(), now).await?;
                Ok(ExecutionResult::Closed(position))
            }
            OrderOutcome::Pending { order_id } => {
                self.hold_for_verification(order, &order_id, position.user_id, now)
                    .await?;
                Ok(ExecutionResult::Pending(order_id))
            }
            OrderOutcome::Rejected { reason } => {
                warn!(
                    position_id = position.id,
                    reason, "exit order rejected by broker"
                );
                Ok(ExecutionResult::Rejected(reason))
            }
        }
    }

    /// Re-checks every pending order against the broker. Fills are applied,
    /// rejections dropped, still-pending orders carried to the next cycle.
    pub async fn reconcile_pending(&self, user_id: i64, now: DateTime<Utc>) -> Result<u32> {
        let pending = self.store.pending_orders(user_id).await?;
        let mut resolved = 0;

        for record in pending {
            match self.brokerage.order_status(&record.order_id).await {
                Ok(OrderOutcome::Filled(fill)) => {
                    if let Err(e) = self.apply_verified_fill(&record, &fill, now).await {
                        error!(order_id = record.order_id, error = %e, "failed to apply verified fill");
                        continue;
                    }
                    self.store.remove_pending_order(&record.order_id).await?;
                    resolved += 1;
                }
                Ok(OrderOutcome::Rejected { reason }) => {
                    warn!(order_id = record.order_id, reason, "pending order rejected");
                    self.store.remove_pending_order(&record.order_id).await?;
                    resolved += 1;
                }
                Ok(OrderOutcome::Pending { .. }) => {
                    info!(order_id = record.order_id, "order still pending verification");
                }
                Err(e) => {
                    warn!(order_id = record.order_id, error = %e, "verification check failed, retrying next cycle");
                }
            }
        }

        Ok(resolved)
    }

    async fn apply_verified_fill(
        &self,
        record: &PendingOrder,
        fill: &Fill,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match record.order.action {
            OrderAction::Open => {
                let automation_id = record
                    .order
                    .automation_id
                    .ok_or_else(|| anyhow!("entry order without automation"))?;
                let automations = self.store.automations(record.user_id).await?;
                let automation = automations
                    .iter()
                    .find(|a| a.id == automation_id)
                    .ok_or_else(|| anyhow!("automation {automation_id} no longer exists"))?;
                self.apply_open_fill(&record.order, fill, automation, now)
                    .await?;
            }
            OrderAction::Close => {
                let position_id = record
                    .order
                    .position_id
                    .ok_or_else(|| anyhow!("close order without position"))?;
                let positions = self.store.open_positions(record.user_id).await?;
                let position = positions
                    .into_iter()
                    .find(|p| p.id == position_id)
                    .ok_or_else(|| anyhow!("position {position_id} not open"))?;
                self.apply_close_fill(&record.order, fill, position, now)
                    .await?;
            }
        }
        Ok(())
    }

    async fn apply_open_fill(
        &self,
        order: &TradeOrder,
        fill: &Fill,
        automation: &Automation,
        now: DateTime<Utc>,
    ) -> Result<Position> {
        let position = Position::open(
            0,
            order.automation_id,
            automation.user_id,
            fill.contract.clone(),
            fill.quantity,
            fill.avg_fill_price,
            fill.filled_at,
        );
        let position = self.store.insert_position(position).await?;

        let mut updated = automation.clone();
        updated.execution_count += 1;
        updated.last_executed = Some(now);
        self.store.save_automation(&updated).await?;

        info!(
            automation_id = automation.id,
            position_id = position.id,
            contract = position.contract.display_name(),
            price = %fill.avg_fill_price,
            quantity = fill.quantity,
            "position opened"
        );

        self.raise_alert(
            automation.user_id,
            AlertKind::TradeExecuted,
            AlertPriority::Info,
            &position.contract.symbol,
            format!(
                "opened {} x{} at {}",
                position.contract.display_name(),
                fill.quantity,
                fill.avg_fill_price
            ),
            serde_json::json!({
                "position_id": position.id,
                "automation_id": automation.id,
                "fill_price": fill.avg_fill_price.to_string(),
            }),
            now,
        )
        .await;

        Ok(position)
    }

    async fn apply_close_fill(
        &self,
        order: &TradeOrder,
        fill: &Fill,
        mut position: Position,
        now: DateTime<Utc>,
    ) -> Result<Position> {
        let closed_qty = fill.quantity.min(position.quantity);
        let realized = (fill.avg_fill_price - position.entry_price)
            * position.contract.multiplier
            * Decimal::from(closed_qty)
            - fill.commission;
        position.realized_pnl += realized;

        if closed_qty >= position.quantity {
            position.quantity = 0;
            position.status = PositionStatus::Closed;
            position.closed_at = Some(now);
            position.close_reason = order.close_reason;
            position.unrealized_pnl = Decimal::ZERO;
        } else {
            position.quantity -= closed_qty;
            position.unrealized_pnl = (position.current_price - position.entry_price)
                * position.contract.multiplier
                * Decimal::from(position.quantity);
        }
        self.store.save_position(&position).await?;

        info!(
            position_id = position.id,
            closed_qty,
            realized = %realized,
            reason = order.close_reason.map(|r| r.to_string()).unwrap_or_default(),
            "position close applied"
        );

        self.raise_alert(
            position.user_id,
            AlertKind::PositionClosed,
            AlertPriority::Info,
            &position.contract.symbol,
            format!(
                "closed {closed_qty} of {} at {} ({})",
                position.contract.display_name(),
                fill.avg_fill_price,
                order
                    .close_reason
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "manual".to_string()),
            ),
            serde_json::json!({
                "position_id": position.id,
                "realized_pnl": realized.to_string(),
            }),
            now,
        )
        .await;

        Ok(position)
    }

    async fn hold_for_verification(
        &self,
        order: &TradeOrder,
        order_id: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        warn!(
            order_id,
            client_order_id = order.client_order_id,
            "broker response ambiguous, holding order for verification"
        );
        self.store
            .save_pending_order(&PendingOrder {
                order_id: order_id.to_string(),
                user_id,
                order: order.clone(),
                submitted_at: now,
            })
            .await?;

        self.raise_alert(
            user_id,
            AlertKind::OrderPendingVerification,
            AlertPriority::Warning,
            &order.contract.symbol,
            format!("fill status unknown for {}", order.contract.display_name()),
            serde_json::json!({ "order_id": order_id }),
            now,
        )
        .await;
        Ok(())
    }

    /// Persists and publishes an alert. Delivery failure never propagates.
    #[allow(clippy::too_many_arguments)]
    async fn raise_alert(
        &self,
        user_id: i64,
        kind: AlertKind,
        priority: AlertPriority,
        symbol: &str,
        message: String,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let alert = Alert::new(user_id, kind, priority, symbol, message, payload, now);
        if let Err(e) = self.store.save_alert(alert.clone()).await {
            error!(error = %e, "failed to persist alert");
        }
        self.sink.publish(&alert).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autopilot_brokerage::paper::{FillBehavior, PaperBrokerage};
    use autopilot_core::automation::{AutomationState, StrategyKind};
    use autopilot_core::contracts::{OptionContract, OptionRight};
    use autopilot_core::order::OrderSide;
    use autopilot_core::position::CloseReason;
    use autopilot_store::memory::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    struct NullSink;

    #[async_trait]
    impl NotificationSink for NullSink {
        async fn publish(&self, _alert: &Alert) {}
    }

    fn automation() -> Automation {
        Automation {
            id: 1,
            user_id: 7,
            name: "NVDA calls".to_string(),
            symbol: "NVDA".to_string(),
            strategy: StrategyKind::LongCall,
            min_confidence: 0.30,
            quantity: 2,
            min_dte: 20,
            max_dte: 60,
            min_delta: 0.30,
            max_delta: 0.60,
            min_volume: 50,
            min_open_interest: 200,
            max_spread_pct: dec!(10),
            profit_target_pct: dec!(25),
            stop_loss_pct: dec!(50),
            max_hold_days: 30,
            min_dte_exit: 7,
            trailing_stop: None,
            allow_multiple_positions: false,
            state: AutomationState::Active,
            execution_count: 0,
            last_executed: None,
        }
    }

    fn contract() -> OptionContract {
        OptionContract::new(
            "NVDA",
            NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            dec!(140),
            OptionRight::Call,
        )
    }

    fn entry_order() -> TradeOrder {
        TradeOrder::entry(1, OrderSide::Buy, contract(), 2, dec!(2.10))
    }

    struct Harness {
        executor: TradeExecutor,
        broker: Arc<PaperBrokerage>,
        store: MemoryStore,
    }

    async fn harness() -> Harness {
        let broker = Arc::new(PaperBrokerage::new(dec!(0.65)));
        let store = MemoryStore::new();
        store.put_automation(automation()).await;
        let executor = TradeExecutor::new(
            broker.clone(),
            Arc::new(store.clone()),
            Arc::new(NullSink),
        );
        Harness {
            executor,
            broker,
            store,
        }
    }

    #[tokio::test]
    async fn confirmed_fill_creates_cooldown_position() {
        let h = harness().await;
        let result = h
            .executor
            .execute_entry(&entry_order(), &automation(), Utc::now())
            .await
            .unwrap();

        let position = match result {
            ExecutionResult::Opened(p) => p,
            other => panic!("expected opened, got {other:?}"),
        };
        assert_eq!(position.status, PositionStatus::Cooldown);
        assert_eq!(position.entry_price, dec!(2.10));

        // Execution bookkeeping on the automation.
        let updated = h.store.automation(1).await.unwrap();
        assert_eq!(updated.execution_count, 1);
        assert!(updated.last_executed.is_some());
    }

    #[tokio::test]
    async fn ambiguous_fill_never_creates_position() {
        let h = harness().await;
        h.broker.set_fill_behavior(FillBehavior::Pending).await;

        let result = h
            .executor
            .execute_entry(&entry_order(), &automation(), Utc::now())
            .await
            .unwrap();
        assert!(matches!(result, ExecutionResult::Pending(_)));

        assert!(h.store.open_positions(7).await.unwrap().is_empty());
        assert_eq!(h.store.pending_orders(7).await.unwrap().len(), 1);
        // Automation is not credited with an execution it may not have had.
        assert_eq!(h.store.automation(1).await.unwrap().execution_count, 0);
    }

    #[tokio::test]
    async fn pending_entry_reconciles_into_position_after_fill() {
        let h = harness().await;
        h.broker.set_fill_behavior(FillBehavior::Pending).await;

        let order = entry_order();
        h.executor
            .execute_entry(&order, &automation(), Utc::now())
            .await
            .unwrap();

        // Nothing resolves while the broker still reports pending.
        assert_eq!(h.executor.reconcile_pending(7, Utc::now()).await.unwrap(), 0);
        assert!(h.store.open_positions(7).await.unwrap().is_empty());

        // Broker settles between cycles.
        h.broker.resolve_pending(&order.client_order_id, dec!(2.08)).await;
        assert_eq!(h.executor.reconcile_pending(7, Utc::now()).await.unwrap(), 1);

        let positions = h.store.open_positions(7).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].entry_price, dec!(2.08));
        assert!(h.store.pending_orders(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_close_realizes_pnl_and_sets_reason() {
        let h = harness().await;
        let opened = match h
            .executor
            .execute_entry(&entry_order(), &automation(), Utc::now())
            .await
            .unwrap()
        {
            ExecutionResult::Opened(p) => p,
            other => panic!("expected opened, got {other:?}"),
        };

        h.broker
            .set_contract_quote(autopilot_core::contracts::OptionQuote {
                contract: contract(),
                bid: dec!(2.60),
                ask: dec!(2.70),
                last: dec!(2.60),
                volume: 100,
                open_interest: 500,
                iv: 0.4,
                greeks: Default::default(),
            })
            .await;

        let order = TradeOrder::exit(
            opened.id,
            Some(1),
            contract(),
            2,
            CloseReason::ProfitTarget2,
        );
        let result = h
            .executor
            .execute_exit(&order, &opened, Utc::now())
            .await
            .unwrap();

        let closed = match result {
            ExecutionResult::Closed(p) => p,
            other => panic!("expected closed, got {other:?}"),
        };
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.close_reason, Some(CloseReason::ProfitTarget2));
        // (2.65 mid - 2.10) * 100 * 2 - 1.30 commission = 108.70
        assert_eq!(closed.realized_pnl, dec!(108.70));
        assert!(h.store.open_positions(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_close_keeps_position_open() {
        let h = harness().await;
        let opened = match h
            .executor
            .execute_entry(&entry_order(), &automation(), Utc::now())
            .await
            .unwrap()
        {
            ExecutionResult::Opened(p) => p,
            other => panic!("expected opened, got {other:?}"),
        };

        let order = TradeOrder::exit(
            opened.id,
            Some(1),
            contract(),
            1,
            CloseReason::ProfitTarget1,
        );
        let mut priced = order.clone();
        priced.limit_price = Some(dec!(2.60));
        let result = h
            .executor
            .execute_exit(&priced, &opened, Utc::now())
            .await
            .unwrap();

        let remaining = match result {
            ExecutionResult::Closed(p) => p,
            other => panic!("expected closed, got {other:?}"),
        };
        assert_eq!(remaining.quantity, 1);
        assert_ne!(remaining.status, PositionStatus::Closed);
        assert_eq!(h.store.open_positions(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn broker_rejection_is_reported_not_swallowed() {
        let h = harness().await;
        h.broker
            .set_fill_behavior(FillBehavior::Reject("no margin".to_string()))
            .await;

        let result = h
            .executor
            .execute_entry(&entry_order(), &automation(), Utc::now())
            .await
            .unwrap();
        match result {
            ExecutionResult::Rejected(reason) => assert_eq!(reason, "no margin"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(h.store.open_positions(7).await.unwrap().is_empty());
    }
}
