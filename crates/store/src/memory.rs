//! In-memory store for tests and paper trading.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use autopilot_core::alert::Alert;
use autopilot_core::automation::Automation;
use autopilot_core::diagnostics::ScanDiagnostic;
use autopilot_core::order::PendingOrder;
use autopilot_core::position::{Position, PositionStatus};
use autopilot_core::risk_limits::RiskLimits;
use autopilot_core::traits::Store;

#[derive(Default)]
struct Inner {
    automations: HashMap<i64, Automation>,
    positions: HashMap<i64, Position>,
    risk_limits: HashMap<i64, RiskLimits>,
    pending_orders: HashMap<String, PendingOrder>,
    alerts: Vec<Alert>,
    diagnostics: HashMap<i64, ScanDiagnostic>,
    next_position_id: i64,
    next_alert_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_automation(&self, automation: Automation) {
        self.inner
            .write()
            .await
            .automations
            .insert(automation.id, automation);
    }

    pub async fn put_risk_limits(&self, limits: RiskLimits) {
        self.inner
            .write()
            .await
            .risk_limits
            .insert(limits.user_id, limits);
    }

    pub async fn put_position(&self, position: Position) {
        self.inner
            .write()
            .await
            .positions
            .insert(position.id, position);
    }

    pub async fn alerts(&self, user_id: i64) -> Vec<Alert> {
        self.inner
            .read()
            .await
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn position(&self, id: i64) -> Option<Position> {
        self.inner.read().await.positions.get(&id).cloned()
    }

    pub async fn automation(&self, id: i64) -> Option<Automation> {
        self.inner.read().await.automations.get(&id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn automations(&self, user_id: i64) -> Result<Vec<Automation>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Automation> = inner
            .automations
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.id);
        Ok(out)
    }

    async fn save_automation(&self, automation: &Automation) -> Result<()> {
        self.inner
            .write()
            .await
            .automations
            .insert(automation.id, automation.clone());
        Ok(())
    }

    async fn open_positions(&self, user_id: i64) -> Result<Vec<Position>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Position> = inner
            .positions
            .values()
            .filter(|p| p.user_id == user_id && p.is_open())
            .cloned()
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        self.inner
            .write()
            .await
            .positions
            .insert(position.id, position.clone());
        Ok(())
    }

    async fn insert_position(&self, mut position: Position) -> Result<Position> {
        let mut inner = self.inner.write().await;
        inner.next_position_id += 1;
        position.id = inner.next_position_id;
        inner.positions.insert(position.id, position.clone());
        Ok(position)
    }

    async fn risk_limits(&self, user_id: i64) -> Result<RiskLimits> {
        Ok(self
            .inner
            .read()
            .await
            .risk_limits
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| RiskLimits::default_for(user_id)))
    }

    async fn pending_orders(&self, user_id: i64) -> Result<Vec<PendingOrder>> {
        let inner = self.inner.read().await;
        let mut out: Vec<PendingOrder> = inner
            .pending_orders
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(out)
    }

    async fn save_pending_order(&self, pending: &PendingOrder) -> Result<()> {
        self.inner
            .write()
            .await
            .pending_orders
            .insert(pending.order_id.clone(), pending.clone());
        Ok(())
    }

    async fn remove_pending_order(&self, order_id: &str) -> Result<()> {
        self.inner.write().await.pending_orders.remove(order_id);
        Ok(())
    }

    async fn save_alert(&self, mut alert: Alert) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.next_alert_id += 1;
        alert.id = inner.next_alert_id;
        inner.alerts.push(alert);
        Ok(())
    }

    async fn save_diagnostic(&self, diagnostic: &ScanDiagnostic) -> Result<()> {
        self.inner
            .write()
            .await
            .diagnostics
            .insert(diagnostic.automation_id, diagnostic.clone());
        Ok(())
    }

    async fn diagnostic(&self, automation_id: i64) -> Result<Option<ScanDiagnostic>> {
        Ok(self
            .inner
            .read()
            .await
            .diagnostics
            .get(&automation_id)
            .cloned())
    }

    async fn daily_realized_pnl(&self, user_id: i64) -> Result<Decimal> {
        let today = Utc::now().date_naive();
        let inner = self.inner.read().await;
        Ok(inner
            .positions
            .values()
            .filter(|p| {
                p.user_id == user_id
                    && p.status == PositionStatus::Closed
                    && p.closed_at.is_some_and(|t| t.date_naive() == today)
            })
            .map(|p| p.realized_pnl)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::contracts::{OptionContract, OptionRight};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn position(user_id: i64) -> Position {
        let contract = OptionContract::new(
            "NVDA",
            NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            dec!(140),
            OptionRight::Call,
        );
        Position::open(0, Some(1), user_id, contract, 1, dec!(2.00), Utc::now())
    }

    #[tokio::test]
    async fn insert_position_allocates_ids() {
        let store = MemoryStore::new();
        let a = store.insert_position(position(7)).await.unwrap();
        let b = store.insert_position(position(7)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.open_positions(7).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn open_positions_excludes_closed_and_other_users() {
        let store = MemoryStore::new();
        let mut closed = store.insert_position(position(7)).await.unwrap();
        closed.status = PositionStatus::Closed;
        store.save_position(&closed).await.unwrap();
        store.insert_position(position(8)).await.unwrap();

        assert!(store.open_positions(7).await.unwrap().is_empty());
        assert_eq!(store.open_positions(8).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn risk_limits_default_when_absent() {
        let store = MemoryStore::new();
        let limits = store.risk_limits(42).await.unwrap();
        assert_eq!(limits.user_id, 42);
        assert_eq!(limits.max_open_positions, 10);
    }

    #[tokio::test]
    async fn daily_pnl_sums_positions_closed_today() {
        let store = MemoryStore::new();
        let mut p = store.insert_position(position(7)).await.unwrap();
        p.status = PositionStatus::Closed;
        p.realized_pnl = dec!(-150);
        p.closed_at = Some(Utc::now());
        store.save_position(&p).await.unwrap();

        assert_eq!(store.daily_realized_pnl(7).await.unwrap(), dec!(-150));
    }

    #[tokio::test]
    async fn diagnostics_keep_last_scan_per_automation() {
        let store = MemoryStore::new();
        let first = ScanDiagnostic::blocked(1, 7, Utc::now(), "confidence too low", String::new());
        let second = ScanDiagnostic::blocked(1, 7, Utc::now(), "position already open", String::new());
        store.save_diagnostic(&first).await.unwrap();
        store.save_diagnostic(&second).await.unwrap();

        let got = store.diagnostic(1).await.unwrap().unwrap();
        assert_eq!(got.block_reason(), Some("position already open"));
    }
}
