//! Postgres-backed store.
//!
//! Queryable columns (owner, status, timestamps) are real columns; the full
//! record rides along as JSONB so schema churn stays cheap while the engine
//! types evolve. Queries are runtime-checked; switch to `query_as!` once
//! migrations are wired into CI.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use autopilot_core::alert::Alert;
use autopilot_core::automation::Automation;
use autopilot_core::config::DatabaseConfig;
use autopilot_core::diagnostics::ScanDiagnostic;
use autopilot_core::order::PendingOrder;
use autopilot_core::position::Position;
use autopilot_core::risk_limits::RiskLimits;
use autopilot_core::traits::Store;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects a pool against the configured database.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the schema if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if DDL execution fails.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS automations (
                id          BIGINT PRIMARY KEY,
                user_id     BIGINT NOT NULL,
                state       TEXT NOT NULL,
                record      JSONB NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS positions (
                id           BIGSERIAL PRIMARY KEY,
                user_id      BIGINT NOT NULL,
                status       TEXT NOT NULL,
                realized_pnl NUMERIC NOT NULL DEFAULT 0,
                closed_at    TIMESTAMPTZ,
                record       JSONB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pending_orders (
                order_id     TEXT PRIMARY KEY,
                user_id      BIGINT NOT NULL,
                submitted_at TIMESTAMPTZ NOT NULL,
                record       JSONB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS risk_limits (
                user_id BIGINT PRIMARY KEY,
                record  JSONB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS alerts (
                id         BIGSERIAL PRIMARY KEY,
                user_id    BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                record     JSONB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scan_diagnostics (
                automation_id BIGINT PRIMARY KEY,
                user_id       BIGINT NOT NULL,
                cycle_at      TIMESTAMPTZ NOT NULL,
                record        JSONB NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn automations(&self, user_id: i64) -> Result<Vec<Automation>> {
        let rows = sqlx::query(
            "SELECT record FROM automations WHERE user_id = $1 ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record: serde_json::Value = row.get("record");
            out.push(serde_json::from_value(record)?);
        }
        Ok(out)
    }

    async fn save_automation(&self, automation: &Automation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO automations (id, user_id, state, record, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE SET
                state = excluded.state,
                record = excluded.record,
                updated_at = NOW()
            "#,
        )
        .bind(automation.id)
        .bind(automation.user_id)
        .bind(state_str(automation))
        .bind(serde_json::to_value(automation)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_positions(&self, user_id: i64) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            "SELECT record FROM positions WHERE user_id = $1 AND status != 'closed' ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record: serde_json::Value = row.get("record");
            out.push(serde_json::from_value(record)?);
        }
        Ok(out)
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE positions
            SET status = $2, realized_pnl = $3, closed_at = $4, record = $5
            WHERE id = $1
            "#,
        )
        .bind(position.id)
        .bind(status_str(position))
        .bind(position.realized_pnl)
        .bind(position.closed_at)
        .bind(serde_json::to_value(position)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_position(&self, mut position: Position) -> Result<Position> {
        let row = sqlx::query(
            r#"
            INSERT INTO positions (user_id, status, realized_pnl, closed_at, record)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(position.user_id)
        .bind(status_str(&position))
        .bind(position.realized_pnl)
        .bind(position.closed_at)
        .bind(serde_json::to_value(&position)?)
        .fetch_one(&self.pool)
        .await?;

        position.id = row.get("id");
        // Re-save so the JSONB record carries the allocated id.
        self.save_position(&position).await?;
        Ok(position)
    }

    async fn risk_limits(&self, user_id: i64) -> Result<RiskLimits> {
        let row = sqlx::query("SELECT record FROM risk_limits WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let record: serde_json::Value = row.get("record");
                Ok(serde_json::from_value(record)?)
            }
            None => Ok(RiskLimits::default_for(user_id)),
        }
    }

    async fn pending_orders(&self, user_id: i64) -> Result<Vec<PendingOrder>> {
        let rows = sqlx::query(
            "SELECT record FROM pending_orders WHERE user_id = $1 ORDER BY submitted_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record: serde_json::Value = row.get("record");
            out.push(serde_json::from_value(record)?);
        }
        Ok(out)
    }

    async fn save_pending_order(&self, pending: &PendingOrder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_orders (order_id, user_id, submitted_at, record)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO UPDATE SET record = excluded.record
            "#,
        )
        .bind(&pending.order_id)
        .bind(pending.user_id)
        .bind(pending.submitted_at)
        .bind(serde_json::to_value(pending)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_pending_order(&self, order_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_orders WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_alert(&self, alert: Alert) -> Result<()> {
        sqlx::query(
            "INSERT INTO alerts (user_id, created_at, record) VALUES ($1, $2, $3)",
        )
        .bind(alert.user_id)
        .bind(alert.created_at)
        .bind(serde_json::to_value(&alert)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_diagnostic(&self, diagnostic: &ScanDiagnostic) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_diagnostics (automation_id, user_id, cycle_at, record)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (automation_id) DO UPDATE SET
                cycle_at = excluded.cycle_at,
                record = excluded.record
            "#,
        )
        .bind(diagnostic.automation_id)
        .bind(diagnostic.user_id)
        .bind(diagnostic.cycle_at)
        .bind(serde_json::to_value(diagnostic)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn diagnostic(&self, automation_id: i64) -> Result<Option<ScanDiagnostic>> {
        let row = sqlx::query("SELECT record FROM scan_diagnostics WHERE automation_id = $1")
            .bind(automation_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let record: serde_json::Value = row.get("record");
                Ok(Some(serde_json::from_value(record)?))
            }
            None => Ok(None),
        }
    }

    async fn daily_realized_pnl(&self, user_id: i64) -> Result<Decimal> {
        let midnight: DateTime<Utc> = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| DateTime::from_naive_utc_and_offset(t, Utc))
            .unwrap_or_else(Utc::now);

        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(realized_pnl), 0) AS pnl
            FROM positions
            WHERE user_id = $1 AND status = 'closed' AND closed_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(midnight)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("pnl"))
    }
}

fn status_str(position: &Position) -> &'static str {
    use autopilot_core::position::PositionStatus;
    match position.status {
        PositionStatus::Cooldown => "cooldown",
        PositionStatus::Monitoring => "monitoring",
        PositionStatus::Closed => "closed",
    }
}

fn state_str(automation: &Automation) -> &'static str {
    use autopilot_core::automation::AutomationState;
    match automation.state {
        AutomationState::Active => "active",
        AutomationState::Paused => "paused",
    }
}
