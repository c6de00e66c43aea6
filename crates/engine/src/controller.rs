//! The master controller: per-cycle orchestration and adaptive scheduling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use autopilot_core::alert::{Alert, AlertKind, AlertPriority};
use autopilot_core::automation::{Automation, AutomationState};
use autopilot_core::config::EngineSettings;
use autopilot_core::diagnostics::ScanDiagnostic;
use autopilot_core::risk_limits::RiskLimits;
use autopilot_core::session::{MarketSession, MarketSessionClock, SessionState};
use autopilot_core::traits::{Brokerage, NotificationSink, Store};
use autopilot_position_manager::executor::{ExecutionResult, TradeExecutor};
use autopilot_position_manager::monitor::{evaluate_exit, PositionMonitor};
use autopilot_scanner::risk::{PortfolioSnapshot, RiskValidator, Verdict};
use autopilot_scanner::scan::OpportunityScanner;
use autopilot_signals::volatility::VolatilityRanker;

use crate::status::EngineStatus;

/// Signals at or above this confidence are elevated to persisted alerts.
pub const SIGNAL_ALERT_CONFIDENCE: f64 = 0.75;

/// Diagnostic reason recorded when a broker call fails for the cycle.
pub const REASON_BROKER_UNAVAILABLE: &str = "broker unavailable";

/// What one cycle did, for logs and operators.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub user_id: i64,
    pub session: Option<MarketSession>,
    pub pending_resolved: u32,
    pub exits_triggered: u32,
    pub entries_placed: u32,
    pub automations_scanned: u32,
    pub automations_skipped: u32,
}

pub struct MasterController {
    brokerage: Arc<dyn Brokerage>,
    store: Arc<dyn Store>,
    executor: TradeExecutor,
    scanner: OpportunityScanner,
    validator: RiskValidator,
    monitor: PositionMonitor,
    clock: MarketSessionClock,
    settings: EngineSettings,
    /// Per-user mutual-exclusion tokens: a scheduled tick and a manual
    /// "run now" can never run the same user concurrently.
    tokens: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    stop_flag: AtomicBool,
    status: RwLock<EngineStatus>,
}

impl MasterController {
    #[must_use]
    pub fn new(
        brokerage: Arc<dyn Brokerage>,
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
        settings: EngineSettings,
    ) -> Self {
        let scanner = OpportunityScanner::new(
            brokerage.clone(),
            VolatilityRanker::new(settings.iv_sample_floor),
            settings.history_lookback,
        );
        let executor = TradeExecutor::new(brokerage.clone(), store.clone(), sink);
        Self {
            brokerage,
            store,
            executor,
            scanner,
            validator: RiskValidator::new(),
            monitor: PositionMonitor::new(),
            clock: MarketSessionClock::new(),
            settings,
            tokens: Mutex::new(HashMap::new()),
            stop_flag: AtomicBool::new(false),
            status: RwLock::new(EngineStatus::default()),
        }
    }

    /// Runs the scheduler loop until [`stop`](Self::stop) is called.
    /// Cadence follows the market session: 15 minutes regular, 30 minutes
    /// extended hours, hourly (or suspended) while closed.
    pub async fn run(&self) -> Result<()> {
        self.status.write().await.running = true;
        info!(users = ?self.settings.user_ids, "engine started");

        while !self.stop_flag.load(Ordering::SeqCst) {
            let now = Utc::now();
            let state = self.clock.session_at(now);

            if state.session != MarketSession::Closed || self.settings.run_while_closed {
                for &user_id in &self.settings.user_ids {
                    match self.tick(user_id, Utc::now()).await {
                        Ok(report) => info!(
                            user_id,
                            exits = report.exits_triggered,
                            entries = report.entries_placed,
                            scanned = report.automations_scanned,
                            "cycle complete"
                        ),
                        Err(e) => error!(user_id, error = %e, "cycle failed"),
                    }
                }
            }

            let delay = self.cycle_delay(&state, now);
            {
                let mut status = self.status.write().await;
                status.next_cycle_secs = Some(delay.as_secs());
            }
            tokio::time::sleep(delay).await;
        }

        self.status.write().await.running = false;
        info!("engine stopped");
        Ok(())
    }

    /// Requests the scheduler loop to wind down after the current cycle.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub async fn status(&self) -> EngineStatus {
        self.status.read().await.clone()
    }

    /// Last scan diagnostic for an automation.
    pub async fn diagnostics(&self, automation_id: i64) -> Result<Option<ScanDiagnostic>> {
        self.store.diagnostic(automation_id).await
    }

    /// Runs one scheduled cycle, waiting for the user's token.
    pub async fn tick(&self, user_id: i64, now: DateTime<Utc>) -> Result<CycleReport> {
        let token = self.token_for(user_id).await;
        let _guard = token.lock().await;
        self.run_cycle(user_id, now).await
    }

    /// Out-of-band cycle request. Fails fast instead of queueing when a
    /// cycle already holds the user's token.
    pub async fn run_cycle_now(&self, user_id: i64) -> Result<CycleReport> {
        let token = self.token_for(user_id).await;
        let guard = token
            .try_lock()
            .map_err(|_| anyhow!("cycle already running for user {user_id}"))?;
        let report = self.run_cycle(user_id, Utc::now()).await;
        drop(guard);
        report
    }

    async fn token_for(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.tokens
            .lock()
            .await
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn cycle_delay(&self, state: &SessionState, now: DateTime<Utc>) -> Duration {
        let secs = match state.session {
            MarketSession::Regular => 15 * 60,
            MarketSession::PreMarket | MarketSession::AfterHours => 30 * 60,
            MarketSession::Closed => {
                let until_open = state.seconds_until_transition(now).max(60) as u64;
                if self.settings.run_while_closed {
                    3600
                } else {
                    return Duration::from_secs(until_open.min(3600));
                }
            }
        };
        Duration::from_secs(secs)
    }

    /// One full cycle, token already held: reconcile, monitor, then scan.
    async fn run_cycle(&self, user_id: i64, now: DateTime<Utc>) -> Result<CycleReport> {
        let started = std::time::Instant::now();
        let session = self.clock.session_at(now).session;
        let mut report = CycleReport {
            user_id,
            session: Some(session),
            ..CycleReport::default()
        };

        report.pending_resolved = self
            .executor
            .reconcile_pending(user_id, now)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id, error = %e, "pending reconciliation failed");
                0
            });

        // Risk limits and account state are read once and held immutable
        // for the whole cycle.
        let limits = self.store.risk_limits(user_id).await?;
        let account_equity = self
            .brokerage
            .account_equity(user_id)
            .await
            .context("account equity unavailable")?;
        let buying_power = self.brokerage.buying_power(user_id).await?;
        let daily_realized_pnl = self.store.daily_realized_pnl(user_id).await?;

        let automations = self.store.automations(user_id).await?;

        // Monitor runs to completion before the scanner so freed capacity
        // is visible to this cycle's entry decisions.
        report.exits_triggered = self.monitor_phase(user_id, &automations, now).await?;

        // Re-read after exits.
        let open_positions = self.store.open_positions(user_id).await?;
        let mut snapshot = PortfolioSnapshot {
            user_id,
            account_equity,
            buying_power,
            open_positions,
            daily_realized_pnl,
        };

        for automation in &automations {
            // Cooperative cancellation checkpoint between automations.
            if self.stop_flag.load(Ordering::SeqCst) {
                info!(user_id, "cycle cancelled between automations");
                break;
            }
            if !automation.is_active() {
                continue;
            }
            report.automations_scanned += 1;

            match self.scan_one(automation, &mut snapshot, &limits, now).await {
                Ok(placed) => {
                    if placed {
                        report.entries_placed += 1;
                    }
                }
                Err(e) => {
                    // One automation's failure must not abort the rest.
                    report.automations_skipped += 1;
                    warn!(
                        automation_id = automation.id,
                        error = %e,
                        "automation skipped this cycle"
                    );
                    let diagnostic = ScanDiagnostic::blocked(
                        automation.id,
                        user_id,
                        now,
                        REASON_BROKER_UNAVAILABLE,
                        e.to_string(),
                    );
                    if let Err(e) = self.store.save_diagnostic(&diagnostic).await {
                        error!(error = %e, "failed to save diagnostic");
                    }
                }
            }
        }

        let elapsed = started.elapsed().as_millis() as u64;
        let mut status = self.status.write().await;
        status.cycles_completed += 1;
        status.last_cycle_at = Some(now);
        status.last_cycle_ms = Some(elapsed);
        status.last_session = Some(session);

        Ok(report)
    }

    /// Refreshes every open position and executes triggered exits.
    async fn monitor_phase(
        &self,
        user_id: i64,
        automations: &[Automation],
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let positions = self.store.open_positions(user_id).await?;
        let mut exits = 0;

        for mut position in positions {
            if position.in_cooldown(now) {
                continue;
            }
            self.monitor.advance_state(&mut position, now);

            // Price refresh is best-effort: a stale mark is better than a
            // skipped exit ladder when the broker hiccups.
            match self.brokerage.option_quote(&position.contract).await {
                Ok(quote) => position.mark(quote.mid(), quote.greeks),
                Err(e) => warn!(
                    position_id = position.id,
                    error = %e,
                    "price refresh failed, evaluating on last mark"
                ),
            }
            self.store.save_position(&position).await?;

            let automation = automations
                .iter()
                .find(|a| Some(a.id) == position.automation_id);
            let Some(decision) = evaluate_exit(&position, automation, now) else {
                continue;
            };

            let order = self.monitor.exit_order(&position, &decision);
            match self.executor.execute_exit(&order, &position, now).await {
                Ok(ExecutionResult::Closed(_)) => exits += 1,
                Ok(ExecutionResult::Pending(order_id)) => {
                    info!(position_id = position.id, order_id, "exit pending verification");
                }
                Ok(ExecutionResult::Rejected(reason)) => {
                    warn!(position_id = position.id, reason, "exit rejected");
                }
                Ok(ExecutionResult::Opened(_)) => {}
                Err(e) => {
                    warn!(position_id = position.id, error = %e, "exit failed, retrying next cycle");
                }
            }
        }

        Ok(exits)
    }

    /// Scans one automation and, when approved, executes the entry.
    /// Returns whether an entry order was placed.
    async fn scan_one(
        &self,
        automation: &Automation,
        snapshot: &mut PortfolioSnapshot,
        limits: &RiskLimits,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if let Err(reason) = automation.validate() {
            self.pause_misconfigured(automation, &reason, now).await?;
            return Ok(false);
        }

        let result = self
            .scanner
            .scan(automation, &snapshot.open_positions, now)
            .await?;

        if let Some(signal) = &result.signal {
            if signal.confidence >= SIGNAL_ALERT_CONFIDENCE {
                let alert = Alert::new(
                    automation.user_id,
                    AlertKind::SignalTriggered,
                    AlertPriority::Info,
                    &signal.symbol,
                    format!(
                        "{:?} signal at {:.2} confidence",
                        signal.direction, signal.confidence
                    ),
                    serde_json::to_value(signal).unwrap_or_default(),
                    now,
                );
                if let Err(e) = self.store.save_alert(alert).await {
                    error!(error = %e, "failed to persist signal alert");
                }
            }
        }

        let Some((order, quote)) = result.candidate else {
            self.store.save_diagnostic(&result.diagnostic).await?;
            return Ok(false);
        };

        // The mandatory gate: no order reaches the executor unvalidated.
        let verdict = self
            .validator
            .validate(&order, &quote.greeks, limits, snapshot);
        if let Verdict::Rejected { reason, detail } = verdict {
            let diagnostic = ScanDiagnostic::blocked(
                automation.id,
                automation.user_id,
                now,
                &reason,
                detail,
            );
            self.store.save_diagnostic(&diagnostic).await?;
            return Ok(false);
        }

        self.store.save_diagnostic(&result.diagnostic).await?;
        match self.executor.execute_entry(&order, automation, now).await? {
            ExecutionResult::Opened(position) => {
                // Later automations in this cycle must see the new
                // position in their capacity checks.
                snapshot.open_positions.push(position);
                Ok(true)
            }
            ExecutionResult::Pending(_) | ExecutionResult::Rejected(_) => Ok(false),
            ExecutionResult::Closed(_) => Ok(false),
        }
    }

    /// Fatal-configuration handling: pause the automation and raise a
    /// critical alert before it can reach the scanner again.
    async fn pause_misconfigured(
        &self,
        automation: &Automation,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        warn!(
            automation_id = automation.id,
            reason, "invalid automation configuration, pausing"
        );
        let mut paused = automation.clone();
        paused.state = AutomationState::Paused;
        self.store.save_automation(&paused).await?;

        let alert = Alert::new(
            automation.user_id,
            AlertKind::AutomationPaused,
            AlertPriority::Critical,
            &automation.symbol,
            format!("automation '{}' paused: {reason}", automation.name),
            serde_json::json!({ "automation_id": automation.id, "reason": reason }),
            now,
        );
        self.store.save_alert(alert).await?;

        let diagnostic = ScanDiagnostic::blocked(
            automation.id,
            automation.user_id,
            now,
            "invalid configuration",
            reason.to_string(),
        );
        self.store.save_diagnostic(&diagnostic).await?;
        Ok(())
    }
}
