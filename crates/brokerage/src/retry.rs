//! Centralized retry/backoff and timeout policy for brokerage calls.
//!
//! Read calls (chain, quote, history) are retried with exponential backoff.
//! Order placement is never blindly retried: a timed-out placement is
//! reported as `Pending` under the client order id so the executor can
//! reconcile it next cycle instead of double-submitting.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use autopilot_core::config::BrokerSettings;
use autopilot_core::contracts::{Bar, OptionChain, OptionContract, OptionQuote};
use autopilot_core::order::{OrderOutcome, TradeOrder};
use autopilot_core::traits::Brokerage;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_settings(settings: &BrokerSettings) -> Self {
        Self {
            call_timeout: Duration::from_secs(settings.call_timeout_secs),
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
        }
    }

    /// Runs `op` with a per-attempt timeout, retrying transient failures
    /// with exponential backoff. Returns the last error once retries are
    /// exhausted.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if attempt >= self.max_retries => {
                    return Err(e.context(format!("{label} failed after {attempt} retries")));
                }
                Err(_) if attempt >= self.max_retries => {
                    return Err(anyhow!("{label} timed out after {attempt} retries"));
                }
                Ok(Err(e)) => {
                    warn!(label, attempt, error = %e, "brokerage call failed, retrying");
                }
                Err(_) => {
                    warn!(label, attempt, "brokerage call timed out, retrying");
                }
            }
            tokio::time::sleep(self.base_delay * 2_u32.pow(attempt)).await;
            attempt += 1;
        }
    }
}

/// Decorator applying [`RetryPolicy`] uniformly to an inner brokerage.
pub struct RetryingBrokerage {
    inner: Arc<dyn Brokerage>,
    policy: RetryPolicy,
}

impl RetryingBrokerage {
    #[must_use]
    pub fn new(inner: Arc<dyn Brokerage>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Brokerage for RetryingBrokerage {
    async fn option_chain(&self, symbol: &str) -> Result<OptionChain> {
        self.policy
            .run("option_chain", || self.inner.option_chain(symbol))
            .await
    }

    async fn option_quote(&self, contract: &OptionContract) -> Result<OptionQuote> {
        self.policy
            .run("option_quote", || self.inner.option_quote(contract))
            .await
    }

    async fn quote(&self, symbol: &str) -> Result<Decimal> {
        self.policy.run("quote", || self.inner.quote(symbol)).await
    }

    async fn price_history(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>> {
        self.policy
            .run("price_history", || self.inner.price_history(symbol, lookback))
            .await
    }

    async fn iv_history(&self, symbol: &str, lookback: usize) -> Result<Vec<f64>> {
        self.policy
            .run("iv_history", || self.inner.iv_history(symbol, lookback))
            .await
    }

    async fn place_order(&self, order: &TradeOrder) -> Result<OrderOutcome> {
        // Single attempt: a repeated placement could double-fill. A timeout
        // becomes Pending so the executor reconciles instead of assuming.
        match tokio::time::timeout(self.policy.call_timeout, self.inner.place_order(order)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    client_order_id = order.client_order_id,
                    "order placement timed out, holding for verification"
                );
                Ok(OrderOutcome::Pending {
                    order_id: order.client_order_id.clone(),
                })
            }
        }
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderOutcome> {
        self.policy
            .run("order_status", || self.inner.order_status(order_id))
            .await
    }

    async fn buying_power(&self, user_id: i64) -> Result<Decimal> {
        self.policy
            .run("buying_power", || self.inner.buying_power(user_id))
            .await
    }

    async fn account_equity(&self, user_id: i64) -> Result<Decimal> {
        self.policy
            .run("account_equity", || self.inner.account_equity(user_id))
            .await
    }
}
