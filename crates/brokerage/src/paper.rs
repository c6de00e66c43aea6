//! Paper trading brokerage.
//!
//! Simulates the external brokerage capability with scripted market data
//! and deterministic fills. Used by the test suite and by dry runs before
//! connecting a real broker adapter.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

use autopilot_core::contracts::{Bar, OptionChain, OptionContract, OptionQuote};
use autopilot_core::order::{Fill, OrderOutcome, TradeOrder};
use autopilot_core::traits::Brokerage;

/// How the paper broker answers order placements.
#[derive(Debug, Clone)]
pub enum FillBehavior {
    /// Fill immediately at the limit price (or the seeded contract price).
    Fill,
    /// Report the order as pending; stays pending until resolved.
    Pending,
    /// Reject every order with this reason.
    Reject(String),
}

#[derive(Default)]
struct PaperState {
    chains: HashMap<String, OptionChain>,
    quotes: HashMap<String, Decimal>,
    contract_prices: HashMap<String, OptionQuote>,
    histories: HashMap<String, Vec<Bar>>,
    iv_histories: HashMap<String, Vec<f64>>,
    equity: Decimal,
    buying_power: Decimal,
    pending: HashMap<String, OrderOutcome>,
    placed: Vec<TradeOrder>,
}

pub struct PaperBrokerage {
    state: Mutex<PaperState>,
    behavior: Mutex<FillBehavior>,
    commission_per_contract: Decimal,
    /// Artificial delay before every call, for timeout/contention tests.
    latency: Mutex<std::time::Duration>,
}

fn contract_key(contract: &OptionContract) -> String {
    format!(
        "{}:{}:{}:{}",
        contract.symbol, contract.expiry, contract.strike, contract.right
    )
}

impl PaperBrokerage {
    #[must_use]
    pub fn new(commission_per_contract: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                equity: Decimal::from(100_000),
                buying_power: Decimal::from(50_000),
                ..PaperState::default()
            }),
            behavior: Mutex::new(FillBehavior::Fill),
            commission_per_contract,
            latency: Mutex::new(std::time::Duration::ZERO),
        }
    }

    pub async fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock().await = latency;
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub async fn set_chain(&self, symbol: &str, chain: OptionChain) {
        self.state.lock().await.chains.insert(symbol.to_uppercase(), chain);
    }

    pub async fn set_quote(&self, symbol: &str, price: Decimal) {
        self.state.lock().await.quotes.insert(symbol.to_uppercase(), price);
    }

    pub async fn set_contract_quote(&self, quote: OptionQuote) {
        self.state
            .lock()
            .await
            .contract_prices
            .insert(contract_key(&quote.contract), quote);
    }

    pub async fn set_history(&self, symbol: &str, bars: Vec<Bar>) {
        self.state.lock().await.histories.insert(symbol.to_uppercase(), bars);
    }

    pub async fn set_iv_history(&self, symbol: &str, series: Vec<f64>) {
        self.state
            .lock()
            .await
            .iv_histories
            .insert(symbol.to_uppercase(), series);
    }

    pub async fn set_equity(&self, equity: Decimal) {
        self.state.lock().await.equity = equity;
    }

    pub async fn set_buying_power(&self, buying_power: Decimal) {
        self.state.lock().await.buying_power = buying_power;
    }

    pub async fn set_fill_behavior(&self, behavior: FillBehavior) {
        *self.behavior.lock().await = behavior;
    }

    /// Flips a pending order to a confirmed fill at `price`, as if the
    /// broker settled it between cycles.
    pub async fn resolve_pending(&self, order_id: &str, price: Decimal) {
        let mut state = self.state.lock().await;
        if !matches!(state.pending.get(order_id), Some(OrderOutcome::Pending { .. })) {
            return;
        }
        let Some(order) = state
            .placed
            .iter()
            .find(|o| o.client_order_id == order_id)
            .cloned()
        else {
            return;
        };
        let fill = Self::fill_for(&order, price, self.commission_per_contract);
        state
            .pending
            .insert(order_id.to_string(), OrderOutcome::Filled(fill));
    }

    /// Orders placed so far, for test assertions.
    pub async fn placed_orders(&self) -> Vec<TradeOrder> {
        self.state.lock().await.placed.clone()
    }

    fn fill_for(order: &TradeOrder, price: Decimal, commission_rate: Decimal) -> Fill {
        Fill {
            order_id: order.client_order_id.clone(),
            contract: order.contract.clone(),
            side: order.side,
            quantity: order.quantity,
            avg_fill_price: price,
            commission: commission_rate * Decimal::from(order.quantity),
            filled_at: Utc::now(),
        }
    }

    async fn fill_price(&self, order: &TradeOrder) -> Decimal {
        if let Some(price) = order.limit_price {
            return price;
        }
        let state = self.state.lock().await;
        state
            .contract_prices
            .get(&contract_key(&order.contract))
            .map(OptionQuote::mid)
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl Brokerage for PaperBrokerage {
    async fn option_chain(&self, symbol: &str) -> Result<OptionChain> {
        self.simulate_latency().await;
        self.state
            .lock()
            .await
            .chains
            .get(&symbol.to_uppercase())
            .cloned()
            .ok_or_else(|| anyhow!("no paper chain for {symbol}"))
    }

    async fn option_quote(&self, contract: &OptionContract) -> Result<OptionQuote> {
        self.simulate_latency().await;
        self.state
            .lock()
            .await
            .contract_prices
            .get(&contract_key(contract))
            .cloned()
            .ok_or_else(|| anyhow!("no paper quote for {}", contract.display_name()))
    }

    async fn quote(&self, symbol: &str) -> Result<Decimal> {
        self.simulate_latency().await;
        self.state
            .lock()
            .await
            .quotes
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| anyhow!("no paper price for {symbol}"))
    }

    async fn price_history(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>> {
        self.simulate_latency().await;
        let state = self.state.lock().await;
        let bars = state
            .histories
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_default();
        let start = bars.len().saturating_sub(lookback);
        Ok(bars[start..].to_vec())
    }

    async fn iv_history(&self, symbol: &str, lookback: usize) -> Result<Vec<f64>> {
        self.simulate_latency().await;
        let state = self.state.lock().await;
        let series = state
            .iv_histories
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_default();
        let start = series.len().saturating_sub(lookback);
        Ok(series[start..].to_vec())
    }

    async fn place_order(&self, order: &TradeOrder) -> Result<OrderOutcome> {
        self.simulate_latency().await;
        let behavior = self.behavior.lock().await.clone();
        let price = self.fill_price(order).await;
        let mut state = self.state.lock().await;
        state.placed.push(order.clone());

        let outcome = match behavior {
            FillBehavior::Fill => {
                let fill = Self::fill_for(order, price, self.commission_per_contract);
                info!(
                    order_id = fill.order_id,
                    symbol = fill.contract.symbol,
                    price = %fill.avg_fill_price,
                    quantity = fill.quantity,
                    "paper fill simulated"
                );
                OrderOutcome::Filled(fill)
            }
            FillBehavior::Pending => {
                let outcome = OrderOutcome::Pending {
                    order_id: order.client_order_id.clone(),
                };
                state
                    .pending
                    .insert(order.client_order_id.clone(), outcome.clone());
                outcome
            }
            FillBehavior::Reject(reason) => OrderOutcome::Rejected { reason },
        };

        Ok(outcome)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderOutcome> {
        self.simulate_latency().await;
        self.state
            .lock()
            .await
            .pending
            .get(order_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown paper order {order_id}"))
    }

    async fn buying_power(&self, _user_id: i64) -> Result<Decimal> {
        self.simulate_latency().await;
        Ok(self.state.lock().await.buying_power)
    }

    async fn account_equity(&self, _user_id: i64) -> Result<Decimal> {
        self.simulate_latency().await;
        Ok(self.state.lock().await.equity)
    }
}
