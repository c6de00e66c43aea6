//! Per-automation opportunity scanning and contract selection.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use autopilot_core::automation::{Automation, StrategyKind};
use autopilot_core::contracts::{OptionQuote, OptionRight};
use autopilot_core::diagnostics::ScanDiagnostic;
use autopilot_core::order::{OrderSide, TradeOrder};
use autopilot_core::position::Position;
use autopilot_core::traits::Brokerage;
use autopilot_signals::generator::{Signal, SignalDirection, SignalGenerator};
use autopilot_signals::technical::TechnicalAnalyzer;
use autopilot_signals::volatility::{IvMetrics, VolatilityRanker};

// Contract scoring weights. Tunable pending calibration; must sum to 1.
pub const W_LIQUIDITY: f64 = 0.30;
pub const W_SPREAD: f64 = 0.25;
pub const W_DTE_FIT: f64 = 0.25;
pub const W_DELTA_FIT: f64 = 0.20;

/// Liquidity saturates at this multiple of the automation's floor.
const LIQUIDITY_SATURATION: f64 = 10.0;

/// Stable diagnostic reason codes.
pub mod reasons {
    pub const POSITION_ALREADY_OPEN: &str = "position already open";
    pub const CONFIDENCE_TOO_LOW: &str = "confidence too low";
    pub const DIRECTION_MISMATCH: &str = "signal direction does not fit strategy";
    pub const NO_MATCHING_CONTRACTS: &str = "no contracts match filters";
}

/// Output of one automation's scan.
pub struct ScanResult {
    /// The proposed order plus the quote it was built from (the quote
    /// carries the greeks the risk validator projects with).
    pub candidate: Option<(TradeOrder, OptionQuote)>,
    pub signal: Option<Signal>,
    pub diagnostic: ScanDiagnostic,
}

pub struct OpportunityScanner {
    brokerage: Arc<dyn Brokerage>,
    analyzer: TechnicalAnalyzer,
    ranker: VolatilityRanker,
    generator: SignalGenerator,
    history_lookback: usize,
}

impl OpportunityScanner {
    #[must_use]
    pub fn new(
        brokerage: Arc<dyn Brokerage>,
        ranker: VolatilityRanker,
        history_lookback: usize,
    ) -> Self {
        Self {
            brokerage,
            analyzer: TechnicalAnalyzer::new(),
            ranker,
            generator: SignalGenerator::new(),
            history_lookback,
        }
    }

    /// Scans one automation. Produces at most one candidate order and
    /// always a diagnostic.
    ///
    /// # Errors
    /// Returns an error only for transient broker failures; the caller
    /// skips the automation for this cycle and records the reason.
    pub async fn scan(
        &self,
        automation: &Automation,
        open_positions: &[Position],
        now: DateTime<Utc>,
    ) -> Result<ScanResult> {
        if !automation.allow_multiple_positions {
            let already_open = open_positions
                .iter()
                .any(|p| p.automation_id == Some(automation.id) && p.is_open());
            if already_open {
                return Ok(ScanResult {
                    candidate: None,
                    signal: None,
                    diagnostic: ScanDiagnostic::blocked(
                        automation.id,
                        automation.user_id,
                        now,
                        reasons::POSITION_ALREADY_OPEN,
                        "allow_multiple_positions is off and a position is open".to_string(),
                    ),
                });
            }
        }

        let bars = self
            .brokerage
            .price_history(&automation.symbol, self.history_lookback)
            .await?;
        let iv_series = self
            .brokerage
            .iv_history(&automation.symbol, 252)
            .await?;

        let events = self.analyzer.analyze(&bars);
        let iv = match iv_series.last() {
            Some(&current) => self.ranker.rank(current, &iv_series),
            None => IvMetrics::Insufficient,
        };
        let signal = self
            .generator
            .generate(&automation.symbol, automation.strategy, events, iv, now);

        if signal.confidence < automation.min_confidence
            || signal.direction == SignalDirection::Hold
        {
            let detail = format!(
                "confidence {:.2} below threshold {:.2}",
                signal.confidence, automation.min_confidence
            );
            let diagnostic = ScanDiagnostic::blocked(
                automation.id,
                automation.user_id,
                now,
                reasons::CONFIDENCE_TOO_LOW,
                detail,
            );
            return Ok(ScanResult {
                candidate: None,
                signal: Some(signal),
                diagnostic,
            });
        }

        if !direction_fits(signal.direction, automation.strategy) {
            let detail = format!(
                "{:?} signal cannot drive a {:?} automation",
                signal.direction, automation.strategy
            );
            let diagnostic = ScanDiagnostic::blocked(
                automation.id,
                automation.user_id,
                now,
                reasons::DIRECTION_MISMATCH,
                detail,
            );
            return Ok(ScanResult {
                candidate: None,
                signal: Some(signal),
                diagnostic,
            });
        }

        let chain = self.brokerage.option_chain(&automation.symbol).await?;
        let today = now.date_naive();
        let matching: Vec<&OptionQuote> = chain
            .quotes
            .iter()
            .filter(|q| passes_filters(q, automation, today))
            .collect();

        debug!(
            automation_id = automation.id,
            symbol = automation.symbol,
            total = chain.quotes.len(),
            matching = matching.len(),
            "chain filtered"
        );

        let Some(best) = select_best(&matching, automation, today) else {
            let diagnostic = ScanDiagnostic::blocked(
                automation.id,
                automation.user_id,
                now,
                reasons::NO_MATCHING_CONTRACTS,
                format!(
                    "{} of {} contracts passed filters",
                    matching.len(),
                    chain.quotes.len()
                ),
            );
            return Ok(ScanResult {
                candidate: None,
                signal: Some(signal),
                diagnostic,
            });
        };

        let side = entry_side(automation.strategy);
        let limit_price = match side {
            OrderSide::Buy => best.ask,
            OrderSide::Sell => best.bid,
        };
        let order = TradeOrder::entry(
            automation.id,
            side,
            best.contract.clone(),
            automation.quantity,
            limit_price,
        );

        let diagnostic = ScanDiagnostic::candidate(
            automation.id,
            automation.user_id,
            now,
            best.contract.clone(),
            format!(
                "score {:.3}, confidence {:.2}, spread {:.1}%",
                score(best, automation, today),
                signal.confidence,
                best.spread_pct()
            ),
        );

        Ok(ScanResult {
            candidate: Some((order, best.clone())),
            signal: Some(signal),
            diagnostic,
        })
    }
}

/// Which contract right each strategy trades.
fn strategy_right(strategy: StrategyKind) -> OptionRight {
    match strategy {
        StrategyKind::LongCall | StrategyKind::CoveredCall => OptionRight::Call,
        StrategyKind::LongPut | StrategyKind::CashSecuredPut => OptionRight::Put,
    }
}

const fn entry_side(strategy: StrategyKind) -> OrderSide {
    match strategy {
        StrategyKind::LongCall | StrategyKind::LongPut => OrderSide::Buy,
        StrategyKind::CoveredCall | StrategyKind::CashSecuredPut => OrderSide::Sell,
    }
}

/// Bullish signals drive the bullish strategies; bearish drive long puts.
fn direction_fits(direction: SignalDirection, strategy: StrategyKind) -> bool {
    match direction {
        SignalDirection::BuyCall => matches!(
            strategy,
            StrategyKind::LongCall | StrategyKind::CoveredCall | StrategyKind::CashSecuredPut
        ),
        SignalDirection::BuyPut => strategy == StrategyKind::LongPut,
        SignalDirection::Hold => false,
    }
}

fn passes_filters(quote: &OptionQuote, automation: &Automation, today: chrono::NaiveDate) -> bool {
    let dte = quote.contract.days_to_expiry(today);
    let delta = quote.greeks.delta.abs();
    quote.contract.right == strategy_right(automation.strategy)
        && dte >= automation.min_dte
        && dte <= automation.max_dte
        && delta >= automation.min_delta
        && delta <= automation.max_delta
        && quote.volume >= automation.min_volume
        && quote.open_interest >= automation.min_open_interest
        && quote.spread_pct() <= automation.max_spread_pct
}

/// Multi-factor contract score in [0, 1]; highest wins.
fn score(quote: &OptionQuote, automation: &Automation, today: chrono::NaiveDate) -> f64 {
    let vol_floor = automation.min_volume.max(1) as f64;
    let oi_floor = automation.min_open_interest.max(1) as f64;
    let vol_score = (quote.volume as f64 / (vol_floor * LIQUIDITY_SATURATION)).min(1.0);
    let oi_score = (quote.open_interest as f64 / (oi_floor * LIQUIDITY_SATURATION)).min(1.0);
    let liquidity = (vol_score + oi_score) / 2.0;

    let max_spread = automation.max_spread_pct.to_f64().unwrap_or(1.0).max(f64::EPSILON);
    let spread = quote.spread_pct().to_f64().unwrap_or(max_spread);
    let spread_score = (1.0 - spread / max_spread).clamp(0.0, 1.0);

    let dte = quote.contract.days_to_expiry(today) as f64;
    let dte_mid = (automation.min_dte + automation.max_dte) as f64 / 2.0;
    let dte_half = ((automation.max_dte - automation.min_dte) as f64 / 2.0).max(1.0);
    let dte_score = (1.0 - (dte - dte_mid).abs() / dte_half).clamp(0.0, 1.0);

    let delta = quote.greeks.delta.abs();
    let delta_mid = (automation.min_delta + automation.max_delta) / 2.0;
    let delta_half = ((automation.max_delta - automation.min_delta) / 2.0).max(f64::EPSILON);
    let delta_score = (1.0 - (delta - delta_mid).abs() / delta_half).clamp(0.0, 1.0);

    W_LIQUIDITY * liquidity
        + W_SPREAD * spread_score
        + W_DTE_FIT * dte_score
        + W_DELTA_FIT * delta_score
}

/// Picks the highest-scoring contract; ties go to the lower spread, then
/// the higher open interest.
fn select_best<'a>(
    quotes: &[&'a OptionQuote],
    automation: &Automation,
    today: chrono::NaiveDate,
) -> Option<&'a OptionQuote> {
    const TIE_EPSILON: f64 = 1e-9;

    let mut best: Option<(&OptionQuote, f64)> = None;
    for &quote in quotes {
        let s = score(quote, automation, today);
        match best {
            None => best = Some((quote, s)),
            Some((current, cs)) => {
                let better = if (s - cs).abs() < TIE_EPSILON {
                    match quote.spread_pct().cmp(&current.spread_pct()) {
                        std::cmp::Ordering::Less => true,
                        std::cmp::Ordering::Greater => false,
                        std::cmp::Ordering::Equal => {
                            quote.open_interest > current.open_interest
                        }
                    }
                } else {
                    s > cs
                };
                if better {
                    best = Some((quote, s));
                }
            }
        }
    }
    best.map(|(q, _)| q)
}
