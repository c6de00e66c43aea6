//! Combines technical events and IV positioning into one directional
//! verdict per symbol.

use autopilot_core::automation::StrategyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::technical::TechnicalEvent;
use crate::volatility::IvMetrics;

/// Net confidence below this floor is reported as `Hold` regardless of
/// direction, to keep noise out of the scanner.
pub const MIN_CONFIDENCE: f64 = 0.1;

// IV favorability bands. Tunable pending calibration.
pub const IV_FAVORABLE_BAND: f64 = 0.60;
pub const IV_UNFAVORABLE_BAND: f64 = 0.40;
pub const IV_ADJUSTMENT: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    BuyCall,
    BuyPut,
    Hold,
}

/// The scoring result for one symbol in one cycle. Ephemeral unless
/// elevated to an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    pub confidence: f64,
    pub events: Vec<TechnicalEvent>,
    pub iv: IvMetrics,
    pub generated_at: DateTime<Utc>,
}

/// Deterministic: identical (events, IV, strategy) inputs always produce
/// the identical (direction, confidence) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalGenerator;

impl SignalGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn generate(
        &self,
        symbol: &str,
        strategy: StrategyKind,
        events: Vec<TechnicalEvent>,
        iv: IvMetrics,
        now: DateTime<Utc>,
    ) -> Signal {
        let bullish: f64 = events.iter().filter(|e| e.bullish).map(|e| e.weight).sum();
        let bearish: f64 = events.iter().filter(|e| !e.bullish).map(|e| e.weight).sum();
        let net = bullish - bearish;

        let mut confidence = net.abs().clamp(0.0, 1.0);
        let direction = if net > 0.0 {
            SignalDirection::BuyCall
        } else if net < 0.0 {
            SignalDirection::BuyPut
        } else {
            SignalDirection::Hold
        };

        if direction != SignalDirection::Hold {
            confidence = (confidence + iv_adjustment(strategy, iv)).clamp(0.0, 1.0);
        }

        let direction = if confidence < MIN_CONFIDENCE {
            SignalDirection::Hold
        } else {
            direction
        };

        tracing::debug!(
            symbol,
            ?direction,
            confidence,
            bullish,
            bearish,
            "signal generated"
        );

        Signal {
            symbol: symbol.to_string(),
            direction,
            confidence,
            events,
            iv,
            generated_at: now,
        }
    }
}

/// Confidence adjustment from IV positioning. High rank favors
/// premium-selling strategies; low rank favors premium buying. Neutral
/// (insufficient data or mid-band) applies no adjustment.
fn iv_adjustment(strategy: StrategyKind, iv: IvMetrics) -> f64 {
    let Some(rank) = iv.rank() else {
        return 0.0;
    };

    let favorable = if strategy.is_premium_selling() {
        rank >= IV_FAVORABLE_BAND
    } else {
        rank <= IV_UNFAVORABLE_BAND
    };
    let unfavorable = if strategy.is_premium_selling() {
        rank <= IV_UNFAVORABLE_BAND
    } else {
        rank >= IV_FAVORABLE_BAND
    };

    if favorable {
        IV_ADJUSTMENT
    } else if unfavorable {
        -IV_ADJUSTMENT
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technical::TechnicalPattern;
    use chrono::TimeZone;

    fn event(bullish: bool, weight: f64) -> TechnicalEvent {
        TechnicalEvent {
            pattern: if bullish {
                TechnicalPattern::GoldenCross
            } else {
                TechnicalPattern::DeathCross
            },
            bullish,
            weight,
            description: String::new(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, 15, 0, 0).unwrap()
    }

    #[test]
    fn bullish_majority_yields_buy_call() {
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::LongCall,
            vec![event(true, 0.30), event(true, 0.25), event(false, 0.15)],
            IvMetrics::Insufficient,
            at(),
        );
        assert_eq!(signal.direction, SignalDirection::BuyCall);
        assert!((signal.confidence - 0.40).abs() < 1e-9);
    }

    #[test]
    fn bearish_majority_yields_buy_put() {
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::LongPut,
            vec![event(false, 0.30), event(false, 0.25)],
            IvMetrics::Insufficient,
            at(),
        );
        assert_eq!(signal.direction, SignalDirection::BuyPut);
    }

    #[test]
    fn below_floor_is_hold_regardless_of_direction() {
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::LongCall,
            vec![event(true, 0.05)],
            IvMetrics::Insufficient,
            at(),
        );
        assert_eq!(signal.direction, SignalDirection::Hold);
    }

    #[test]
    fn no_events_is_hold_with_zero_confidence() {
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::LongCall,
            vec![],
            IvMetrics::Insufficient,
            at(),
        );
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert!(signal.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn low_iv_rank_boosts_premium_buying() {
        let iv = IvMetrics::Ranked {
            rank: 0.10,
            percentile: 0.08,
        };
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::LongCall,
            vec![event(true, 0.30)],
            iv,
            at(),
        );
        assert!((signal.confidence - 0.40).abs() < 1e-9);
    }

    #[test]
    fn high_iv_rank_penalizes_premium_buying() {
        let iv = IvMetrics::Ranked {
            rank: 0.90,
            percentile: 0.95,
        };
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::LongCall,
            vec![event(true, 0.30)],
            iv,
            at(),
        );
        assert!((signal.confidence - 0.20).abs() < 1e-9);
    }

    #[test]
    fn high_iv_rank_boosts_premium_selling() {
        let iv = IvMetrics::Ranked {
            rank: 0.90,
            percentile: 0.95,
        };
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::CoveredCall,
            vec![event(true, 0.30)],
            iv,
            at(),
        );
        assert!((signal.confidence - 0.40).abs() < 1e-9);
    }

    #[test]
    fn insufficient_iv_applies_no_adjustment() {
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::CoveredCall,
            vec![event(true, 0.30)],
            IvMetrics::Insufficient,
            at(),
        );
        assert!((signal.confidence - 0.30).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let events = vec![event(true, 0.5), event(true, 0.5), event(true, 0.5)];
        let iv = IvMetrics::Ranked {
            rank: 0.05,
            percentile: 0.02,
        };
        let signal = SignalGenerator::new().generate(
            "NVDA",
            StrategyKind::LongCall,
            events,
            iv,
            at(),
        );
        assert!((signal.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_inputs_yield_identical_output() {
        let make = || {
            SignalGenerator::new().generate(
                "NVDA",
                StrategyKind::LongCall,
                vec![event(true, 0.30), event(false, 0.15)],
                IvMetrics::Ranked {
                    rank: 0.25,
                    percentile: 0.30,
                },
                at(),
            )
        };
        let a = make();
        let b = make();
        assert_eq!(a.direction, b.direction);
        assert!((a.confidence - b.confidence).abs() < f64::EPSILON);
    }
}
