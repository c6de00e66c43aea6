//! Technical indicator computation over OHLCV history.
//!
//! Degrades gracefully: each pattern needs its own lookback, and a series
//! too short for one indicator simply does not emit that indicator's
//! events. Short history is never an error.

use autopilot_core::contracts::Bar;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

// Base confidence weights per pattern. Tunable pending calibration.
pub const W_MA_CROSS: f64 = 0.30;
pub const W_TREND_200: f64 = 0.15;
pub const W_RSI_REVERSAL: f64 = 0.25;
pub const W_MACD_CROSS: f64 = 0.25;
pub const W_VOLUME_BREAK: f64 = 0.35;

pub const RSI_PERIOD: usize = 14;
pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const VOLUME_BREAKOUT_RATIO: f64 = 1.5;

/// Bars on each side a local extreme must dominate to count as a pivot.
const PIVOT_WINDOW: usize = 2;

/// Recognized chart patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalPattern {
    GoldenCross,
    DeathCross,
    AboveSma200,
    BelowSma200,
    RsiOversold,
    RsiOverbought,
    MacdBullishCross,
    MacdBearishCross,
    VolumeBreakout,
    VolumeBreakdown,
}

/// One triggered pattern with its base confidence weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalEvent {
    pub pattern: TechnicalPattern,
    pub bullish: bool,
    pub weight: f64,
    pub description: String,
}

impl TechnicalEvent {
    fn new(pattern: TechnicalPattern, bullish: bool, weight: f64, description: String) -> Self {
        Self {
            pattern,
            bullish,
            weight,
            description,
        }
    }
}

/// Computes indicators from a price/volume series and emits one event per
/// triggered pattern. Stateless; every call re-derives from the series.
#[derive(Debug, Clone, Copy, Default)]
pub struct TechnicalAnalyzer;

impl TechnicalAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scans the series and returns all triggered pattern events.
    pub fn analyze(&self, bars: &[Bar]) -> Vec<TechnicalEvent> {
        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(0.0))
            .collect();
        let volumes: Vec<f64> = bars
            .iter()
            .map(|b| b.volume.to_f64().unwrap_or(0.0))
            .collect();

        let mut events = Vec::new();
        self.check_ma_cross(&closes, &mut events);
        self.check_trend(&closes, &mut events);
        self.check_rsi(&closes, &mut events);
        self.check_macd(&closes, &mut events);
        self.check_volume_break(bars, &closes, &volumes, &mut events);
        events
    }

    fn check_ma_cross(&self, closes: &[f64], events: &mut Vec<TechnicalEvent>) {
        let (Some(fast_prev), Some(slow_prev), Some(fast), Some(slow)) = (
            sma_at(closes, 20, closes.len().saturating_sub(1)),
            sma_at(closes, 50, closes.len().saturating_sub(1)),
            sma_at(closes, 20, closes.len()),
            sma_at(closes, 50, closes.len()),
        ) else {
            return;
        };

        if fast_prev <= slow_prev && fast > slow {
            events.push(TechnicalEvent::new(
                TechnicalPattern::GoldenCross,
                true,
                W_MA_CROSS,
                format!("SMA20 ({fast:.2}) crossed above SMA50 ({slow:.2})"),
            ));
        } else if fast_prev >= slow_prev && fast < slow {
            events.push(TechnicalEvent::new(
                TechnicalPattern::DeathCross,
                false,
                W_MA_CROSS,
                format!("SMA20 ({fast:.2}) crossed below SMA50 ({slow:.2})"),
            ));
        }
    }

    fn check_trend(&self, closes: &[f64], events: &mut Vec<TechnicalEvent>) {
        let Some(sma200) = sma_at(closes, 200, closes.len()) else {
            return;
        };
        let Some(&close) = closes.last() else {
            return;
        };

        if close > sma200 {
            events.push(TechnicalEvent::new(
                TechnicalPattern::AboveSma200,
                true,
                W_TREND_200,
                format!("price {close:.2} above SMA200 {sma200:.2}"),
            ));
        } else if close < sma200 {
            events.push(TechnicalEvent::new(
                TechnicalPattern::BelowSma200,
                false,
                W_TREND_200,
                format!("price {close:.2} below SMA200 {sma200:.2}"),
            ));
        }
    }

    fn check_rsi(&self, closes: &[f64], events: &mut Vec<TechnicalEvent>) {
        let Some(rsi) = rsi(closes, RSI_PERIOD) else {
            return;
        };

        if rsi < RSI_OVERSOLD {
            events.push(TechnicalEvent::new(
                TechnicalPattern::RsiOversold,
                true,
                W_RSI_REVERSAL,
                format!("RSI({RSI_PERIOD}) at {rsi:.1}, oversold"),
            ));
        } else if rsi > RSI_OVERBOUGHT {
            events.push(TechnicalEvent::new(
                TechnicalPattern::RsiOverbought,
                false,
                W_RSI_REVERSAL,
                format!("RSI({RSI_PERIOD}) at {rsi:.1}, overbought"),
            ));
        }
    }

    fn check_macd(&self, closes: &[f64], events: &mut Vec<TechnicalEvent>) {
        let Some(m) = macd(closes) else {
            return;
        };

        if m.line_prev <= m.signal_prev && m.line > m.signal {
            events.push(TechnicalEvent::new(
                TechnicalPattern::MacdBullishCross,
                true,
                W_MACD_CROSS,
                format!("MACD {:.3} crossed above signal {:.3}", m.line, m.signal),
            ));
        } else if m.line_prev >= m.signal_prev && m.line < m.signal {
            events.push(TechnicalEvent::new(
                TechnicalPattern::MacdBearishCross,
                false,
                W_MACD_CROSS,
                format!("MACD {:.3} crossed below signal {:.3}", m.line, m.signal),
            ));
        }
    }

    fn check_volume_break(
        &self,
        bars: &[Bar],
        closes: &[f64],
        volumes: &[f64],
        events: &mut Vec<TechnicalEvent>,
    ) {
        let Some(ratio) = volume_ratio(volumes) else {
            return;
        };
        if ratio <= VOLUME_BREAKOUT_RATIO {
            return;
        }
        let Some(&close) = closes.last() else {
            return;
        };
        let (support, resistance) = support_resistance(bars, closes);

        if let Some(res) = resistance {
            if close > res {
                events.push(TechnicalEvent::new(
                    TechnicalPattern::VolumeBreakout,
                    true,
                    W_VOLUME_BREAK,
                    format!("close {close:.2} broke resistance {res:.2} on {ratio:.1}x volume"),
                ));
                return;
            }
        }
        if let Some(sup) = support {
            if close < sup {
                events.push(TechnicalEvent::new(
                    TechnicalPattern::VolumeBreakdown,
                    false,
                    W_VOLUME_BREAK,
                    format!("close {close:.2} broke support {sup:.2} on {ratio:.1}x volume"),
                ));
            }
        }
    }
}

/// Simple moving average of `values[end - period..end]`.
fn sma_at(values: &[f64], period: usize, end: usize) -> Option<f64> {
    if period == 0 || end > values.len() || end < period {
        return None;
    }
    let window = &values[end - period..end];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// RSI with Wilder smoothing. Needs `period + 1` closes.
fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period].iter().filter(|&&c| c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss =
        -changes[..period].iter().filter(|&&c| c < 0.0).sum::<f64>() / period as f64;

    for &change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss <= f64::EPSILON {
        // No losses at all: max strength, unless there were no gains
        // either (a flat series is neutral, not overbought).
        return if avg_gain <= f64::EPSILON {
            Some(50.0)
        } else {
            Some(100.0)
        };
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}

/// Exponential moving average series, seeded with the SMA of the first
/// `period` values.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &v in &values[period..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

struct MacdState {
    line: f64,
    signal: f64,
    line_prev: f64,
    signal_prev: f64,
}

/// MACD(12, 26, 9): line, signal, and their previous values for cross
/// detection. Needs 26 + 9 closes.
fn macd(closes: &[f64]) -> Option<MacdState> {
    const FAST: usize = 12;
    const SLOW: usize = 26;
    const SIGNAL: usize = 9;

    if closes.len() < SLOW + SIGNAL {
        return None;
    }

    let fast = ema_series(closes, FAST);
    let slow = ema_series(closes, SLOW);
    // Align: slow EMA starts (SLOW - FAST) entries later than fast.
    let offset = SLOW - FAST;
    let line_series: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(i, &s)| fast[i + offset] - s)
        .collect();

    let signal_series = ema_series(&line_series, SIGNAL);
    if signal_series.len() < 2 || line_series.len() < 2 {
        return None;
    }

    Some(MacdState {
        line: line_series[line_series.len() - 1],
        signal: signal_series[signal_series.len() - 1],
        line_prev: line_series[line_series.len() - 2],
        signal_prev: signal_series[signal_series.len() - 2],
    })
}

/// Last bar's volume relative to the 20-period average of the bars before
/// it. Needs 21 bars.
fn volume_ratio(volumes: &[f64]) -> Option<f64> {
    let n = volumes.len();
    if n < 21 {
        return None;
    }
    let avg = sma_at(volumes, 20, n - 1)?;
    if avg <= f64::EPSILON {
        return None;
    }
    Some(volumes[n - 1] / avg)
}

/// Nearest support and resistance from pivot extrema, excluding the last
/// bar so a fresh breakout does not erase the level it broke.
fn support_resistance(bars: &[Bar], closes: &[f64]) -> (Option<f64>, Option<f64>) {
    let n = bars.len();
    if n < 2 * PIVOT_WINDOW + 2 {
        return (None, None);
    }
    let prior_close = closes[n - 2];
    let scan = &bars[..n - 1];

    let mut support: Option<f64> = None;
    let mut resistance: Option<f64> = None;

    for i in PIVOT_WINDOW..scan.len() - PIVOT_WINDOW {
        let high = scan[i].high.to_f64().unwrap_or(0.0);
        let low = scan[i].low.to_f64().unwrap_or(0.0);

        let pivot_high = (1..=PIVOT_WINDOW).all(|k| {
            high > scan[i - k].high.to_f64().unwrap_or(0.0)
                && high > scan[i + k].high.to_f64().unwrap_or(0.0)
        });
        let pivot_low = (1..=PIVOT_WINDOW).all(|k| {
            low < scan[i - k].low.to_f64().unwrap_or(f64::MAX)
                && low < scan[i + k].low.to_f64().unwrap_or(f64::MAX)
        });

        if pivot_high && high > prior_close {
            resistance = Some(resistance.map_or(high, |r: f64| r.min(high)));
        }
        if pivot_low && low < prior_close {
            support = Some(support.map_or(low, |s: f64| s.max(low)));
        }
    }

    (support, resistance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn bars_from(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 21, 0, 0).unwrap();
        closes
            .iter()
            .zip(volumes.iter())
            .enumerate()
            .map(|(i, (&c, &v))| Bar {
                timestamp: start + Duration::days(i as i64),
                open: Decimal::from_f64(c).unwrap(),
                high: Decimal::from_f64(c + 0.5).unwrap(),
                low: Decimal::from_f64(c - 0.5).unwrap(),
                close: Decimal::from_f64(c).unwrap(),
                volume: Decimal::from_f64(v).unwrap(),
            })
            .collect()
    }

    fn flat(n: usize, price: f64) -> (Vec<f64>, Vec<f64>) {
        (vec![price; n], vec![100.0; n])
    }

    #[test]
    fn short_series_yields_no_events_and_no_panic() {
        let analyzer = TechnicalAnalyzer::new();
        for n in 0..15 {
            let (closes, volumes) = flat(n, 100.0);
            let events = analyzer.analyze(&bars_from(&closes, &volumes));
            assert!(events.is_empty(), "events at n={n}: {events:?}");
        }
    }

    #[test]
    fn no_sma200_event_below_200_periods() {
        let analyzer = TechnicalAnalyzer::new();
        let (closes, volumes) = flat(199, 100.0);
        let events = analyzer.analyze(&bars_from(&closes, &volumes));
        assert!(!events
            .iter()
            .any(|e| matches!(e.pattern, TechnicalPattern::AboveSma200 | TechnicalPattern::BelowSma200)));
    }

    #[test]
    fn sma200_trend_fires_at_exactly_200_periods() {
        let analyzer = TechnicalAnalyzer::new();
        let mut closes = vec![100.0; 199];
        closes.push(101.0);
        let volumes = vec![100.0; 200];
        let events = analyzer.analyze(&bars_from(&closes, &volumes));
        assert!(events
            .iter()
            .any(|e| e.pattern == TechnicalPattern::AboveSma200 && e.bullish));
    }

    #[test]
    fn golden_cross_detected_on_final_bar() {
        let analyzer = TechnicalAnalyzer::new();
        // Flat then a single strong up close: SMA20 reacts faster than SMA50.
        let mut closes = vec![100.0; 54];
        closes.push(110.0);
        let volumes = vec![100.0; 55];
        let events = analyzer.analyze(&bars_from(&closes, &volumes));
        assert!(events
            .iter()
            .any(|e| e.pattern == TechnicalPattern::GoldenCross && e.bullish));
    }

    #[test]
    fn death_cross_detected_on_final_bar() {
        let analyzer = TechnicalAnalyzer::new();
        let mut closes = vec![100.0; 54];
        closes.push(90.0);
        let volumes = vec![100.0; 55];
        let events = analyzer.analyze(&bars_from(&closes, &volumes));
        assert!(events
            .iter()
            .any(|e| e.pattern == TechnicalPattern::DeathCross && !e.bullish));
    }

    #[test]
    fn rsi_all_gains_is_overbought() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let value = rsi(&closes, RSI_PERIOD).unwrap();
        assert!((value - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_oversold() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64 * 0.5).collect();
        let value = rsi(&closes, RSI_PERIOD).unwrap();
        assert!(value < 1.0, "rsi was {value}");
    }

    #[test]
    fn rsi_requires_period_plus_one() {
        let closes = vec![100.0; RSI_PERIOD];
        assert!(rsi(&closes, RSI_PERIOD).is_none());
    }

    #[test]
    fn rsi_flat_series_is_neutral() {
        let closes = vec![100.0; 40];
        let value = rsi(&closes, RSI_PERIOD).unwrap();
        assert!((value - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_balanced_moves_near_fifty() {
        // Alternate +1/-1: gains equal losses.
        let closes: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let value = rsi(&closes, RSI_PERIOD).unwrap();
        assert!((value - 50.0).abs() < 10.0, "rsi was {value}");
    }

    #[test]
    fn macd_flat_series_is_zero() {
        let closes = vec![100.0; 60];
        let m = macd(&closes).unwrap();
        assert!(m.line.abs() < 1e-9);
        assert!(m.signal.abs() < 1e-9);
    }

    #[test]
    fn macd_bullish_cross_on_jump() {
        let analyzer = TechnicalAnalyzer::new();
        let mut closes = vec![100.0; 40];
        closes.push(108.0);
        let volumes = vec![100.0; 41];
        let events = analyzer.analyze(&bars_from(&closes, &volumes));
        assert!(events
            .iter()
            .any(|e| e.pattern == TechnicalPattern::MacdBullishCross && e.bullish));
    }

    #[test]
    fn volume_ratio_compares_last_bar_to_prior_average() {
        let mut volumes = vec![100.0; 30];
        volumes.push(250.0);
        let ratio = volume_ratio(&volumes).unwrap();
        assert!((ratio - 2.5).abs() < 1e-9);
    }

    #[test]
    fn breakout_needs_volume_and_level() {
        let analyzer = TechnicalAnalyzer::new();
        // Pivot high at 105 in the middle, close punches through on volume.
        let mut closes = vec![100.0; 30];
        closes[15] = 104.5; // bar high becomes 105.0
        let mut volumes = vec![100.0; 30];
        closes.push(106.0);
        volumes.push(300.0);
        let events = analyzer.analyze(&bars_from(&closes, &volumes));
        assert!(
            events
                .iter()
                .any(|e| e.pattern == TechnicalPattern::VolumeBreakout && e.bullish),
            "events: {events:?}"
        );
    }

    #[test]
    fn no_breakout_without_volume_expansion() {
        let analyzer = TechnicalAnalyzer::new();
        let mut closes = vec![100.0; 30];
        closes[15] = 104.5;
        let mut volumes = vec![100.0; 30];
        closes.push(106.0);
        volumes.push(110.0);
        let events = analyzer.analyze(&bars_from(&closes, &volumes));
        assert!(!events
            .iter()
            .any(|e| e.pattern == TechnicalPattern::VolumeBreakout));
    }
}
