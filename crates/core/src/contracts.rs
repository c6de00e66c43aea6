//! Option contract, quote, and price-series types shared across the engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Options contract right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// An options contract specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub right: OptionRight,
    /// Contract multiplier (100 for standard US equity options).
    pub multiplier: Decimal,
}

impl OptionContract {
    /// Create a new standard US equity options contract.
    pub fn new(symbol: &str, expiry: NaiveDate, strike: Decimal, right: OptionRight) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            expiry,
            strike,
            right,
            multiplier: Decimal::from(100),
        }
    }

    /// Human-readable contract description (e.g., "NVDA 140C 2026-03-20").
    pub fn display_name(&self) -> String {
        format!("{} {}{} {}", self.symbol, self.strike, self.right, self.expiry)
    }

    /// Days until expiration relative to `today`.
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry - today).num_days()
    }
}

/// Option greeks snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

/// A single quoted contract from an option chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuote {
    pub contract: OptionContract,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: u64,
    pub open_interest: u64,
    pub iv: f64,
    pub greeks: OptionGreeks,
}

impl OptionQuote {
    /// Mid price of the bid/ask spread.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Bid/ask spread as a percentage of the mid price.
    ///
    /// Returns 100% for unquotable contracts (zero mid) so they sort last.
    pub fn spread_pct(&self) -> Decimal {
        let mid = self.mid();
        if mid.is_zero() {
            return Decimal::from(100);
        }
        ((self.ask - self.bid) / mid) * Decimal::from(100)
    }
}

/// Options chain for a single underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying: String,
    pub underlying_price: Decimal,
    pub quotes: Vec<OptionQuote>,
    pub retrieved_at: DateTime<Utc>,
}

/// One OHLCV bar of a price history series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(bid: Decimal, ask: Decimal) -> OptionQuote {
        let expiry = NaiveDate::from_ymd_opt(2026, 9, 18).unwrap();
        OptionQuote {
            contract: OptionContract::new("nvda", expiry, dec!(140), OptionRight::Call),
            bid,
            ask,
            last: bid,
            volume: 100,
            open_interest: 500,
            iv: 0.40,
            greeks: OptionGreeks::default(),
        }
    }

    #[test]
    fn contract_symbol_is_uppercased() {
        let q = quote(dec!(1), dec!(2));
        assert_eq!(q.contract.symbol, "NVDA");
    }

    #[test]
    fn mid_is_midpoint_of_spread() {
        let q = quote(dec!(2.00), dec!(2.10));
        assert_eq!(q.mid(), dec!(2.05));
    }

    #[test]
    fn spread_pct_relative_to_mid() {
        let q = quote(dec!(1.90), dec!(2.10));
        // 0.20 spread on 2.00 mid = 10%
        assert_eq!(q.spread_pct(), dec!(10));
    }

    #[test]
    fn spread_pct_saturates_on_zero_mid() {
        let q = quote(dec!(0), dec!(0));
        assert_eq!(q.spread_pct(), dec!(100));
    }

    #[test]
    fn days_to_expiry_counts_calendar_days() {
        let q = quote(dec!(1), dec!(2));
        let today = NaiveDate::from_ymd_opt(2026, 9, 8).unwrap();
        assert_eq!(q.contract.days_to_expiry(today), 10);
    }
}
