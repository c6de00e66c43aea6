//! Signal generation pipeline: technical indicators, implied-volatility
//! ranking, and the combined directional verdict per symbol.

pub mod generator;
pub mod technical;
pub mod volatility;

pub use generator::{Signal, SignalDirection, SignalGenerator};
pub use technical::{TechnicalAnalyzer, TechnicalEvent, TechnicalPattern};
pub use volatility::{IvMetrics, VolatilityRanker};
