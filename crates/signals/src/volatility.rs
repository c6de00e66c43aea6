//! Implied-volatility rank and percentile over a trailing history window.

use serde::{Deserialize, Serialize};

/// Default minimum history length before rank/percentile are trusted.
pub const DEFAULT_SAMPLE_FLOOR: usize = 20;

/// IV positioning for a symbol.
///
/// `Insufficient` is a normal outcome, not an error: callers must treat it
/// as neutral (no confidence adjustment).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IvMetrics {
    Ranked { rank: f64, percentile: f64 },
    Insufficient,
}

impl IvMetrics {
    #[must_use]
    pub const fn is_neutral(&self) -> bool {
        matches!(self, Self::Insufficient)
    }

    /// The rank when available.
    #[must_use]
    pub const fn rank(&self) -> Option<f64> {
        match self {
            Self::Ranked { rank, .. } => Some(*rank),
            Self::Insufficient => None,
        }
    }
}

/// Ranks current IV within its trailing (~252-session) history.
#[derive(Debug, Clone, Copy)]
pub struct VolatilityRanker {
    sample_floor: usize,
}

impl Default for VolatilityRanker {
    fn default() -> Self {
        Self {
            sample_floor: DEFAULT_SAMPLE_FLOOR,
        }
    }
}

impl VolatilityRanker {
    #[must_use]
    pub const fn new(sample_floor: usize) -> Self {
        Self { sample_floor }
    }

    /// Computes IV rank = (current − min) / (max − min) and percentile =
    /// fraction of samples strictly below current, both in [0, 1].
    #[must_use]
    pub fn rank(&self, current_iv: f64, history: &[f64]) -> IvMetrics {
        if history.len() < self.sample_floor {
            return IvMetrics::Insufficient;
        }

        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for &iv in history {
            min = min.min(iv);
            max = max.max(iv);
        }

        // A flat history gives no spread to rank against.
        if (max - min).abs() <= f64::EPSILON {
            return IvMetrics::Insufficient;
        }

        let rank = ((current_iv - min) / (max - min)).clamp(0.0, 1.0);
        let below = history.iter().filter(|&&iv| iv < current_iv).count();
        let percentile = below as f64 / history.len() as f64;

        IvMetrics::Ranked { rank, percentile }
    }
}
