//! Engine status snapshot exposed to operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autopilot_core::session::MarketSession;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub cycles_completed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle_ms: Option<u64>,
    pub last_session: Option<MarketSession>,
    pub next_cycle_secs: Option<u64>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            running: false,
            cycles_completed: 0,
            last_cycle_at: None,
            last_cycle_ms: None,
            last_session: None,
            next_cycle_secs: None,
        }
    }
}
