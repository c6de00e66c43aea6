use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub engine: EngineSettings,
    pub database: DatabaseConfig,
    pub broker: BrokerSettings,
}

/// Scheduler and signal tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Users whose automations this instance drives.
    pub user_ids: Vec<i64>,
    /// Keep ticking (hourly) while the market is closed instead of
    /// suspending until the next session.
    pub run_while_closed: bool,
    /// Bars of price history requested per signal computation.
    pub history_lookback: usize,
    /// Minimum IV history samples before rank/percentile are trusted.
    pub iv_sample_floor: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Brokerage adapter behavior: bounded timeouts and the centralized retry
/// policy applied to every external call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub call_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Per-contract commission charged by the paper broker.
    pub paper_commission: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings {
                user_ids: vec![1],
                run_while_closed: false,
                history_lookback: 250,
                iv_sample_floor: 20,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/autopilot".to_string(),
                max_connections: 10,
            },
            broker: BrokerSettings {
                call_timeout_secs: 10,
                max_retries: 2,
                retry_base_delay_ms: 250,
                paper_commission: 0.65,
            },
        }
    }
}
