//! Alerts — persisted, user-facing events with an acknowledge lifecycle.
//!
//! Signals are ephemeral; an alert is what survives the cycle that produced
//! it. Delivery itself is an external concern (see
//! [`crate::traits::NotificationSink`]).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SignalTriggered,
    TradeExecuted,
    PositionClosed,
    AutomationPaused,
    OrderPendingVerification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub user_id: i64,
    pub kind: AlertKind,
    pub priority: AlertPriority,
    pub symbol: String,
    pub message: String,
    /// Structured indicator/diagnostic payload for the UI.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Alert {
    /// Default retention before an unacknowledged alert is pruned.
    const TTL_HOURS: i64 = 72;

    #[must_use]
    pub fn new(
        user_id: i64,
        kind: AlertKind,
        priority: AlertPriority,
        symbol: &str,
        message: String,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            kind,
            priority,
            symbol: symbol.to_string(),
            message,
            payload,
            created_at: now,
            expires_at: now + Duration::hours(Self::TTL_HOURS),
            acknowledged: false,
        }
    }

    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
