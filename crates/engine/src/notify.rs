//! Notification sink that writes alerts to the log.
//!
//! Stands in for email/UI delivery; fire-and-forget by contract, so a
//! failed delivery can never roll back the trade that raised the alert.

use async_trait::async_trait;
use tracing::info;

use autopilot_core::alert::Alert;
use autopilot_core::traits::NotificationSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn publish(&self, alert: &Alert) {
        info!(
            user_id = alert.user_id,
            kind = ?alert.kind,
            priority = ?alert.priority,
            symbol = alert.symbol,
            message = alert.message,
            "alert"
        );
    }
}
