// Notification transport seam.

use async_trait::async_trait;

use crate::referral::types::{NotificationChannel, NotificationKind};
use uuid::Uuid;

/// A message on its way out, with whatever contact detail could be
/// resolved for the recipient.
#[derive(Debug, Clone)]
pub struct OutboundNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub message: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Delivery transport. Implementations are best-effort: the dispatcher
/// logs a failed send and moves on, so `send` must not be load-bearing
/// for referral state.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, outbound: &OutboundNotification) -> anyhow::Result<()>;
}

/// Default transport: emits the delivery as a structured log line. Real
/// email/SMS gateways slot in behind the same trait.
#[derive(Debug, Default)]
pub struct TracingSender;

#[async_trait]
impl NotificationSender for TracingSender {
    async fn send(&self, outbound: &OutboundNotification) -> anyhow::Result<()> {
        tracing::info!(
            user_id = %outbound.user_id,
            kind = %outbound.kind,
            channel = %outbound.channel,
            message = %outbound.message,
            "notification dispatched"
        );
        Ok(())
    }
}
