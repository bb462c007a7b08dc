// Notification Dispatcher - best-effort messaging for referral events.
//
// A notification is persisted as an in-app row and handed to the delivery
// transport. Both steps are fire-and-forget relative to the state
// transition that triggered them: failures are logged, never propagated.

mod sender;

pub use sender::{NotificationSender, OutboundNotification, TracingSender};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::referral::types::{
    NewNotification, Notification, NotificationChannel, NotificationKind, Patient,
};
use crate::storage::{ReferralStore, StoreError};

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn ReferralStore>,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn ReferralStore>, sender: Arc<dyn NotificationSender>) -> Self {
        Self { store, sender }
    }

    /// Record and deliver one message. Never fails the caller.
    pub async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        channel: NotificationChannel,
        message: impl Into<String>,
    ) {
        let message = message.into();

        if let Err(err) = self
            .store
            .insert_notification(NewNotification {
                user_id,
                kind,
                channel,
                message: message.clone(),
            })
            .await
        {
            tracing::warn!(
                user_id = %user_id,
                kind = %kind,
                error = %err,
                "failed to persist notification row"
            );
        }

        // Contact detail is an enrichment; a missing patient row still
        // gets the send attempt with whatever we have.
        let (email, phone) = match self.store.get_patient(user_id).await {
            Ok(patient) => (patient.email, patient.phone),
            Err(err) => {
                tracing::debug!(user_id = %user_id, error = %err, "no contact info for recipient");
                (None, None)
            }
        };

        let outbound = OutboundNotification {
            user_id,
            kind,
            channel,
            message,
            email,
            phone,
        };
        if let Err(err) = self.sender.send(&outbound).await {
            tracing::warn!(
                user_id = %user_id,
                kind = %kind,
                channel = %channel,
                error = %err,
                "notification delivery failed"
            );
        }
    }

    /// Reminder for an upcoming appointment, for the enclosing app's
    /// reminder job.
    pub async fn send_appointment_reminder(&self, patient: &Patient, when: DateTime<Utc>) {
        let message = appointment_reminder(&patient.full_name, when);
        self.notify(
            patient.id,
            NotificationKind::AppointmentReminder,
            NotificationChannel::Email,
            message,
        )
        .await;
    }

    /// Notifications for one user, write order.
    pub async fn notifications_for(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        self.store.list_notifications(user_id).await
    }
}

/// "Hello {name}, this is a reminder for your appointment on {date}."
pub fn appointment_reminder(name: &str, when: DateTime<Utc>) -> String {
    format!(
        "Hello {name}, this is a reminder for your appointment on {}.",
        when.format("%Y-%m-%d %H:%M UTC")
    )
}

/// "Hello {name}, it looks like you missed your appointment on {date}."
pub fn missed_appointment_alert(name: &str, when: DateTime<Utc>) -> String {
    format!(
        "Hello {name}, it looks like you missed your appointment on {}. Please reschedule.",
        when.format("%Y-%m-%d %H:%M UTC")
    )
}
