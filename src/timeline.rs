// Timeline Recorder - append-only audit trail per referral.
//
// Audit writes are log-and-continue: losing a timeline line must never
// block a patient care action, so failures are traced and swallowed.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::referral::types::{NewTimelineEvent, TimelineEvent, TimelineEventKind};
use crate::storage::{ReferralStore, StoreError};

#[derive(Clone)]
pub struct TimelineRecorder {
    store: Arc<dyn ReferralStore>,
}

impl TimelineRecorder {
    pub fn new(store: Arc<dyn ReferralStore>) -> Self {
        Self { store }
    }

    /// Append an audit event. Never fails the caller.
    pub async fn record(
        &self,
        referral_id: Uuid,
        kind: TimelineEventKind,
        description: impl Into<String>,
    ) {
        let event = NewTimelineEvent {
            kind,
            description: description.into(),
            timestamp: Utc::now(),
        };
        if let Err(err) = self.store.insert_timeline_event(referral_id, event).await {
            tracing::warn!(
                referral_id = %referral_id,
                kind = %kind,
                error = %err,
                "failed to append timeline event"
            );
        }
    }

    /// Full history for a referral, in creation order.
    pub async fn history(&self, referral_id: Uuid) -> Result<Vec<TimelineEvent>, StoreError> {
        self.store.list_timeline_events(referral_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    #[tokio::test]
    async fn test_record_appends_in_order() {
        let (store, seed) = InMemoryStore::with_demo_data();
        let store = Arc::new(store);
        let recorder = TimelineRecorder::new(store);

        recorder
            .record(
                seed.cardiology_referral,
                TimelineEventKind::AppointmentBooked,
                "Appointment scheduled by specialist",
            )
            .await;

        let history = recorder.history(seed.cardiology_referral).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TimelineEventKind::ReferralSent);
        assert_eq!(history[1].kind, TimelineEventKind::AppointmentBooked);
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let (store, seed) = InMemoryStore::with_demo_data();
        let store = Arc::new(store);
        let recorder = TimelineRecorder::new(store.clone());

        store.set_fail_timeline_writes(true);
        recorder
            .record(seed.cardiology_referral, TimelineEventKind::NoShow, "Patient did not attend")
            .await;
        store.set_fail_timeline_writes(false);

        let history = recorder.history(seed.cardiology_referral).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
