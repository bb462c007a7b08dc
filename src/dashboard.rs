// Nurse dashboard aggregation.
//
// Read-only, snapshot semantics, no locking. A patient who missed an
// appointment floats to the top regardless of their baseline risk score.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::referral::types::{Priority, Referral, ReferralStatus};
use crate::storage::{ReferralFilter, ReferralStore, StoreError};

/// Effective risk assigned to referrals in a missed-appointment state.
const MISSED_APPOINTMENT_RISK: i32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardEntry {
    pub referral_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub specialty: String,
    pub priority: Priority,
    pub status: ReferralStatus,
    pub is_urgent: bool,
    pub risk_score: i32,
}

pub struct Dashboard {
    store: Arc<dyn ReferralStore>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn ReferralStore>) -> Self {
        Self { store }
    }

    /// All referrals joined with their patients, highest effective risk
    /// first, priority breaking ties.
    pub async fn snapshot(&self) -> Result<Vec<DashboardEntry>, StoreError> {
        let referrals = self.store.list_referrals(&ReferralFilter::all()).await?;

        let mut entries = Vec::with_capacity(referrals.len());
        for referral in referrals {
            let patient = self.store.get_patient(referral.patient_id).await?;
            entries.push(DashboardEntry {
                referral_id: referral.id,
                patient_id: patient.id,
                patient_name: patient.full_name,
                specialty: referral.specialty.to_string(),
                priority: referral.priority,
                status: referral.status,
                is_urgent: referral.is_urgent,
                risk_score: effective_risk(&referral, patient.risk_score),
            });
        }

        entries.sort_by(|a, b| {
            b.risk_score
                .cmp(&a.risk_score)
                .then(b.priority.cmp(&a.priority))
        });
        Ok(entries)
    }
}

fn effective_risk(referral: &Referral, baseline: i32) -> i32 {
    match referral.status {
        ReferralStatus::NoShow | ReferralStatus::NeedsReschedule => MISSED_APPOINTMENT_RISK,
        _ => baseline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    #[tokio::test]
    async fn test_missed_appointment_floats_to_top() {
        let (store, seed) = InMemoryStore::with_demo_data();

        // James (baseline risk 2) misses; Maria (risk 1, High priority)
        // stays on the happy path.
        store
            .update_referral_status(
                seed.orthopedics_referral,
                ReferralStatus::NeedsReschedule,
                None,
            )
            .await
            .unwrap();

        let dashboard = Dashboard::new(Arc::new(store));
        let entries = dashboard.snapshot().await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].patient_name, "James Wilson");
        assert_eq!(entries[0].risk_score, MISSED_APPOINTMENT_RISK);
        assert_eq!(entries[1].patient_name, "Maria Garcia");
        assert_eq!(entries[1].risk_score, 1);
    }

    #[tokio::test]
    async fn test_priority_breaks_risk_ties() {
        let (store, seed) = InMemoryStore::with_demo_data();
        // Both referrals in the missed state share effective risk 100.
        for id in [seed.cardiology_referral, seed.orthopedics_referral] {
            store
                .update_referral_status(id, ReferralStatus::NeedsReschedule, None)
                .await
                .unwrap();
        }

        let dashboard = Dashboard::new(Arc::new(store));
        let entries = dashboard.snapshot().await.unwrap();

        // Maria's referral is High priority, James's is Medium.
        assert_eq!(entries[0].patient_name, "Maria Garcia");
        assert_eq!(entries[0].priority, Priority::High);
    }
}
