// Fixture-grade in-memory store.
//
// Serves demo mode and the test suites. Failure toggles let callers
// exercise the log-and-continue paths without a real backend outage.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::referral::types::{
    Appointment, AppointmentUpdate, ContactUpdate, NewAppointment, NewNotification, NewPatient,
    NewReferral, NewTask, NewTimelineEvent, Notification, Patient, Priority, Referral,
    ReferralStatus, Role, Specialty, Task, TaskKind, TaskStatus, TimelineEvent, TimelineEventKind,
};

use super::{ListScope, ReferralFilter, ReferralStore, StoreError};

#[derive(Default)]
struct Tables {
    patients: Vec<Patient>,
    referrals: Vec<Referral>,
    appointments: Vec<Appointment>,
    timeline: Vec<TimelineEvent>,
    tasks: Vec<Task>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_timeline_writes: AtomicBool,
    fail_notification_writes: AtomicBool,
}

/// Ids of the seeded demo rows, for callers that need to refer to them.
#[derive(Debug, Clone)]
pub struct DemoSeed {
    pub nurse_id: Uuid,
    pub maria: Uuid,
    pub james: Uuid,
    pub cardiology_referral: Uuid,
    pub orthopedics_referral: Uuid,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two patients, two SENT referrals, each with its initial timeline
    /// line.
    pub fn with_demo_data() -> (Self, DemoSeed) {
        let mut tables = Tables::default();
        let now = Utc::now();
        let nurse_id = Uuid::new_v4();

        let maria = Patient {
            id: Uuid::new_v4(),
            full_name: "Maria Garcia".to_string(),
            email: Some("maria@example.com".to_string()),
            phone: Some("555-0101".to_string()),
            risk_score: 1,
            medical_history: Vec::new(),
            created_at: now,
        };
        let james = Patient {
            id: Uuid::new_v4(),
            full_name: "James Wilson".to_string(),
            email: Some("james@example.com".to_string()),
            phone: Some("555-0102".to_string()),
            risk_score: 2,
            medical_history: Vec::new(),
            created_at: now,
        };

        let cardiology = Referral {
            id: Uuid::new_v4(),
            patient_id: maria.id,
            created_by: nurse_id,
            specialty: Specialty::Cardiology,
            priority: Priority::High,
            status: ReferralStatus::Sent,
            notes: Some("Chest pain evaluation".to_string()),
            due_date: None,
            transportation_needed: true,
            is_urgent: false,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        let orthopedics = Referral {
            id: Uuid::new_v4(),
            patient_id: james.id,
            created_by: nurse_id,
            specialty: Specialty::Orthopedics,
            priority: Priority::Medium,
            status: ReferralStatus::Sent,
            notes: Some("Knee pain".to_string()),
            due_date: None,
            transportation_needed: false,
            is_urgent: false,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        let seed = DemoSeed {
            nurse_id,
            maria: maria.id,
            james: james.id,
            cardiology_referral: cardiology.id,
            orthopedics_referral: orthopedics.id,
        };

        for referral in [&cardiology, &orthopedics] {
            tables.timeline.push(TimelineEvent {
                id: Uuid::new_v4(),
                referral_id: referral.id,
                kind: TimelineEventKind::ReferralSent,
                description: "Referral sent to specialist".to_string(),
                timestamp: now,
            });
        }
        tables.patients.extend([maria, james]);
        tables.referrals.extend([cardiology, orthopedics]);

        let store = Self {
            tables: RwLock::new(tables),
            ..Self::default()
        };
        (store, seed)
    }

    /// Make subsequent timeline inserts fail, to exercise the recorder's
    /// log-and-continue path.
    pub fn set_fail_timeline_writes(&self, fail: bool) {
        self.fail_timeline_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent notification inserts fail, to exercise the
    /// dispatcher's best-effort path.
    pub fn set_fail_notification_writes(&self, fail: bool) {
        self.fail_notification_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReferralStore for InMemoryStore {
    async fn get_patient(&self, id: Uuid) -> Result<Patient, StoreError> {
        let tables = self.tables.read().await;
        tables
            .patients
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let tables = self.tables.read().await;
        let mut patients = tables.patients.clone();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(patients)
    }

    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: new.full_name,
            email: new.email,
            phone: new.phone,
            risk_score: new.risk_score,
            medical_history: new.medical_history,
            created_at: Utc::now(),
        };
        self.tables.write().await.patients.push(patient.clone());
        Ok(patient)
    }

    async fn update_patient_contact(
        &self,
        id: Uuid,
        update: ContactUpdate,
    ) -> Result<Patient, StoreError> {
        let mut tables = self.tables.write().await;
        let patient = tables
            .patients
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(email) = update.email {
            patient.email = Some(email);
        }
        if let Some(phone) = update.phone {
            patient.phone = Some(phone);
        }
        Ok(patient.clone())
    }

    async fn get_referral(&self, id: Uuid) -> Result<Referral, StoreError> {
        let tables = self.tables.read().await;
        tables
            .referrals
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_referrals(&self, filter: &ReferralFilter) -> Result<Vec<Referral>, StoreError> {
        let tables = self.tables.read().await;
        let mut referrals: Vec<Referral> = tables
            .referrals
            .iter()
            .filter(|r| match (filter.scope, filter.role) {
                (ListScope::Mine, Some(Role::Patient)) => Some(r.patient_id) == filter.user_id,
                (ListScope::Mine, Some(Role::Specialist)) => {
                    ReferralFilter::specialist_queue_statuses().contains(&r.status)
                }
                _ => true,
            })
            .cloned()
            .collect();
        referrals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(referrals)
    }

    async fn insert_referral(&self, new: NewReferral) -> Result<Referral, StoreError> {
        let now = Utc::now();
        let referral = Referral {
            id: Uuid::new_v4(),
            patient_id: new.patient_id,
            created_by: new.created_by,
            specialty: new.specialty,
            priority: new.priority,
            status: new.status,
            notes: new.notes,
            due_date: new.due_date,
            transportation_needed: new.transportation_needed,
            is_urgent: new.is_urgent,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.tables.write().await.referrals.push(referral.clone());
        Ok(referral)
    }

    async fn update_referral_status(
        &self,
        id: Uuid,
        status: ReferralStatus,
        expected_version: Option<i64>,
    ) -> Result<Referral, StoreError> {
        let mut tables = self.tables.write().await;
        let referral = tables
            .referrals
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(expected) = expected_version {
            if referral.version != expected {
                return Err(StoreError::Conflict);
            }
        }
        referral.status = status;
        referral.version += 1;
        referral.updated_at = Utc::now();
        Ok(referral.clone())
    }

    async fn set_transportation_needed(
        &self,
        id: Uuid,
        needed: bool,
    ) -> Result<Referral, StoreError> {
        let mut tables = self.tables.write().await;
        let referral = tables
            .referrals
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;
        referral.transportation_needed = needed;
        referral.version += 1;
        referral.updated_at = Utc::now();
        Ok(referral.clone())
    }

    async fn insert_appointment(
        &self,
        referral_id: Uuid,
        new: NewAppointment,
    ) -> Result<Appointment, StoreError> {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            referral_id,
            scheduled_for: new.scheduled_for,
            location: new.location,
            status: new.status,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .appointments
            .push(appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        let appointment = tables
            .appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(scheduled_for) = update.scheduled_for {
            appointment.scheduled_for = scheduled_for;
        }
        if let Some(location) = update.location {
            appointment.location = location;
        }
        if let Some(status) = update.status {
            appointment.status = status;
        }
        Ok(appointment.clone())
    }

    async fn list_appointments(&self, referral_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| a.referral_id == referral_id)
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        Ok(appointments)
    }

    async fn insert_timeline_event(
        &self,
        referral_id: Uuid,
        event: NewTimelineEvent,
    ) -> Result<TimelineEvent, StoreError> {
        if self.fail_timeline_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!("timeline writes disabled")));
        }
        let event = TimelineEvent {
            id: Uuid::new_v4(),
            referral_id,
            kind: event.kind,
            description: event.description,
            timestamp: event.timestamp,
        };
        self.tables.write().await.timeline.push(event.clone());
        Ok(event)
    }

    async fn list_timeline_events(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<TimelineEvent>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .timeline
            .iter()
            .filter(|e| e.referral_id == referral_id)
            .cloned()
            .collect())
    }

    async fn insert_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let task = Task {
            id: Uuid::new_v4(),
            referral_id: new.referral_id,
            kind: new.kind,
            status: TaskStatus::Open,
            due_at: new.due_at,
            assigned_to: new.assigned_to,
            created_at: Utc::now(),
        };
        self.tables.write().await.tasks.push(task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        let tables = self.tables.read().await;
        tables
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_open_tasks(
        &self,
        referral_id: Option<Uuid>,
        kind: Option<TaskKind>,
    ) -> Result<Vec<Task>, StoreError> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Open)
            .filter(|t| referral_id.is_none_or(|id| t.referral_id == id))
            .filter(|t| kind.is_none_or(|k| t.kind == k))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| match (a.due_at, b.due_at) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.created_at.cmp(&b.created_at),
        });
        Ok(tasks)
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Task, StoreError> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound)?;
        task.status = status;
        Ok(task.clone())
    }

    async fn insert_notification(
        &self,
        new: NewNotification,
    ) -> Result<Notification, StoreError> {
        if self.fail_notification_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!("notification writes disabled")));
        }
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            kind: new.kind,
            channel: new.channel,
            message: new.message,
            is_read: false,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_seed_rows() {
        let (store, seed) = InMemoryStore::with_demo_data();
        let maria = store.get_patient(seed.maria).await.unwrap();
        assert_eq!(maria.full_name, "Maria Garcia");

        let referral = store.get_referral(seed.cardiology_referral).await.unwrap();
        assert_eq!(referral.status, ReferralStatus::Sent);
        assert_eq!(referral.specialty, Specialty::Cardiology);
        assert!(referral.transportation_needed);

        let timeline = store
            .list_timeline_events(seed.cardiology_referral)
            .await
            .unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].kind, TimelineEventKind::ReferralSent);
    }

    #[tokio::test]
    async fn test_status_cas_conflict() {
        let (store, seed) = InMemoryStore::with_demo_data();
        let referral = store.get_referral(seed.cardiology_referral).await.unwrap();

        store
            .update_referral_status(referral.id, ReferralStatus::Booked, Some(referral.version))
            .await
            .unwrap();

        // Stale version loses.
        let err = store
            .update_referral_status(referral.id, ReferralStatus::Closed, Some(referral.version))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        // Unconditional write still goes through.
        let updated = store
            .update_referral_status(referral.id, ReferralStatus::Closed, None)
            .await
            .unwrap();
        assert_eq!(updated.status, ReferralStatus::Closed);
    }

    #[tokio::test]
    async fn test_appointments_sorted_earliest_first() {
        let (store, seed) = InMemoryStore::with_demo_data();
        let later = Utc::now() + chrono::Duration::days(5);
        let sooner = Utc::now() + chrono::Duration::days(1);
        for at in [later, sooner] {
            store
                .insert_appointment(
                    seed.cardiology_referral,
                    NewAppointment {
                        scheduled_for: at,
                        location: "Clinic".to_string(),
                        status: crate::referral::types::AppointmentStatus::Booked,
                    },
                )
                .await
                .unwrap();
        }
        let appointments = store
            .list_appointments(seed.cardiology_referral)
            .await
            .unwrap();
        assert_eq!(appointments[0].scheduled_for, sooner);
        assert_eq!(appointments[1].scheduled_for, later);
    }

    #[tokio::test]
    async fn test_specialist_queue_filter() {
        let (store, seed) = InMemoryStore::with_demo_data();
        store
            .update_referral_status(seed.orthopedics_referral, ReferralStatus::Booked, None)
            .await
            .unwrap();

        let queue = store
            .list_referrals(&ReferralFilter::mine(Role::Specialist, Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, seed.cardiology_referral);
    }

    #[tokio::test]
    async fn test_contact_update_leaves_other_fields() {
        let (store, seed) = InMemoryStore::with_demo_data();
        let updated = store
            .update_patient_contact(
                seed.maria,
                ContactUpdate {
                    phone: Some("555-0199".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone.as_deref(), Some("555-0199"));
        assert_eq!(updated.email.as_deref(), Some("maria@example.com"));
        assert_eq!(updated.risk_score, 1);
    }

    #[tokio::test]
    async fn test_patient_scope_filter() {
        let (store, seed) = InMemoryStore::with_demo_data();
        let mine = store
            .list_referrals(&ReferralFilter::mine(Role::Patient, seed.maria))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].patient_id, seed.maria);
    }
}
