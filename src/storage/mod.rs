// Storage collaborator seam.
//
// One trait, two implementations: an in-memory fixture store and a sqlx
// SQLite store behind the `database` feature. The implementation is picked
// once at process startup and injected as `Arc<dyn ReferralStore>`.

pub mod memory;

#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::referral::types::{
    Appointment, AppointmentUpdate, ContactUpdate, NewAppointment, NewNotification, NewPatient,
    NewReferral, NewTask, NewTimelineEvent, Notification, Patient, Referral, ReferralStatus, Role,
    Task, TaskKind, TaskStatus, TimelineEvent,
};

pub use memory::InMemoryStore;

#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("version conflict")]
    Conflict,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(other.into()),
        }
    }
}

/// Which slice of referrals a listing wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListScope {
    #[default]
    All,
    Mine,
}

/// Listing filter. `Mine` + patient narrows to that patient's referrals;
/// `Mine` + specialist narrows to the specialist work queue (referrals
/// awaiting booking or rebooking).
#[derive(Debug, Clone, Default)]
pub struct ReferralFilter {
    pub scope: ListScope,
    pub role: Option<Role>,
    pub user_id: Option<Uuid>,
}

impl ReferralFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn mine(role: Role, user_id: Uuid) -> Self {
        Self {
            scope: ListScope::Mine,
            role: Some(role),
            user_id: Some(user_id),
        }
    }

    /// Statuses that make up the specialist work queue.
    pub fn specialist_queue_statuses() -> [ReferralStatus; 2] {
        [ReferralStatus::Sent, ReferralStatus::NeedsReschedule]
    }
}

/// Read/write operations the coordinator needs from persistence.
///
/// Implementations must keep appointments earliest-first, timeline events
/// in creation order, and bump the referral version on every status write.
#[async_trait]
pub trait ReferralStore: Send + Sync {
    // -- patients ---------------------------------------------------------

    async fn get_patient(&self, id: Uuid) -> Result<Patient, StoreError>;

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;

    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, StoreError>;

    async fn update_patient_contact(
        &self,
        id: Uuid,
        update: ContactUpdate,
    ) -> Result<Patient, StoreError>;

    // -- referrals --------------------------------------------------------

    async fn get_referral(&self, id: Uuid) -> Result<Referral, StoreError>;

    async fn list_referrals(&self, filter: &ReferralFilter) -> Result<Vec<Referral>, StoreError>;

    async fn insert_referral(&self, new: NewReferral) -> Result<Referral, StoreError>;

    /// Compare-and-swap status write. With `expected_version`, fails with
    /// `Conflict` when the stored version moved; without it, last write
    /// wins (manual override path).
    async fn update_referral_status(
        &self,
        id: Uuid,
        status: ReferralStatus,
        expected_version: Option<i64>,
    ) -> Result<Referral, StoreError>;

    async fn set_transportation_needed(
        &self,
        id: Uuid,
        needed: bool,
    ) -> Result<Referral, StoreError>;

    // -- appointments -----------------------------------------------------

    async fn insert_appointment(
        &self,
        referral_id: Uuid,
        new: NewAppointment,
    ) -> Result<Appointment, StoreError>;

    async fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, StoreError>;

    /// Appointments for a referral, earliest `scheduled_for` first.
    async fn list_appointments(&self, referral_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    // -- timeline ---------------------------------------------------------

    async fn insert_timeline_event(
        &self,
        referral_id: Uuid,
        event: NewTimelineEvent,
    ) -> Result<TimelineEvent, StoreError>;

    /// Timeline in creation order.
    async fn list_timeline_events(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<TimelineEvent>, StoreError>;

    // -- tasks ------------------------------------------------------------

    async fn insert_task(&self, new: NewTask) -> Result<Task, StoreError>;

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError>;

    async fn list_open_tasks(
        &self,
        referral_id: Option<Uuid>,
        kind: Option<TaskKind>,
    ) -> Result<Vec<Task>, StoreError>;

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Task, StoreError>;

    // -- notifications ----------------------------------------------------

    async fn insert_notification(
        &self,
        new: NewNotification,
    ) -> Result<Notification, StoreError>;

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError>;
}
