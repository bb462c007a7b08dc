// Referral State Machine Module
//
// Owns every referral/appointment status transition and the side effects
// derived from it: follow-up tasks, timeline audit lines, and patient
// notifications. Collaborators never call back into the coordinator.

pub mod coordinator;
pub mod errors;
pub mod transitions;
pub mod types;

pub use coordinator::{CoordinatorSettings, ReferralCoordinator};
pub use errors::{CoordinationError, EntityKind};
pub use types::{
    Actor, Appointment, AppointmentStatus, CreateReferral, Notification, NotificationChannel,
    NotificationKind, Patient, Priority, Referral, ReferralStatus, Role, Specialty, Task,
    TaskKind, TaskStatus, TimelineEvent, TimelineEventKind,
};
