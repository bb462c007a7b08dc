// Referral coordinator - the state machine and its derived side effects.
//
// Every mutating operation follows the same shape: serialize on the
// referral, validate the transition against a consistent read, apply the
// core writes (appointment, tasks, status CAS), then the best-effort
// side effects (timeline line, patient notification). Caller errors are
// raised before the first write, so they leave no partial state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::notify::{NotificationDispatcher, NotificationSender};
use crate::storage::{ReferralFilter, ReferralStore, StoreError};
use crate::tasks::TaskManager;
use crate::timeline::TimelineRecorder;

use super::errors::{CoordinationError, EntityKind};
use super::transitions;
use super::types::{
    Actor, Appointment, AppointmentStatus, AppointmentUpdate, CreateReferral, NewAppointment,
    NewReferral, NotificationChannel, NotificationKind, Priority, Referral, ReferralStatus,
    Specialty, Task, TaskKind, TimelineEvent, TimelineEventKind,
};

/// Policy knobs for derived side effects.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// How long the nursing station gets to rebook after a no-show.
    pub reschedule_due_after: Duration,
    pub reschedule_assignee: String,
    pub transport_assignee: String,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            reschedule_due_after: Duration::hours(24),
            reschedule_assignee: "Nursing Station".to_string(),
            transport_assignee: "Volunteer Drivers".to_string(),
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &crate::config::TaskPolicyConfig) -> Self {
        Self {
            reschedule_due_after: Duration::hours(config.reschedule_due_hours),
            reschedule_assignee: config.reschedule_assignee.clone(),
            transport_assignee: config.transport_assignee.clone(),
        }
    }
}

/// Per-referral async lock registry. The referral aggregate (referral +
/// its appointment + its tasks) is the unit of mutual exclusion.
#[derive(Default)]
struct ReferralLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl ReferralLocks {
    async fn acquire(&self, referral_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().expect("referral lock registry poisoned");
            locks
                .entry(referral_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub struct ReferralCoordinator {
    store: Arc<dyn ReferralStore>,
    timeline: TimelineRecorder,
    tasks: TaskManager,
    notifications: NotificationDispatcher,
    locks: ReferralLocks,
    settings: CoordinatorSettings,
}

impl ReferralCoordinator {
    pub fn new(
        store: Arc<dyn ReferralStore>,
        sender: Arc<dyn NotificationSender>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            timeline: TimelineRecorder::new(store.clone()),
            tasks: TaskManager::new(store.clone()),
            notifications: NotificationDispatcher::new(store.clone(), sender),
            locks: ReferralLocks::default(),
            settings,
            store,
        }
    }

    pub fn with_defaults(
        store: Arc<dyn ReferralStore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self::new(store, sender, CoordinatorSettings::default())
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    // -- operations -------------------------------------------------------

    /// Nurse sends a referral to a specialty. The referral starts in SENT.
    pub async fn create_referral(
        &self,
        actor: &Actor,
        request: CreateReferral,
    ) -> Result<Referral, CoordinationError> {
        let specialty: Specialty = request
            .specialty
            .parse()
            .map_err(CoordinationError::Validation)?;
        let priority: Priority = request
            .priority
            .parse()
            .map_err(CoordinationError::Validation)?;

        let patient = self
            .store
            .get_patient(request.patient_id)
            .await
            .map_err(CoordinationError::from_store(
                EntityKind::Patient,
                request.patient_id,
            ))?;

        let referral = self
            .store
            .insert_referral(NewReferral {
                patient_id: patient.id,
                created_by: actor.id,
                specialty,
                priority,
                status: ReferralStatus::Sent,
                notes: request.notes,
                due_date: request.due_date,
                transportation_needed: request.transportation_needed,
                is_urgent: request.is_urgent,
            })
            .await
            .map_err(CoordinationError::Dependency)?;

        self.timeline
            .record(
                referral.id,
                TimelineEventKind::ReferralSent,
                "Referral sent to specialist",
            )
            .await;

        tracing::info!(
            referral_id = %referral.id,
            patient_id = %patient.id,
            specialty = %specialty,
            priority = %priority,
            actor = %actor.role,
            "referral created"
        );
        Ok(referral)
    }

    /// Specialist books (or re-books) the appointment slot. Any stale
    /// reschedule task is closed in the same operation.
    pub async fn book_appointment(
        &self,
        actor: &Actor,
        referral_id: Uuid,
        scheduled_for: DateTime<Utc>,
        location: &str,
    ) -> Result<Appointment, CoordinationError> {
        let _guard = self.locks.acquire(referral_id).await;

        let referral = self.load_referral(referral_id).await?;
        if !transitions::can_book(referral.status) {
            return Err(CoordinationError::invalid_transition(
                "book_appointment",
                EntityKind::Referral,
                referral.status,
            ));
        }

        let appointments = self
            .store
            .list_appointments(referral_id)
            .await
            .map_err(CoordinationError::Dependency)?;

        // A still-active slot is moved in place; a no-show or fresh
        // referral gets a new row, preserving history.
        let appointment = match appointments.iter().find(|a| a.status.is_active()) {
            Some(active) => self
                .store
                .update_appointment(
                    active.id,
                    AppointmentUpdate {
                        scheduled_for: Some(scheduled_for),
                        location: Some(location.to_string()),
                        status: Some(AppointmentStatus::Booked),
                    },
                )
                .await
                .map_err(CoordinationError::from_store(
                    EntityKind::Appointment,
                    active.id,
                ))?,
            None => self
                .store
                .insert_appointment(
                    referral_id,
                    NewAppointment {
                        scheduled_for,
                        location: location.to_string(),
                        status: AppointmentStatus::Booked,
                    },
                )
                .await
                .map_err(CoordinationError::Dependency)?,
        };

        self.tasks
            .close_open_tasks(referral_id, TaskKind::Reschedule)
            .await
            .map_err(CoordinationError::Dependency)?;

        self.transition_status(&referral, ReferralStatus::Booked, transitions::can_book, "book_appointment")
            .await?;

        self.timeline
            .record(
                referral_id,
                TimelineEventKind::AppointmentBooked,
                "Appointment scheduled by specialist",
            )
            .await;
        self.notifications
            .notify(
                referral.patient_id,
                NotificationKind::AppointmentBooked,
                NotificationChannel::Sms,
                "Your appointment has been scheduled.",
            )
            .await;

        tracing::info!(
            referral_id = %referral_id,
            appointment_id = %appointment.id,
            scheduled_for = %scheduled_for,
            actor = %actor.role,
            "appointment booked"
        );
        Ok(appointment)
    }

    /// Specialist moves an existing appointment to a new slot. The row is
    /// mutated in place; no history row is created.
    pub async fn reschedule_appointment(
        &self,
        actor: &Actor,
        referral_id: Uuid,
        appointment_id: Uuid,
        new_time: DateTime<Utc>,
        new_location: &str,
    ) -> Result<Appointment, CoordinationError> {
        let _guard = self.locks.acquire(referral_id).await;

        let referral = self.load_referral(referral_id).await?;
        if !transitions::can_reschedule(referral.status) {
            return Err(CoordinationError::invalid_transition(
                "reschedule_appointment",
                EntityKind::Referral,
                referral.status,
            ));
        }
        self.find_appointment(referral_id, appointment_id).await?;

        // Back to BOOKED: a moved slot needs the patient to confirm again.
        let appointment = self
            .store
            .update_appointment(
                appointment_id,
                AppointmentUpdate {
                    scheduled_for: Some(new_time),
                    location: Some(new_location.to_string()),
                    status: Some(AppointmentStatus::Booked),
                },
            )
            .await
            .map_err(CoordinationError::from_store(
                EntityKind::Appointment,
                appointment_id,
            ))?;

        self.tasks
            .close_open_tasks(referral_id, TaskKind::Reschedule)
            .await
            .map_err(CoordinationError::Dependency)?;

        self.transition_status(
            &referral,
            ReferralStatus::Booked,
            transitions::can_reschedule,
            "reschedule_appointment",
        )
        .await?;

        self.timeline
            .record(
                referral_id,
                TimelineEventKind::AppointmentRescheduled,
                "Appointment rescheduled",
            )
            .await;
        self.notifications
            .notify(
                referral.patient_id,
                NotificationKind::AppointmentRescheduled,
                NotificationChannel::Email,
                format!(
                    "Your appointment has been rescheduled to {} at {new_location}.",
                    new_time.format("%Y-%m-%d %H:%M UTC")
                ),
            )
            .await;

        tracing::info!(
            referral_id = %referral_id,
            appointment_id = %appointment_id,
            scheduled_for = %new_time,
            actor = %actor.role,
            "appointment rescheduled"
        );
        Ok(appointment)
    }

    /// Patient confirms they will attend.
    pub async fn confirm_appointment(
        &self,
        actor: &Actor,
        referral_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Referral, CoordinationError> {
        let _guard = self.locks.acquire(referral_id).await;

        let referral = self.load_referral(referral_id).await?;
        let appointment = self.find_appointment(referral_id, appointment_id).await?;
        if !transitions::can_confirm(appointment.status) {
            return Err(CoordinationError::invalid_transition(
                "confirm_appointment",
                EntityKind::Appointment,
                appointment.status,
            ));
        }

        self.store
            .update_appointment(
                appointment_id,
                AppointmentUpdate {
                    status: Some(AppointmentStatus::Confirmed),
                    ..Default::default()
                },
            )
            .await
            .map_err(CoordinationError::from_store(
                EntityKind::Appointment,
                appointment_id,
            ))?;

        let updated = self
            .transition_status(&referral, ReferralStatus::Confirmed, |_| true, "confirm_appointment")
            .await?;

        self.timeline
            .record(
                referral_id,
                TimelineEventKind::PatientConfirmed,
                "Patient confirmed appointment",
            )
            .await;
        self.notifications
            .notify(
                referral.patient_id,
                NotificationKind::AppointmentConfirmed,
                NotificationChannel::Email,
                "Appointment confirmed.",
            )
            .await;

        tracing::info!(
            referral_id = %referral_id,
            appointment_id = %appointment_id,
            actor = %actor.role,
            "appointment confirmed"
        );
        Ok(updated)
    }

    /// Specialist records that the patient attended.
    pub async fn mark_attended(
        &self,
        actor: &Actor,
        referral_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Referral, CoordinationError> {
        let _guard = self.locks.acquire(referral_id).await;

        let referral = self.load_referral(referral_id).await?;
        let appointment = self.find_appointment(referral_id, appointment_id).await?;
        if !transitions::can_mark_attended(appointment.status) {
            return Err(CoordinationError::invalid_transition(
                "mark_attended",
                EntityKind::Appointment,
                appointment.status,
            ));
        }

        self.store
            .update_appointment(
                appointment_id,
                AppointmentUpdate {
                    status: Some(AppointmentStatus::Attended),
                    ..Default::default()
                },
            )
            .await
            .map_err(CoordinationError::from_store(
                EntityKind::Appointment,
                appointment_id,
            ))?;

        let updated = self
            .transition_status(&referral, ReferralStatus::Attended, |_| true, "mark_attended")
            .await?;

        self.timeline
            .record(
                referral_id,
                TimelineEventKind::Attended,
                "Patient attended appointment",
            )
            .await;

        tracing::info!(
            referral_id = %referral_id,
            appointment_id = %appointment_id,
            actor = %actor.role,
            "patient attended"
        );
        Ok(updated)
    }

    /// Specialist records a missed appointment. Opens the reschedule task
    /// and flags the referral for rebooking. Calling it again for the same
    /// no-show is a no-op.
    pub async fn mark_no_show(
        &self,
        actor: &Actor,
        referral_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Referral, CoordinationError> {
        let _guard = self.locks.acquire(referral_id).await;

        let referral = self.load_referral(referral_id).await?;
        let appointment = self.find_appointment(referral_id, appointment_id).await?;
        if appointment.status == AppointmentStatus::NoShow {
            tracing::debug!(
                referral_id = %referral_id,
                appointment_id = %appointment_id,
                "appointment already marked no-show"
            );
            return Ok(referral);
        }

        self.store
            .update_appointment(
                appointment_id,
                AppointmentUpdate {
                    status: Some(AppointmentStatus::NoShow),
                    ..Default::default()
                },
            )
            .await
            .map_err(CoordinationError::from_store(
                EntityKind::Appointment,
                appointment_id,
            ))?;

        let due_at = Utc::now() + self.settings.reschedule_due_after;
        self.tasks
            .open_task_if_none(
                referral_id,
                TaskKind::Reschedule,
                Some(due_at),
                &self.settings.reschedule_assignee,
            )
            .await
            .map_err(CoordinationError::Dependency)?;

        let updated = self
            .transition_status(&referral, ReferralStatus::NeedsReschedule, |_| true, "mark_no_show")
            .await?;

        self.timeline
            .record(referral_id, TimelineEventKind::NoShow, "Patient did not attend")
            .await;
        self.notifications
            .notify(
                referral.patient_id,
                NotificationKind::NoShow,
                NotificationChannel::Email,
                "You were marked as no-show. Please request a reschedule.",
            )
            .await;

        tracing::info!(
            referral_id = %referral_id,
            appointment_id = %appointment_id,
            actor = %actor.role,
            "no-show recorded"
        );
        Ok(updated)
    }

    /// Patient asks for a different slot.
    pub async fn request_reschedule(
        &self,
        actor: &Actor,
        referral_id: Uuid,
    ) -> Result<Referral, CoordinationError> {
        let _guard = self.locks.acquire(referral_id).await;

        let referral = self.load_referral(referral_id).await?;
        if !transitions::can_request_reschedule(referral.status) {
            return Err(CoordinationError::invalid_transition(
                "request_reschedule",
                EntityKind::Referral,
                referral.status,
            ));
        }

        let due_at = Utc::now() + self.settings.reschedule_due_after;
        self.tasks
            .open_task_if_none(
                referral_id,
                TaskKind::Reschedule,
                Some(due_at),
                &self.settings.reschedule_assignee,
            )
            .await
            .map_err(CoordinationError::Dependency)?;

        let updated = self
            .transition_status(
                &referral,
                ReferralStatus::NeedsReschedule,
                transitions::can_request_reschedule,
                "request_reschedule",
            )
            .await?;

        self.timeline
            .record(
                referral_id,
                TimelineEventKind::RescheduleRequested,
                "Patient requested reschedule",
            )
            .await;

        tracing::info!(referral_id = %referral_id, actor = %actor.role, "reschedule requested");
        Ok(updated)
    }

    /// Patient asks for a ride. Always opens a transport task.
    pub async fn request_transport(
        &self,
        actor: &Actor,
        referral_id: Uuid,
    ) -> Result<Referral, CoordinationError> {
        let _guard = self.locks.acquire(referral_id).await;

        let referral = self
            .store
            .set_transportation_needed(referral_id, true)
            .await
            .map_err(CoordinationError::from_store(
                EntityKind::Referral,
                referral_id,
            ))?;

        self.tasks
            .open_task(
                referral_id,
                TaskKind::Transport,
                None,
                &self.settings.transport_assignee,
            )
            .await
            .map_err(CoordinationError::Dependency)?;

        self.timeline
            .record(
                referral_id,
                TimelineEventKind::TransportRequested,
                "Patient requested transportation",
            )
            .await;

        tracing::info!(referral_id = %referral_id, actor = %actor.role, "transportation requested");
        Ok(referral)
    }

    /// Nurse escape hatch: force a status, bypassing derived-task logic.
    /// Not silent: the override lands on the timeline.
    pub async fn set_status(
        &self,
        actor: &Actor,
        referral_id: Uuid,
        new_status: ReferralStatus,
    ) -> Result<Referral, CoordinationError> {
        let _guard = self.locks.acquire(referral_id).await;

        let referral = self.load_referral(referral_id).await?;
        let updated = self
            .transition_status(&referral, new_status, |_| true, "set_status")
            .await?;

        self.timeline
            .record(
                referral_id,
                TimelineEventKind::StatusOverridden,
                format!("Status manually set to {new_status}"),
            )
            .await;

        tracing::warn!(
            referral_id = %referral_id,
            from = %referral.status,
            to = %new_status,
            actor = %actor.role,
            "status manually overridden"
        );
        Ok(updated)
    }

    /// Nurse closes a follow-up task. Closing a DONE task is a no-op.
    pub async fn close_task(&self, actor: &Actor, task_id: Uuid) -> Result<Task, CoordinationError> {
        let task = self
            .tasks
            .close_task(task_id)
            .await
            .map_err(CoordinationError::from_store(EntityKind::Task, task_id))?;
        tracing::info!(task_id = %task_id, actor = %actor.role, "task closed");
        Ok(task)
    }

    // -- reads ------------------------------------------------------------

    pub async fn get_referral(&self, referral_id: Uuid) -> Result<Referral, CoordinationError> {
        self.load_referral(referral_id).await
    }

    pub async fn list_referrals(
        &self,
        filter: &ReferralFilter,
    ) -> Result<Vec<Referral>, CoordinationError> {
        self.store
            .list_referrals(filter)
            .await
            .map_err(CoordinationError::Dependency)
    }

    pub async fn referral_timeline(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<TimelineEvent>, CoordinationError> {
        self.timeline
            .history(referral_id)
            .await
            .map_err(CoordinationError::Dependency)
    }

    pub async fn appointments(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<Appointment>, CoordinationError> {
        self.store
            .list_appointments(referral_id)
            .await
            .map_err(CoordinationError::Dependency)
    }

    // -- internals --------------------------------------------------------

    async fn load_referral(&self, referral_id: Uuid) -> Result<Referral, CoordinationError> {
        self.store
            .get_referral(referral_id)
            .await
            .map_err(CoordinationError::from_store(
                EntityKind::Referral,
                referral_id,
            ))
    }

    async fn find_appointment(
        &self,
        referral_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Appointment, CoordinationError> {
        let appointments = self
            .store
            .list_appointments(referral_id)
            .await
            .map_err(CoordinationError::Dependency)?;
        appointments
            .into_iter()
            .find(|a| a.id == appointment_id)
            .ok_or(CoordinationError::NotFound {
                entity: EntityKind::Appointment,
                id: appointment_id,
            })
    }

    /// CAS status write, retried once on a lost race: re-read, re-check
    /// the guard against the fresh status, re-apply. A second loss
    /// surfaces Conflict.
    async fn transition_status(
        &self,
        referral: &Referral,
        new_status: ReferralStatus,
        guard: impl Fn(ReferralStatus) -> bool,
        operation: &'static str,
    ) -> Result<Referral, CoordinationError> {
        match self
            .store
            .update_referral_status(referral.id, new_status, Some(referral.version))
            .await
        {
            Ok(updated) => Ok(updated),
            Err(StoreError::Conflict) => {
                tracing::debug!(
                    referral_id = %referral.id,
                    operation = operation,
                    "version conflict, retrying once"
                );
                let current = self.load_referral(referral.id).await?;
                if !guard(current.status) {
                    return Err(CoordinationError::invalid_transition(
                        operation,
                        EntityKind::Referral,
                        current.status,
                    ));
                }
                self.store
                    .update_referral_status(current.id, new_status, Some(current.version))
                    .await
                    .map_err(CoordinationError::from_store(
                        EntityKind::Referral,
                        referral.id,
                    ))
            }
            Err(other) => Err(CoordinationError::from_store(EntityKind::Referral, referral.id)(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_matches_config_default() {
        let config = crate::config::ClearwaterConfig::default();
        let settings = CoordinatorSettings::from_config(&config.tasks);
        assert_eq!(settings.reschedule_due_after, Duration::hours(24));
        assert_eq!(settings.reschedule_assignee, "Nursing Station");
        assert_eq!(settings.transport_assignee, "Volunteer Drivers");
    }
}
