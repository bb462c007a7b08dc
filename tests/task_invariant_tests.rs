//! Task/status invariant tests
//!
//! The load-bearing invariant: a referral is NEEDS_RESCHEDULE iff exactly
//! one OPEN reschedule task exists for it. Every path that could violate
//! it is exercised here.

use chrono::{Duration, Utc};
use uuid::Uuid;

use clearwater_loop::{AppointmentStatus, CoordinationError, ReferralStatus, TaskKind, TaskStatus};

mod fixtures;
use fixtures::TestLoop;

#[tokio::test]
async fn test_no_show_opens_exactly_one_reschedule_task() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;
    let specialist = fixture.specialist();

    let appointment = fixture
        .coordinator
        .book_appointment(&specialist, referral_id, Utc::now(), "Clinic A")
        .await
        .unwrap();
    let current = fixture
        .coordinator
        .mark_no_show(&specialist, referral_id, appointment.id)
        .await
        .unwrap();

    // Both directions of the invariant.
    assert_eq!(current.status, ReferralStatus::NeedsReschedule);
    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Reschedule))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn test_no_show_is_idempotent() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;
    let specialist = fixture.specialist();

    let appointment = fixture
        .coordinator
        .book_appointment(&specialist, referral_id, Utc::now(), "Clinic A")
        .await
        .unwrap();

    for _ in 0..2 {
        fixture
            .coordinator
            .mark_no_show(&specialist, referral_id, appointment.id)
            .await
            .unwrap();
    }

    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Reschedule))
        .await
        .unwrap();
    assert_eq!(open.len(), 1, "double no-show must not duplicate the task");
}

#[tokio::test]
async fn test_booking_closes_open_reschedule_task() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;
    let specialist = fixture.specialist();

    let appointment = fixture
        .coordinator
        .book_appointment(&specialist, referral_id, Utc::now(), "Clinic A")
        .await
        .unwrap();
    fixture
        .coordinator
        .mark_no_show(&specialist, referral_id, appointment.id)
        .await
        .unwrap();

    // Rebooking after the no-show clears the stale task atomically.
    fixture
        .coordinator
        .book_appointment(
            &specialist,
            referral_id,
            Utc::now() + Duration::days(7),
            "Clinic B",
        )
        .await
        .unwrap();

    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Reschedule))
        .await
        .unwrap();
    assert!(open.is_empty(), "no dangling task after rebooking");

    let current = fixture.coordinator.get_referral(referral_id).await.unwrap();
    assert_eq!(current.status, ReferralStatus::Booked);

    // The no-show row stays as history; the new slot is a fresh row.
    let appointments = fixture.coordinator.appointments(referral_id).await.unwrap();
    assert_eq!(appointments.len(), 2);
    assert!(appointments
        .iter()
        .any(|a| a.status == AppointmentStatus::NoShow));
    assert!(appointments
        .iter()
        .any(|a| a.status == AppointmentStatus::Booked));
}

#[tokio::test]
async fn test_reschedule_round_trip() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;
    let specialist = fixture.specialist();

    let appointment = fixture
        .coordinator
        .book_appointment(&specialist, referral_id, Utc::now(), "Clinic A")
        .await
        .unwrap();
    fixture
        .coordinator
        .mark_no_show(&specialist, referral_id, appointment.id)
        .await
        .unwrap();

    let new_slot = Utc::now() + Duration::days(3);
    let moved = fixture
        .coordinator
        .reschedule_appointment(&specialist, referral_id, appointment.id, new_slot, "Clinic C")
        .await
        .unwrap();

    // Same row, new slot.
    assert_eq!(moved.id, appointment.id);
    assert_eq!(moved.scheduled_for, new_slot);
    assert_eq!(moved.location, "Clinic C");

    let current = fixture.coordinator.get_referral(referral_id).await.unwrap();
    assert_eq!(current.status, ReferralStatus::Booked);

    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Reschedule))
        .await
        .unwrap();
    assert!(open.is_empty());
}

#[tokio::test]
async fn test_patient_reschedule_request_deduplicates_tasks() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;
    let specialist = fixture.specialist();

    fixture
        .coordinator
        .book_appointment(&specialist, referral_id, Utc::now(), "Clinic A")
        .await
        .unwrap();

    for _ in 0..2 {
        let current = fixture
            .coordinator
            .request_reschedule(&fixture.maria(), referral_id)
            .await
            .unwrap();
        assert_eq!(current.status, ReferralStatus::NeedsReschedule);
    }

    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Reschedule))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn test_close_task_by_nurse() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;

    fixture
        .coordinator
        .request_transport(&fixture.maria(), referral_id)
        .await
        .unwrap();
    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Transport))
        .await
        .unwrap();

    let closed = fixture
        .coordinator
        .close_task(&fixture.nurse(), open[0].id)
        .await
        .unwrap();
    assert_eq!(closed.status, TaskStatus::Done);

    // Idempotent close, NotFound for unknown ids.
    let again = fixture
        .coordinator
        .close_task(&fixture.nurse(), open[0].id)
        .await
        .unwrap();
    assert_eq!(again.status, TaskStatus::Done);

    let err = fixture
        .coordinator
        .close_task(&fixture.nurse(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::NotFound { .. }));
}

#[tokio::test]
async fn test_reschedule_task_due_offset_defaults_to_24h() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;
    let specialist = fixture.specialist();

    let before = Utc::now();
    let appointment = fixture
        .coordinator
        .book_appointment(&specialist, referral_id, Utc::now(), "Clinic A")
        .await
        .unwrap();
    fixture
        .coordinator
        .mark_no_show(&specialist, referral_id, appointment.id)
        .await
        .unwrap();

    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Reschedule))
        .await
        .unwrap();
    let due_at = open[0].due_at.unwrap();
    let offset = due_at - before;
    assert!(offset > Duration::hours(23) && offset <= Duration::hours(25));
}
