//! Concurrency tests
//!
//! Operations on one referral are serialized by the coordinator's
//! per-referral lock, with a version CAS behind it. Racing calls must
//! settle on exactly one final state with no duplicate tasks and no lost
//! updates.

use chrono::{Duration, Utc};

use clearwater_loop::{ReferralStatus, TaskKind};

mod fixtures;
use fixtures::TestLoop;

#[tokio::test(flavor = "multi_thread")]
async fn test_simultaneous_no_shows_produce_one_task() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;
    let specialist = fixture.specialist();

    let appointment = fixture
        .coordinator
        .book_appointment(&specialist, referral_id, Utc::now(), "Clinic A")
        .await
        .unwrap();

    let (first, second) = futures::join!(
        fixture
            .coordinator
            .mark_no_show(&specialist, referral_id, appointment.id),
        fixture
            .coordinator
            .mark_no_show(&specialist, referral_id, appointment.id),
    );
    first.unwrap();
    second.unwrap();

    let current = fixture.coordinator.get_referral(referral_id).await.unwrap();
    assert_eq!(current.status, ReferralStatus::NeedsReschedule);

    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Reschedule))
        .await
        .unwrap();
    assert_eq!(open.len(), 1, "racing no-shows must not duplicate the task");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_book_and_no_show_race_settles_consistently() {
    let fixture = TestLoop::new();
    let referral_id = fixture.seed.cardiology_referral;
    let specialist = fixture.specialist();

    let appointment = fixture
        .coordinator
        .book_appointment(&specialist, referral_id, Utc::now(), "Clinic A")
        .await
        .unwrap();

    let (rebook, no_show) = futures::join!(
        fixture.coordinator.book_appointment(
            &specialist,
            referral_id,
            Utc::now() + Duration::days(7),
            "Clinic B",
        ),
        fixture
            .coordinator
            .mark_no_show(&specialist, referral_id, appointment.id),
    );
    rebook.unwrap();
    no_show.unwrap();

    // Whichever order the lock granted, status and tasks must agree.
    let current = fixture.coordinator.get_referral(referral_id).await.unwrap();
    let open = fixture
        .coordinator
        .tasks()
        .open_tasks(Some(referral_id), Some(TaskKind::Reschedule))
        .await
        .unwrap();
    match current.status {
        ReferralStatus::NeedsReschedule => assert_eq!(open.len(), 1),
        ReferralStatus::Booked => assert!(open.is_empty()),
        other => panic!("unexpected final status {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_operations_on_distinct_referrals_do_not_interfere() {
    let fixture = TestLoop::new();
    let specialist = fixture.specialist();

    let (a, b) = futures::join!(
        fixture.coordinator.book_appointment(
            &specialist,
            fixture.seed.cardiology_referral,
            Utc::now(),
            "Clinic A",
        ),
        fixture.coordinator.book_appointment(
            &specialist,
            fixture.seed.orthopedics_referral,
            Utc::now(),
            "Clinic B",
        ),
    );
    a.unwrap();
    b.unwrap();

    for id in [
        fixture.seed.cardiology_referral,
        fixture.seed.orthopedics_referral,
    ] {
        let referral = fixture.coordinator.get_referral(id).await.unwrap();
        assert_eq!(referral.status, ReferralStatus::Booked);
    }
}
