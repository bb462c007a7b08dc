// Transition table for the referral state machine.
//
// Guards are pure functions of the persisted status so the coordinator can
// validate an operation against a consistent read before its first write.

use super::types::{AppointmentStatus, ReferralStatus};

/// An appointment may be booked unless the referral is finished.
pub fn can_book(status: ReferralStatus) -> bool {
    !status.is_terminal()
}

/// Reschedule moves an existing appointment; only defined while the
/// referral is sitting on a booked slot or waiting for a new one.
pub fn can_reschedule(status: ReferralStatus) -> bool {
    matches!(status, ReferralStatus::Booked | ReferralStatus::NeedsReschedule)
}

/// A patient may ask for a different slot any time one is on the books.
pub fn can_request_reschedule(status: ReferralStatus) -> bool {
    matches!(
        status,
        ReferralStatus::Booked | ReferralStatus::Confirmed | ReferralStatus::NeedsReschedule
    )
}

/// Confirming an appointment that was already attended is undefined.
pub fn can_confirm(status: AppointmentStatus) -> bool {
    status != AppointmentStatus::Attended
}

/// Attendance is recorded once.
pub fn can_mark_attended(status: AppointmentStatus) -> bool {
    status != AppointmentStatus::Attended
}
