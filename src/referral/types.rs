// Core domain types for the referral coordination loop

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of the person invoking an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Nurse,
    Specialist,
    Patient,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Nurse => "nurse",
            Role::Specialist => "specialist",
            Role::Patient => "patient",
        };
        write!(f, "{label}")
    }
}

/// Explicit acting identity passed into every coordinator operation.
///
/// Replaces ambient session state: callers always say who is acting, and
/// the coordinator uses it for attribution (created_by, audit lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn nurse(id: Uuid) -> Self {
        Self { id, role: Role::Nurse }
    }

    pub fn specialist(id: Uuid) -> Self {
        Self { id, role: Role::Specialist }
    }

    pub fn patient(id: Uuid) -> Self {
        Self { id, role: Role::Patient }
    }
}

/// Referral lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralStatus {
    Created,
    Sent,
    Booked,
    Confirmed,
    Attended,
    NoShow,
    NeedsReschedule,
    Closed,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Created => "CREATED",
            ReferralStatus::Sent => "SENT",
            ReferralStatus::Booked => "BOOKED",
            ReferralStatus::Confirmed => "CONFIRMED",
            ReferralStatus::Attended => "ATTENDED",
            ReferralStatus::NoShow => "NO_SHOW",
            ReferralStatus::NeedsReschedule => "NEEDS_RESCHEDULE",
            ReferralStatus::Closed => "CLOSED",
        }
    }

    /// Terminal for the happy path; re-opening is out of scope.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReferralStatus::Attended | ReferralStatus::Closed)
    }

    pub const ALL: [ReferralStatus; 8] = [
        ReferralStatus::Created,
        ReferralStatus::Sent,
        ReferralStatus::Booked,
        ReferralStatus::Confirmed,
        ReferralStatus::Attended,
        ReferralStatus::NoShow,
        ReferralStatus::NeedsReschedule,
        ReferralStatus::Closed,
    ];
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReferralStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(ReferralStatus::Created),
            "SENT" => Ok(ReferralStatus::Sent),
            "BOOKED" => Ok(ReferralStatus::Booked),
            "CONFIRMED" => Ok(ReferralStatus::Confirmed),
            "ATTENDED" => Ok(ReferralStatus::Attended),
            "NO_SHOW" => Ok(ReferralStatus::NoShow),
            "NEEDS_RESCHEDULE" => Ok(ReferralStatus::NeedsReschedule),
            "CLOSED" => Ok(ReferralStatus::Closed),
            other => Err(format!("unknown referral status: {other}")),
        }
    }
}

/// Appointment states, nested inside a BOOKED-or-later referral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Booked,
    Confirmed,
    Attended,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Booked => "BOOKED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Attended => "ATTENDED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }

    /// An active appointment is one the patient is still expected at.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Booked | AppointmentStatus::Confirmed
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(AppointmentStatus::Scheduled),
            "BOOKED" => Ok(AppointmentStatus::Booked),
            "CONFIRMED" => Ok(AppointmentStatus::Confirmed),
            "ATTENDED" => Ok(AppointmentStatus::Attended),
            "NO_SHOW" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("unknown appointment status: {other}")),
        }
    }
}

/// Referral priority, highest first in dashboard ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" | "HIGH" | "high" => Ok(Priority::High),
            "Medium" | "MEDIUM" | "medium" => Ok(Priority::Medium),
            "Low" | "LOW" | "low" => Ok(Priority::Low),
            "" => Err("priority is required".to_string()),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Specialties a referral can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Specialty {
    Cardiology,
    Dermatology,
    Endocrinology,
    Neurology,
    Oncology,
    Ophthalmology,
    Orthopedics,
    Pediatrics,
    Psychiatry,
}

impl Specialty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::Cardiology => "Cardiology",
            Specialty::Dermatology => "Dermatology",
            Specialty::Endocrinology => "Endocrinology",
            Specialty::Neurology => "Neurology",
            Specialty::Oncology => "Oncology",
            Specialty::Ophthalmology => "Ophthalmology",
            Specialty::Orthopedics => "Orthopedics",
            Specialty::Pediatrics => "Pediatrics",
            Specialty::Psychiatry => "Psychiatry",
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Specialty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("specialty is required".to_string()),
            "Cardiology" => Ok(Specialty::Cardiology),
            "Dermatology" => Ok(Specialty::Dermatology),
            "Endocrinology" => Ok(Specialty::Endocrinology),
            "Neurology" => Ok(Specialty::Neurology),
            "Oncology" => Ok(Specialty::Oncology),
            "Ophthalmology" => Ok(Specialty::Ophthalmology),
            "Orthopedics" => Ok(Specialty::Orthopedics),
            "Pediatrics" => Ok(Specialty::Pediatrics),
            "Psychiatry" => Ok(Specialty::Psychiatry),
            other => Err(format!("unknown specialty: {other}")),
        }
    }
}

/// Follow-up work item kinds, generated by the coordinator only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Reschedule,
    Transport,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Reschedule => "RESCHEDULE",
            TaskKind::Transport => "TRANSPORT",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESCHEDULE" => Ok(TaskKind::Reschedule),
            "TRANSPORT" => Ok(TaskKind::Transport),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Open,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "OPEN",
            TaskStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(TaskStatus::Open),
            "DONE" => Ok(TaskStatus::Done),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Audit event vocabulary for the referral timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineEventKind {
    ReferralSent,
    AppointmentBooked,
    AppointmentRescheduled,
    PatientConfirmed,
    Attended,
    NoShow,
    RescheduleRequested,
    TransportRequested,
    StatusOverridden,
}

impl TimelineEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineEventKind::ReferralSent => "REFERRAL_SENT",
            TimelineEventKind::AppointmentBooked => "APPOINTMENT_BOOKED",
            TimelineEventKind::AppointmentRescheduled => "APPOINTMENT_RESCHEDULED",
            TimelineEventKind::PatientConfirmed => "PATIENT_CONFIRMED",
            TimelineEventKind::Attended => "ATTENDED",
            TimelineEventKind::NoShow => "NO_SHOW",
            TimelineEventKind::RescheduleRequested => "RESCHEDULE_REQUESTED",
            TimelineEventKind::TransportRequested => "TRANSPORT_REQUESTED",
            TimelineEventKind::StatusOverridden => "STATUS_OVERRIDDEN",
        }
    }
}

impl fmt::Display for TimelineEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimelineEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REFERRAL_SENT" => Ok(TimelineEventKind::ReferralSent),
            "APPOINTMENT_BOOKED" => Ok(TimelineEventKind::AppointmentBooked),
            "APPOINTMENT_RESCHEDULED" => Ok(TimelineEventKind::AppointmentRescheduled),
            "PATIENT_CONFIRMED" => Ok(TimelineEventKind::PatientConfirmed),
            "ATTENDED" => Ok(TimelineEventKind::Attended),
            "NO_SHOW" => Ok(TimelineEventKind::NoShow),
            "RESCHEDULE_REQUESTED" => Ok(TimelineEventKind::RescheduleRequested),
            "TRANSPORT_REQUESTED" => Ok(TimelineEventKind::TransportRequested),
            "STATUS_OVERRIDDEN" => Ok(TimelineEventKind::StatusOverridden),
            other => Err(format!("unknown timeline event kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    AppointmentBooked,
    AppointmentRescheduled,
    AppointmentConfirmed,
    AppointmentReminder,
    NoShow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AppointmentBooked => "APPOINTMENT_BOOKED",
            NotificationKind::AppointmentRescheduled => "APPOINTMENT_RESCHEDULED",
            NotificationKind::AppointmentConfirmed => "APPOINTMENT_CONFIRMED",
            NotificationKind::AppointmentReminder => "APPOINTMENT_REMINDER",
            NotificationKind::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPOINTMENT_BOOKED" => Ok(NotificationKind::AppointmentBooked),
            "APPOINTMENT_RESCHEDULED" => Ok(NotificationKind::AppointmentRescheduled),
            "APPOINTMENT_CONFIRMED" => Ok(NotificationKind::AppointmentConfirmed),
            "APPOINTMENT_REMINDER" => Ok(NotificationKind::AppointmentReminder),
            "NO_SHOW" => Ok(NotificationKind::NoShow),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    InApp,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
            NotificationChannel::InApp => "in_app",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(NotificationChannel::Email),
            "sms" => Ok(NotificationChannel::Sms),
            "in_app" => Ok(NotificationChannel::InApp),
            other => Err(format!("unknown notification channel: {other}")),
        }
    }
}

/// Patient record. Immutable after creation except the contact fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub risk_score: i32,
    pub medical_history: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPatient {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub risk_score: i32,
    pub medical_history: Vec<String>,
}

/// Contact-field update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// The central aggregate: a request for a patient to see a specialist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub created_by: Uuid,
    pub specialty: Specialty,
    pub priority: Priority,
    pub status: ReferralStatus,
    pub notes: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub transportation_needed: bool,
    pub is_urgent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every status write.
    pub version: i64,
}

/// Typed insert payload handed to the store by the coordinator.
#[derive(Debug, Clone)]
pub struct NewReferral {
    pub patient_id: Uuid,
    pub created_by: Uuid,
    pub specialty: Specialty,
    pub priority: Priority,
    pub status: ReferralStatus,
    pub notes: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub transportation_needed: bool,
    pub is_urgent: bool,
}

/// Caller-facing create request. Specialty and priority arrive as text from
/// the presentation layer and are validated here, not there.
#[derive(Debug, Clone)]
pub struct CreateReferral {
    pub patient_id: Uuid,
    pub specialty: String,
    pub priority: String,
    pub notes: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub transportation_needed: bool,
    pub is_urgent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub referral_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub location: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub scheduled_for: DateTime<Utc>,
    pub location: String,
    pub status: AppointmentStatus,
}

/// In-place appointment mutation; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct AppointmentUpdate {
    pub scheduled_for: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub referral_id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub assigned_to: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub referral_id: Uuid,
    pub kind: TaskKind,
    pub due_at: Option<DateTime<Utc>>,
    pub assigned_to: String,
}

/// Immutable audit line; ordering is creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub referral_id: Uuid,
    pub kind: TimelineEventKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTimelineEvent {
    pub kind: TimelineEventKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Write-once notification row; the read flag is the only mutable field
/// and its mutation is out of scope here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub message: String,
}
