// Clearwater Loop - Rural Referral Coordination Core
// This exposes the core components for testing and integration

pub mod config;
pub mod dashboard;
pub mod notify;
pub mod referral;
pub mod storage;
pub mod tasks;
pub mod telemetry;
pub mod timeline;

// Re-export key types for easy access
pub use config::{config, init_config, ClearwaterConfig};
pub use dashboard::{Dashboard, DashboardEntry};
pub use notify::{NotificationDispatcher, NotificationSender, OutboundNotification, TracingSender};
pub use referral::{
    Actor, Appointment, AppointmentStatus, CoordinationError, CoordinatorSettings, CreateReferral,
    EntityKind, Notification, NotificationChannel, NotificationKind, Patient, Priority, Referral,
    ReferralCoordinator, ReferralStatus, Role, Specialty, Task, TaskKind, TaskStatus,
    TimelineEvent, TimelineEventKind,
};
pub use storage::{InMemoryStore, ListScope, ReferralFilter, ReferralStore, StoreError};
pub use tasks::TaskManager;
pub use telemetry::{create_referral_span, generate_correlation_id, init_telemetry};
pub use timeline::TimelineRecorder;

#[cfg(feature = "database")]
pub use storage::SqliteStore;
