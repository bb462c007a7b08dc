use thiserror::Error;
use uuid::Uuid;

use crate::storage::StoreError;

/// Entities an operation can fail to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Patient,
    Referral,
    Appointment,
    Task,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EntityKind::Patient => "patient",
            EntityKind::Referral => "referral",
            EntityKind::Appointment => "appointment",
            EntityKind::Task => "task",
        };
        write!(f, "{label}")
    }
}

/// Error taxonomy for coordinator operations.
///
/// NotFound, InvalidTransition and Validation are caller errors and surface
/// immediately. Conflict surfaces only after one internal retry. Dependency
/// is a failed core storage write and is fatal to the operation.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("{operation} is not defined while {entity} is {state}")]
    InvalidTransition {
        operation: &'static str,
        entity: EntityKind,
        state: String,
    },

    #[error("concurrent update on referral {referral_id} lost after retry")]
    Conflict { referral_id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage dependency failure")]
    Dependency(#[source] StoreError),
}

impl CoordinationError {
    pub(crate) fn invalid_transition(
        operation: &'static str,
        entity: EntityKind,
        state: impl ToString,
    ) -> Self {
        CoordinationError::InvalidTransition {
            operation,
            entity,
            state: state.to_string(),
        }
    }

    /// Map a store error raised while touching a specific entity.
    pub(crate) fn from_store(entity: EntityKind, id: Uuid) -> impl Fn(StoreError) -> Self {
        move |err| match err {
            StoreError::NotFound => CoordinationError::NotFound { entity, id },
            StoreError::Conflict => CoordinationError::Conflict { referral_id: id },
            other => CoordinationError::Dependency(other),
        }
    }
}
