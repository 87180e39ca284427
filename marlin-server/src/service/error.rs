//! Service-level failure taxonomy

use crate::db::repos::{DbError, EMAIL_KEY, ENROLLMENT_KEY, GROUP_CODE_KEY, NATIONAL_ID_KEY};
use crate::models::ValidationError;

pub(crate) const NATIONAL_ID_TAKEN: &str = "national ID already registered to another student";
pub(crate) const EMAIL_TAKEN: &str = "email already registered to another student";
pub(crate) const CODE_TAKEN: &str = "a group with this code already exists";
pub(crate) const ALREADY_ENROLLED: &str = "student is already enrolled in this group";
pub(crate) const GROUP_NOT_EMPTY: &str =
    "group cannot be deleted while it has enrolled students";

/// Outcome of a failed enrollment operation
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A field failed validation
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Malformed request that isn't a single-field validation failure
    #[error("{0}")]
    InvalidInput(String),

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// Uniqueness, capacity or identity-mismatch violation
    #[error("{0}")]
    Conflict(String),

    /// Optimistic concurrency collision; safe to retry after reloading
    #[error("{resource} {id} was modified by another request, reload and retry")]
    StaleWrite { resource: &'static str, id: String },

    /// Unexpected storage failure, message passed through
    #[error("storage failure: {0}")]
    Internal(String),
}

impl ServiceError {
    pub(crate) fn capacity(group_id: i64, capacity: usize) -> Self {
        Self::Conflict(format!(
            "group {} already has the maximum of {} students",
            group_id, capacity
        ))
    }
}

impl From<DbError> for ServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { resource, id } => Self::NotFound { resource, id },
            DbError::UniqueViolation { constraint } => Self::Conflict(
                match constraint.as_str() {
                    NATIONAL_ID_KEY => NATIONAL_ID_TAKEN,
                    EMAIL_KEY => EMAIL_TAKEN,
                    GROUP_CODE_KEY => CODE_TAKEN,
                    ENROLLMENT_KEY => ALREADY_ENROLLED,
                    _ => "record conflicts with an existing one",
                }
                .to_owned(),
            ),
            DbError::CapacityExceeded { group_id, capacity } => Self::capacity(group_id, capacity),
            DbError::HasMembers { .. } => Self::Conflict(GROUP_NOT_EMPTY.to_owned()),
            DbError::StaleVersion { resource, id } => Self::StaleWrite { resource, id },
            e @ DbError::Contention { .. } => Self::Internal(e.to_string()),
            DbError::Sqlx(e) => Self::Internal(e.to_string()),
        }
    }
}
