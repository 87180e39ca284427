//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Uses JOINs for list operations (no N+1)
//! - Relies on unique constraints, mapping violations to `DbError::UniqueViolation`
//! - Locks the group row in a transaction for every write that adds a member

pub mod students;
pub mod groups;

pub use groups::GroupRepo;
pub use students::StudentRepo;

/// Unique constraint on `students.national_id`
pub const NATIONAL_ID_KEY: &str = "students_national_id_key";
/// Unique constraint on `students.email`
pub const EMAIL_KEY: &str = "students_email_key";
/// Unique constraint on `class_groups.code`
pub const GROUP_CODE_KEY: &str = "class_groups_code_key";
/// Primary key of `enrollments`, one row per (student, group)
pub const ENROLLMENT_KEY: &str = "enrollments_pkey";

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("group {group_id} is full ({capacity} students)")]
    CapacityExceeded { group_id: i64, capacity: usize },

    #[error("group {group_id} still has enrolled students")]
    HasMembers { group_id: i64 },

    #[error("{resource} '{id}' was modified concurrently")]
    StaleVersion { resource: &'static str, id: String },

    /// Serialization failure or deadlock; PostgreSQL rolled the transaction back
    #[error("transaction aborted by concurrent writer (SQLSTATE {code})")]
    Contention { code: String },
}

/// SQLSTATEs PostgreSQL raises when concurrent transactions collide
const CONTENTION_CODES: [&str; 2] = ["40001", "40P01"];

fn is_contention(code: &str) -> bool {
    CONTENTION_CODES.contains(&code)
}

impl DbError {
    pub(crate) fn student_not_found(id: i64) -> Self {
        Self::NotFound {
            resource: "student",
            id: id.to_string(),
        }
    }

    pub(crate) fn group_not_found(id: i64) -> Self {
        Self::NotFound {
            resource: "group",
            id: id.to_string(),
        }
    }

    /// Report a collided transaction as a stale write on `resource`.
    pub(crate) fn on_contention(self, resource: &'static str, id: i64) -> Self {
        match self {
            Self::Contention { .. } => Self::StaleVersion {
                resource,
                id: id.to_string(),
            },
            other => other,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return Self::UniqueViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_owned(),
                };
            }
            if let Some(code) = db.code().filter(|c| is_contention(c)) {
                return Self::Contention {
                    code: code.into_owned(),
                };
            }
        }
        Self::Sqlx(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_stays_sqlx() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Sqlx(_)));
    }

    #[test]
    fn contention_codes() {
        assert!(is_contention("40001"));
        assert!(is_contention("40P01"));
        assert!(!is_contention("23505"));
    }

    #[test]
    fn contention_becomes_stale_version() {
        let err = DbError::Contention {
            code: "40P01".into(),
        }
        .on_contention("student", 7);
        assert!(matches!(err, DbError::StaleVersion { resource: "student", ref id } if id == "7"));

        let untouched = DbError::group_not_found(3).on_contention("group", 3);
        assert!(matches!(untouched, DbError::NotFound { .. }));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            DbError::student_not_found(4).to_string(),
            "not found: student '4'"
        );
        assert_eq!(
            DbError::CapacityExceeded {
                group_id: 2,
                capacity: 5
            }
            .to_string(),
            "group 2 is full (5 students)"
        );
    }
}
