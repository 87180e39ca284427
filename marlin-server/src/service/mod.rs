//! Enrollment service
//!
//! Orchestrates validation and persistence for students, class groups and
//! the enrollments between them. Handlers call this; it calls the store.

pub mod error;
mod groups;
mod students;

use std::sync::Arc;

use crate::db::EnrollmentStore;
use crate::models::Student;

pub use error::ServiceError;

/// Default maximum number of students per group
pub const DEFAULT_GROUP_CAPACITY: usize = 5;

/// Tunable enrollment rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentPolicy {
    /// Maximum students per group
    pub group_capacity: usize,
    /// Whether replacing a student's groups must respect capacity for groups
    /// the student is joining
    pub check_capacity_on_replace: bool,
}

impl Default for EnrollmentPolicy {
    fn default() -> Self {
        Self {
            group_capacity: DEFAULT_GROUP_CAPACITY,
            check_capacity_on_replace: true,
        }
    }
}

/// Student details supplied when enrolling or attaching
#[derive(Debug, Clone, Default)]
pub struct StudentIntake {
    pub name: String,
    pub national_id: String,
    /// Required whenever a new student record is created
    pub email: Option<String>,
}

/// How an intake treats a national ID that is already registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeMode {
    /// New student: an existing national ID is a conflict
    Enroll,
    /// Add to group: an existing student is reused as-is
    Attach,
}

/// Result of a successful intake
#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub student: Student,
    /// False when an existing student was attached
    pub created: bool,
}

/// Enrollment service shared by all handlers
#[derive(Clone)]
pub struct EnrollmentService {
    store: Arc<dyn EnrollmentStore>,
    policy: EnrollmentPolicy,
}

impl EnrollmentService {
    pub fn new(store: Arc<dyn EnrollmentStore>, policy: EnrollmentPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> EnrollmentPolicy {
        self.policy
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }
}
