//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod validation;
pub mod student;
pub mod group;

pub use validation::{validate_email, validate_national_id, ValidationError};
pub use student::{
    Email, NationalId, NewStudent, Student, StudentChanges, StudentFilter, StudentName,
    StudentPatch, StudentSummary,
};
pub use group::{ClassGroup, GroupCode, GroupFilter, GroupLevel, GroupSummary, NewGroup};
