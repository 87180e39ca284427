//! Student domain types
//!
//! Validated field newtypes plus the record, patch and filter shapes used by
//! the service and the store.

use super::validation::{strip_national_id, validate_email, validate_national_id, ValidationError};
use super::GroupSummary;

const MAX_NAME_LEN: usize = 200;
const MAX_EMAIL_LEN: usize = 254;

/// Validated student full name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentName(String);

impl StudentName {
    /// Create a student name. Surrounding whitespace is trimmed.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }
        if s.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "name",
                max: MAX_NAME_LEN,
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// National ID in canonical form (11 digits, separators removed).
///
/// `"123.456.789-09"` and `"12345678909"` are the same ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NationalId(String);

impl NationalId {
    /// Validate and normalize a national ID.
    ///
    /// # Example
    /// ```
    /// use marlin_server::models::NationalId;
    ///
    /// let id = NationalId::new("123.456.789-09").unwrap();
    /// assert_eq!(id.as_str(), "12345678909");
    /// assert!(NationalId::new("123.456").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.trim().is_empty() {
            return Err(ValidationError::Empty { field: "nationalId" });
        }
        if !validate_national_id(s) {
            return Err(ValidationError::InvalidFormat {
                field: "nationalId",
                reason: "must contain exactly 11 digits, optionally separated by '.' or '-'",
            });
        }
        Ok(Self(strip_national_id(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated email address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "email" });
        }
        if s.len() > MAX_EMAIL_LEN {
            return Err(ValidationError::TooLong {
                field: "email",
                max: MAX_EMAIL_LEN,
            });
        }
        if !validate_email(s) {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "must be a valid address of the form local@domain",
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Student with memberships attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub national_id: String,
    pub email: String,
    /// Row version for optimistic concurrency
    pub version: i32,
    pub groups: Vec<GroupSummary>,
}

impl Student {
    /// Whether a raw, possibly formatted, national ID names this student.
    pub fn has_national_id(&self, raw: &str) -> bool {
        strip_national_id(raw) == self.national_id
    }
}

/// Student as seen from a group's member list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentSummary {
    pub id: i64,
    pub name: String,
    pub national_id: String,
    pub email: String,
}

impl From<&Student> for StudentSummary {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            national_id: s.national_id.clone(),
            email: s.email.clone(),
        }
    }
}

/// Fully validated input for a new student row
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: StudentName,
    pub national_id: NationalId,
    pub email: Email,
}

/// Validated field changes for an update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct StudentChanges {
    pub name: Option<StudentName>,
    pub national_id: Option<NationalId>,
    pub email: Option<Email>,
    /// Replacement membership set, already de-duplicated
    pub group_ids: Option<Vec<i64>>,
}

impl StudentChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.national_id.is_none()
            && self.email.is_none()
            && self.group_ids.is_none()
    }
}

/// Raw partial update as received from a caller.
///
/// Absence means "leave unchanged"; a present empty string is an explicit
/// value and is validated like any other.
#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub group_ids: Option<Vec<i64>>,
}

/// Conjunctive listing filter; `None` fields don't restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilter {
    /// Substring of the name
    pub name: Option<String>,
    /// Exact national ID, canonical form
    pub national_id: Option<String>,
    /// Substring of the email
    pub email: Option<String>,
    /// Member of this group
    pub group_id: Option<i64>,
}

impl StudentFilter {
    /// Build a filter from raw query values. Empty strings are dropped and the
    /// national ID has its separators stripped.
    pub fn from_raw(
        name: Option<String>,
        national_id: Option<String>,
        email: Option<String>,
        group_id: Option<i64>,
    ) -> Self {
        Self {
            name: name.filter(|s| !s.is_empty()),
            national_id: national_id
                .filter(|s| !s.is_empty())
                .map(|s| strip_national_id(&s)),
            email: email.filter(|s| !s.is_empty()),
            group_id,
        }
    }

    /// In-process evaluation of the filter, used by the in-memory store.
    pub fn matches(&self, student: &Student) -> bool {
        self.name
            .as_deref()
            .map_or(true, |n| student.name.contains(n))
            && self
                .national_id
                .as_deref()
                .map_or(true, |id| student.national_id == id)
            && self
                .email
                .as_deref()
                .map_or(true, |e| student.email.contains(e))
            && self
                .group_id
                .map_or(true, |g| student.groups.iter().any(|grp| grp.id == g))
    }
}
