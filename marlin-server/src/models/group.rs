//! Class group domain types

use super::validation::ValidationError;
use super::StudentSummary;

const MAX_CODE_LEN: usize = 32;
const MAX_LEVEL_LEN: usize = 64;

/// Validated group code, e.g. `A1`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupCode(String);

impl GroupCode {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "code" });
        }
        if s.chars().count() > MAX_CODE_LEN {
            return Err(ValidationError::TooLong {
                field: "code",
                max: MAX_CODE_LEN,
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Free-form level label, e.g. `Basic`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLevel(String);

impl GroupLevel {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "level" });
        }
        if s.chars().count() > MAX_LEVEL_LEN {
            return Err(ValidationError::TooLong {
                field: "level",
                max: MAX_LEVEL_LEN,
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Class group with enrolled students attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassGroup {
    pub id: i64,
    pub code: String,
    pub level: String,
    pub students: Vec<StudentSummary>,
}

impl ClassGroup {
    pub fn member_count(&self) -> usize {
        self.students.len()
    }

    pub fn has_member(&self, national_id: &str) -> bool {
        self.students.iter().any(|s| s.national_id == national_id)
    }
}

/// Group as seen from a student's membership list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub id: i64,
    pub code: String,
    pub level: String,
}

impl From<&ClassGroup> for GroupSummary {
    fn from(g: &ClassGroup) -> Self {
        Self {
            id: g.id,
            code: g.code.clone(),
            level: g.level.clone(),
        }
    }
}

/// Validated input for a new group row
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub code: GroupCode,
    pub level: GroupLevel,
}

/// Conjunctive listing filter; `None` fields don't restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    /// Substring of the code
    pub code: Option<String>,
    /// Substring of the level
    pub level: Option<String>,
    /// Has this student enrolled
    pub student_id: Option<i64>,
}

impl GroupFilter {
    pub fn from_raw(code: Option<String>, level: Option<String>, student_id: Option<i64>) -> Self {
        Self {
            code: code.filter(|s| !s.is_empty()),
            level: level.filter(|s| !s.is_empty()),
            student_id,
        }
    }

    pub fn matches(&self, group: &ClassGroup) -> bool {
        self.code.as_deref().map_or(true, |c| group.code.contains(c))
            && self.level.as_deref().map_or(true, |l| group.level.contains(l))
            && self
                .student_id
                .map_or(true, |id| group.students.iter().any(|s| s.id == id))
    }
}
